use std::collections::VecDeque;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::StoreError;

/// Positioned, staged I/O over the data file.
///
/// Outgoing bytes are staged into an internal queue and drained through
/// a fixed scratch buffer at the current file position; incoming bytes
/// land in the same queue and are consumed from the front. The engine
/// ends every mutating operation with [`FileIo::commit`], which is the
/// durability point of the whole store.
#[derive(Debug)]
pub struct FileIo {
    file: File,
    scratch: Vec<u8>,
    queue: VecDeque<u8>,
}

impl FileIo {
    pub fn new(file: File, scratch_buffer_size: usize) -> Self {
        Self {
            file,
            scratch: vec![0u8; scratch_buffer_size],
            queue: VecDeque::new(),
        }
    }

    /// Position the file cursor. Any staged bytes are discarded.
    pub fn seek(&mut self, offset: u64) -> Result<(), StoreError> {
        self.queue.clear();
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    pub fn stage(&mut self, bytes: &[u8]) {
        self.queue.extend(bytes);
    }

    pub fn stage_u64(&mut self, value: u64) {
        self.queue.extend(value.to_le_bytes());
    }

    /// Drain the staging queue into the file at the current position,
    /// one scratch buffer at a time.
    pub fn flush_staged(&mut self) -> Result<(), StoreError> {
        while !self.queue.is_empty() {
            let chunk = self.queue.len().min(self.scratch.len());

            for (dst, src) in self.scratch.iter_mut().zip(self.queue.drain(..chunk)) {
                *dst = src;
            }

            self.file.write_all(&self.scratch[..chunk])?;
        }

        Ok(())
    }

    /// Read exactly `count` bytes at the current position into the
    /// staging queue.
    pub fn read_exactly(&mut self, count: u64) -> Result<(), StoreError> {
        let mut remaining = count as usize;

        while remaining > 0 {
            let chunk = remaining.min(self.scratch.len());
            self.file.read_exact(&mut self.scratch[..chunk])?;
            self.queue.extend(&self.scratch[..chunk]);
            remaining -= chunk;
        }

        Ok(())
    }

    pub fn take_u64(&mut self) -> Result<u64, StoreError> {
        let mut bytes = [0u8; 8];

        for byte in &mut bytes {
            *byte = self
                .queue
                .pop_front()
                .ok_or_else(|| StoreError::Corrupted("short read from data file".into()))?;
        }

        Ok(u64::from_le_bytes(bytes))
    }

    pub fn take_bytes(&mut self, count: usize) -> Result<Vec<u8>, StoreError> {
        if self.queue.len() < count {
            return Err(StoreError::Corrupted("short read from data file".into()));
        }

        Ok(self.queue.drain(..count).collect())
    }

    /// Extend the file with zero bytes up to `length`. Shorter targets
    /// leave the file untouched.
    pub fn grow_to(&mut self, length: u64) -> Result<(), StoreError> {
        if self.size()? < length {
            self.file.set_len(length)?;
        }

        Ok(())
    }

    pub fn truncate(&mut self, length: u64) -> Result<(), StoreError> {
        self.file.set_len(length)?;
        Ok(())
    }

    pub fn size(&self) -> Result<u64, StoreError> {
        Ok(self.file.metadata()?.len())
    }

    /// Flush file contents to durable storage.
    pub fn commit(&mut self) -> Result<(), StoreError> {
        self.file.sync_data()?;
        Ok(())
    }

    /// Like [`FileIo::commit`] but also flushes metadata, for close.
    pub fn sync_all(&mut self) -> Result<(), StoreError> {
        self.file.sync_all()?;
        Ok(())
    }
}
