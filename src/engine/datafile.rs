use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use tracing::{debug, info, warn};

use super::{
    FileIo, FreeSpaceMap, Interval, ObjectIndex, SlotPool, FIRST_BLOCK_OFFSET, INDEX_BLOCK_SIZE,
    MAX_ID, MIN_FILE_SIZE, MIN_ID, SLOTS_PER_BLOCK, SLOT_SIZE,
};
use crate::config::StoreConfig;
use crate::{ObjectId, StoreError};

/// The coordinator of one data file.
///
/// Owns the next-id counter, the id index, the free-space map, the slot
/// pool and the file handle. Every mutating operation writes to the
/// file, commits, and only then updates the in-memory maps; when a step
/// fails, values taken out of the maps earlier in the same operation
/// are put back, so the cached state keeps matching the last durable
/// state on disk.
pub struct DataFileEngine {
    config: StoreConfig,
    io: Option<FileIo>,
    free: FreeSpaceMap,
    slots: SlotPool,
    objects: BTreeMap<ObjectId, ObjectIndex>,
    next_id: u64,
    last_block: u64,
}

impl DataFileEngine {
    /// Open the data file at `config.path`, creating and formatting it
    /// if it does not exist yet, then rebuild all in-memory state from
    /// the file contents.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        config.validate()?;

        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .open(&config.path)?;

        let mut engine = Self {
            io: Some(FileIo::new(file, config.scratch_buffer_size)),
            free: FreeSpaceMap::default(),
            slots: SlotPool::default(),
            objects: BTreeMap::new(),
            next_id: 0,
            last_block: FIRST_BLOCK_OFFSET,
            config,
        };

        if engine.io_mut()?.size()? == 0 {
            engine.format()?;
            sync_parent_dir(&engine.config.path)?;
        }

        engine.initialize()?;

        Ok(engine)
    }

    /// Allocate a payload interval and an index slot for a fresh id.
    /// The slot is durable on disk before the call returns.
    pub fn reserve(&mut self, data_length: u64) -> Result<ObjectIndex, StoreError> {
        self.ensure_open()?;

        let iv = self.acquire_payload(data_length)?;

        let slot_offset = match self.acquire_slot() {
            Ok(offset) => offset,
            Err(err) => {
                self.free.add(iv);
                return Err(err);
            }
        };

        let id = match self.mint_id() {
            Ok(id) => id,
            Err(err) => {
                self.slots.push(slot_offset);
                self.free.add(iv);
                return Err(err);
            }
        };

        self.install(id, iv, slot_offset)
    }

    /// Like [`DataFileEngine::reserve`] but reuses a previously minted
    /// id, for updates that relocate a payload.
    pub fn reserve_for(
        &mut self,
        id: ObjectId,
        data_length: u64,
    ) -> Result<ObjectIndex, StoreError> {
        self.ensure_open()?;

        if self.objects.contains_key(&id) {
            return Err(StoreError::AlreadyExists(id));
        }

        let iv = self.acquire_payload(data_length)?;

        let slot_offset = match self.acquire_slot() {
            Ok(offset) => offset,
            Err(err) => {
                self.free.add(iv);
                return Err(err);
            }
        };

        self.install(id, iv, slot_offset)
    }

    /// Fill the payload interval of a reserved object. `bytes` must
    /// match the reserved length exactly.
    pub fn write(&mut self, index: &ObjectIndex, bytes: &[u8]) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.ensure_live(index)?;

        let want = index.payload_length();
        if bytes.len() as u64 != want {
            return Err(StoreError::LengthMismatch {
                want,
                got: bytes.len() as u64,
            });
        }

        if bytes.is_empty() {
            return Ok(());
        }

        let io = self.io_mut()?;
        io.seek(index.data_begin)?;
        io.stage(bytes);
        io.flush_staged()?;
        io.commit()?;

        debug!(id = index.id, length = want, "wrote payload");

        Ok(())
    }

    pub fn read(&mut self, index: &ObjectIndex) -> Result<Vec<u8>, StoreError> {
        self.ensure_open()?;
        self.ensure_live(index)?;

        let length = index.payload_length();
        if length == 0 {
            return Ok(Vec::new());
        }

        let io = self.io_mut()?;
        io.seek(index.data_begin)?;
        io.read_exactly(length)?;
        io.take_bytes(length as usize)
    }

    /// Destroy an object: zero its slot's id field on disk, then return
    /// its payload interval and slot to the allocators.
    pub fn free(&mut self, index: &ObjectIndex) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.ensure_live(index)?;

        // only the id field is zeroed; stale begin/end bytes in a free
        // slot are ignored by every reader
        let io = self.io_mut()?;
        io.seek(index.slot_offset)?;
        io.stage_u64(0);
        io.flush_staged()?;
        io.commit()?;

        self.free.add(index.payload());
        self.slots.push(index.slot_offset);
        self.objects.remove(&index.id);

        debug!(id = index.id, "freed object");

        Ok(())
    }

    pub fn index_of(&self, id: ObjectId) -> Result<ObjectIndex, StoreError> {
        self.ensure_open()?;

        self.objects
            .get(&id)
            .copied()
            .ok_or(StoreError::NotFound(id))
    }

    pub fn contains(&self, id: ObjectId) -> Result<bool, StoreError> {
        self.ensure_open()?;
        Ok(self.objects.contains_key(&id))
    }

    /// Snapshot of all live ids, in ascending order. Later mutations do
    /// not affect an already taken snapshot.
    pub fn ids(&self) -> Result<Vec<ObjectId>, StoreError> {
        self.ensure_open()?;
        Ok(self.objects.keys().copied().collect())
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        self.ensure_open()?;
        Ok(self.objects.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    pub fn file_size(&self) -> Result<u64, StoreError> {
        match &self.io {
            Some(io) => io.size(),
            None => Err(StoreError::Closed),
        }
    }

    /// Reclaim dead space: retire all-free index blocks at the chain
    /// tail, coalesce adjacent free intervals, and truncate the file
    /// past the last used byte.
    pub fn compact(&mut self) -> Result<(), StoreError> {
        self.ensure_open()?;

        self.trim_chain_tail()?;
        self.free.merge_all();

        let old_size = self.io_mut()?.size()?;
        let new_size = self.free.trim_tail(old_size);

        if new_size < old_size {
            let io = self.io_mut()?;
            io.truncate(new_size)?;
            io.commit()?;
        }

        info!(old_size, new_size, "compacted data file");

        Ok(())
    }

    /// Flush everything and release the file handle. Every operation
    /// after this fails with [`StoreError::Closed`].
    pub fn close(&mut self) -> Result<(), StoreError> {
        let mut io = self.io.take().ok_or(StoreError::Closed)?;
        io.sync_all()?;

        info!("data file closed");

        Ok(())
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.io.is_some() {
            Ok(())
        } else {
            Err(StoreError::Closed)
        }
    }

    fn io_mut(&mut self) -> Result<&mut FileIo, StoreError> {
        self.io.as_mut().ok_or(StoreError::Closed)
    }

    fn ensure_live(&self, index: &ObjectIndex) -> Result<(), StoreError> {
        match self.objects.get(&index.id) {
            Some(live) if live == index => Ok(()),
            _ => Err(StoreError::NotFound(index.id)),
        }
    }

    /// Lay out a fresh file: minimum length, next-id cell, zeroed first
    /// index block.
    fn format(&mut self) -> Result<(), StoreError> {
        info!(path = %self.config.path.display(), "creating data file");

        let initial = self.config.min_file_size.max(MIN_FILE_SIZE);

        let start_id = self.config.start_id;
        let io = self.io_mut()?;
        io.grow_to(initial)?;
        io.seek(0)?;
        io.stage_u64(start_id);
        io.flush_staged()?;

        self.zero_block(FIRST_BLOCK_OFFSET)?;
        self.io_mut()?.commit()
    }

    /// Rebuild every in-memory structure from the file alone: read the
    /// next-id cell, seed the free map with the whole file, then walk
    /// the index-block chain subtracting blocks and live payloads.
    fn initialize(&mut self) -> Result<(), StoreError> {
        let file_size = self.io_mut()?.size()?;

        if file_size < MIN_FILE_SIZE {
            return Err(StoreError::Corrupted(format!(
                "file holds {file_size} bytes, less than one index block"
            )));
        }

        let io = self.io_mut()?;
        io.seek(0)?;
        io.read_exactly(8)?;
        let next_id = io.take_u64()?;
        self.next_id = next_id;

        self.free = FreeSpaceMap::default();
        self.slots = SlotPool::default();
        self.objects = BTreeMap::new();
        self.free.add(Interval::new(FIRST_BLOCK_OFFSET, file_size));

        let mut block = FIRST_BLOCK_OFFSET;

        loop {
            let block_end = block
                .checked_add(INDEX_BLOCK_SIZE)
                .filter(|&end| end <= file_size)
                .ok_or_else(|| {
                    StoreError::Corrupted(format!("index block at {block} lies outside the file"))
                })?;
            let block_iv = Interval::new(block, block_end);

            self.free.reserve(block_iv).map_err(|_| {
                StoreError::Corrupted(format!("index block at {block} overlaps another region"))
            })?;

            let (next, records) = self.read_block(block)?;

            for (position, (id, begin, end)) in records.into_iter().enumerate() {
                let slot_offset = block + 8 + position as u64 * SLOT_SIZE;

                if id == 0 {
                    self.slots.push(slot_offset);
                    continue;
                }

                if id >= self.next_id {
                    return Err(StoreError::Corrupted(format!(
                        "object {id} is not below the next-id counter {next_id}"
                    )));
                }

                if begin > end || end > file_size {
                    return Err(StoreError::Corrupted(format!(
                        "object {id} holds invalid interval [{begin}, {end})"
                    )));
                }

                self.free.reserve(Interval::new(begin, end)).map_err(|_| {
                    warn!(id, begin, end, "payload overlaps another region");
                    StoreError::Corrupted(format!(
                        "payload of object {id} overlaps another region"
                    ))
                })?;

                let index = ObjectIndex {
                    id,
                    data_begin: begin,
                    data_end: end,
                    slot_offset,
                };

                if self.objects.insert(id, index).is_some() {
                    return Err(StoreError::Corrupted(format!("duplicate object id {id}")));
                }
            }

            self.last_block = block;

            if next == 0 {
                break;
            }

            block = next;
        }

        info!(
            objects = self.objects.len(),
            free_slots = self.slots.len(),
            free_intervals = self.free.len(),
            next_id = self.next_id,
            "data file initialized"
        );

        Ok(())
    }

    /// Read one index block into memory: its next-pointer and the raw
    /// `(id, begin, end)` triple of every slot.
    fn read_block(&mut self, block: u64) -> Result<(u64, Vec<(u64, u64, u64)>), StoreError> {
        let io = self.io_mut()?;
        io.seek(block)?;
        io.read_exactly(INDEX_BLOCK_SIZE)?;

        let next = io.take_u64()?;

        let mut records = Vec::with_capacity(SLOTS_PER_BLOCK as usize);
        for _ in 0..SLOTS_PER_BLOCK {
            records.push((io.take_u64()?, io.take_u64()?, io.take_u64()?));
        }

        Ok((next, records))
    }

    fn acquire_payload(&mut self, data_length: u64) -> Result<Interval, StoreError> {
        if data_length == 0 {
            // zero-length payloads never touch the free map
            return Ok(Interval::new(0, 0));
        }

        self.acquire_free(data_length)
    }

    /// Take a best-fit interval of exactly `size` bytes, growing the
    /// file when no stored interval is large enough. Any surplus of the
    /// taken interval goes straight back to the free map.
    fn acquire_free(&mut self, size: u64) -> Result<Interval, StoreError> {
        let found = match self.free.take(size) {
            Some(iv) => iv,
            None => {
                let old_size = self.io_mut()?.size()?;
                let new_size = old_size + size.max(self.config.growth_quantum);

                debug!(old_size, new_size, "growing data file");

                self.io_mut()?.grow_to(new_size)?;
                self.free.add(Interval::new(old_size, new_size));

                self.free.take(size).ok_or_else(|| {
                    StoreError::Corrupted("file growth produced no usable interval".into())
                })?
            }
        };

        if found.length() > size {
            self.free.add(Interval::new(found.begin + size, found.end));
        }

        Ok(Interval::new(found.begin, found.begin + size))
    }

    fn acquire_slot(&mut self) -> Result<u64, StoreError> {
        if self.slots.is_empty() {
            self.grow_chain()?;
        }

        self.slots
            .pop()
            .ok_or_else(|| StoreError::Corrupted("fresh index block exposed no free slots".into()))
    }

    /// Append a new index block to the chain and feed its slots to the
    /// pool.
    fn grow_chain(&mut self) -> Result<(), StoreError> {
        let block_iv = self.acquire_free(INDEX_BLOCK_SIZE)?;

        debug!(begin = block_iv.begin, "appending index block");

        // the fresh block becomes reachable only after it is zeroed on
        // disk, so a crash between the two commits never links a block
        // holding stale bytes
        if let Err(err) = self.zero_block_committed(block_iv.begin) {
            self.free.add(block_iv);
            return Err(err);
        }

        if let Err(err) = self.write_next_pointer(self.last_block, block_iv.begin) {
            self.free.add(block_iv);
            return Err(err);
        }

        for position in 0..SLOTS_PER_BLOCK {
            self.slots.push(block_iv.begin + 8 + position * SLOT_SIZE);
        }

        self.last_block = block_iv.begin;

        Ok(())
    }

    fn zero_block(&mut self, begin: u64) -> Result<(), StoreError> {
        let zeros = vec![0u8; INDEX_BLOCK_SIZE as usize];

        let io = self.io_mut()?;
        io.seek(begin)?;
        io.stage(&zeros);
        io.flush_staged()
    }

    fn zero_block_committed(&mut self, begin: u64) -> Result<(), StoreError> {
        self.zero_block(begin)?;
        self.io_mut()?.commit()
    }

    fn write_next_pointer(&mut self, block: u64, target: u64) -> Result<(), StoreError> {
        let io = self.io_mut()?;
        io.seek(block)?;
        io.stage_u64(target);
        io.flush_staged()?;
        io.commit()
    }

    /// Persist the bumped next-id counter, then hand out the previous
    /// value.
    fn mint_id(&mut self) -> Result<ObjectId, StoreError> {
        let id = self.next_id;

        if !(MIN_ID..=MAX_ID).contains(&id) {
            return Err(StoreError::IdExhausted);
        }

        let io = self.io_mut()?;
        io.seek(0)?;
        io.stage_u64(id + 1);
        io.flush_staged()?;
        io.commit()?;

        self.next_id = id + 1;

        Ok(id)
    }

    /// Write the slot record and commit, then publish the object in the
    /// id index.
    fn install(
        &mut self,
        id: ObjectId,
        iv: Interval,
        slot_offset: u64,
    ) -> Result<ObjectIndex, StoreError> {
        if let Err(err) = self.commit_slot(id, iv, slot_offset) {
            self.slots.push(slot_offset);
            self.free.add(iv);
            return Err(err);
        }

        let index = ObjectIndex {
            id,
            data_begin: iv.begin,
            data_end: iv.end,
            slot_offset,
        };

        self.objects.insert(id, index);

        debug!(id, begin = iv.begin, length = iv.length(), "reserved object");

        Ok(index)
    }

    fn commit_slot(
        &mut self,
        id: ObjectId,
        iv: Interval,
        slot_offset: u64,
    ) -> Result<(), StoreError> {
        let io = self.io_mut()?;
        io.seek(slot_offset)?;
        io.stage_u64(id);
        io.stage_u64(iv.begin);
        io.stage_u64(iv.end);
        io.flush_staged()?;
        io.commit()
    }

    /// Unlink and reclaim trailing index blocks whose slots are all
    /// free. Block zero is never touched.
    fn trim_chain_tail(&mut self) -> Result<(), StoreError> {
        while self.last_block != FIRST_BLOCK_OFFSET {
            let block_iv = Interval::new(self.last_block, self.last_block + INDEX_BLOCK_SIZE);

            let drained = self
                .slots
                .drain_tail_matching(|offset| block_iv.contains_offset(offset));

            if drained.len() as u64 != SLOTS_PER_BLOCK {
                // the block still holds live slots, or its free slots
                // are not the trailing run of the pool
                for offset in drained {
                    self.slots.push(offset);
                }
                break;
            }

            let parent = self.chain_parent(self.last_block)?;

            if let Err(err) = self.write_next_pointer(parent, 0) {
                for offset in drained {
                    self.slots.push(offset);
                }
                return Err(err);
            }

            debug!(begin = block_iv.begin, "retired tail index block");

            self.free.add(block_iv);
            self.last_block = parent;
        }

        Ok(())
    }

    /// Walk the chain from the first block to find the block whose
    /// next-pointer references `target`.
    fn chain_parent(&mut self, target: u64) -> Result<u64, StoreError> {
        let mut block = FIRST_BLOCK_OFFSET;

        loop {
            let io = self.io_mut()?;
            io.seek(block)?;
            io.read_exactly(8)?;
            let next = io.take_u64()?;

            if next == target {
                return Ok(block);
            }

            if next == 0 {
                return Err(StoreError::Corrupted(
                    "index block chain ends before its cached tail".into(),
                ));
            }

            block = next;
        }
    }
}

fn sync_parent_dir(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            File::open(parent)?.sync_all()?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &Path) -> StoreConfig {
        StoreConfig {
            path: dir.join("objects.dat"),
            scratch_buffer_size: 64,
            min_file_size: 1024,
            growth_quantum: 512,
            start_id: 500,
        }
    }

    fn open_engine(dir: &Path) -> DataFileEngine {
        DataFileEngine::open(test_config(dir)).unwrap()
    }

    /// Parse the raw file and check that the next-id cell, the index
    /// blocks, the live payloads and the free map partition the file
    /// exactly, with no gaps and no overlaps.
    fn assert_partition(engine: &DataFileEngine, path: &Path) {
        let raw = std::fs::read(path).unwrap();
        let file_size = raw.len() as u64;

        let word = |offset: u64| {
            let offset = offset as usize;
            u64::from_le_bytes(raw[offset..offset + 8].try_into().unwrap())
        };

        let mut pieces = vec![Interval::new(0, FIRST_BLOCK_OFFSET)];

        let mut block = FIRST_BLOCK_OFFSET;
        loop {
            pieces.push(Interval::new(block, block + INDEX_BLOCK_SIZE));

            for position in 0..SLOTS_PER_BLOCK {
                let slot_offset = block + 8 + position * SLOT_SIZE;
                let id = word(slot_offset);
                if id != 0 {
                    let begin = word(slot_offset + 8);
                    let end = word(slot_offset + 16);
                    pieces.push(Interval::new(begin, end));
                }
            }

            block = word(block);
            if block == 0 {
                break;
            }
        }

        pieces.extend(engine.free.iter());
        pieces.retain(|iv| !iv.is_empty());
        pieces.sort();

        let mut cursor = 0;
        for iv in pieces {
            assert_eq!(iv.begin, cursor, "gap or overlap at {iv}");
            cursor = iv.end;
        }
        assert_eq!(cursor, file_size);
    }

    #[test]
    fn fresh_file_has_minimum_layout() {
        let dir = tempfile::tempdir().unwrap();
        let engine = open_engine(dir.path());

        assert_eq!(engine.file_size().unwrap(), MIN_FILE_SIZE);
        assert_eq!(engine.slots.len(), SLOTS_PER_BLOCK as usize);
        assert!(engine.free.is_empty());
        assert_eq!(engine.next_id, 500);
        assert_partition(&engine, &engine.config.path);
    }

    #[test]
    fn reserve_write_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = open_engine(dir.path());

        let index = engine.reserve(11).unwrap();
        assert_eq!(index.id, 500);
        assert_eq!(index.payload_length(), 11);

        engine.write(&index, b"hello world").unwrap();
        assert_eq!(engine.read(&index).unwrap(), b"hello world");
        assert_partition(&engine, &engine.config.path);
    }

    #[test]
    fn freed_space_is_reused_best_fit() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = open_engine(dir.path());

        let first = engine.reserve(100).unwrap();
        engine.write(&first, &[0xaa; 100]).unwrap();

        let second = engine.reserve(100).unwrap();
        engine.write(&second, &[0xbb; 100]).unwrap();

        engine.free(&first).unwrap();

        // the freed 100-byte interval is a tighter fit than the tail
        let third = engine.reserve(80).unwrap();
        assert!(first.payload().contains(&third.payload()));

        engine.write(&third, &[0xcc; 80]).unwrap();
        assert_eq!(engine.read(&third).unwrap(), vec![0xcc; 80]);
        assert_eq!(engine.read(&second).unwrap(), vec![0xbb; 100]);
        assert_partition(&engine, &engine.config.path);
    }

    #[test]
    fn growth_adds_exactly_request_or_quantum() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = open_engine(dir.path());

        // fresh file has no free payload space at all
        engine.reserve(10).unwrap();
        assert_eq!(engine.file_size().unwrap(), MIN_FILE_SIZE + 512);

        // larger than the quantum: grown by the request itself
        engine.reserve(5000).unwrap();
        assert_eq!(engine.file_size().unwrap(), MIN_FILE_SIZE + 512 + 5000);
    }

    #[test]
    fn zero_length_payloads_are_legal() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = open_engine(dir.path());

        let index = engine.reserve(0).unwrap();
        assert_eq!(index.data_begin, index.data_end);

        engine.write(&index, &[]).unwrap();
        assert_eq!(engine.read(&index).unwrap(), Vec::<u8>::new());

        engine.free(&index).unwrap();
        assert!(!engine.contains(index.id).unwrap());
        assert_partition(&engine, &engine.config.path);
    }

    #[test]
    fn length_mismatch_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = open_engine(dir.path());

        let index = engine.reserve(4).unwrap();
        assert!(matches!(
            engine.write(&index, b"too long"),
            Err(StoreError::LengthMismatch { want: 4, got: 8 })
        ));

        // the reservation is still intact afterwards
        engine.write(&index, b"four").unwrap();
        assert_eq!(engine.read(&index).unwrap(), b"four");
    }

    #[test]
    fn stale_indices_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = open_engine(dir.path());

        let index = engine.reserve(4).unwrap();
        engine.write(&index, b"data").unwrap();
        engine.free(&index).unwrap();

        assert!(matches!(
            engine.read(&index),
            Err(StoreError::NotFound(id)) if id == index.id
        ));
        assert!(matches!(
            engine.free(&index),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn id_space_exhaustion_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.start_id = MAX_ID;

        let mut engine = DataFileEngine::open(config).unwrap();

        let index = engine.reserve(1).unwrap();
        assert_eq!(index.id, MAX_ID);

        assert!(matches!(engine.reserve(1), Err(StoreError::IdExhausted)));
    }

    #[test]
    fn second_index_block_is_linked_and_recycled() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = open_engine(dir.path());

        let indices: Vec<_> = (0..=SLOTS_PER_BLOCK)
            .map(|n| {
                let index = engine.reserve(1).unwrap();
                engine.write(&index, &[n as u8]).unwrap();
                index
            })
            .collect();

        assert_ne!(engine.last_block, FIRST_BLOCK_OFFSET);
        assert_eq!(engine.slots.len(), SLOTS_PER_BLOCK as usize - 1);
        assert_partition(&engine, &engine.config.path);

        // freeing everything makes the tail block reclaimable
        for index in &indices {
            engine.free(index).unwrap();
        }

        engine.compact().unwrap();

        assert_eq!(engine.last_block, FIRST_BLOCK_OFFSET);
        assert_eq!(engine.file_size().unwrap(), MIN_FILE_SIZE);
        assert_eq!(engine.slots.len(), SLOTS_PER_BLOCK as usize);
        assert_partition(&engine, &engine.config.path);
    }

    #[test]
    fn compact_leaves_live_objects_alone() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = open_engine(dir.path());

        let keep = engine.reserve(64).unwrap();
        engine.write(&keep, &[0x11; 64]).unwrap();

        let drop = engine.reserve(64).unwrap();
        engine.write(&drop, &[0x22; 64]).unwrap();

        engine.free(&drop).unwrap();
        engine.compact().unwrap();

        assert_eq!(engine.read(&keep).unwrap(), vec![0x11; 64]);
        assert_partition(&engine, &engine.config.path);
    }

    #[test]
    fn overlapping_payloads_refuse_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_config(dir.path()).path;

        {
            let mut engine = open_engine(dir.path());
            let a = engine.reserve(50).unwrap();
            engine.write(&a, &[1; 50]).unwrap();
            let b = engine.reserve(50).unwrap();
            engine.write(&b, &[2; 50]).unwrap();
            engine.close().unwrap();
        }

        // point the second slot's interval at the first one's bytes
        let mut raw = std::fs::read(&path).unwrap();
        let first_begin = raw[24..32].to_vec();
        let first_end = raw[32..40].to_vec();
        raw[48..56].copy_from_slice(&first_begin);
        raw[56..64].copy_from_slice(&first_end);
        std::fs::write(&path, raw).unwrap();

        let result = DataFileEngine::open(test_config(dir.path()));
        assert!(matches!(result, Err(StoreError::Corrupted(_))));
    }

    #[test]
    fn truncated_file_refuses_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_config(dir.path()).path;

        {
            let mut engine = open_engine(dir.path());
            engine.close().unwrap();
        }

        let raw = std::fs::read(&path).unwrap();
        std::fs::write(&path, &raw[..100]).unwrap();

        let result = DataFileEngine::open(test_config(dir.path()));
        assert!(matches!(result, Err(StoreError::Corrupted(_))));
    }

    #[test]
    fn closed_engine_rejects_every_operation() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = open_engine(dir.path());

        let index = engine.reserve(4).unwrap();
        engine.write(&index, b"data").unwrap();
        engine.close().unwrap();

        assert!(matches!(engine.reserve(1), Err(StoreError::Closed)));
        assert!(matches!(engine.read(&index), Err(StoreError::Closed)));
        assert!(matches!(engine.free(&index), Err(StoreError::Closed)));
        assert!(matches!(engine.ids(), Err(StoreError::Closed)));
        assert!(matches!(engine.contains(500), Err(StoreError::Closed)));
        assert!(matches!(engine.compact(), Err(StoreError::Closed)));
        assert!(matches!(engine.close(), Err(StoreError::Closed)));
    }
}
