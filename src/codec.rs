use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::StoreError;

/// Turns host values into payload bytes and back. The store never
/// inspects payloads; everything it persists goes through one of these.
pub trait ObjectCodec<T> {
    fn encode(&self, value: &T, writer: &mut dyn Write) -> Result<(), StoreError>;

    fn decode(&self, reader: &mut dyn Read) -> Result<T, StoreError>;

    fn encode_to_vec(&self, value: &T) -> Result<Vec<u8>, StoreError> {
        let mut bytes = Vec::new();
        self.encode(value, &mut bytes)?;
        Ok(bytes)
    }

    fn decode_from_slice(&self, mut bytes: &[u8]) -> Result<T, StoreError> {
        self.decode(&mut bytes)
    }
}

/// Codec for any serde type, using the bincode wire format.
#[derive(Debug, Default, Clone, Copy)]
pub struct BincodeCodec;

impl<T> ObjectCodec<T> for BincodeCodec
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T, writer: &mut dyn Write) -> Result<(), StoreError> {
        bincode::serialize_into(writer, value).map_err(|err| StoreError::Codec(err))
    }

    fn decode(&self, reader: &mut dyn Read) -> Result<T, StoreError> {
        bincode::deserialize_from(reader).map_err(|err| StoreError::Codec(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        seen: u64,
    }

    #[test]
    fn bincode_round_trip() {
        let value = Sample {
            name: "tip".into(),
            seen: 42,
        };

        let codec = BincodeCodec;
        let bytes = codec.encode_to_vec(&value).unwrap();
        let back: Sample = codec.decode_from_slice(&bytes).unwrap();

        assert_eq!(back, value);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let codec = BincodeCodec;
        let result: Result<Sample, _> = codec.decode_from_slice(&[0xff, 0x01]);
        assert!(matches!(result, Err(StoreError::Codec(_))));
    }
}
