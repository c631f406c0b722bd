use serde::{de::DeserializeOwned, Serialize};

pub fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, bincode::error::EncodeError> {
    bincode::serde::encode_to_vec(value, bincode::config::legacy())
}

pub fn deserialize<T: DeserializeOwned>(data: &[u8]) -> Result<T, bincode::error::DecodeError> {
    bincode::serde::decode_from_slice(data, bincode::config::legacy()).map(|(data, _len)| data)
}
