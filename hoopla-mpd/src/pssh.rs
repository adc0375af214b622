/*
    REFERENCES
    ----------

    1. https://github.com/shaka-project/shaka-packager/blob/56e227267c9091a0f65b4d92d9064dda4557f3a7/packager/tools/pssh/pssh-box.py
    2. https://w3c.github.io/encrypted-media/format-registry/initdata/cenc.html

*/

use crate::{KeyId, Result, SystemId, bail, reader::Reader};
use base64::Engine;

/// Header fields of a `pssh` box.
///
/// Only the box layout is read, the system specific payload stays opaque.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PsshBox {
    pub version: u8,
    pub system_id: SystemId,
    /// Key ids listed by version 1 boxes.
    pub key_ids: Vec<KeyId>,
    pub data: Vec<u8>,
}

impl PsshBox {
    pub fn from_base64(data: &str) -> Result<Self> {
        let bytes = base64::engine::general_purpose::STANDARD.decode(data.trim())?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 32 {
            bail!("Data too short to be a valid PSSH box.");
        }

        let mut reader = Reader::new(bytes);
        let size = reader.read_u32()? as usize;

        if size != bytes.len() {
            bail!(
                "PSSH box size {} doesn't match data length {}.",
                size,
                bytes.len()
            );
        }

        let box_type = reader.read_bytes(4)?;

        if box_type != b"pssh" {
            bail!(
                "Expected 'pssh' box type but found '{}'.",
                String::from_utf8_lossy(&box_type)
            );
        }

        let version = reader.read_u8()?;
        reader.skip(3)?; // flags

        if version > 1 {
            bail!("Unsupported PSSH box version v{}.", version);
        }

        let system_id = SystemId::from_hex(&hex::encode(reader.read_bytes(16)?));
        let mut key_ids = vec![];

        if version > 0 {
            let count = reader.read_u32()?;

            for _ in 0..count {
                key_ids.push(KeyId::from_bytes(&reader.read_bytes(16)?));
            }
        }

        let data_size = reader.read_u32()? as usize;
        let data = reader.read_bytes(data_size)?;

        if reader.remaining() != 0 {
            bail!("PSSH box has {} trailing bytes.", reader.remaining());
        }

        Ok(Self {
            version,
            system_id,
            key_ids,
            data,
        })
    }
}
