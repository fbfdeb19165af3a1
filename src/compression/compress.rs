use crate::core::error::{Error, ErrorKind, Result};
use serde::{Serialize, Deserialize};

/// Compressed byte block, the on-disk envelope of a compressed partition
#[derive(Debug, Serialize, Deserialize)]
pub struct CompressedBlock {
    pub data: Vec<u8>,
    pub original_size: usize,
    pub checksum: u32,        // CRC32 of the uncompressed bytes
    pub compression: CompressionType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CompressionType {
    #[default]
    None,
    LZ4,      // Fast compression (~500 MB/s), ratio 2-3x
    Zstd,     // Better ratio (3-5x), slower (~200 MB/s)
    Snappy,   // Balanced (2-3x ratio, ~300 MB/s)
}

impl CompressionType {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, CompressionType::None)
    }
}

impl CompressedBlock {
    pub fn compress(data: &[u8], compression: CompressionType) -> Result<Self> {
        let compressed = match compression {
            CompressionType::None => data.to_vec(),

            CompressionType::LZ4 => {
                lz4::block::compress(data, None, false)?
            }

            CompressionType::Zstd => {
                zstd::encode_all(data, 3)?  // Level 3 is balanced
            }

            CompressionType::Snappy => {
                use snap::raw::Encoder;
                let mut encoder = Encoder::new();
                encoder.compress_vec(data)
                    .map_err(|e| Error::new(ErrorKind::Compression, e.to_string()))?
            }
        };

        Ok(CompressedBlock {
            data: compressed,
            original_size: data.len(),
            checksum: crc32fast::hash(data),
            compression,
        })
    }

    pub fn decompress(&self) -> Result<Vec<u8>> {
        let data = match self.compression {
            CompressionType::None => self.data.clone(),

            CompressionType::LZ4 => {
                lz4::block::decompress(&self.data, Some(self.original_size as i32))
                    .map_err(|e| Error::new(ErrorKind::Compression, e.to_string()))?
            }

            CompressionType::Zstd => {
                zstd::decode_all(&self.data[..])
                    .map_err(|e| Error::new(ErrorKind::Compression, e.to_string()))?
            }

            CompressionType::Snappy => {
                use snap::raw::Decoder;
                let mut decoder = Decoder::new();
                decoder.decompress_vec(&self.data)
                    .map_err(|e| Error::new(ErrorKind::Compression, e.to_string()))?
            }
        };

        if data.len() != self.original_size || crc32fast::hash(&data) != self.checksum {
            return Err(Error::new(
                ErrorKind::Compression,
                format!("checksum mismatch in {:?} block", self.compression),
            ));
        }

        Ok(data)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}
