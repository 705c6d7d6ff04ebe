use super::codec::PayloadCodec;
use crate::core::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use tracing::debug;

/// Compression algorithm selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    /// No compression (default)
    #[default]
    None,
    /// LZ4 - Fast compression/decompression
    Lz4,
    /// Zstandard - Better compression ratio
    Zstd,
}

impl CompressionAlgorithm {
    fn tag(self) -> u8 {
        match self {
            CompressionAlgorithm::None => 0,
            CompressionAlgorithm::Lz4 => 1,
            CompressionAlgorithm::Zstd => 2,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(CompressionAlgorithm::None),
            1 => Some(CompressionAlgorithm::Lz4),
            2 => Some(CompressionAlgorithm::Zstd),
            _ => None,
        }
    }
}

/// Compression configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Minimum payload size to compress (bytes)
    pub min_payload_size: usize,
    pub algorithm: CompressionAlgorithm,
    /// Zstd compression level (1-22)
    pub zstd_level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            min_payload_size: 256,
            algorithm: CompressionAlgorithm::None,
            zstd_level: 3, // Balanced compression
        }
    }
}

/// Compressing payload codec.
///
/// Frames are `[algorithm tag][body]`, so payloads below the size threshold
/// are stored raw and still decode correctly.
pub struct Compressor {
    config: CompressionConfig,
}

impl Compressor {
    pub fn new(config: CompressionConfig) -> Self {
        Self { config }
    }

    pub fn with_algorithm(algorithm: CompressionAlgorithm) -> Self {
        Self::new(CompressionConfig {
            algorithm,
            ..Default::default()
        })
    }

    /// Estimate if compression would be beneficial
    pub fn should_compress(&self, data: &[u8]) -> bool {
        self.config.algorithm != CompressionAlgorithm::None
            && data.len() >= self.config.min_payload_size
    }

    fn compress_lz4(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut encoder = lz4::EncoderBuilder::new()
            .level(4) // Fast compression
            .build(Vec::new())?;

        encoder.write_all(data)?;
        let (compressed, result) = encoder.finish();
        result?;

        debug!("LZ4 compressed: {} → {} bytes", data.len(), compressed.len());
        Ok(compressed)
    }

    fn decompress_lz4(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut decoder = lz4::Decoder::new(data)?;
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;
        Ok(decompressed)
    }

    fn compress_zstd(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        let compressed = zstd::encode_all(data, self.config.zstd_level)?;
        debug!("Zstd compressed: {} → {} bytes", data.len(), compressed.len());
        Ok(compressed)
    }
}

impl PayloadCodec for Compressor {
    fn name(&self) -> &str {
        match self.config.algorithm {
            CompressionAlgorithm::None => "none",
            CompressionAlgorithm::Lz4 => "lz4",
            CompressionAlgorithm::Zstd => "zstd",
        }
    }

    fn encode(&self, data: Vec<u8>) -> Result<Vec<u8>> {
        let algo = if self.should_compress(&data) {
            self.config.algorithm
        } else {
            CompressionAlgorithm::None
        };

        let body = match algo {
            CompressionAlgorithm::None => data,
            CompressionAlgorithm::Lz4 => self.compress_lz4(&data)?,
            CompressionAlgorithm::Zstd => self.compress_zstd(&data)?,
        };

        let mut framed = Vec::with_capacity(body.len() + 1);
        framed.push(algo.tag());
        framed.extend_from_slice(&body);
        Ok(framed)
    }

    fn decode(&self, data: Vec<u8>) -> Result<Vec<u8>> {
        let (&tag, body) = data
            .split_first()
            .ok_or_else(|| CacheError::Io("empty compressed frame".to_string()))?;
        let algo = CompressionAlgorithm::from_tag(tag)
            .ok_or_else(|| CacheError::Io(format!("unknown compression tag {}", tag)))?;

        let decoded = match algo {
            CompressionAlgorithm::None => body.to_vec(),
            CompressionAlgorithm::Lz4 => self.decompress_lz4(body)?,
            CompressionAlgorithm::Zstd => zstd::decode_all(body)?,
        };
        Ok(decoded)
    }
}
