use super::compressor::{CompressionAlgorithm, Compressor};
use crate::config::DurableConfig;
use crate::core::error::{CacheError, Result};

/// Transformation applied to serialized entries on their way to and from
/// durable storage
pub trait PayloadCodec: Send + Sync {
    fn name(&self) -> &str;
    fn encode(&self, data: Vec<u8>) -> Result<Vec<u8>>;
    fn decode(&self, data: Vec<u8>) -> Result<Vec<u8>>;
}

/// Identity codec
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl PayloadCodec for Passthrough {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn encode(&self, data: Vec<u8>) -> Result<Vec<u8>> {
        Ok(data)
    }

    fn decode(&self, data: Vec<u8>) -> Result<Vec<u8>> {
        Ok(data)
    }
}

/// Prefixes payloads with a little-endian CRC32 and verifies it on decode
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc32Checksum;

impl PayloadCodec for Crc32Checksum {
    fn name(&self) -> &str {
        "crc32"
    }

    fn encode(&self, data: Vec<u8>) -> Result<Vec<u8>> {
        let checksum = crc32fast::hash(&data);
        let mut framed = Vec::with_capacity(data.len() + 4);
        framed.extend_from_slice(&checksum.to_le_bytes());
        framed.extend_from_slice(&data);
        Ok(framed)
    }

    fn decode(&self, data: Vec<u8>) -> Result<Vec<u8>> {
        if data.len() < 4 {
            return Err(CacheError::Io("checksum frame too short".to_string()));
        }
        let (head, body) = data.split_at(4);
        let expected = u32::from_le_bytes([head[0], head[1], head[2], head[3]]);
        let actual = crc32fast::hash(body);
        if expected != actual {
            return Err(CacheError::Checksum { expected, actual });
        }
        Ok(body.to_vec())
    }
}

/// Stages applied in order on encode and in reverse on decode
pub struct CodecPipeline {
    stages: Vec<Box<dyn PayloadCodec>>,
}

impl CodecPipeline {
    pub fn new(stages: Vec<Box<dyn PayloadCodec>>) -> Self {
        Self { stages }
    }

    /// Build the pipeline selected by the durable tier configuration.
    /// With no compression and no checksum this is a passthrough.
    pub fn from_config(config: &DurableConfig) -> Self {
        let mut stages: Vec<Box<dyn PayloadCodec>> = Vec::new();
        if config.compression != CompressionAlgorithm::None {
            stages.push(Box::new(Compressor::with_algorithm(config.compression)));
        }
        if config.checksum {
            stages.push(Box::new(Crc32Checksum));
        }
        Self::new(stages)
    }

    pub fn is_passthrough(&self) -> bool {
        self.stages.is_empty()
    }
}

impl Default for CodecPipeline {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl PayloadCodec for CodecPipeline {
    fn name(&self) -> &str {
        if self.stages.is_empty() {
            "passthrough"
        } else {
            "pipeline"
        }
    }

    fn encode(&self, data: Vec<u8>) -> Result<Vec<u8>> {
        self.stages
            .iter()
            .try_fold(data, |acc, stage| stage.encode(acc))
    }

    fn decode(&self, data: Vec<u8>) -> Result<Vec<u8>> {
        self.stages
            .iter()
            .rev()
            .try_fold(data, |acc, stage| stage.decode(acc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pipeline_is_passthrough() {
        let pipeline = CodecPipeline::from_config(&DurableConfig::default());
        assert!(pipeline.is_passthrough());
        assert_eq!(pipeline.encode(b"abc".to_vec()).unwrap(), b"abc");
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let codec = Crc32Checksum;
        let mut framed = codec.encode(b"payload".to_vec()).unwrap();
        framed[6] ^= 0xff;

        assert!(matches!(
            codec.decode(framed),
            Err(CacheError::Checksum { .. })
        ));
    }

    #[test]
    fn test_pipeline_compress_then_checksum() {
        let config = DurableConfig {
            compression: CompressionAlgorithm::Lz4,
            checksum: true,
            ..Default::default()
        };
        let pipeline = CodecPipeline::from_config(&config);
        let data = b"tiered cache payload ".repeat(64);

        let encoded = pipeline.encode(data.clone()).unwrap();
        assert!(encoded.len() < data.len());
        assert_eq!(pipeline.decode(encoded).unwrap(), data);
    }
}
