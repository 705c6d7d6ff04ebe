//! Payload codecs for durable storage
//!
//! Compression and checksumming are strategies behind [`PayloadCodec`];
//! the default pipeline is a passthrough.

pub mod codec;
pub mod compressor;

pub use codec::{CodecPipeline, Crc32Checksum, Passthrough, PayloadCodec};
pub use compressor::{CompressionAlgorithm, CompressionConfig, Compressor};
