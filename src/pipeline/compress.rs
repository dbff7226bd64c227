use crate::error::{EfcError, Result};
use crate::header::CompressionKind;
use flate2::{Compress, Decompress, FlushCompress, FlushDecompress, Status};

/// Default zlib level (best compression)
pub const DEFAULT_LEVEL: u32 = 9;

/// Smallest output round handed to zlib per call
const MIN_ROUND: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMode {
    Compress,
    Decompress,
}

/// Chunk-by-chunk (de)compression with state carried across calls for one file
pub enum CompressionStrategy {
    Identity,
    Deflate(Deflater),
    Inflate(Inflater),
}

impl CompressionStrategy {
    pub fn new(kind: CompressionKind, mode: CompressionMode) -> Result<Self> {
        Self::with_level(kind, mode, DEFAULT_LEVEL)
    }

    pub fn with_level(kind: CompressionKind, mode: CompressionMode, level: u32) -> Result<Self> {
        match (kind, mode) {
            (CompressionKind::None, _) => Ok(Self::Identity),
            (CompressionKind::Zlib, CompressionMode::Compress) => {
                Ok(Self::Deflate(Deflater::new(level)?))
            }
            (CompressionKind::Zlib, CompressionMode::Decompress) => {
                Ok(Self::Inflate(Inflater::new()))
            }
        }
    }

    /// Transform one chunk. On the final chunk all internal state is
    /// flushed into the returned buffer.
    pub fn transform(&mut self, chunk: &[u8], is_final: bool) -> Result<Vec<u8>> {
        match self {
            Self::Identity => Ok(chunk.to_vec()),
            Self::Deflate(d) => d.transform(chunk, is_final),
            Self::Inflate(i) => Ok(i.transform(chunk, is_final)),
        }
    }

    /// False once a decompressor has hit malformed input
    pub fn is_intact(&self) -> bool {
        match self {
            Self::Inflate(i) => !i.corrupt,
            _ => true,
        }
    }
}

/// zlib-wrapped DEFLATE compressor
pub struct Deflater {
    stream: Compress,
}

impl Deflater {
    pub fn new(level: u32) -> Result<Self> {
        if level > 9 {
            return Err(EfcError::CompressionError(format!(
                "zlib level {} out of range 0-9",
                level
            )));
        }
        Ok(Self {
            stream: Compress::new(flate2::Compression::new(level), true),
        })
    }

    fn transform(&mut self, input: &[u8], is_final: bool) -> Result<Vec<u8>> {
        let flush = if is_final {
            FlushCompress::Finish
        } else {
            FlushCompress::None
        };
        let round = input.len().max(MIN_ROUND);
        let start_in = self.stream.total_in();
        let mut output = Vec::new();

        // Keep going while zlib fills the whole round: one chunk can
        // produce more output than was supplied
        loop {
            output.reserve(round);
            let spare = output.capacity() - output.len();
            let consumed = (self.stream.total_in() - start_in) as usize;
            let before_out = output.len();

            let status = self
                .stream
                .compress_vec(&input[consumed..], &mut output, flush)
                .map_err(|e| EfcError::CompressionError(format!("zlib: {}", e)))?;

            let consumed = (self.stream.total_in() - start_in) as usize;
            let produced = output.len() - before_out;
            let drained = consumed == input.len() && produced < spare;

            match status {
                Status::StreamEnd => break,
                Status::Ok | Status::BufError if !is_final && drained => break,
                Status::BufError if produced == 0 => {
                    return Err(EfcError::CompressionError(
                        "zlib made no progress while finishing".into(),
                    ))
                }
                _ => {}
            }
        }
        Ok(output)
    }
}

/// zlib-wrapped DEFLATE decompressor.
///
/// Malformed input does not abort decoding: the stream is marked corrupt,
/// nothing further is emitted, and integrity verification reports the
/// failure.
pub struct Inflater {
    stream: Decompress,
    finished: bool,
    corrupt: bool,
}

impl Inflater {
    pub fn new() -> Self {
        Self {
            stream: Decompress::new(true),
            finished: false,
            corrupt: false,
        }
    }

    fn transform(&mut self, input: &[u8], is_final: bool) -> Vec<u8> {
        let mut output = Vec::new();
        if self.corrupt || self.finished {
            if !input.is_empty() && self.finished && !self.corrupt {
                tracing::debug!(bytes = input.len(), "ignoring data after end of zlib stream");
            }
            return output;
        }

        let flush = if is_final {
            FlushDecompress::Finish
        } else {
            FlushDecompress::None
        };
        let round = input.len().saturating_mul(2).max(MIN_ROUND);
        let start_in = self.stream.total_in();

        loop {
            output.reserve(round);
            let spare = output.capacity() - output.len();
            let consumed = (self.stream.total_in() - start_in) as usize;
            let before_out = output.len();

            let status = match self
                .stream
                .decompress_vec(&input[consumed..], &mut output, flush)
            {
                Ok(status) => status,
                Err(e) => {
                    tracing::warn!(error = %e, "compressed stream is corrupt; output will be incomplete");
                    self.corrupt = true;
                    break;
                }
            };

            let consumed = (self.stream.total_in() - start_in) as usize;
            let produced = output.len() - before_out;
            let drained = consumed == input.len() && produced < spare;

            match status {
                Status::StreamEnd => {
                    self.finished = true;
                    break;
                }
                Status::Ok | Status::BufError if drained => break,
                Status::BufError if produced == 0 => break,
                _ => {}
            }
        }

        if is_final && !self.finished && !self.corrupt {
            tracing::warn!("compressed stream ended early; output will be incomplete");
            self.corrupt = true;
        }
        output
    }
}

impl Default for Inflater {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(strategy: &mut CompressionStrategy, data: &[u8], chunk: usize) -> Vec<u8> {
        let mut out = Vec::new();
        if data.is_empty() {
            out.extend(strategy.transform(&[], true).unwrap());
            return out;
        }
        let chunks: Vec<&[u8]> = data.chunks(chunk).collect();
        for (i, c) in chunks.iter().enumerate() {
            out.extend(strategy.transform(c, i + 1 == chunks.len()).unwrap());
        }
        out
    }

    fn roundtrip(data: &[u8], chunk: usize) {
        let mut deflate = CompressionStrategy::new(CompressionKind::Zlib, CompressionMode::Compress).unwrap();
        let compressed = run(&mut deflate, data, chunk);
        let mut inflate = CompressionStrategy::new(CompressionKind::Zlib, CompressionMode::Decompress).unwrap();
        let restored = run(&mut inflate, &compressed, chunk);
        assert!(inflate.is_intact());
        assert_eq!(restored, data);
    }

    #[test]
    fn test_identity_passthrough() {
        let mut none = CompressionStrategy::new(CompressionKind::None, CompressionMode::Compress).unwrap();
        assert_eq!(none.transform(b"abc", false).unwrap(), b"abc");
        assert_eq!(none.transform(b"", true).unwrap(), b"");
        assert!(none.is_intact());
    }

    #[test]
    fn test_zlib_roundtrip_single_chunk() {
        roundtrip(b"Hello, World! This is a test of compression.", 1024);
    }

    #[test]
    fn test_zlib_roundtrip_many_chunks() {
        let data: Vec<u8> = (0..100_000).map(|i| (i % 251) as u8).collect();
        roundtrip(&data, 777);
    }

    #[test]
    fn test_zlib_empty_input_is_valid_stream() {
        let mut deflate = CompressionStrategy::new(CompressionKind::Zlib, CompressionMode::Compress).unwrap();
        let compressed = deflate.transform(&[], true).unwrap();
        assert!(!compressed.is_empty());
        roundtrip(b"", 16);
    }

    #[test]
    fn test_expanding_output_is_drained() {
        // Highly compressible input decompresses to far more than each chunk holds
        let data = vec![b'z'; 2_000_000];
        let mut deflate = CompressionStrategy::new(CompressionKind::Zlib, CompressionMode::Compress).unwrap();
        let compressed = deflate.transform(&data, true).unwrap();
        assert!(compressed.len() < 10_000);

        let mut inflate = CompressionStrategy::new(CompressionKind::Zlib, CompressionMode::Decompress).unwrap();
        let restored = inflate.transform(&compressed, true).unwrap();
        assert_eq!(restored.len(), data.len());
    }

    #[test]
    fn test_incompressible_data_grows_but_roundtrips() {
        use rand::RngCore;
        let mut data = vec![0u8; 300_000];
        rand::thread_rng().fill_bytes(&mut data);
        roundtrip(&data, 65_536);
    }

    #[test]
    fn test_corrupt_stream_is_flagged() {
        let mut inflate = CompressionStrategy::new(CompressionKind::Zlib, CompressionMode::Decompress).unwrap();
        let out = inflate.transform(&[0xFF; 64], true).unwrap();
        assert!(out.is_empty());
        assert!(!inflate.is_intact());
        // Latched
        assert!(inflate.transform(b"more", true).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_stream_is_flagged() {
        let mut deflate = CompressionStrategy::new(CompressionKind::Zlib, CompressionMode::Compress).unwrap();
        let compressed = deflate.transform(&vec![7u8; 10_000], true).unwrap();
        let mut inflate = CompressionStrategy::new(CompressionKind::Zlib, CompressionMode::Decompress).unwrap();
        inflate.transform(&compressed[..compressed.len() - 3], true).unwrap();
        assert!(!inflate.is_intact());
    }

    #[test]
    fn test_level_out_of_range() {
        assert!(matches!(
            CompressionStrategy::with_level(CompressionKind::Zlib, CompressionMode::Compress, 12),
            Err(EfcError::CompressionError(_))
        ));
    }
}
