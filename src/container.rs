//! End-to-end encode, decode and probe flows.
//!
//! Encode writes a placeholder header, streams the payload through the
//! metered output, then seeks back and patches the header with the counted
//! payload length. Decode parses the header, caps the input at the recorded
//! payload length and verifies the recovered checksum against the written
//! output.

use crate::error::{EfcError, Result};
use crate::header::{
    CipherKind, CompressionKind, EfcHeader, HeaderVersion, DEFAULT_CIPHER, DEFAULT_COMPRESSION,
};
use crate::metered::{MeteredReader, MeteredWriter};
use crate::pipeline::{
    Checksum, CompressionMode, CompressionStrategy, EncryptionMode, EncryptionStrategy,
    CHECKSUM_SIZE, DEFAULT_LEVEL, IV_SIZE,
};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Algorithm selection for encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeSettings {
    pub compression: CompressionKind,
    pub cipher: CipherKind,
    /// zlib level, 0-9
    pub level: u32,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            compression: DEFAULT_COMPRESSION,
            cipher: DEFAULT_CIPHER,
            level: DEFAULT_LEVEL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeReport {
    /// Plaintext checksum embedded in the payload
    pub checksum: Checksum,
    pub header_len: u64,
    /// Bytes after the compression flag
    pub payload_len: u64,
}

impl EncodeReport {
    pub fn container_len(&self) -> u64 {
        self.header_len + self.payload_len
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeReport {
    /// Original filename rebuilt from the container name and stored extension
    pub filename: PathBuf,
    /// Checksum recovered from the payload
    pub expected: Checksum,
    /// Checksum of the bytes actually written
    pub actual: Checksum,
    pub checksum_matched: bool,
    /// False when the compressed stream was malformed
    pub stream_intact: bool,
    pub plain_len: u64,
}

/// Header-only view of a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerInfo {
    pub filename: String,
    pub version: HeaderVersion,
    pub legacy_magic: bool,
    pub compression: CompressionKind,
    pub cipher: CipherKind,
    pub payload_len: u64,
}

impl ContainerInfo {
    pub fn compression_description(&self) -> &'static str {
        self.compression.description()
    }

    pub fn cipher_description(&self) -> &'static str {
        self.cipher.description()
    }
}

/// Encode `input` into `output` as a container for a file named `source_name`
pub fn encode_stream<R, W>(
    input: &mut R,
    output: &mut W,
    source_name: &Path,
    key: &[u8],
    settings: &EncodeSettings,
) -> Result<EncodeReport>
where
    R: Read + Seek,
    W: Write + Seek,
{
    encode_into(input, source_name, key, settings, || Ok(output))
}

/// Decode the container in `input`, writing the plaintext to `output`.
///
/// `container_name` supplies the base name for the recovered filename.
/// `output` must be readable so the written bytes can be verified.
pub fn decode_stream<R, W>(
    input: &mut R,
    output: &mut W,
    container_name: &Path,
    key: &[u8],
) -> Result<DecodeReport>
where
    R: Read + Seek,
    W: Read + Write + Seek,
{
    decode_into(input, container_name, key, |_| Ok(output))
}

/// Read only the header of the container in `input`
pub fn probe_stream<R: Read>(input: &mut R, container_name: &Path) -> Result<ContainerInfo> {
    let mut reader = MeteredReader::new(input);
    let header = EfcHeader::parse(&mut reader)?;
    Ok(ContainerInfo {
        filename: header.filename_for(container_name).to_string_lossy().into_owned(),
        version: header.version,
        legacy_magic: header.legacy_magic,
        compression: header.compression,
        cipher: header.cipher,
        payload_len: header.payload_len,
    })
}

/// Encode the file at `input` into a new container at `output`.
///
/// The output is only created once both strategies and the key are accepted.
pub fn encode_file(
    input: &Path,
    output: &Path,
    key: &[u8],
    settings: &EncodeSettings,
) -> Result<EncodeReport> {
    let mut source = File::open(input)?;
    let report = encode_into(&mut source, input, key, settings, || {
        Ok(BufWriter::new(File::create(output)?))
    })?;
    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        bytes = report.container_len(),
        "encoded container"
    );
    Ok(report)
}

/// A decoded file and where it was written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFile {
    pub path: PathBuf,
    pub report: DecodeReport,
}

/// Decode the container at `input`.
///
/// `resolve_output` receives the recovered filename and returns the path to
/// write; it runs after the header, strategies and key have been accepted
/// and before any output exists.
pub fn decode_file<F>(input: &Path, key: &[u8], resolve_output: F) -> Result<DecodedFile>
where
    F: FnOnce(&Path) -> Result<PathBuf>,
{
    let mut source = BufReader::new(File::open(input)?);
    let mut written_to = PathBuf::new();
    let report = decode_into(&mut source, input, key, |filename| {
        let path = resolve_output(filename)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        written_to = path;
        Ok(file)
    })?;
    tracing::info!(
        input = %input.display(),
        output = %written_to.display(),
        checksum = %report.actual,
        matched = report.checksum_matched,
        "decoded container"
    );
    Ok(DecodedFile {
        path: written_to,
        report,
    })
}

pub fn probe_file(input: &Path) -> Result<ContainerInfo> {
    let mut source = BufReader::new(File::open(input)?);
    probe_stream(&mut source, input)
}

fn encode_into<R, W, F>(
    input: &mut R,
    source_name: &Path,
    key: &[u8],
    settings: &EncodeSettings,
    open_output: F,
) -> Result<EncodeReport>
where
    R: Read + Seek,
    W: Write + Seek,
    F: FnOnce() -> Result<W>,
{
    let mut compression = CompressionStrategy::with_level(
        settings.compression,
        CompressionMode::Compress,
        settings.level,
    )?;
    let encryption = EncryptionStrategy::new(settings.cipher, EncryptionMode::Encrypt)?;
    encryption.validate_key(key)?;

    let mut header = EfcHeader::new(source_name, settings.compression, settings.cipher);
    check_input_fits(input, &header)?;

    let checksum = Checksum::compute(input)?;
    tracing::debug!(checksum = %checksum, "computed plaintext checksum");

    let mut output = MeteredWriter::new(open_output()?);

    output.save_pos()?;
    let header_len = header.write(&mut output)?;
    output.reset_count();

    let mut slot = checksum;
    encryption.transform_stream(&mut compression, input, &mut output, key, &mut slot)?;
    header.payload_len = output.write_count();

    let end = output.stream_position()?;
    output.restore_pos()?;
    header.write(&mut output)?;
    output.seek(SeekFrom::Start(end))?;
    output.flush()?;

    tracing::debug!(header_len, payload_len = header.payload_len, "patched header");
    Ok(EncodeReport {
        checksum,
        header_len,
        payload_len: header.payload_len,
    })
}

fn decode_into<R, W, F>(
    input: &mut R,
    container_name: &Path,
    key: &[u8],
    open_output: F,
) -> Result<DecodeReport>
where
    R: Read + Seek,
    W: Read + Write + Seek,
    F: FnOnce(&Path) -> Result<W>,
{
    let mut reader = MeteredReader::new(input);
    let header = EfcHeader::parse(&mut reader)?;

    let mut compression = CompressionStrategy::new(header.compression, CompressionMode::Decompress)?;
    let encryption = EncryptionStrategy::new(header.cipher, EncryptionMode::Decrypt)?;
    encryption.validate_key(key)?;
    check_payload_available(&mut reader, &header)?;

    let filename = header.filename_for(container_name);
    let mut output = open_output(&filename)?;
    let start = output.stream_position()?;

    reader.set_limit(header.payload_len);
    let mut expected = Checksum::blank();
    let plain_len = {
        let mut sink = MeteredWriter::new(BufWriter::new(&mut output));
        encryption.transform_stream(&mut compression, &mut reader, &mut sink, key, &mut expected)?;
        let plain_len = sink.write_count();
        sink.into_inner()
            .into_inner()
            .map_err(|e| EfcError::Io(e.into_error()))?;
        plain_len
    };

    output.seek(SeekFrom::Start(start))?;
    let actual = Checksum::compute_to_end(&mut output)?;
    let stream_intact = compression.is_intact();
    let checksum_matched = stream_intact && actual == expected;

    if !checksum_matched {
        tracing::warn!(
            expected = %expected,
            actual = %actual,
            stream_intact,
            "checksum mismatch: decoded output does not match the original"
        );
    }

    Ok(DecodeReport {
        filename,
        expected,
        actual,
        checksum_matched,
        stream_intact,
        plain_len,
    })
}

/// Refuse containers whose stream ends before the recorded payload does
/// Reject inputs whose uncompressed payload would overflow the i32 length
/// field, before any output is created. Compression is not credited.
fn check_input_fits<R: Read + Seek>(input: &mut R, header: &EfcHeader) -> Result<()> {
    let start = input.stream_position()?;
    let end = input.seek(SeekFrom::End(0))?;
    input.seek(SeekFrom::Start(start))?;

    let worst = header.field_len() + (IV_SIZE + CHECKSUM_SIZE) as u64 + end.saturating_sub(start);
    if worst > i32::MAX as u64 {
        return Err(EfcError::PayloadTooLarge(worst));
    }
    Ok(())
}

fn check_payload_available<R: Read + Seek>(
    reader: &mut MeteredReader<R>,
    header: &EfcHeader,
) -> Result<()> {
    let minimum = (IV_SIZE + CHECKSUM_SIZE) as u64;
    if header.payload_len < minimum {
        return Err(EfcError::InvalidHeader(format!(
            "payload length {} is shorter than the {} byte IV and checksum",
            header.payload_len, minimum
        )));
    }
    let available = reader.remaining_len()?;
    if available < header.payload_len {
        return Err(EfcError::InvalidHeader(format!(
            "container truncated: header records {} payload bytes, {} present",
            header.payload_len, available
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    const KEY: [u8; 32] = [7u8; 32];

    fn encode_bytes(data: &[u8], settings: &EncodeSettings) -> (Vec<u8>, EncodeReport) {
        let mut out = Cursor::new(Vec::new());
        let report = encode_stream(
            &mut Cursor::new(data.to_vec()),
            &mut out,
            Path::new("hello.txt"),
            &KEY,
            settings,
        )
        .unwrap();
        (out.into_inner(), report)
    }

    fn decode_bytes(container: &[u8], key: &[u8]) -> Result<(Vec<u8>, DecodeReport)> {
        let mut out = Cursor::new(Vec::new());
        let report = decode_stream(
            &mut Cursor::new(container.to_vec()),
            &mut out,
            Path::new("hello.efc"),
            key,
        )?;
        Ok((out.into_inner(), report))
    }

    #[test]
    fn test_stream_roundtrip() {
        let data = b"0123456789";
        let (container, report) = encode_bytes(data, &EncodeSettings::default());
        assert_eq!(container.len() as u64, report.container_len());

        let (plain, decoded) = decode_bytes(&container, &KEY).unwrap();
        assert_eq!(plain, data);
        assert!(decoded.checksum_matched);
        assert!(decoded.stream_intact);
        assert_eq!(decoded.filename, PathBuf::from("hello.txt"));
        assert_eq!(decoded.expected, report.checksum);
        assert_eq!(decoded.plain_len, 10);
    }

    #[test]
    fn test_header_records_payload_length() {
        let (container, report) = encode_bytes(&[0xAB; 5000], &EncodeSettings::default());
        let on_disk = i32::from_le_bytes(container[4..8].try_into().unwrap()) as u64;
        assert_eq!(on_disk, container.len() as u64 - 8);
        assert_eq!(report.payload_len, container.len() as u64 - report.header_len);
    }

    #[test]
    fn test_output_position_is_end_after_encode() {
        let mut out = Cursor::new(Vec::new());
        encode_stream(
            &mut Cursor::new(b"abc".to_vec()),
            &mut out,
            Path::new("a.bin"),
            &KEY,
            &EncodeSettings::default(),
        )
        .unwrap();
        assert_eq!(out.position(), out.get_ref().len() as u64);
    }

    #[test]
    fn test_wrong_key_reports_mismatch() {
        let settings = EncodeSettings {
            compression: CompressionKind::None,
            ..Default::default()
        };
        let (container, _) = encode_bytes(b"top secret", &settings);
        let (plain, report) = decode_bytes(&container, &[8u8; 32]).unwrap();
        assert_ne!(plain, b"top secret");
        assert!(!report.checksum_matched);
    }

    #[test]
    fn test_bad_key_length_touches_nothing() {
        let mut out = Cursor::new(Vec::new());
        let err = encode_stream(
            &mut Cursor::new(b"abc".to_vec()),
            &mut out,
            Path::new("a.txt"),
            &[1u8; 10],
            &EncodeSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, EfcError::InvalidKey { .. }));
        assert!(out.get_ref().is_empty());
    }

    #[test]
    fn test_none_cipher_rejected_before_output() {
        let settings = EncodeSettings {
            cipher: CipherKind::None,
            ..Default::default()
        };
        let mut out = Cursor::new(Vec::new());
        let err = encode_stream(
            &mut Cursor::new(b"abc".to_vec()),
            &mut out,
            Path::new("a.txt"),
            &KEY,
            &settings,
        )
        .unwrap_err();
        assert!(matches!(err, EfcError::UnsupportedAlgorithm(_)));
        assert!(out.get_ref().is_empty());
    }

    #[test]
    fn test_truncated_container() {
        let (container, _) = encode_bytes(b"0123456789", &EncodeSettings::default());
        let err = decode_bytes(&container[..container.len() - 1], &KEY).unwrap_err();
        assert!(matches!(err, EfcError::InvalidHeader(_)));
    }

    #[test]
    fn test_probe() {
        let (container, report) = encode_bytes(b"0123456789", &EncodeSettings::default());
        let info = probe_stream(&mut Cursor::new(container), Path::new("dir/hello.efc")).unwrap();
        assert_eq!(info.filename, "hello.txt");
        assert_eq!(info.compression, CompressionKind::Zlib);
        assert_eq!(info.cipher, CipherKind::Aes256Cfb);
        assert_eq!(info.payload_len, report.payload_len);
        assert_eq!(info.cipher_description(), "AES 256-bit CFB Mode");
        assert_eq!(info.compression_description(), "Zlib");

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["cipher"], "aes256cfb");
        assert_eq!(json["compression"], "zlib");
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("notes.md");
        let container = dir.path().join("notes.efc");
        let restored = dir.path().join("restored");
        std::fs::create_dir(&restored).unwrap();
        std::fs::write(&input, b"# notes\n\nsome text").unwrap();

        encode_file(&input, &container, &KEY, &EncodeSettings::default()).unwrap();
        let decoded = decode_file(&container, &KEY, |name| Ok(restored.join(name))).unwrap();

        assert_eq!(decoded.path, restored.join("notes.md"));
        assert!(decoded.report.checksum_matched);
        assert_eq!(std::fs::read(&decoded.path).unwrap(), b"# notes\n\nsome text");
        assert_eq!(probe_file(&container).unwrap().filename, "notes.md");
    }

    #[test]
    fn test_decode_file_failure_creates_no_output() {
        let dir = tempdir().unwrap();
        let container = dir.path().join("bogus.efc");
        std::fs::write(&container, b"not a container at all").unwrap();
        let target = dir.path().join("out.bin");

        let err = decode_file(&container, &KEY, |_| Ok(target.clone())).unwrap_err();
        assert!(matches!(err, EfcError::InvalidHeader(_)));
        assert!(!target.exists());
    }

    #[test]
    fn test_extension_with_path_parts_creates_no_output() {
        let dir = tempdir().unwrap();
        let (genuine, _) = encode_bytes(b"data", &EncodeSettings::default());
        let bad = "x/../../../../tmp/evil";

        // Swap the obfuscated "txt\0" field for the hostile one
        let mut forged = genuine[..4].to_vec();
        let length = i32::from_le_bytes(genuine[4..8].try_into().unwrap()) + bad.len() as i32 - 3;
        forged.extend_from_slice(&length.to_le_bytes());
        forged.extend(crate::obfuscate::obfuscate(bad.as_bytes()));
        forged.push(0);
        forged.extend_from_slice(&genuine[12..]);

        let err = probe_stream(&mut Cursor::new(forged.clone()), Path::new("evil.efc")).unwrap_err();
        assert!(matches!(err, EfcError::InvalidHeader(_)));

        let container = dir.path().join("evil.efc");
        std::fs::write(&container, &forged).unwrap();
        let restored = dir.path().join("restored");
        std::fs::create_dir(&restored).unwrap();
        let mut resolved = false;
        let err = decode_file(&container, &KEY, |name| {
            resolved = true;
            Ok(restored.join(name))
        })
        .unwrap_err();
        assert!(matches!(err, EfcError::InvalidHeader(_)));
        assert!(!resolved);
        assert_eq!(std::fs::read_dir(&restored).unwrap().count(), 0);
    }

    /// Reports a length without backing it with memory
    struct ZeroSource {
        len: u64,
        pos: u64,
    }

    impl Read for ZeroSource {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = (self.len.saturating_sub(self.pos)).min(buf.len() as u64) as usize;
            buf[..n].fill(0);
            self.pos += n as u64;
            Ok(n)
        }
    }

    impl Seek for ZeroSource {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            self.pos = match pos {
                SeekFrom::Start(n) => n,
                SeekFrom::End(n) => self.len.saturating_add_signed(n),
                SeekFrom::Current(n) => self.pos.saturating_add_signed(n),
            };
            Ok(self.pos)
        }
    }

    #[test]
    fn test_oversized_input_rejected_before_writing() {
        let mut input = ZeroSource {
            len: i32::MAX as u64,
            pos: 0,
        };
        let mut out = Cursor::new(Vec::new());
        let err = encode_stream(
            &mut input,
            &mut out,
            Path::new("huge.bin"),
            &KEY,
            &EncodeSettings::default(),
        )
        .unwrap_err();

        assert!(matches!(err, EfcError::PayloadTooLarge(n) if n > i32::MAX as u64));
        assert!(out.get_ref().is_empty());
        assert_eq!(input.pos, 0, "nothing was read");
    }
}
