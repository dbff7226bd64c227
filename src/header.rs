use crate::error::{EfcError, Result};
use crate::metered::MeteredReader;
use crate::obfuscate::{obfuscate, obfuscate_in_place};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Canonical magic bytes; the 4th byte is the header version
pub const EFC_MAGIC: [u8; 4] = [b'E', b'F', b'C', 0x00];

/// Alternate magic used when a container is embedded in a PNG chunk.
/// Accepted when parsing, never written.
pub const LEGACY_PNG_MAGIC: [u8; 4] = [b'e', b'F', b'C', b'C'];

/// Longest accepted obfuscated field, excluding its NUL terminator
pub const MAX_FIELD_LEN: usize = 255;

/// Width of the compression flag on disk
const FLAG_LEN: u64 = 1;

/// Compression algorithm options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    None,
    #[default]
    Zlib,
}

pub const DEFAULT_COMPRESSION: CompressionKind = CompressionKind::Zlib;

impl CompressionKind {
    pub fn id(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Zlib => 1,
        }
    }

    pub fn from_id(id: u32) -> Result<Self> {
        match id {
            0 => Ok(Self::None),
            1 => Ok(Self::Zlib),
            other => Err(EfcError::UnsupportedAlgorithm(format!(
                "compression id {}",
                other
            ))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Zlib => "zlib",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Zlib => "Zlib",
        }
    }

    fn flag(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Zlib => 1,
        }
    }

    fn from_flag(flag: u8) -> Result<Self> {
        match flag {
            0 => Ok(Self::None),
            1 => Ok(Self::Zlib),
            other => Err(EfcError::UnsupportedAlgorithm(format!(
                "compression flag 0x{:02x}",
                other
            ))),
        }
    }
}

impl std::str::FromStr for CompressionKind {
    type Err = EfcError;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "zlib" | "deflate" => Ok(Self::Zlib),
            _ => Err(EfcError::UnsupportedAlgorithm(format!(
                "compression: {}",
                s
            ))),
        }
    }
}

/// Cipher options. `None` is a sentinel: encryption is mandatory, so it is
/// never accepted as an operating cipher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CipherKind {
    None,
    #[default]
    Aes256Cfb,
}

pub const DEFAULT_CIPHER: CipherKind = CipherKind::Aes256Cfb;

impl CipherKind {
    /// Ciphers that can actually encrypt, in listing order (first is the default)
    pub const OPERATING: [CipherKind; 1] = [CipherKind::Aes256Cfb];

    pub fn id(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Aes256Cfb => 1,
        }
    }

    pub fn from_id(id: u32) -> Result<Self> {
        match id {
            0 => Ok(Self::None),
            1 => Ok(Self::Aes256Cfb),
            other => Err(EfcError::UnsupportedAlgorithm(format!("cipher id {}", other))),
        }
    }

    /// Short name used on the command line
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Aes256Cfb => "aes256cfb",
        }
    }

    /// Name stored (obfuscated) in the container header
    pub fn header_name(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Aes256Cfb => "AES_256_CFB",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::None => "[Unrecognised Algorithm]",
            Self::Aes256Cfb => "AES 256-bit CFB Mode",
        }
    }

    /// Key width in bytes
    pub fn key_len(self) -> usize {
        match self {
            Self::None => 0,
            Self::Aes256Cfb => 32,
        }
    }

    fn from_header_name(name: &str) -> Self {
        if name == Self::Aes256Cfb.header_name() {
            Self::Aes256Cfb
        } else {
            Self::None
        }
    }
}

impl std::str::FromStr for CipherKind {
    type Err = EfcError;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "aes256cfb" | "aes_256_cfb" | "aes-256-cfb" => Ok(Self::Aes256Cfb),
            _ => Err(EfcError::UnsupportedAlgorithm(format!("cipher: {}", s))),
        }
    }
}

/// Header layout revisions, keyed by the 4th magic byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum HeaderVersion {
    #[default]
    Default,
}

impl HeaderVersion {
    pub fn byte(self) -> u8 {
        match self {
            Self::Default => 0,
        }
    }
}

/// EFC container header.
///
/// On disk:
///
/// ```text
/// [magic: 4][payload length: i32 LE][ext\0][cipher name\0][compressed: 1][payload...]
/// ```
///
/// The on-disk length counts everything after itself. In memory,
/// `payload_len` only counts the bytes after the compression flag
/// (IV, encrypted checksum, encrypted data); the variable fields are
/// added on write and subtracted on parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EfcHeader {
    pub version: HeaderVersion,
    /// Parsed from the PNG-embedding alias instead of the canonical magic
    pub legacy_magic: bool,
    pub compression: CompressionKind,
    pub cipher: CipherKind,
    /// Extension of the original file, without the leading dot
    pub extension: String,
    pub payload_len: u64,
}

impl Default for EfcHeader {
    fn default() -> Self {
        Self {
            version: HeaderVersion::Default,
            legacy_magic: false,
            compression: CompressionKind::None,
            cipher: CipherKind::None,
            extension: String::new(),
            payload_len: 0,
        }
    }
}

impl EfcHeader {
    /// Create a header for encoding `source`
    pub fn new(source: &Path, compression: CompressionKind, cipher: CipherKind) -> Self {
        let extension = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_string();
        Self {
            compression,
            cipher,
            extension,
            ..Default::default()
        }
    }

    /// Bytes taken by the variable fields: both terminated strings plus the flag
    pub fn field_len(&self) -> u64 {
        (self.extension.len() as u64 + 1)
            + (self.cipher.header_name().len() as u64 + 1)
            + FLAG_LEN
    }

    /// Full header size on disk
    pub fn encoded_len(&self) -> u64 {
        EFC_MAGIC.len() as u64 + 4 + self.field_len()
    }

    /// Recovered filename: the container's base name with its extension
    /// swapped for the stored one
    pub fn filename_for(&self, container: &Path) -> PathBuf {
        let base = container
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_default();
        base.with_extension(&self.extension)
    }

    /// Serialize the header. Writing twice with different `payload_len`
    /// values produces byte-identical output apart from the length field.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<u64> {
        if self.extension.len() > MAX_FIELD_LEN {
            return Err(EfcError::InvalidHeader(format!(
                "extension longer than {} bytes",
                MAX_FIELD_LEN
            )));
        }
        if self.extension.as_bytes().contains(&0) {
            return Err(EfcError::InvalidHeader("extension contains NUL".into()));
        }
        check_extension(&self.extension)?;

        let on_disk = self.payload_len + self.field_len();
        let length = i32::try_from(on_disk).map_err(|_| EfcError::PayloadTooLarge(on_disk))?;

        let mut magic = EFC_MAGIC;
        magic[3] = self.version.byte();
        writer.write_all(&magic)?;
        writer.write_i32::<LittleEndian>(length)?;
        write_field(writer, self.extension.as_bytes())?;
        write_field(writer, self.cipher.header_name().as_bytes())?;
        writer.write_u8(self.compression.flag())?;

        tracing::debug!(
            payload_len = self.payload_len,
            on_disk_len = on_disk,
            "wrote EFC header"
        );
        Ok(self.encoded_len())
    }

    /// Parse a header from the start of `reader`
    pub fn parse<R: Read>(reader: &mut MeteredReader<R>) -> Result<Self> {
        let mut magic = [0u8; 4];
        read_exact_or_invalid(reader, &mut magic, "magic bytes")?;
        let (version, legacy_magic) = identify_magic(&magic)?;

        let length = reader
            .read_i32::<LittleEndian>()
            .map_err(|e| eof_as_invalid(e, "payload length"))?;
        if length < 0 {
            return Err(EfcError::InvalidHeader(format!(
                "negative payload length {}",
                length
            )));
        }
        let mut remaining = length as u64;

        let extension = read_field(reader, "extension")?;
        remaining = consume(remaining, extension.len() as u64 + 1)?;
        let extension = String::from_utf8(extension)
            .map_err(|_| EfcError::InvalidHeader("extension is not valid UTF-8".into()))?;
        check_extension(&extension)?;

        let cipher_name = read_field(reader, "cipher name")?;
        remaining = consume(remaining, cipher_name.len() as u64 + 1)?;
        let cipher_name = String::from_utf8_lossy(&cipher_name);
        let cipher = CipherKind::from_header_name(&cipher_name);
        if cipher == CipherKind::None {
            tracing::debug!(cipher = %cipher_name, "unrecognised cipher name in header");
        }

        let flag = reader
            .read_u8()
            .map_err(|e| eof_as_invalid(e, "compression flag"))?;
        remaining = consume(remaining, FLAG_LEN)?;
        let compression = CompressionKind::from_flag(flag)?;

        tracing::debug!(
            legacy_magic,
            extension = %extension,
            payload_len = remaining,
            "parsed EFC header"
        );

        Ok(Self {
            version,
            legacy_magic,
            compression,
            cipher,
            extension,
            payload_len: remaining,
        })
    }
}

fn identify_magic(magic: &[u8; 4]) -> Result<(HeaderVersion, bool)> {
    if *magic == EFC_MAGIC {
        return Ok((HeaderVersion::Default, false));
    }
    if *magic == LEGACY_PNG_MAGIC {
        return Ok((HeaderVersion::Default, true));
    }
    // Other revisions use either the plain or the obfuscated prefix
    if magic[..3] == EFC_MAGIC[..3] || magic[..3] == obfuscate(&EFC_MAGIC[..3])[..] {
        return Err(EfcError::UnsupportedVersion(magic[3]));
    }
    Err(EfcError::InvalidHeader(format!(
        "unrecognised magic bytes {}",
        hex::encode(magic)
    )))
}

/// The extension is joined onto output paths, so it must stay a single
/// path component
fn check_extension(extension: &str) -> Result<()> {
    if extension.chars().any(std::path::is_separator) || extension.contains("..") {
        return Err(EfcError::InvalidHeader(format!(
            "extension {:?} is not a plain file extension",
            extension
        )));
    }
    Ok(())
}

fn write_field<W: Write>(writer: &mut W, value: &[u8]) -> io::Result<()> {
    let mut hidden = value.to_vec();
    obfuscate_in_place(&mut hidden);
    writer.write_all(&hidden)?;
    writer.write_u8(0)
}

/// Read an obfuscated, NUL-terminated field and return it in the clear
fn read_field<R: Read>(reader: &mut MeteredReader<R>, what: &str) -> Result<Vec<u8>> {
    let mut field = Vec::new();
    loop {
        let byte = reader.read_u8().map_err(|e| eof_as_invalid(e, what))?;
        if byte == 0 {
            break;
        }
        if field.len() == MAX_FIELD_LEN {
            return Err(EfcError::InvalidHeader(format!("{} is not terminated", what)));
        }
        field.push(byte);
    }
    obfuscate_in_place(&mut field);
    Ok(field)
}

fn consume(remaining: u64, used: u64) -> Result<u64> {
    remaining.checked_sub(used).ok_or_else(|| {
        EfcError::InvalidHeader("payload length is smaller than the header fields".into())
    })
}

fn read_exact_or_invalid<R: Read>(reader: &mut R, buf: &mut [u8], what: &str) -> Result<()> {
    reader.read_exact(buf).map_err(|e| eof_as_invalid(e, what))
}

fn eof_as_invalid(err: io::Error, what: &str) -> EfcError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        EfcError::InvalidHeader(format!("truncated while reading {}", what))
    } else {
        EfcError::Io(err)
    }
}
