//! EFC - Encrypted File Container
//!
//! Packs a single file into a container that hides its contents, its
//! original extension and the cipher used, while keeping enough metadata to
//! restore the original name on decode.
//!
//! ## Container layout
//!
//! ```text
//! [magic "EFC\0"][payload length: i32 LE][ext\0][cipher\0][compressed: 1]
//! [IV: 16][encrypted SHA-1: 20][encrypted data...]
//! ```
//!
//! The extension and cipher name are obfuscated. Data is zlib-compressed
//! (optional) and then encrypted with AES-256-CFB. The SHA-1 of the plaintext
//! rides inside the ciphertext and is checked after decoding.
//!
//! ## Example
//!
//! ```no_run
//! use efc::cli::{decode_command, encode_command, DecodeOptions, EncodeOptions, KeySource};
//! use std::path::Path;
//!
//! let encode = EncodeOptions {
//!     key: KeySource::Password("my_secret".into()),
//!     ..Default::default()
//! };
//! let (container, _) = encode_command(Path::new("report.pdf"), &encode).unwrap();
//!
//! let decode = DecodeOptions {
//!     key: KeySource::Password("my_secret".into()),
//!     ..Default::default()
//! };
//! let decoded = decode_command(&container, &decode).unwrap();
//! assert!(decoded.report.checksum_matched);
//! ```

pub mod cli;
pub mod container;
pub mod error;
pub mod header;
pub mod metered;
pub mod obfuscate;
pub mod pipeline;

pub use container::{
    decode_file, decode_stream, encode_file, encode_stream, probe_file, probe_stream,
    ContainerInfo, DecodeReport, DecodedFile, EncodeReport, EncodeSettings,
};
pub use error::{EfcError, Result};
pub use header::{CipherKind, CompressionKind, EfcHeader};
