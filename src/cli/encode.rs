use crate::cli::key::KeySource;
use crate::container::{encode_file, EncodeReport, EncodeSettings};
use crate::error::{EfcError, Result};
use crate::header::{CipherKind, CompressionKind};
use crate::pipeline::DEFAULT_LEVEL;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Extension given to new containers
pub const CONTAINER_EXTENSION: &str = "efc";

/// Options for the encode command
#[derive(Debug, Clone)]
pub struct EncodeOptions {
    pub key: KeySource,
    pub compression: CompressionKind,
    pub cipher: CipherKind,
    pub level: u32,
    /// Defaults to the input path with an `.efc` extension
    pub output: Option<PathBuf>,
    pub overwrite: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        let settings = EncodeSettings::default();
        Self {
            key: KeySource::default(),
            compression: settings.compression,
            cipher: settings.cipher,
            level: DEFAULT_LEVEL,
            output: None,
            overwrite: false,
        }
    }
}

impl EncodeOptions {
    pub fn settings(&self) -> EncodeSettings {
        EncodeSettings {
            compression: self.compression,
            cipher: self.cipher,
            level: self.level,
        }
    }
}

/// Default container path for `input`
pub fn default_container_path(input: &Path) -> PathBuf {
    let swapped = input.with_extension(CONTAINER_EXTENSION);
    if swapped != input {
        return swapped;
    }
    // Already named *.efc: append rather than overwrite the source
    let mut appended = OsString::from(input.as_os_str());
    appended.push(".");
    appended.push(CONTAINER_EXTENSION);
    PathBuf::from(appended)
}

/// Encode `input` into a container, returning where it was written
pub fn encode_command(input: &Path, options: &EncodeOptions) -> Result<(PathBuf, EncodeReport)> {
    let output = options
        .output
        .clone()
        .unwrap_or_else(|| default_container_path(input));

    if output == input {
        return Err(EfcError::OutputExists(output));
    }
    if output.exists() && !options.overwrite {
        return Err(EfcError::OutputExists(output));
    }

    let key = options.key.resolve(options.cipher)?;
    let report = encode_file(input, &output, &key, &options.settings())?;
    Ok((output, report))
}
