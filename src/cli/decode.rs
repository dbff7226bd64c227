use crate::cli::key::KeySource;
use crate::container::{decode_file, DecodedFile};
use crate::error::{EfcError, Result};
use crate::header::DEFAULT_CIPHER;
use std::path::{Path, PathBuf};

/// Options for the decode command
#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
    pub key: KeySource,
    /// A file path, or a directory to place the recovered file in
    pub output: Option<PathBuf>,
    pub overwrite: bool,
}

/// Where a decoded file goes: an explicit file, inside an explicit
/// directory, or next to the container
pub fn resolve_decode_output(container: &Path, recovered: &Path, requested: Option<&Path>) -> PathBuf {
    match requested {
        Some(dir) if dir.is_dir() => dir.join(recovered),
        Some(path) => path.to_path_buf(),
        None => container
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(recovered),
    }
}

/// Decode the container at `input`.
///
/// A checksum mismatch is not an error: check `report.checksum_matched`.
pub fn decode_command(input: &Path, options: &DecodeOptions) -> Result<DecodedFile> {
    // Every operating cipher shares the default's key width
    let key = options.key.resolve(DEFAULT_CIPHER)?;

    decode_file(input, &key, |recovered| {
        let output = resolve_decode_output(input, recovered, options.output.as_deref());
        if output == input {
            return Err(EfcError::OutputExists(output));
        }
        if output.exists() && !options.overwrite {
            return Err(EfcError::OutputExists(output));
        }
        Ok(output)
    })
}
