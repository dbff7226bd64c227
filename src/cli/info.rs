use crate::container::{probe_file, ContainerInfo};
use crate::error::Result;
use crate::header::{CipherKind, DEFAULT_CIPHER};
use std::path::Path;

/// Output shape for the info command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InfoOptions {
    /// Print only the recovered filename
    pub only_filename: bool,
    pub json: bool,
}

/// Describe the container at `path` without decoding it
pub fn show_info(path: &Path, options: &InfoOptions) -> Result<String> {
    let info = probe_file(path)?;
    render_info(path, &info, options)
}

fn render_info(path: &Path, info: &ContainerInfo, options: &InfoOptions) -> Result<String> {
    if options.only_filename {
        return Ok(format!("{}\n", info.filename));
    }
    if options.json {
        let mut json = serde_json::to_string_pretty(info)?;
        json.push('\n');
        return Ok(json);
    }

    let mut output = String::new();
    output.push_str("EFC Container Information\n");
    output.push_str("=========================\n\n");
    output.push_str(&format!("File: {}\n", path.display()));
    output.push_str(&format!("Original filename: {}\n", info.filename));
    if info.legacy_magic {
        output.push_str("Magic: embedded (legacy PNG alias)\n");
    }
    output.push_str(&format!("Compression: {}\n", info.compression_description()));
    output.push_str(&format!("Encryption: {}\n", info.cipher_description()));
    output.push_str(&format!(
        "Payload size: {} ({} bytes)\n",
        format_size(info.payload_len),
        info.payload_len
    ));
    Ok(output)
}

/// One line per usable cipher, the default marked
pub fn list_ciphers() -> String {
    let mut output = String::from("Available ciphers:\n");
    for cipher in CipherKind::OPERATING {
        let marker = if cipher == DEFAULT_CIPHER { " (Default)" } else { "" };
        output.push_str(&format!(
            "  {:<12} {}{}\n",
            cipher.name(),
            cipher.description(),
            marker
        ));
    }
    output
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
