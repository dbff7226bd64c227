use crate::error::{EfcError, Result};
use crate::header::CipherKind;
use crate::pipeline::{derive_key_from_file, derive_key_from_password};
use std::io::{self, BufRead};
use std::path::PathBuf;

/// Password value that means "read the password from stdin"
pub const STDIN_PASSWORD: &str = "-";

/// Where the key material comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// Key bytes used as-is; must match the cipher's key width
    Raw(Vec<u8>),
    /// File whose leading bytes are the key
    KeyFile(PathBuf),
    /// File whose SHA-256 digest is the key
    HashFile(PathBuf),
    /// Password whose SHA-256 digest is the key
    Password(String),
}

impl Default for KeySource {
    fn default() -> Self {
        Self::Password(String::new())
    }
}

impl KeySource {
    /// Build a source from mutually exclusive command-line values
    pub fn from_flags(
        password: Option<String>,
        keyfile: Option<PathBuf>,
        hash_keyfile: Option<PathBuf>,
        raw: Option<Vec<u8>>,
    ) -> Result<Self> {
        match (password, keyfile, hash_keyfile, raw) {
            (Some(p), None, None, None) => Ok(Self::Password(p)),
            (None, Some(k), None, None) => Ok(Self::KeyFile(k)),
            (None, None, Some(h), None) => Ok(Self::HashFile(h)),
            (None, None, None, Some(r)) => Ok(Self::Raw(r)),
            _ => Err(EfcError::KeyRequired),
        }
    }

    /// Produce a key of `cipher`'s width, reading stdin for `-` passwords
    pub fn resolve(&self, cipher: CipherKind) -> Result<Vec<u8>> {
        let stdin = io::stdin();
        self.resolve_with(cipher, &mut stdin.lock())
    }

    pub fn resolve_with<B: BufRead>(&self, cipher: CipherKind, stdin: &mut B) -> Result<Vec<u8>> {
        let expected = cipher.key_len();
        match self {
            Self::Raw(bytes) => {
                if bytes.len() != expected {
                    return Err(EfcError::InvalidKey {
                        expected,
                        actual: bytes.len(),
                    });
                }
                Ok(bytes.clone())
            }
            Self::KeyFile(path) => {
                let contents = std::fs::read(path).map_err(|source| EfcError::KeyDerivation {
                    path: path.clone(),
                    source,
                })?;
                if contents.len() < expected {
                    return Err(EfcError::InvalidKey {
                        expected,
                        actual: contents.len(),
                    });
                }
                Ok(contents[..expected].to_vec())
            }
            Self::HashFile(path) => derive_key_from_file(cipher, path),
            Self::Password(password) if password == STDIN_PASSWORD => {
                let password = read_password_line(stdin)?;
                derive_key_from_password(cipher, &password)
            }
            Self::Password(password) => {
                if password.is_empty() {
                    return Err(EfcError::KeyRequired);
                }
                derive_key_from_password(cipher, password)
            }
        }
    }
}

fn read_password_line<B: BufRead>(stdin: &mut B) -> Result<String> {
    let mut line = String::new();
    stdin.read_line(&mut line)?;
    let password = line.trim_end_matches(|c: char| c == '\r' || c == '\n').to_string();
    if password.is_empty() {
        return Err(EfcError::KeyRequired);
    }
    Ok(password)
}
