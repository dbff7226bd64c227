use crate::error::{EfcError, Result};
use crate::header::CipherKind;
use crate::pipeline::checksum::{digest_reader, Checksum, CHECKSUM_SIZE};
use crate::pipeline::compress::CompressionStrategy;
use aes::Aes256;
use cfb_mode::cipher::KeyIvInit;
use cfb_mode::{BufDecryptor, BufEncryptor};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

/// Plaintext/ciphertext read size for the streaming loop
pub const CHUNK_SIZE: usize = 512 * 1024;

/// AES block size; the IV leads every payload
pub const IV_SIZE: usize = 16;

const KEYFILE_CHUNK_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionMode {
    Encrypt,
    Decrypt,
}

/// Whole-stream encryption for one cipher and direction.
///
/// Payload layout: `[IV][encrypted checksum][encrypted data...]`. On encode
/// data is compressed before it is encrypted; on decode it is decrypted
/// before it is decompressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionStrategy {
    kind: CipherKind,
    mode: EncryptionMode,
}

impl EncryptionStrategy {
    pub fn new(kind: CipherKind, mode: EncryptionMode) -> Result<Self> {
        match kind {
            CipherKind::Aes256Cfb => Ok(Self { kind, mode }),
            CipherKind::None => Err(EfcError::UnsupportedAlgorithm(
                "cipher: none (encryption is mandatory)".into(),
            )),
        }
    }

    /// Reject keys that do not match the cipher's width
    pub fn validate_key(&self, key: &[u8]) -> Result<()> {
        check_key(self.kind, key)
    }

    /// Run the full payload transform from `input` to `output`.
    ///
    /// On encrypt `checksum` is the plaintext digest to embed; on decrypt it
    /// is overwritten with the digest recovered from the payload.
    pub fn transform_stream<R: Read, W: Write>(
        &self,
        compression: &mut CompressionStrategy,
        input: &mut R,
        output: &mut W,
        key: &[u8],
        checksum: &mut Checksum,
    ) -> Result<()> {
        check_key(self.kind, key)?;
        match (self.kind, self.mode) {
            (CipherKind::Aes256Cfb, EncryptionMode::Encrypt) => {
                run_stream::<AesEncrypter, _, _>(compression, input, output, key, checksum)
            }
            (CipherKind::Aes256Cfb, EncryptionMode::Decrypt) => {
                run_stream::<AesDecrypter, _, _>(compression, input, output, key, checksum)
            }
            (CipherKind::None, _) => Err(EfcError::UnsupportedAlgorithm("cipher: none".into())),
        }
    }

    pub fn key_from_password(&self, password: &str) -> Result<Vec<u8>> {
        derive_key_from_password(self.kind, password)
    }

    pub fn key_from_file(&self, path: &Path) -> Result<Vec<u8>> {
        derive_key_from_file(self.kind, path)
    }
}

/// Hash a password into a key of the cipher's width
pub fn derive_key_from_password(kind: CipherKind, password: &str) -> Result<Vec<u8>> {
    match kind {
        CipherKind::Aes256Cfb => Ok(Sha256::digest(password.as_bytes()).to_vec()),
        CipherKind::None => Err(EfcError::UnsupportedAlgorithm("cipher: none".into())),
    }
}

/// Hash a file's contents into a key of the cipher's width
pub fn derive_key_from_file(kind: CipherKind, path: &Path) -> Result<Vec<u8>> {
    if kind == CipherKind::None {
        return Err(EfcError::UnsupportedAlgorithm("cipher: none".into()));
    }
    let to_key_error = |source: io::Error| EfcError::KeyDerivation {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(to_key_error)?;
    let mut reader = BufReader::new(file);
    digest_reader::<Sha256, _>(&mut reader, KEYFILE_CHUNK_SIZE).map_err(|e| match e {
        EfcError::Io(source) => to_key_error(source),
        other => other,
    })
}

fn check_key(kind: CipherKind, key: &[u8]) -> Result<()> {
    if key.len() != kind.key_len() {
        return Err(EfcError::InvalidKey {
            expected: kind.key_len(),
            actual: key.len(),
        });
    }
    Ok(())
}

/// Per-direction steps around the shared chunk loop
trait StreamHooks: Sized {
    /// Set up the cipher and exchange the IV and checksum
    fn initialise<R: Read, W: Write>(
        key: &[u8],
        input: &mut R,
        output: &mut W,
        checksum: &mut Checksum,
    ) -> Result<Self>;

    fn pre_compression(&mut self, chunk: &mut [u8]);

    fn post_compression<W: Write>(&mut self, data: Vec<u8>, output: &mut W) -> Result<()>;
}

fn run_stream<H: StreamHooks, R: Read, W: Write>(
    compression: &mut CompressionStrategy,
    input: &mut R,
    output: &mut W,
    key: &[u8],
    checksum: &mut Checksum,
) -> Result<()> {
    let mut hooks = H::initialise(key, input, output, checksum)?;

    let mut current = vec![0u8; CHUNK_SIZE];
    let mut next = vec![0u8; CHUNK_SIZE];
    let mut current_len = fill_chunk(input, &mut current)?;
    let mut chunks = 0u64;

    loop {
        // Read one chunk ahead so the final chunk is known before it is transformed
        let next_len = if current_len == CHUNK_SIZE {
            fill_chunk(input, &mut next)?
        } else {
            0
        };
        let is_final = next_len == 0;

        let mut chunk = current[..current_len].to_vec();
        hooks.pre_compression(&mut chunk);
        let transformed = compression.transform(&chunk, is_final)?;
        hooks.post_compression(transformed, output)?;
        chunks += 1;

        if is_final {
            break;
        }
        std::mem::swap(&mut current, &mut next);
        current_len = next_len;
    }

    tracing::debug!(chunks, "payload stream transformed");
    Ok(())
}

/// Read until `buf` is full or the source is exhausted
fn fill_chunk<R: Read>(input: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

struct AesEncrypter {
    cipher: BufEncryptor<Aes256>,
}

impl StreamHooks for AesEncrypter {
    fn initialise<R: Read, W: Write>(
        key: &[u8],
        _input: &mut R,
        output: &mut W,
        checksum: &mut Checksum,
    ) -> Result<Self> {
        let mut iv = [0u8; IV_SIZE];
        OsRng.fill_bytes(&mut iv);
        let mut cipher = BufEncryptor::<Aes256>::new_from_slices(key, &iv).map_err(|_| {
            EfcError::InvalidKey {
                expected: CipherKind::Aes256Cfb.key_len(),
                actual: key.len(),
            }
        })?;

        output.write_all(&iv)?;

        let mut sealed = *checksum.as_bytes();
        cipher.encrypt(&mut sealed);
        output.write_all(&sealed)?;

        Ok(Self { cipher })
    }

    // Encryption happens after compression
    fn pre_compression(&mut self, _chunk: &mut [u8]) {}

    fn post_compression<W: Write>(&mut self, mut data: Vec<u8>, output: &mut W) -> Result<()> {
        self.cipher.encrypt(&mut data);
        output.write_all(&data)?;
        Ok(())
    }
}

struct AesDecrypter {
    cipher: BufDecryptor<Aes256>,
}

impl StreamHooks for AesDecrypter {
    fn initialise<R: Read, W: Write>(
        key: &[u8],
        input: &mut R,
        _output: &mut W,
        checksum: &mut Checksum,
    ) -> Result<Self> {
        let mut iv = [0u8; IV_SIZE];
        read_payload_exact(input, &mut iv, "IV")?;
        let mut cipher = BufDecryptor::<Aes256>::new_from_slices(key, &iv).map_err(|_| {
            EfcError::InvalidKey {
                expected: CipherKind::Aes256Cfb.key_len(),
                actual: key.len(),
            }
        })?;

        let mut sealed = [0u8; CHECKSUM_SIZE];
        read_payload_exact(input, &mut sealed, "checksum")?;
        cipher.decrypt(&mut sealed);
        *checksum = Checksum::from_bytes(sealed);

        Ok(Self { cipher })
    }

    // Compressed bytes are meaningless until decrypted
    fn pre_compression(&mut self, chunk: &mut [u8]) {
        self.cipher.decrypt(chunk);
    }

    fn post_compression<W: Write>(&mut self, data: Vec<u8>, output: &mut W) -> Result<()> {
        output.write_all(&data)?;
        Ok(())
    }
}

fn read_payload_exact<R: Read>(input: &mut R, buf: &mut [u8], what: &str) -> Result<()> {
    input.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            EfcError::InvalidHeader(format!("payload truncated before end of {}", what))
        } else {
            EfcError::Io(e)
        }
    })
}
