use crate::error::Result;
use digest::Digest;
use sha1::Sha1;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// Checksum width in bytes (SHA-1)
pub const CHECKSUM_SIZE: usize = 20;

/// Read size used when hashing whole files
pub const DIGEST_CHUNK_SIZE: usize = 512 * 1024;

/// Whole-file SHA-1 of the plaintext, carried encrypted inside the payload
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checksum([u8; CHECKSUM_SIZE]);

impl Checksum {
    /// All-zero placeholder, filled in during decode
    pub fn blank() -> Self {
        Self([0u8; CHECKSUM_SIZE])
    }

    pub fn from_bytes(bytes: [u8; CHECKSUM_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; CHECKSUM_SIZE] {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Digest everything from the current position to the end of `source`,
    /// then seek back so the source can be read again
    pub fn compute<R: Read + Seek>(source: &mut R) -> Result<Self> {
        let start = source.stream_position()?;
        let checksum = Self::compute_to_end(source)?;
        source.seek(SeekFrom::Start(start))?;
        Ok(checksum)
    }

    /// Digest everything left in `source`, leaving it exhausted
    pub fn compute_to_end<R: Read>(source: &mut R) -> Result<Self> {
        let bytes = digest_reader::<Sha1, _>(source, DIGEST_CHUNK_SIZE)?;
        let mut out = [0u8; CHECKSUM_SIZE];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }

    pub fn of_file(path: &Path) -> Result<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        Self::compute_to_end(&mut reader)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", self.to_hex())
    }
}

/// Stream `source` through digest `D`, returning the raw digest bytes
pub(crate) fn digest_reader<D, R>(source: &mut R, chunk_size: usize) -> Result<Vec<u8>>
where
    D: Digest,
    R: Read + ?Sized,
{
    let mut hasher = D::new();
    let mut buffer = vec![0u8; chunk_size];
    loop {
        let n = source.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hasher.finalize().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    #[test]
    fn test_known_sha1() {
        let mut cursor = Cursor::new(b"abc".to_vec());
        let checksum = Checksum::compute(&mut cursor).unwrap();
        assert_eq!(checksum.to_hex(), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn test_compute_restores_position() {
        let mut cursor = Cursor::new(b"xxhello".to_vec());
        cursor.set_position(2);
        let checksum = Checksum::compute(&mut cursor).unwrap();
        assert_eq!(cursor.position(), 2);

        let direct = Checksum::compute(&mut Cursor::new(b"hello".to_vec())).unwrap();
        assert_eq!(checksum, direct);
    }

    #[test]
    fn test_blank() {
        let blank = Checksum::blank();
        assert!(blank.is_blank());
        assert_eq!(blank.as_bytes(), &[0u8; CHECKSUM_SIZE]);
        let empty = Checksum::compute(&mut Cursor::new(Vec::new())).unwrap();
        assert!(!empty.is_blank());
    }

    #[test]
    fn test_multi_chunk_matches_single_read() {
        let data: Vec<u8> = (0..(DIGEST_CHUNK_SIZE * 2 + 17)).map(|i| (i % 253) as u8).collect();
        let chunked = Checksum::compute(&mut Cursor::new(data.clone())).unwrap();
        let whole = Sha1::digest(&data);
        assert_eq!(&chunked.as_bytes()[..], whole.as_slice());
    }

    #[test]
    fn test_of_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(
            Checksum::of_file(&path).unwrap().to_hex(),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }
}
