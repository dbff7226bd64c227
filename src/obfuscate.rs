//! Header metadata obfuscation.
//!
//! Not a security mechanism: it only keeps the original extension and cipher
//! name from showing up in a plain `grep` of a container. Each byte has its
//! nibbles swapped, so the transform is its own inverse, preserves length, and
//! maps NUL to NUL only (NUL-terminated fields stay well formed).

/// (De)obfuscate a single byte
#[inline]
pub fn obfuscate_byte(byte: u8) -> u8 {
    byte.rotate_left(4)
}

/// (De)obfuscate a byte slice in place
pub fn obfuscate_in_place(bytes: &mut [u8]) {
    for byte in bytes.iter_mut() {
        *byte = obfuscate_byte(*byte);
    }
}

/// (De)obfuscate a byte slice into a new buffer
pub fn obfuscate(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().map(|&b| obfuscate_byte(b)).collect()
}
