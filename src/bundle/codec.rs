//! Little-endian field access over in-memory byte buffers.
//!
//! Structural validation happens before these are called, so an offset past
//! the end of the buffer is a caller bug and panics rather than surfacing as
//! a recoverable error.

/// Reads a little-endian `u16` at `offset`.
///
/// # Panics
///
/// Panics if `offset + 2` exceeds the buffer length.
pub fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes(bytes[offset..offset + size_of::<u16>()].try_into().unwrap())
}

/// Reads a little-endian `u32` at `offset`.
///
/// # Panics
///
/// Panics if `offset + 4` exceeds the buffer length.
pub fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + size_of::<u32>()].try_into().unwrap())
}

/// Reads a little-endian `u64` at `offset`.
///
/// # Panics
///
/// Panics if `offset + 8` exceeds the buffer length.
pub fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(bytes[offset..offset + size_of::<u64>()].try_into().unwrap())
}

/// Writes `value` as a little-endian `u32` at `offset`.
///
/// # Panics
///
/// Panics if `offset + 4` exceeds the buffer length.
pub fn write_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + size_of::<u32>()].copy_from_slice(&value.to_le_bytes());
}
