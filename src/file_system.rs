use std::{fs, io};

use camino::Utf8Path;

/// Moves `source` to `destination`, falling back to copy-and-delete when a
/// plain rename is not possible (crossing filesystems, for one).
pub fn move_file(source: &Utf8Path, destination: &Utf8Path) -> io::Result<()> {
    if fs::rename(source, destination).is_ok() {
        return Ok(());
    }
    fs::copy(source, destination)?;
    fs::remove_file(source)
}

pub fn copy_file(source: &Utf8Path, destination: &Utf8Path) -> io::Result<u64> {
    fs::copy(source, destination)
}
