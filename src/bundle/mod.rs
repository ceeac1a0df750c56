//! Reading and rewriting Burn bundle executables: the `.wixburn` section, the
//! containers appended after the stub, and the signature bookkeeping that
//! re-inscription depends on.

mod cabinet;
mod codec;
mod manifest;
mod pe;
mod reader;
mod section;
#[cfg(test)]
pub(crate) mod testing;
mod writer;

use std::{
    io::{self, Read, Seek, SeekFrom},
    ops::Range,
};

use thiserror::Error;
use tracing::debug;

pub use pe::{SectionLocation, StubLayout};
pub use reader::{BundleReader, ExtractError};
pub use section::BurnSection;
pub use writer::BundleWriter;

#[derive(Error, Debug)]
pub enum BundleError {
    #[error("File is not a valid Windows executable")]
    InvalidStub,
    #[error("Executable does not contain a .wixburn section")]
    MissingBurnSection,
    #[error("The .wixburn section is too small to hold a bundle header")]
    BurnSectionTooSmall,
    #[error("File is not a valid Burn bundle")]
    InvalidBundle,
    #[error("Bundle uses unsupported Burn section version {0}")]
    IncompatibleVersion(u32),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Everything recognized about an open bundle: the executable layout, the
/// parsed `.wixburn` payload, and the resolved engine boundary. Immutable on
/// the read path; the writer updates it in lockstep with the file.
#[derive(Clone, Debug)]
pub struct Bundle {
    pub layout: StubLayout,
    pub section: BurnSection,
    /// File offset at which attached container data begins.
    pub engine_size: u64,
}

impl Bundle {
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Self, BundleError> {
        let layout = pe::read_stub_layout(reader)?;

        // A section claiming more bytes than the file holds would otherwise
        // drive the allocation below.
        let file_size = reader.seek(SeekFrom::End(0))?;
        let available = file_size.saturating_sub(layout.wixburn_section.offset);
        if u64::from(layout.wixburn_section.size) > available {
            return Err(BundleError::InvalidBundle);
        }

        reader.seek(SeekFrom::Start(layout.wixburn_section.offset))?;
        let mut bytes = vec![0; layout.wixburn_section.size as usize];
        reader.read_exact(&mut bytes)?;
        let section = BurnSection::parse(&bytes)?;

        let engine_size = section.engine_size(layout.signature_offset, layout.signature_size);
        debug!(?section, engine_size);
        Ok(Self {
            layout,
            section,
            engine_size,
        })
    }

    /// Byte range of each chained container, slot 1 onwards. There is no
    /// absolute index on disk; each range starts where the previous one
    /// ended, beginning at the engine boundary.
    pub fn attached_container_ranges(&self) -> Vec<Range<u64>> {
        let mut next_address = self.engine_size;
        self.section
            .container_sizes
            .iter()
            .skip(1)
            .map(|&size| {
                let start = next_address;
                next_address += u64::from(size);
                start..next_address
            })
            .collect()
    }
}
