//! Walks just enough of a Windows executable to find the `.wixburn` section
//! and the fields that signing touches: DOS header, NT/COFF header, then a
//! linear scan of the section table.

use std::io::{self, Read, Seek, SeekFrom};

use super::{BundleError, codec, section::BURN_SECTION_MIN_SIZE};

pub(crate) const DOS_MAGIC: u16 = 0x5A4D;
pub(crate) const PE_SIGNATURE: u32 = 0x0000_4550;

const DOS_HEADER_SIZE: usize = 64;
const DOS_OFFSET_NT_HEADER: usize = 60;
const NT_HEADER_SIZE: usize = 24;
const NT_OFFSET_SECTION_COUNT: usize = 6;
const NT_OFFSET_OPTIONAL_HEADER_SIZE: usize = 20;
const OPTIONAL_OFFSET_CHECKSUM: usize = 64;
// The security entry is the fifth of sixteen 8-byte data directory entries,
// so it sits a fixed distance before the end of the optional header for both
// PE32 and PE32+ images.
const CERTIFICATE_TABLE_NEGATIVE_OFFSET: usize = 8 * (16 - 4);
const SECTION_HEADER_SIZE: usize = 40;
const SECTION_OFFSET_RAW_DATA_SIZE: usize = 16;
const SECTION_OFFSET_RAW_DATA_OFFSET: usize = 20;

/// `.wixburn` as a little-endian qword, the full 8-byte name field.
pub(crate) const WIXBURN_SECTION_NAME: u64 = 0x6E72_7562_7869_772E;

/// Raw data location of a section, as recorded in its table entry.
#[derive(Clone, Copy, Debug)]
pub struct SectionLocation {
    pub offset: u64,
    pub size: u32,
}

/// Offsets and signature state resolved from the executable headers, fixed
/// for the lifetime of an open file.
#[derive(Clone, Debug)]
pub struct StubLayout {
    pub checksum: u32,
    pub checksum_offset: u64,
    pub certificate_table_offset: u64,
    pub signature_offset: u32,
    pub signature_size: u32,
    pub wixburn_section: SectionLocation,
}

/// Reads the DOS header, NT header, and section table from `reader` and
/// locates the `.wixburn` section. Each stage is parsed into its own struct
/// once; nothing is resolved lazily.
pub fn read_stub_layout<R: Read + Seek>(reader: &mut R) -> Result<StubLayout, BundleError> {
    let dos = DosHeader::read(reader)?;
    let nt = NtHeader::read(reader, &dos)?;
    let wixburn_section = locate_burn_section(reader, &nt)?;
    Ok(StubLayout {
        checksum: nt.checksum,
        checksum_offset: nt.checksum_offset,
        certificate_table_offset: nt.certificate_table_offset,
        signature_offset: nt.signature_offset,
        signature_size: nt.signature_size,
        wixburn_section,
    })
}

struct DosHeader {
    nt_header_offset: u64,
}

impl DosHeader {
    fn read<R: Read + Seek>(reader: &mut R) -> Result<Self, BundleError> {
        reader.seek(SeekFrom::Start(0))?;
        let mut bytes = [0; DOS_HEADER_SIZE];
        read_header(reader, &mut bytes)?;
        if codec::read_u16(&bytes, 0) != DOS_MAGIC {
            return Err(BundleError::InvalidStub);
        }
        Ok(Self {
            nt_header_offset: u64::from(codec::read_u32(&bytes, DOS_OFFSET_NT_HEADER)),
        })
    }
}

/// The NT/COFF header together with the optional-header fields signing
/// touches, and the derived file offsets of those fields.
struct NtHeader {
    section_count: u16,
    section_table_offset: u64,
    checksum: u32,
    checksum_offset: u64,
    certificate_table_offset: u64,
    signature_offset: u32,
    signature_size: u32,
}

impl NtHeader {
    fn read<R: Read + Seek>(reader: &mut R, dos: &DosHeader) -> Result<Self, BundleError> {
        reader.seek(SeekFrom::Start(dos.nt_header_offset))?;
        let mut bytes = [0; NT_HEADER_SIZE];
        read_header(reader, &mut bytes)?;
        if codec::read_u32(&bytes, 0) != PE_SIGNATURE {
            return Err(BundleError::InvalidStub);
        }
        let section_count = codec::read_u16(&bytes, NT_OFFSET_SECTION_COUNT);
        let optional_header_size =
            usize::from(codec::read_u16(&bytes, NT_OFFSET_OPTIONAL_HEADER_SIZE));
        if optional_header_size < CERTIFICATE_TABLE_NEGATIVE_OFFSET + size_of::<u64>() {
            // Cannot hold a checksum and a certificate table entry.
            return Err(BundleError::InvalidStub);
        }

        let mut optional_header = vec![0; optional_header_size];
        read_header(reader, &mut optional_header)?;
        let certificate_table = optional_header_size - CERTIFICATE_TABLE_NEGATIVE_OFFSET;
        let optional_header_offset = dos.nt_header_offset + NT_HEADER_SIZE as u64;

        Ok(Self {
            section_count,
            section_table_offset: optional_header_offset + optional_header_size as u64,
            checksum: codec::read_u32(&optional_header, OPTIONAL_OFFSET_CHECKSUM),
            checksum_offset: optional_header_offset + OPTIONAL_OFFSET_CHECKSUM as u64,
            certificate_table_offset: optional_header_offset + certificate_table as u64,
            signature_offset: codec::read_u32(&optional_header, certificate_table),
            signature_size: codec::read_u32(
                &optional_header,
                certificate_table + size_of::<u32>(),
            ),
        })
    }
}

fn locate_burn_section<R: Read + Seek>(
    reader: &mut R,
    nt: &NtHeader,
) -> Result<SectionLocation, BundleError> {
    reader.seek(SeekFrom::Start(nt.section_table_offset))?;
    let mut entry = [0; SECTION_HEADER_SIZE];
    for _ in 0..nt.section_count {
        read_header(reader, &mut entry)?;
        if codec::read_u64(&entry, 0) != WIXBURN_SECTION_NAME {
            continue;
        }
        let size = codec::read_u32(&entry, SECTION_OFFSET_RAW_DATA_SIZE);
        if (size as usize) < BURN_SECTION_MIN_SIZE {
            return Err(BundleError::BurnSectionTooSmall);
        }
        let offset = u64::from(codec::read_u32(&entry, SECTION_OFFSET_RAW_DATA_OFFSET));
        return Ok(SectionLocation { offset, size });
    }
    Err(BundleError::MissingBurnSection)
}

/// A header that ends before its fixed size means the file is not a viable
/// executable, so truncation maps to [`BundleError::InvalidStub`] rather than
/// an I/O error.
fn read_header<R: Read>(reader: &mut R, buffer: &mut [u8]) -> Result<(), BundleError> {
    reader.read_exact(buffer).map_err(|error| {
        if error.kind() == io::ErrorKind::UnexpectedEof {
            BundleError::InvalidStub
        } else {
            BundleError::Io(error)
        }
    })
}
