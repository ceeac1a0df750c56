//! Builders for synthetic bundle images and cabinets used across the
//! module's tests.

use std::io::{Cursor, Write};

use cab::{CabinetBuilder, CompressionType};

use super::{
    pe::{DOS_MAGIC, PE_SIGNATURE, WIXBURN_SECTION_NAME},
    section::BurnSection,
};

/// Raw data offset of the `.wixburn` section in built images.
pub const SECTION_OFFSET: u64 = 512;
/// Container data in built images begins here.
pub const DEFAULT_STUB_SIZE: u32 = 1024;

const NT_HEADER_OFFSET: usize = 64;
const OPTIONAL_HEADER_SIZE: usize = 224;
const SECTION_TABLE_OFFSET: usize = NT_HEADER_OFFSET + 24 + OPTIONAL_HEADER_SIZE;
const CHECKSUM_OFFSET: usize = NT_HEADER_OFFSET + 24 + 64;
const CERTIFICATE_TABLE_OFFSET: usize = NT_HEADER_OFFSET + 24 + OPTIONAL_HEADER_SIZE - 96;

pub fn base_section() -> BurnSection {
    BurnSection {
        version: 3,
        guid: [
            0x78, 0x56, 0x34, 0x12, 0xBC, 0x9A, 0xF0, 0xDE, 0x01, 0x23, 0x45, 0x67, 0x89, 0xAB,
            0xCD, 0xEF,
        ],
        stub_size: DEFAULT_STUB_SIZE,
        original_checksum: 0,
        original_signature_offset: 0,
        original_signature_size: 0,
        container_format: 1,
        container_sizes: vec![150],
    }
}

/// Produces a minimal PE image with two section table entries, the second
/// being `.wixburn`, and optional container data appended at the stub
/// boundary.
pub struct StubBuilder {
    section: BurnSection,
    raw_size: u32,
    checksum: u32,
    signature: (u32, u32),
    section_name: u64,
    trailing: Vec<u8>,
}

impl StubBuilder {
    pub fn new() -> Self {
        Self {
            section: base_section(),
            raw_size: 512,
            checksum: 0,
            signature: (0, 0),
            section_name: WIXBURN_SECTION_NAME,
            trailing: Vec::new(),
        }
    }

    pub fn section(mut self, section: BurnSection) -> Self {
        self.section = section;
        self
    }

    pub fn raw_size(mut self, raw_size: u32) -> Self {
        self.raw_size = raw_size;
        self
    }

    pub fn checksum(mut self, checksum: u32) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn signature(mut self, offset: u32, size: u32) -> Self {
        self.signature = (offset, size);
        self
    }

    pub fn section_name(mut self, section_name: u64) -> Self {
        self.section_name = section_name;
        self
    }

    pub fn trailing(mut self, trailing: Vec<u8>) -> Self {
        self.trailing = trailing;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let section_end = SECTION_OFFSET as usize + self.raw_size as usize;
        let stub_size = self.section.stub_size as usize;
        let mut image = vec![0; section_end.max(stub_size)];

        image[0..2].copy_from_slice(&DOS_MAGIC.to_le_bytes());
        image[60..64].copy_from_slice(&(NT_HEADER_OFFSET as u32).to_le_bytes());

        image[NT_HEADER_OFFSET..NT_HEADER_OFFSET + 4].copy_from_slice(&PE_SIGNATURE.to_le_bytes());
        image[NT_HEADER_OFFSET + 6..NT_HEADER_OFFSET + 8].copy_from_slice(&2_u16.to_le_bytes());
        image[NT_HEADER_OFFSET + 20..NT_HEADER_OFFSET + 22]
            .copy_from_slice(&(OPTIONAL_HEADER_SIZE as u16).to_le_bytes());

        image[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].copy_from_slice(&self.checksum.to_le_bytes());
        image[CERTIFICATE_TABLE_OFFSET..CERTIFICATE_TABLE_OFFSET + 4]
            .copy_from_slice(&self.signature.0.to_le_bytes());
        image[CERTIFICATE_TABLE_OFFSET + 4..CERTIFICATE_TABLE_OFFSET + 8]
            .copy_from_slice(&self.signature.1.to_le_bytes());

        // Entry 0 is a decoy so the scan has to skip past something.
        image[SECTION_TABLE_OFFSET..SECTION_TABLE_OFFSET + 5].copy_from_slice(b".text");
        let entry = SECTION_TABLE_OFFSET + 40;
        image[entry..entry + 8].copy_from_slice(&self.section_name.to_le_bytes());
        image[entry + 16..entry + 20].copy_from_slice(&self.raw_size.to_le_bytes());
        image[entry + 20..entry + 24].copy_from_slice(&(SECTION_OFFSET as u32).to_le_bytes());

        let payload = self.section.serialize();
        let copied = payload.len().min(self.raw_size as usize);
        let start = SECTION_OFFSET as usize;
        image[start..start + copied].copy_from_slice(&payload[..copied]);

        image.extend_from_slice(&self.trailing);
        image
    }
}

/// Builds a complete bundle image whose container table matches the given
/// container blobs, appended in order at the stub boundary.
pub fn bundle_image(mut section: BurnSection, containers: &[&[u8]]) -> Vec<u8> {
    section.container_sizes = containers
        .iter()
        .map(|container| container.len() as u32)
        .collect();
    StubBuilder::new()
        .section(section)
        .trailing(containers.concat())
        .build()
}

/// Appends a certificate blob to a built image and records it in the
/// optional header, approximating what an Authenticode signer does.
pub fn sign(image: &mut Vec<u8>, blob: &[u8]) {
    let offset = image.len() as u32;
    image[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].copy_from_slice(&0x4321_u32.to_le_bytes());
    image[CERTIFICATE_TABLE_OFFSET..CERTIFICATE_TABLE_OFFSET + 4]
        .copy_from_slice(&offset.to_le_bytes());
    image[CERTIFICATE_TABLE_OFFSET + 4..CERTIFICATE_TABLE_OFFSET + 8]
        .copy_from_slice(&(blob.len() as u32).to_le_bytes());
    image.extend_from_slice(blob);
}

/// Builds an in-memory cabinet holding the given `(name, contents)` entries.
pub fn cabinet(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = CabinetBuilder::new();
    let folder = builder.add_folder(CompressionType::MsZip);
    for (name, _) in files {
        folder.add_file(*name);
    }

    let mut cabinet_writer = builder.build(Cursor::new(Vec::new())).unwrap();
    while let Some(mut file_writer) = cabinet_writer.next_file().unwrap() {
        let contents = files
            .iter()
            .find(|(name, _)| *name == file_writer.file_name())
            .unwrap()
            .1;
        file_writer.write_all(contents).unwrap();
    }
    cabinet_writer.finish().unwrap().into_inner()
}
