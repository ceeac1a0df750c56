use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom},
};

use byteorder::{LittleEndian, WriteBytesExt};
use camino::Utf8Path;
use tracing::debug;

use super::{
    Bundle, BundleError, BundleReader,
    section::{
        OFFSET_CONTAINER_COUNT, OFFSET_CONTAINER_SIZES, OFFSET_ORIGINAL_CHECKSUM,
        OFFSET_ORIGINAL_SIGNATURE_OFFSET, OFFSET_ORIGINAL_SIGNATURE_SIZE,
    },
};

/// Read-write view over a bundle or a detached engine copy.
///
/// Opening validates the file once, caching a structural failure the same
/// way [`BundleReader`] does; the mutating operations then report `false`
/// instead of re-validating.
pub struct BundleWriter {
    file: File,
    bundle: Result<Bundle, BundleError>,
}

impl BundleWriter {
    pub fn open(path: impl AsRef<Utf8Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let mut file = File::options().read(true).write(true).open(path)?;
        let bundle = match Bundle::read(&mut file) {
            Err(BundleError::Io(error)) => return Err(error),
            outcome => outcome,
        };
        if let Err(error) = &bundle {
            debug!("{path}: {error}");
        }
        Ok(Self { file, bundle })
    }

    pub fn bundle(&self) -> Result<&Bundle, &BundleError> {
        self.bundle.as_ref()
    }

    /// Re-attaches the containers of `reader`'s bundle onto this file, a
    /// copy of that bundle's freshly signed engine image.
    ///
    /// The live signature is remembered into the original-signature fields
    /// before the attachment boundary is resolved, which places the copied
    /// containers after the new certificate blob and lets the running engine
    /// find them there later. Returns `Ok(false)` when either file is
    /// invalid, either container table is empty, or the source table does
    /// not fit this file's section.
    pub fn reattach_containers(&mut self, reader: &mut BundleReader) -> io::Result<bool> {
        let Ok(source) = reader.bundle() else {
            return Ok(false);
        };
        let source_engine_size = source.engine_size;
        let container_sizes = source.section.container_sizes.clone();

        let Ok(bundle) = &mut self.bundle else {
            return Ok(false);
        };
        if bundle.section.container_count() == 0 || container_sizes.is_empty() {
            return Ok(false);
        }
        let section = bundle.layout.wixburn_section;
        let capacity = (section.size as usize - OFFSET_CONTAINER_SIZES) / size_of::<u32>();
        if container_sizes.len() > capacity {
            debug!(
                "Container table needs {} slots but the section holds {capacity}",
                container_sizes.len()
            );
            return Ok(false);
        }

        remember_then_reset_signature(&mut self.file, bundle)?;
        let next_address = bundle
            .section
            .engine_size(bundle.layout.signature_offset, bundle.layout.signature_size);
        debug!("Re-attaching containers at {next_address}");

        // The engine image already carries the UX container, so only the
        // chained slots are copied, in order, from the source's boundary.
        reader.stream().seek(SeekFrom::Start(source_engine_size))?;
        self.file.seek(SeekFrom::Start(next_address))?;
        for size in container_sizes.iter().skip(1) {
            let size = u64::from(*size);
            let copied = io::copy(&mut reader.stream().take(size), &mut self.file)?;
            if copied < size {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("container data ends after {copied} of {size} bytes"),
                ));
            }
        }
        let end_of_containers = self.file.stream_position()?;
        self.file.set_len(end_of_containers)?;

        write_field(
            &mut self.file,
            section.offset + OFFSET_CONTAINER_COUNT as u64,
            container_sizes.len() as u32,
        )?;
        for (slot, size) in container_sizes.iter().enumerate() {
            write_field(
                &mut self.file,
                section.offset + (OFFSET_CONTAINER_SIZES + slot * size_of::<u32>()) as u64,
                *size,
            )?;
        }

        bundle.section.container_sizes = container_sizes;
        bundle.engine_size = next_address;
        Ok(true)
    }

    /// Prepares a detached engine copy for signing: the container table is
    /// truncated to the UX slot and the original-signature fields, live
    /// checksum, and certificate table entry are cleared, so the signature
    /// an external signer adds becomes the engine boundary.
    pub fn reset_for_signing(&mut self) -> io::Result<bool> {
        let Ok(bundle) = &mut self.bundle else {
            return Ok(false);
        };
        let section_offset = bundle.layout.wixburn_section.offset;

        bundle.section.original_checksum = 0;
        bundle.section.original_signature_offset = 0;
        bundle.section.original_signature_size = 0;
        bundle.section.container_sizes.truncate(1);
        write_field(
            &mut self.file,
            section_offset + OFFSET_ORIGINAL_CHECKSUM as u64,
            0,
        )?;
        write_field(
            &mut self.file,
            section_offset + OFFSET_ORIGINAL_SIGNATURE_OFFSET as u64,
            0,
        )?;
        write_field(
            &mut self.file,
            section_offset + OFFSET_ORIGINAL_SIGNATURE_SIZE as u64,
            0,
        )?;
        write_field(
            &mut self.file,
            section_offset + OFFSET_CONTAINER_COUNT as u64,
            bundle.section.container_count(),
        )?;

        bundle.layout.checksum = 0;
        bundle.layout.signature_offset = 0;
        bundle.layout.signature_size = 0;
        write_field(&mut self.file, bundle.layout.checksum_offset, 0)?;
        write_field(&mut self.file, bundle.layout.certificate_table_offset, 0)?;
        write_field(
            &mut self.file,
            bundle.layout.certificate_table_offset + size_of::<u32>() as u64,
            0,
        )?;

        bundle.engine_size = bundle.section.engine_size(0, 0);
        debug!("Engine copy normalized for signing, boundary {}", bundle.engine_size);
        Ok(true)
    }
}

fn write_field(file: &mut File, offset: u64, value: u32) -> io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_u32::<LittleEndian>(value)
}

/// Records the live Authenticode state into the original-signature fields,
/// then zeroes the live checksum and certificate table entry.
fn remember_then_reset_signature(file: &mut File, bundle: &mut Bundle) -> io::Result<()> {
    let section_offset = bundle.layout.wixburn_section.offset;
    bundle.section.original_checksum = bundle.layout.checksum;
    bundle.section.original_signature_offset = bundle.layout.signature_offset;
    bundle.section.original_signature_size = bundle.layout.signature_size;
    write_field(
        file,
        section_offset + OFFSET_ORIGINAL_CHECKSUM as u64,
        bundle.section.original_checksum,
    )?;
    write_field(
        file,
        section_offset + OFFSET_ORIGINAL_SIGNATURE_OFFSET as u64,
        bundle.section.original_signature_offset,
    )?;
    write_field(
        file,
        section_offset + OFFSET_ORIGINAL_SIGNATURE_SIZE as u64,
        bundle.section.original_signature_size,
    )?;

    bundle.layout.checksum = 0;
    bundle.layout.signature_offset = 0;
    bundle.layout.signature_size = 0;
    write_field(file, bundle.layout.checksum_offset, 0)?;
    write_field(file, bundle.layout.certificate_table_offset, 0)?;
    write_field(
        file,
        bundle.layout.certificate_table_offset + size_of::<u32>() as u64,
        0,
    )
}

#[cfg(test)]
mod tests {
    use std::fs;

    use camino::{Utf8Path, Utf8PathBuf};
    use tempfile::tempdir;

    use super::BundleWriter;
    use crate::bundle::{BundleReader, testing};

    const UX: [u8; 40] = [0xAA; 40];
    const ATTACHED: [u8; 25] = [0xBB; 25];
    const CERTIFICATE: [u8; 16] = [0xCC; 16];

    struct Scratch {
        _root: tempfile::TempDir,
        source: Utf8PathBuf,
        engine: Utf8PathBuf,
    }

    fn write_files(source: &[u8], engine: &[u8]) -> Scratch {
        let root = tempdir().unwrap();
        let path = Utf8Path::from_path(root.path()).unwrap();
        let source_path = path.join("bundle.exe");
        let engine_path = path.join("engine.exe");
        fs::write(&source_path, source).unwrap();
        fs::write(&engine_path, engine).unwrap();
        Scratch {
            source: source_path,
            engine: engine_path,
            _root: root,
        }
    }

    /// A detached engine copy after signing: UX container in place, a
    /// certificate blob appended, and the certificate table pointing at it.
    fn signed_engine() -> Vec<u8> {
        let mut section = testing::base_section();
        section.container_sizes = vec![UX.len() as u32];
        let mut trailing = UX.to_vec();
        trailing.extend_from_slice(&CERTIFICATE);
        testing::StubBuilder::new()
            .section(section)
            .checksum(0x1234)
            .signature(testing::DEFAULT_STUB_SIZE + UX.len() as u32, CERTIFICATE.len() as u32)
            .trailing(trailing)
            .build()
    }

    #[test]
    fn reattaches_containers_after_the_new_signature() {
        let source = testing::bundle_image(testing::base_section(), &[&UX, &ATTACHED]);
        let scratch = write_files(&source, &signed_engine());
        let mut reader = BundleReader::open(&scratch.source).unwrap();
        let mut writer = BundleWriter::open(&scratch.engine).unwrap();

        assert!(writer.reattach_containers(&mut reader).unwrap());

        let signature_end = u64::from(testing::DEFAULT_STUB_SIZE) + 40 + 16;
        let bytes = fs::read(&scratch.engine).unwrap();
        assert_eq!(bytes.len() as u64, signature_end + 25);
        assert_eq!(&bytes[signature_end as usize..], ATTACHED);
        assert_eq!(
            &bytes[signature_end as usize - CERTIFICATE.len()..signature_end as usize],
            CERTIFICATE
        );

        let reopened = BundleReader::open(&scratch.engine).unwrap();
        let bundle = reopened.bundle().unwrap();
        assert_eq!(bundle.section.container_sizes, vec![40, 25]);
        assert_eq!(bundle.section.original_checksum, 0x1234);
        assert_eq!(bundle.section.original_signature_offset, 1064);
        assert_eq!(bundle.section.original_signature_size, 16);
        assert_eq!(bundle.engine_size, signature_end);
        assert_eq!(bundle.layout.checksum, 0);
        assert_eq!(bundle.layout.signature_offset, 0);
        assert_eq!(bundle.layout.signature_size, 0);
    }

    #[test]
    fn reattach_is_a_no_op_when_the_table_does_not_fit() {
        let source = testing::bundle_image(
            testing::base_section(),
            &[&[0x11; 10], &[0x22; 10], &[0x33; 10]],
        );
        // A 56-byte section has room for two table entries at most.
        let engine = testing::StubBuilder::new().raw_size(56).build();
        let scratch = write_files(&source, &engine);
        let mut reader = BundleReader::open(&scratch.source).unwrap();
        let mut writer = BundleWriter::open(&scratch.engine).unwrap();

        assert!(!writer.reattach_containers(&mut reader).unwrap());
        assert_eq!(fs::read(&scratch.engine).unwrap(), engine);
    }

    #[test]
    fn reattach_is_a_no_op_when_either_side_is_invalid() {
        let valid = testing::bundle_image(testing::base_section(), &[&UX]);
        let scratch = write_files(b"MZ garbage", &valid);
        let mut garbage_reader = BundleReader::open(&scratch.source).unwrap();
        let mut valid_writer = BundleWriter::open(&scratch.engine).unwrap();

        assert!(!valid_writer.reattach_containers(&mut garbage_reader).unwrap());

        let mut valid_reader = BundleReader::open(&scratch.engine).unwrap();
        let mut garbage_writer = BundleWriter::open(&scratch.source).unwrap();

        assert!(!garbage_writer.reattach_containers(&mut valid_reader).unwrap());
    }

    #[test]
    fn reset_for_signing_normalizes_the_engine_copy() {
        let mut section = testing::base_section();
        section.container_sizes = vec![40, 25, 30];
        section.original_checksum = 7;
        section.original_signature_offset = 2000;
        section.original_signature_size = 300;
        let image = testing::StubBuilder::new()
            .section(section)
            .checksum(99)
            .signature(5000, 200)
            .trailing(UX.to_vec())
            .build();
        let scratch = write_files(&image, &image);
        let mut writer = BundleWriter::open(&scratch.engine).unwrap();

        assert!(writer.reset_for_signing().unwrap());

        let reopened = BundleReader::open(&scratch.engine).unwrap();
        let bundle = reopened.bundle().unwrap();
        assert_eq!(bundle.section.container_sizes, vec![40]);
        assert_eq!(bundle.section.original_checksum, 0);
        assert_eq!(bundle.section.original_signature_offset, 0);
        assert_eq!(bundle.section.original_signature_size, 0);
        assert_eq!(bundle.layout.checksum, 0);
        assert_eq!(bundle.layout.signature_offset, 0);
        assert_eq!(bundle.layout.signature_size, 0);
        assert_eq!(bundle.engine_size, u64::from(testing::DEFAULT_STUB_SIZE) + 40);
    }
}
