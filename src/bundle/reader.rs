use std::{
    fs::{self, File},
    io::{self, Read, Seek, SeekFrom},
};

use camino::{Utf8Path, Utf8PathBuf};
use quick_xml::de::from_str;
use thiserror::Error;
use tracing::debug;

use super::{
    Bundle, BundleError, cabinet,
    manifest::{BurnManifest, Packaging},
};
use crate::file_system;

/// The Burn manifest is always cabinet entry "0"; it gets this name once
/// extracted.
const MANIFEST_FILE_NAME: &str = "manifest.xml";

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error(transparent)]
    ManifestDeserialization(#[from] quick_xml::DeError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

struct PayloadMove {
    source: Utf8PathBuf,
    destination: Utf8PathBuf,
}

/// Read-only view over a bundle executable.
///
/// Opening validates the file once; a structural failure is remembered for
/// the life of the reader and turns the extraction operations into no-ops
/// that report `false`, while I/O and extraction failures stay hard errors.
pub struct BundleReader {
    file: File,
    bundle: Result<Bundle, BundleError>,
    /// Embedded payloads recorded while reading the manifest; they can only
    /// be moved once the attached containers are on disk.
    attached_payload_moves: Vec<PayloadMove>,
}

impl BundleReader {
    pub fn open(path: impl AsRef<Utf8Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)?;
        let bundle = match Bundle::read(&mut file) {
            Err(BundleError::Io(error)) => return Err(error),
            outcome => outcome,
        };
        if let Err(error) = &bundle {
            debug!("{path}: {error}");
        }
        Ok(Self {
            file,
            bundle,
            attached_payload_moves: Vec::new(),
        })
    }

    pub fn bundle(&self) -> Result<&Bundle, &BundleError> {
        self.bundle.as_ref()
    }

    /// Direct access to the underlying file, for callers that copy raw byte
    /// ranges out of the bundle.
    pub fn stream(&mut self) -> &mut File {
        &mut self.file
    }

    /// Extracts the UX container into `output_directory` and reads the
    /// manifest it carries. UX payloads are moved to their declared paths
    /// right away; embedded chained payloads are only recorded here, to be
    /// relocated by [`Self::extract_attached_containers`].
    ///
    /// Returns `Ok(false)` without touching the filesystem when the bundle
    /// is invalid or carries no containers.
    pub fn extract_ux_container(
        &mut self,
        output_directory: &Utf8Path,
        scratch_directory: &Utf8Path,
    ) -> Result<bool, ExtractError> {
        let (ux_address, ux_size) = match &self.bundle {
            Ok(bundle) if bundle.section.container_count() > 0 => (
                u64::from(bundle.section.stub_size),
                u64::from(bundle.section.ux_container_size()),
            ),
            _ => return Ok(false),
        };

        fs::create_dir_all(output_directory)?;
        fs::create_dir_all(scratch_directory)?;
        let archive = scratch_directory.join("ux.cab");
        debug!("Extracting UX container ({ux_size} bytes at {ux_address})");
        self.copy_range_to(ux_address, ux_size, &archive)?;
        cabinet::extract(&archive, output_directory)?;

        let manifest_path = output_directory.join(MANIFEST_FILE_NAME);
        file_system::move_file(&output_directory.join("0"), &manifest_path)?;
        let manifest = fs::read_to_string(&manifest_path)?;
        let manifest = from_str::<BurnManifest>(&manifest)?;

        for payload in &manifest.ux.payloads {
            let destination = output_directory.join(payload.file_path.replace('\\', "/"));
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent)?;
            }
            file_system::move_file(&output_directory.join(payload.source_path), &destination)?;
        }

        self.attached_payload_moves.clear();
        for payload in &manifest.payloads {
            if payload.packaging != Packaging::Embedded {
                continue;
            }
            let Some(container) = payload.container else {
                continue;
            };
            debug!("Recording payload {} for relocation", payload.id);
            self.attached_payload_moves.push(PayloadMove {
                source: Utf8PathBuf::from(payload.source_path),
                destination: Utf8PathBuf::from(container)
                    .join(payload.file_path.replace('\\', "/")),
            });
        }
        Ok(true)
    }

    /// Extracts every chained container into `output_directory`, then
    /// relocates the embedded payloads recorded during UX extraction.
    ///
    /// Returns `Ok(false)` without touching the filesystem when the bundle
    /// is invalid or has no containers beyond the UX.
    pub fn extract_attached_containers(
        &mut self,
        output_directory: &Utf8Path,
        scratch_directory: &Utf8Path,
    ) -> Result<bool, ExtractError> {
        let ranges = match &self.bundle {
            Ok(bundle) if bundle.section.container_count() >= 2 => {
                bundle.attached_container_ranges()
            }
            _ => return Ok(false),
        };

        fs::create_dir_all(output_directory)?;
        fs::create_dir_all(scratch_directory)?;
        for (index, range) in ranges.into_iter().enumerate() {
            // Scratch names carry the slot number; slot 0 is the UX cabinet.
            let archive = scratch_directory.join(format!("a{}.cab", index + 1));
            debug!("Extracting attached container at {range:?}");
            self.copy_range_to(range.start, range.end - range.start, &archive)?;
            cabinet::extract(&archive, output_directory)?;
        }

        for payload_move in &self.attached_payload_moves {
            let destination = output_directory.join(&payload_move.destination);
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent)?;
            }
            file_system::move_file(&output_directory.join(&payload_move.source), &destination)?;
        }
        Ok(true)
    }

    /// Streams exactly `size` bytes starting at `offset` into a new file at
    /// `destination`. Running out of bundle mid-container is an error, not a
    /// short write.
    fn copy_range_to(&mut self, offset: u64, size: u64, destination: &Utf8Path) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut output = File::create(destination)?;
        let copied = io::copy(&mut (&mut self.file).take(size), &mut output)?;
        if copied < size {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("container data ends after {copied} of {size} bytes"),
            ));
        }
        Ok(())
    }
}
