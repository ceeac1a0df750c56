use crate::bundle::BundleReader;
use crate::commands::utils::is_valid_file;
use anstream::stdout;
use camino::Utf8PathBuf;
use clap::Parser;
use color_eyre::Result;
use color_eyre::eyre::bail;
use std::io::Write;
use uuid::Uuid;

/// Shows the Burn metadata recorded in a bundle
#[derive(Parser)]
pub struct Info {
    #[arg(value_parser = is_valid_file, value_hint = clap::ValueHint::FilePath)]
    bundle: Utf8PathBuf,
}

impl Info {
    pub fn run(self) -> Result<()> {
        let reader = BundleReader::open(&self.bundle)?;
        let bundle = match reader.bundle() {
            Ok(bundle) => bundle,
            Err(error) => bail!("{}: {error}", self.bundle),
        };
        let section = &bundle.section;
        let mut lock = stdout().lock();
        writeln!(lock, "Burn section version: {}", section.version)?;
        writeln!(
            lock,
            "Bundle GUID: {}",
            Uuid::from_bytes_le(section.guid).braced()
        )?;
        writeln!(lock, "Stub size: {} bytes", section.stub_size)?;
        writeln!(lock, "Engine size: {} bytes", bundle.engine_size)?;
        writeln!(lock, "Original checksum: {:#010x}", section.original_checksum)?;
        writeln!(
            lock,
            "Original signature: {} bytes at offset {}",
            section.original_signature_size, section.original_signature_offset
        )?;
        writeln!(
            lock,
            "Signature: {} bytes at offset {}",
            bundle.layout.signature_size, bundle.layout.signature_offset
        )?;
        writeln!(lock, "Containers: {}", section.container_count())?;
        for (slot, size) in section.container_sizes.iter().enumerate() {
            let role = if slot == 0 { "UX" } else { "attached" };
            writeln!(lock, "  {slot}: {size} bytes ({role})")?;
        }
        Ok(())
    }
}
