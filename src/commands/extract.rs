use std::io::Write;

use anstream::stdout;
use camino::Utf8PathBuf;
use clap::Parser;
use color_eyre::Result;
use color_eyre::eyre::bail;

use crate::bundle::BundleReader;
use crate::commands::utils::{is_valid_file, scratch_directory};

/// Extracts a bundle's UX and attached containers into a directory
#[derive(Parser)]
pub struct Extract {
    #[arg(value_parser = is_valid_file, value_hint = clap::ValueHint::FilePath)]
    bundle: Utf8PathBuf,

    /// Directory the container contents are extracted into
    #[arg(short, long, value_hint = clap::ValueHint::DirPath)]
    output: Utf8PathBuf,

    /// Directory intermediate container archives are written to
    #[arg(long, value_hint = clap::ValueHint::DirPath)]
    intermediate: Option<Utf8PathBuf>,
}

impl Extract {
    pub fn run(self) -> Result<()> {
        let mut reader = BundleReader::open(&self.bundle)?;
        if let Err(error) = reader.bundle() {
            bail!("{}: {error}", self.bundle);
        }

        let (scratch, _scratch_guard) = scratch_directory(self.intermediate)?;
        if !reader.extract_ux_container(&self.output, &scratch)? {
            bail!("{} has no containers", self.bundle);
        }
        let attached = reader.extract_attached_containers(&self.output, &scratch)?;

        let mut lock = stdout().lock();
        if attached {
            writeln!(
                lock,
                "Extracted the UX and attached containers to {}",
                self.output
            )?;
        } else {
            writeln!(lock, "Extracted the UX container to {}", self.output)?;
        }
        Ok(())
    }
}
