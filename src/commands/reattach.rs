use std::fs;
use std::io::Write;

use anstream::stdout;
use camino::Utf8PathBuf;
use clap::Parser;
use color_eyre::Result;
use color_eyre::eyre::bail;

use crate::bundle::{BundleReader, BundleWriter};
use crate::commands::utils::{is_valid_file, scratch_directory};
use crate::file_system;

/// Re-attaches a bundle's containers onto a separately signed engine image
#[derive(Parser)]
pub struct Reattach {
    /// The bundle whose containers are re-attached
    #[arg(value_parser = is_valid_file, value_hint = clap::ValueHint::FilePath)]
    bundle: Utf8PathBuf,

    /// The freshly signed engine image
    #[arg(short, long, value_parser = is_valid_file, value_hint = clap::ValueHint::FilePath)]
    engine: Utf8PathBuf,

    /// File the reconstituted bundle is written to
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    output: Utf8PathBuf,

    /// Directory the bundle is staged in before the final move
    #[arg(long, value_hint = clap::ValueHint::DirPath)]
    intermediate: Option<Utf8PathBuf>,
}

impl Reattach {
    pub fn run(self) -> Result<()> {
        let mut reader = BundleReader::open(&self.bundle)?;
        if let Err(error) = reader.bundle() {
            bail!("{}: {error}", self.bundle);
        }

        let (scratch, _scratch_guard) = scratch_directory(self.intermediate)?;
        fs::create_dir_all(&scratch)?;
        let staged = scratch.join("bundle_engine_signed.exe");
        file_system::copy_file(&self.engine, &staged)?;

        let container_count = {
            let mut writer = BundleWriter::open(&staged)?;
            if let Err(error) = writer.bundle() {
                bail!("{}: {error}", self.engine);
            }
            if !writer.reattach_containers(&mut reader)? {
                bail!(
                    "Could not re-attach the containers of {} to {}",
                    self.bundle,
                    self.engine
                );
            }
            writer
                .bundle()
                .map(|bundle| bundle.section.container_count())
                .unwrap_or_default()
        };

        if let Some(parent) = self.output.parent() {
            fs::create_dir_all(parent)?;
        }
        file_system::move_file(&staged, &self.output)?;

        let mut lock = stdout().lock();
        writeln!(lock, "Re-attached {container_count} containers to {}", self.output)?;
        Ok(())
    }
}
