use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};

use anstream::stdout;
use camino::Utf8PathBuf;
use clap::Parser;
use color_eyre::Result;
use color_eyre::eyre::bail;

use crate::bundle::{BundleReader, BundleWriter};
use crate::commands::utils::{is_valid_file, scratch_directory};
use crate::file_system;

/// Copies a bundle's engine image out so an external signer can sign it
#[derive(Parser)]
pub struct Detach {
    #[arg(value_parser = is_valid_file, value_hint = clap::ValueHint::FilePath)]
    bundle: Utf8PathBuf,

    /// File the unsigned engine image is written to
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    engine: Utf8PathBuf,

    /// Directory the engine image is staged in before the final move
    #[arg(long, value_hint = clap::ValueHint::DirPath)]
    intermediate: Option<Utf8PathBuf>,
}

impl Detach {
    pub fn run(self) -> Result<()> {
        let mut reader = BundleReader::open(&self.bundle)?;
        let engine_size = match reader.bundle() {
            Ok(bundle) => bundle.engine_size,
            Err(error) => bail!("{}: {error}", self.bundle),
        };

        let (scratch, _scratch_guard) = scratch_directory(self.intermediate)?;
        fs::create_dir_all(&scratch)?;
        let staged = scratch.join("bundle_engine_unsigned.exe");
        reader.stream().seek(SeekFrom::Start(0))?;
        let copied = {
            let mut engine_file = File::create(&staged)?;
            io::copy(&mut reader.stream().take(engine_size), &mut engine_file)?
        };
        if copied < engine_size {
            bail!("{} ends after {copied} of {engine_size} engine bytes", self.bundle);
        }

        {
            let mut writer = BundleWriter::open(&staged)?;
            if !writer.reset_for_signing()? {
                bail!("Engine image detached from {} is not itself a valid stub", self.bundle);
            }
        }

        if let Some(parent) = self.engine.parent() {
            fs::create_dir_all(parent)?;
        }
        file_system::move_file(&staged, &self.engine)?;

        let mut lock = stdout().lock();
        writeln!(lock, "Detached {engine_size} byte engine to {}", self.engine)?;
        Ok(())
    }
}
