use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::Result;
use color_eyre::eyre::{bail, eyre};
use tempfile::TempDir;

pub fn is_valid_file(path: &str) -> Result<Utf8PathBuf> {
    let path = Utf8Path::new(path);
    if !path.exists() {
        bail!("{path} does not exist")
    }
    if !path.is_file() {
        bail!("{path} is not a file")
    }
    Ok(path.to_path_buf())
}

/// Resolves the directory intermediate files are staged in: the caller's
/// choice when given, otherwise a temporary directory that is removed when
/// the returned guard drops.
pub fn scratch_directory(
    intermediate: Option<Utf8PathBuf>,
) -> Result<(Utf8PathBuf, Option<TempDir>)> {
    let Some(directory) = intermediate else {
        let scratch = tempfile::tempdir()?;
        let directory = Utf8Path::from_path(scratch.path())
            .ok_or_else(|| eyre!("temporary directory path is not valid UTF-8"))?
            .to_path_buf();
        return Ok((directory, Some(scratch)));
    };
    Ok((directory, None))
}
