use std::{
    fs::{self, File},
    io,
};

use cab::Cabinet;
use camino::Utf8Path;
use tracing::debug;

/// Unpacks every file in the cabinet at `archive` into `output_directory`,
/// treating backslashes in entry names as directory separators.
pub fn extract(archive: &Utf8Path, output_directory: &Utf8Path) -> io::Result<()> {
    let mut cabinet = Cabinet::new(File::open(archive)?)?;
    let names = cabinet
        .folder_entries()
        .flat_map(|folder| folder.file_entries())
        .map(|file| file.name().to_owned())
        .collect::<Vec<_>>();

    for name in names {
        let destination = output_directory.join(name.replace('\\', "/"));
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        debug!("Extracting {name} from {archive}");
        let mut reader = cabinet.read_file(&name)?;
        io::copy(&mut reader, &mut File::create(&destination)?)?;
    }
    Ok(())
}
