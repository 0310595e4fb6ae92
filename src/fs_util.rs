use std::fs;
use std::io;
use std::path::Path;
use std::process::Command;

use flate2::read::MultiGzDecoder;

use crate::error::GaldynError;
use crate::transport::find_in_path;

/// Reads the whole gzip stream so a truncated archive is caught before
/// anything is unpacked.
pub fn validate_gzip(archive: &Path) -> Result<(), GaldynError> {
    let file = fs::File::open(archive).map_err(|err| {
        GaldynError::Filesystem(format!("open archive {}: {err}", archive.display()))
    })?;
    let mut decoder = MultiGzDecoder::new(file);
    io::copy(&mut decoder, &mut io::sink()).map_err(|err| GaldynError::Extraction {
        path: archive.display().to_string(),
        message: err.to_string(),
    })?;
    Ok(())
}

/// Unpacks a `.tar.gz` into `target_dir` with the system `tar`.
pub fn extract_tarball(archive: &Path, target_dir: &Path) -> Result<(), GaldynError> {
    let tar = find_in_path("tar").ok_or_else(|| GaldynError::MissingTool("tar".to_string()))?;
    fs::create_dir_all(target_dir).map_err(|err| GaldynError::Filesystem(err.to_string()))?;

    let output = Command::new(&tar)
        .arg("xzf")
        .arg(archive)
        .arg("-C")
        .arg(target_dir)
        .output()
        .map_err(|err| GaldynError::MissingTool(format!("{}: {err}", tar.display())))?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    Err(GaldynError::Extraction {
        path: archive.display().to_string(),
        message: if stderr.is_empty() {
            format!("tar exited with {}", output.status)
        } else {
            stderr
        },
    })
}
