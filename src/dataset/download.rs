//! CIFAR-10 download and extraction

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::dataset::cifar::{batches_dir, CifarSplit};
use crate::utils::error::{CifarError, Result};
use crate::utils::format_bytes;

/// Binary distribution of CIFAR-10
pub const CIFAR10_URL: &str = "https://www.cs.toronto.edu/~kriz/cifar-10-binary.tar.gz";

/// Archive file name inside the dataset root
pub const ARCHIVE_NAME: &str = "cifar-10-binary.tar.gz";

/// Whether every batch file of both splits is present under `root`
pub fn is_extracted(root: impl AsRef<Path>) -> bool {
    let dir = batches_dir(root);
    [CifarSplit::Train, CifarSplit::Test]
        .iter()
        .flat_map(|split| split.file_names())
        .all(|name| dir.join(name).exists())
}

/// Download CIFAR-10 into `root` and extract it
///
/// Skips the download when the archive is already present, and the
/// extraction when the batch files are. Returns the batch directory.
pub fn download_cifar10(root: impl AsRef<Path>) -> Result<PathBuf> {
    let root = root.as_ref();
    fs::create_dir_all(root)?;

    if is_extracted(root) {
        info!("CIFAR-10 already present in {:?}", root);
        return Ok(batches_dir(root));
    }

    let archive = root.join(ARCHIVE_NAME);
    if archive.exists() {
        info!("CIFAR-10 archive already exists, skipping download");
    } else {
        info!("Downloading CIFAR-10 dataset from {}", CIFAR10_URL);
        fetch(CIFAR10_URL, &archive)?;
    }

    info!("Extracting {:?}", archive);
    extract_tar_gz(&archive, root)?;

    if !is_extracted(root) {
        return Err(CifarError::Download(format!(
            "archive {:?} did not contain the expected batch files",
            archive
        )));
    }
    Ok(batches_dir(root))
}

/// Stream `url` into `dest` with a progress bar
fn fetch(url: &str, dest: &Path) -> Result<()> {
    let mut response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| CifarError::Download(format!("failed to download {}: {}", url, e)))?;

    let pb = match response.content_length() {
        Some(len) => ProgressBar::new(len),
        None => ProgressBar::new_spinner(),
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .map_err(|e| CifarError::Download(e.to_string()))?
            .progress_chars("#>-"),
    );

    // Renamed into place once the body is complete
    let partial = dest.with_extension("part");
    let mut file = File::create(&partial)?;
    let mut buf = vec![0u8; 64 * 1024];
    let mut written = 0u64;
    loop {
        let n = response
            .read(&mut buf)
            .map_err(|e| CifarError::Download(format!("failed to read response: {}", e)))?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])?;
        pb.inc(n as u64);
        written += n as u64;
    }
    file.flush()?;
    fs::rename(&partial, dest)?;

    pb.finish_with_message("download complete");
    info!("Downloaded {}", format_bytes(written));
    Ok(())
}

/// Extract tar.gz file
pub fn extract_tar_gz(tar_gz_path: &Path, output_dir: &Path) -> Result<()> {
    let tar_gz = File::open(tar_gz_path)?;
    let decompressor = flate2::read::GzDecoder::new(tar_gz);
    let mut archive = tar::Archive::new(decompressor);

    archive
        .unpack(output_dir)
        .map_err(|e| CifarError::Download(format!("failed to extract {:?}: {}", tar_gz_path, e)))
}
