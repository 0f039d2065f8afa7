//! SHA-256 manifest of build outputs.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::Result;

/// File name the manifest is written under.
pub const MANIFEST_FILE: &str = "MANIFEST.sha256";

/// Extensions of files that belong in the manifest.
pub const TRACKED_EXTENSIONS: &[&str] = &["wav", "mp3", "json", "js", "toml"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub hash: String,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// One `hash  filename` line per entry.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{}  {}\n", e.hash, e.filename))
            .collect()
    }

    /// Write the manifest into `dir` and return its path.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(MANIFEST_FILE);
        std::fs::write(&path, self.render())?;
        Ok(path)
    }
}

/// Hash every tracked file directly inside `dir`, sorted by filename.
pub fn generate_manifest(dir: &Path) -> Result<Manifest> {
    let mut files: Vec<(String, PathBuf)> = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_file() || !is_tracked(&path) {
            continue;
        }
        files.push((entry.file_name().to_string_lossy().into_owned(), path));
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));

    let entries = files
        .into_iter()
        .map(|(filename, path)| {
            Ok(ManifestEntry {
                hash: sha256_file(&path)?,
                filename,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    info!(dir = %dir.display(), files = entries.len(), "manifest generated");
    Ok(Manifest { entries })
}

fn is_tracked(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| TRACKED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Hex SHA-256 of a file's contents.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
