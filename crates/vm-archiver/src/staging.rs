//! Local staging directories, one per VM or archive identity.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Error, Result};

pub const SR_ID_FILE: &str = "SR-ID.txt";
pub const METADATA_FILE: &str = "VM.json";
pub const IMAGE_EXTENSION: &str = "xva";

/// Rejects identities that cannot be used verbatim as a single path segment
/// and object-key segment.
pub fn check_identity(identity: &str) -> Result<&str> {
    let trimmed = identity.trim();
    if trimmed.is_empty() {
        return Err(Error::Selector("identity is empty".into()));
    }
    if trimmed == "." || trimmed == ".." {
        return Err(Error::Selector(format!("identity '{trimmed}' is reserved")));
    }
    if trimmed
        .chars()
        .any(|c| c == '/' || c == '\\' || c.is_control())
    {
        return Err(Error::Selector(format!(
            "identity '{trimmed}' contains a path separator or control character"
        )));
    }
    Ok(trimmed)
}

#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir_for(&self, identity: &str) -> Result<StagingDir> {
        let identity = check_identity(identity)?;
        Ok(StagingDir {
            root: self.root.clone(),
            path: self.root.join(identity),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingDir {
    root: PathBuf,
    path: PathBuf,
}

impl StagingDir {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn image_path(&self, vm_id: &str) -> PathBuf {
        self.path.join(format!("{vm_id}.{IMAGE_EXTENSION}"))
    }

    pub fn sr_id_path(&self) -> PathBuf {
        self.path.join(SR_ID_FILE)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.path.join(METADATA_FILE)
    }

    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.path).map_err(|e| {
            Error::msg(format!(
                "failed to create staging dir {}: {e}",
                self.path.display()
            ))
        })
    }

    /// Removes the directory and everything in it. Succeeds when it is
    /// already gone.
    pub fn clean(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let root_can = self
            .root
            .canonicalize()
            .unwrap_or_else(|_| self.root.clone());
        let dir_can = self
            .path
            .canonicalize()
            .unwrap_or_else(|_| self.path.clone());
        if dir_can == root_can || !dir_can.starts_with(&root_can) {
            return Err(Error::msg(format!(
                "refusing to remove '{}' (not inside staging root '{}')",
                dir_can.display(),
                root_can.display()
            )));
        }
        match fs::remove_dir_all(&dir_can) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::msg(format!(
                "failed to remove staging dir {}: {e}",
                dir_can.display()
            ))),
        }
    }

    /// True when the directory is missing or holds no regular files.
    pub fn is_empty(&self) -> bool {
        if !self.path.is_dir() {
            return true;
        }
        !WalkDir::new(&self.path)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .any(|e| e.file_type().is_file())
    }

    pub fn write_artifact(&self, path: &Path, body: &str) -> Result<()> {
        self.ensure()?;
        atomic_write_text(path, body)
    }
}

pub(crate) fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::msg(format!(
            "failed to remove {}: {e}",
            path.display()
        ))),
    }
}

fn atomic_write_text(path: &Path, body: &str) -> Result<()> {
    let file_name = path.file_name().and_then(|s| s.to_str()).ok_or_else(|| {
        Error::msg(format!(
            "invalid file path for atomic write: {}",
            path.display()
        ))
    })?;
    let tmp = path.with_file_name(format!(
        ".{}.tmp.{}.{}",
        file_name,
        std::process::id(),
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));
    fs::write(&tmp, body)
        .map_err(|e| Error::msg(format!("failed to write temp file {}: {e}", tmp.display())))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        Error::msg(format!(
            "failed to rename {} -> {}: {e}",
            tmp.display(),
            path.display()
        ))
    })
}
