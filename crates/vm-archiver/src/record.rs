use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Returns the trimmed id when it is non-empty and contains at least one
/// ASCII alphanumeric character.
pub fn well_formed_id(raw: &str) -> Option<&str> {
    let id = raw.trim();
    (!id.is_empty() && id.chars().any(|c| c.is_ascii_alphanumeric())).then_some(id)
}

/// An image on disk paired with the storage repository it must be imported
/// into. Produced by export or by reading staged metadata; consumed by the
/// restore proof and by import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRecord {
    image_path: PathBuf,
    sr_id: String,
}

impl ExportRecord {
    pub fn new(image_path: impl Into<PathBuf>, sr_id: &str) -> Result<Self> {
        let image_path = image_path.into();
        let sr_id = well_formed_id(sr_id)
            .ok_or_else(|| Error::msg(format!("storage repository id '{sr_id}' is not valid")))?;
        if image_path.as_os_str().is_empty() || image_path.file_name().is_none() {
            return Err(Error::msg(format!(
                "image path '{}' is not a file path",
                image_path.display()
            )));
        }
        Ok(Self {
            image_path,
            sr_id: sr_id.to_string(),
        })
    }

    pub fn image_path(&self) -> &Path {
        &self.image_path
    }

    pub fn sr_id(&self) -> &str {
        &self.sr_id
    }
}
