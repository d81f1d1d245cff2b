//! Image export and metadata extraction.

use std::path::PathBuf;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::record::well_formed_id;
use crate::staging::{StagingDir, remove_file_if_exists};
use crate::xo::{ControlPlane, record_str, vm_record};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataExport {
    pub sr_id: String,
    pub metadata_path: PathBuf,
}

pub struct Extractor<'a> {
    cp: &'a dyn ControlPlane,
}

impl<'a> Extractor<'a> {
    pub fn new(cp: &'a dyn ControlPlane) -> Self {
        Self { cp }
    }

    /// Exports `vm_id` as a compressed image into the staging directory,
    /// replacing any stale image.
    pub fn export_image(&self, staging: &StagingDir, vm_id: &str) -> Result<PathBuf> {
        let failed = |reason: String| Error::ExportFailed {
            vm_id: vm_id.to_string(),
            reason,
        };
        let image = staging.image_path(vm_id);
        staging.ensure().map_err(|e| failed(e.to_string()))?;
        remove_file_if_exists(&image).map_err(|e| failed(e.to_string()))?;

        tracing::info!(vm_id, path = %image.display(), "exporting image");
        if let Err(e) = self.cp.export_vm(vm_id, &image, true) {
            let _ = remove_file_if_exists(&image);
            return Err(failed(e.to_string()));
        }
        if !image.is_file() {
            return Err(failed(format!(
                "export reported success but {} is missing",
                image.display()
            )));
        }
        Ok(image)
    }

    /// Writes the VM's metadata document and storage repository id into the
    /// staging directory.
    pub fn export_metadata(&self, staging: &StagingDir, vm_id: &str) -> Result<MetadataExport> {
        let metadata_path = staging.metadata_path();
        let sr_path = staging.sr_id_path();
        let discard = || {
            let _ = remove_file_if_exists(&metadata_path);
            let _ = remove_file_if_exists(&sr_path);
        };
        let failed = |reason: String| Error::MetadataExportFailed {
            vm_id: vm_id.to_string(),
            reason,
        };

        discard();
        let record = vm_record(self.cp, vm_id).map_err(|e| failed(e.to_string()))?;
        let body = serde_json::to_string_pretty(&record).map_err(|e| failed(e.to_string()))?;
        if let Err(e) = staging.write_artifact(&metadata_path, &body) {
            discard();
            return Err(failed(e.to_string()));
        }

        let candidates = match self.storage_repositories(&record) {
            Ok(c) => c,
            Err(e) => {
                discard();
                return Err(failed(e.to_string()));
            }
        };
        let Some(sr_id) = pick_storage_repository(&candidates) else {
            discard();
            return Err(Error::StorageLocationUnresolved {
                vm_id: vm_id.to_string(),
            });
        };
        let distinct: Vec<&str> = candidates
            .iter()
            .filter_map(|c| well_formed_id(c))
            .filter(|c| *c != sr_id)
            .collect();
        if !distinct.is_empty() {
            tracing::warn!(vm_id, sr_id, others = ?distinct, "disks span several storage repositories; keeping the first");
        }

        if let Err(e) = staging.write_artifact(&sr_path, &format!("{sr_id}\n")) {
            discard();
            return Err(failed(e.to_string()));
        }
        tracing::info!(vm_id, sr_id, "metadata exported");
        Ok(MetadataExport {
            sr_id: sr_id.to_string(),
            metadata_path,
        })
    }

    /// Walks VM -> VBD -> VDI -> SR and returns every repository reference
    /// found, in attachment order.
    fn storage_repositories(&self, vm: &Value) -> Result<Vec<String>> {
        let vbds: Vec<&str> = vm
            .get("$VBDs")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut out = Vec::new();
        for vbd in vbds {
            for vbd_rec in self.cp.list_objects(&[("type", "VBD"), ("id", vbd)])? {
                let Some(vdi) = record_str(&vbd_rec, "VDI") else {
                    continue;
                };
                for vdi_rec in self.cp.list_objects(&[("type", "VDI"), ("id", vdi)])? {
                    if let Some(sr) = record_str(&vdi_rec, "$SR") {
                        out.push(sr.to_string());
                    }
                }
            }
        }
        Ok(out)
    }
}

/// First well-formed id wins; the rest are ignored.
pub fn pick_storage_repository(candidates: &[String]) -> Option<&str> {
    candidates.iter().find_map(|c| well_formed_id(c))
}
