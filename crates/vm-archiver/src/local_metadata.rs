//! Checks that a staging directory holds a complete, importable archive.

use std::fs::{self, File};

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::record::{ExportRecord, well_formed_id};
use crate::staging::{StagingDir, check_identity};

/// The part of a staged VM record the import needs.
#[derive(Debug, Deserialize)]
struct StagedVm {
    #[serde(default)]
    id: Option<String>,
}

fn invalid(msg: impl Into<String>) -> Error {
    Error::LocalMetadataInvalid(msg.into())
}

/// Reads `SR-ID.txt` and `VM.json`, then confirms `<vm id>.xva` is readable.
/// Nothing is repaired.
pub fn validate_local_metadata(staging: &StagingDir) -> Result<ExportRecord> {
    let sr_path = staging.sr_id_path();
    let raw_sr = fs::read_to_string(&sr_path)
        .map_err(|e| invalid(format!("cannot read {}: {e}", sr_path.display())))?;
    let sr_id = well_formed_id(&raw_sr)
        .ok_or_else(|| invalid(format!("{} holds no storage repository id", sr_path.display())))?;

    let meta_path = staging.metadata_path();
    let raw_meta = fs::read_to_string(&meta_path)
        .map_err(|e| invalid(format!("cannot read {}: {e}", meta_path.display())))?;
    let doc: Value = serde_json::from_str(&raw_meta)
        .map_err(|e| invalid(format!("{} is not JSON: {e}", meta_path.display())))?;
    let vm = match &doc {
        Value::Array(items) if items.len() == 1 => &items[0],
        Value::Object(_) => &doc,
        _ => {
            return Err(invalid(format!(
                "{} does not describe exactly one VM",
                meta_path.display()
            )));
        }
    };
    let vm = StagedVm::deserialize(vm)
        .map_err(|e| invalid(format!("{} is not a VM record: {e}", meta_path.display())))?;
    let vm_id = vm
        .id
        .as_deref()
        .and_then(well_formed_id)
        .ok_or_else(|| invalid(format!("{} has no VM id", meta_path.display())))?;
    let vm_id = check_identity(vm_id).map_err(|e| invalid(e.to_string()))?;

    let image = staging.image_path(vm_id);
    File::open(&image)
        .and_then(|f| f.metadata())
        .map_err(|e| invalid(format!("image {} is not readable: {e}", image.display())))
        .and_then(|m| {
            if m.is_file() {
                Ok(())
            } else {
                Err(invalid(format!("image {} is not a file", image.display())))
            }
        })?;

    ExportRecord::new(image, sr_id).map_err(|e| invalid(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::StagingArea;

    fn staged(sr: &str, meta: &str, image_of: Option<&str>) -> (tempfile::TempDir, StagingDir) {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dir = StagingArea::new(tmp.path())
            .dir_for("foo-bar-01")
            .expect("dir");
        dir.ensure().expect("ensure");
        fs::write(dir.sr_id_path(), sr).expect("sr");
        fs::write(dir.metadata_path(), meta).expect("meta");
        if let Some(id) = image_of {
            fs::write(dir.image_path(id), b"xva").expect("image");
        }
        (tmp, dir)
    }

    #[test]
    fn complete_archive_yields_record() {
        let (_tmp, dir) = staged("sr-9\n", r#"{"id":"vm-7","name_label":"foo"}"#, Some("vm-7"));
        let rec = validate_local_metadata(&dir).expect("valid");
        assert_eq!(rec.sr_id(), "sr-9");
        assert_eq!(rec.image_path(), dir.image_path("vm-7"));
    }

    #[test]
    fn single_element_array_is_accepted() {
        let (_tmp, dir) = staged("sr-9", r#"[{"id":"vm-7"}]"#, Some("vm-7"));
        assert!(validate_local_metadata(&dir).is_ok());
    }

    #[test]
    fn empty_sr_artifact_is_invalid() {
        let (_tmp, dir) = staged("\n", r#"{"id":"vm-7"}"#, Some("vm-7"));
        let err = validate_local_metadata(&dir).unwrap_err();
        assert!(matches!(err, Error::LocalMetadataInvalid(_)), "{err}");
    }

    #[test]
    fn missing_image_is_invalid() {
        let (_tmp, dir) = staged("sr-9", r#"{"id":"vm-7"}"#, None);
        let err = validate_local_metadata(&dir).unwrap_err();
        assert!(matches!(err, Error::LocalMetadataInvalid(_)), "{err}");
        assert!(err.to_string().contains("vm-7.xva"), "{err}");
    }

    #[test]
    fn metadata_without_id_is_invalid() {
        let (_tmp, dir) = staged("sr-9", r#"{"name_label":"foo-bar-01"}"#, Some("vm-7"));
        let err = validate_local_metadata(&dir).unwrap_err();
        assert!(err.to_string().contains("no VM id"), "{err}");
    }

    #[test]
    fn malformed_json_is_invalid() {
        let (_tmp, dir) = staged("sr-9", "{not json", Some("vm-7"));
        let err = validate_local_metadata(&dir).unwrap_err();
        assert!(matches!(err, Error::LocalMetadataInvalid(_)), "{err}");
    }

    #[test]
    fn id_that_escapes_the_directory_is_invalid() {
        let (_tmp, dir) = staged("sr-9", r#"{"id":"../vm-7"}"#, Some("vm-7"));
        let err = validate_local_metadata(&dir).unwrap_err();
        assert!(matches!(err, Error::LocalMetadataInvalid(_)), "{err}");
    }
}
