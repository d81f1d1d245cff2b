use crate::error::{Error, Result};
use crate::record::ExportRecord;
use crate::xo::ControlPlane;

/// Proves an image is restorable by importing it and deleting the result.
pub struct RestoreValidator<'a> {
    cp: &'a dyn ControlPlane,
}

impl<'a> RestoreValidator<'a> {
    pub fn new(cp: &'a dyn ControlPlane) -> Self {
        Self { cp }
    }

    /// Returns the id of the throwaway VM. The VM is never started.
    ///
    /// A failed delete after a successful import is reported as
    /// [`Error::OrphanVmLeft`] so the leftover can be removed by hand.
    pub fn validate(&self, record: &ExportRecord) -> Result<String> {
        tracing::info!(
            sr_id = record.sr_id(),
            image = %record.image_path().display(),
            "importing image to prove it restores"
        );
        let vm_id = self
            .cp
            .import_vm(record.sr_id(), record.image_path())
            .map_err(|e| Error::ImportFailed(e.to_string()))?;

        if let Err(e) = self.cp.delete_vm(&vm_id, true) {
            tracing::info!(vm_id = %vm_id, "restore proof succeeded");
            tracing::error!(vm_id = %vm_id, error = %e, "could not delete the proof VM");
            return Err(Error::OrphanVmLeft { vm_id });
        }
        tracing::info!(vm_id = %vm_id, "restore proof succeeded; proof VM deleted");
        Ok(vm_id)
    }
}
