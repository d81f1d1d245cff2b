//! Moves a staging directory to and from the object store as one unit.

use crate::error::{Error, Result};
use crate::s3::ObjectStore;
use crate::staging::{StagingDir, check_identity};

pub struct TransferEngine<'a> {
    store: &'a dyn ObjectStore,
}

impl<'a> TransferEngine<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self { store }
    }

    /// Uploads the staging directory under `<identity>/` and removes it
    /// locally once the upload succeeded. On failure the local files stay.
    pub fn push(&self, identity: &str, staging: &StagingDir) -> Result<()> {
        let bucket = self.store.bucket()?;
        let identity = check_identity(identity)?;
        if staging.is_empty() {
            return Err(Error::TransferFailed(format!(
                "nothing staged at {}",
                staging.path().display()
            )));
        }

        tracing::info!(bucket, identity, dir = %staging.path().display(), "uploading");
        self.store
            .upload_tree(staging.path(), identity)
            .map_err(|e| Error::TransferFailed(e.to_string()))?;
        staging.clean()
    }

    /// Replaces the staging directory with the contents of `<identity>/`.
    /// An empty result or a failed download leaves no staging directory
    /// behind.
    pub fn pull(&self, identity: &str, staging: &StagingDir) -> Result<()> {
        let bucket = self.store.bucket()?;
        let identity = check_identity(identity)?;
        staging.clean()?;
        staging.ensure()?;

        tracing::info!(bucket, identity, dir = %staging.path().display(), "downloading");
        if let Err(e) = self.store.download_tree(identity, staging.path(), true) {
            staging.clean()?;
            return Err(Error::TransferFailed(e.to_string()));
        }
        if staging.is_empty() {
            staging.clean()?;
            return Err(Error::NothingToRestore {
                identity: identity.to_string(),
            });
        }
        Ok(())
    }
}
