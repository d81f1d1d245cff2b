use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Usage(String),
    #[error("selector error: {0}")]
    Selector(String),
    #[error("session error: {0}")]
    Session(String),
    #[error("export of VM {vm_id} failed: {reason}")]
    ExportFailed { vm_id: String, reason: String },
    #[error("metadata export of VM {vm_id} failed: {reason}")]
    MetadataExportFailed { vm_id: String, reason: String },
    #[error("could not resolve a storage repository for VM {vm_id}")]
    StorageLocationUnresolved { vm_id: String },
    #[error("transfer failed: {0}")]
    TransferFailed(String),
    #[error("nothing to restore for '{identity}'")]
    NothingToRestore { identity: String },
    #[error("import failed: {0}")]
    ImportFailed(String),
    #[error("restore proof left VM {vm_id} behind; delete it manually")]
    OrphanVmLeft { vm_id: String },
    #[error("local metadata invalid: {0}")]
    LocalMetadataInvalid(String),
    #[error("configuration missing: {0}")]
    ConfigurationMissing(String),
    #[error("delete of VM {vm_id} failed: {reason}")]
    DeleteFailed { vm_id: String, reason: String },
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn msg<M: Into<String>>(msg: M) -> Self {
        Self::Other(msg.into())
    }

    pub fn usage<M: Into<String>>(msg: M) -> Self {
        Self::Usage(msg.into())
    }

    /// Process exit status for this failure. `0` is reserved for success.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) => 1,
            Self::Selector(_) => 2,
            Self::Session(_) => 3,
            Self::ExportFailed { .. } => 4,
            Self::MetadataExportFailed { .. } => 5,
            Self::StorageLocationUnresolved { .. } => 6,
            Self::TransferFailed(_) => 7,
            Self::NothingToRestore { .. } => 8,
            Self::ImportFailed(_) => 9,
            Self::OrphanVmLeft { .. } => 10,
            Self::LocalMetadataInvalid(_) => 11,
            Self::ConfigurationMissing(_) => 12,
            Self::DeleteFailed { .. } => 13,
            Self::Other(_) => 14,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::msg(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::msg(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn exit_codes_are_distinct_and_nonzero() {
        let all = [
            Error::usage("u"),
            Error::Selector("s".into()),
            Error::Session("s".into()),
            Error::ExportFailed {
                vm_id: "v".into(),
                reason: "r".into(),
            },
            Error::MetadataExportFailed {
                vm_id: "v".into(),
                reason: "r".into(),
            },
            Error::StorageLocationUnresolved { vm_id: "v".into() },
            Error::TransferFailed("t".into()),
            Error::NothingToRestore {
                identity: "i".into(),
            },
            Error::ImportFailed("i".into()),
            Error::OrphanVmLeft { vm_id: "v".into() },
            Error::LocalMetadataInvalid("l".into()),
            Error::ConfigurationMissing("c".into()),
            Error::DeleteFailed {
                vm_id: "v".into(),
                reason: "r".into(),
            },
            Error::msg("o"),
        ];
        let mut codes: Vec<i32> = all.iter().map(Error::exit_code).collect();
        assert!(codes.iter().all(|c| *c != 0));
        assert_eq!(codes[0], 1);
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }
}
