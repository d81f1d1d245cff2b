use std::fmt;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::staging::check_identity;
use crate::xo::{ControlPlane, record_str};

/// What the operator pointed the command at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    ById(String),
    ByName(String),
    ByArchiveName(String),
    BySrAndFile { sr_id: String, xva_path: PathBuf },
}

impl Selector {
    /// Picks the active selector from the raw options.
    ///
    /// Precedence: VM id, VM name, archive name, storage repository + file.
    pub fn from_options(
        vm_id: Option<String>,
        vm_name: Option<String>,
        archived_vm_name: Option<String>,
        sr_id: Option<String>,
        xva_file: Option<PathBuf>,
    ) -> Result<Option<Self>> {
        let nonblank = |v: Option<String>| {
            v.map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        let vm_id = nonblank(vm_id);
        let vm_name = nonblank(vm_name);
        let archived = nonblank(archived_vm_name);
        let sr_id = nonblank(sr_id);

        let sr_and_file = match (sr_id, xva_file) {
            (Some(sr_id), Some(xva_path)) => Some(Self::BySrAndFile { sr_id, xva_path }),
            (None, None) => None,
            _ => {
                return Err(Error::usage(
                    "--sr-id and --xva-file must be given together",
                ));
            }
        };

        let candidates = [
            vm_id.map(Self::ById),
            vm_name.map(Self::ByName),
            archived.map(Self::ByArchiveName),
            sr_and_file,
        ];
        let mut given = candidates.into_iter().flatten();
        let chosen = given.next();
        for ignored in given {
            if let Some(active) = &chosen {
                tracing::warn!(%active, %ignored, "several selectors given; ignoring the lower-precedence one");
            }
        }
        Ok(chosen)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ById(id) => write!(f, "--vm-id {id}"),
            Self::ByName(name) => write!(f, "--vm-name {name}"),
            Self::ByArchiveName(name) => write!(f, "--archived-vm-name {name}"),
            Self::BySrAndFile { sr_id, xva_path } => {
                write!(f, "--sr-id {sr_id} --xva-file {}", xva_path.display())
            }
        }
    }
}

/// The canonical identity a command works on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Vm { id: String },
    Archive { name: String },
    Xva { sr_id: String, path: PathBuf },
}

impl Target {
    /// Key of the staging directory, when the target has one.
    pub fn staging_identity(&self) -> Option<&str> {
        match self {
            Self::Vm { id } => Some(id.as_str()),
            Self::Archive { name } => Some(name.as_str()),
            Self::Xva { .. } => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vm { id } => write!(f, "vm {id}"),
            Self::Archive { name } => write!(f, "archive {name}"),
            Self::Xva { sr_id, path } => write!(f, "xva {} -> sr {sr_id}", path.display()),
        }
    }
}

/// Resolves a selector. Only `ByName` reaches the control plane, and only to
/// read.
pub fn resolve(cp: &dyn ControlPlane, selector: &Selector) -> Result<Target> {
    match selector {
        Selector::ById(id) => Ok(Target::Vm {
            id: check_identity(id)?.to_string(),
        }),
        Selector::ByName(name) => {
            let hits = cp
                .list_objects(&[("type", "VM"), ("name_label", name)])
                .map_err(|e| Error::Selector(format!("lookup of VM '{name}' failed: {e}")))?;
            let ids: Vec<&str> = hits.iter().filter_map(|r| record_str(r, "id")).collect();
            match (hits.len(), ids.as_slice()) {
                (1, [id]) => Ok(Target::Vm {
                    id: check_identity(id)?.to_string(),
                }),
                (0, _) => Err(Error::Selector(format!("no VM named '{name}'"))),
                (1, _) => Err(Error::Selector(format!("VM named '{name}' has no id"))),
                (n, _) => Err(Error::Selector(format!(
                    "{n} VMs are named '{name}'; select by --vm-id instead"
                ))),
            }
        }
        Selector::ByArchiveName(name) => Ok(Target::Archive {
            name: check_identity(name)?.to_string(),
        }),
        Selector::BySrAndFile { sr_id, xva_path } => Ok(Target::Xva {
            sr_id: sr_id.clone(),
            path: xva_path.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(
        id: Option<&str>,
        name: Option<&str>,
        archived: Option<&str>,
        sr: Option<&str>,
        file: Option<&str>,
    ) -> Result<Option<Selector>> {
        Selector::from_options(
            id.map(Into::into),
            name.map(Into::into),
            archived.map(Into::into),
            sr.map(Into::into),
            file.map(PathBuf::from),
        )
    }

    #[test]
    fn id_wins_over_name() {
        let sel = opts(Some("abc"), Some("web"), None, None, None).unwrap();
        assert_eq!(sel, Some(Selector::ById("abc".into())));
    }

    #[test]
    fn blank_values_are_ignored() {
        let sel = opts(Some("  "), Some("web"), None, None, None).unwrap();
        assert_eq!(sel, Some(Selector::ByName("web".into())));
        assert_eq!(opts(None, None, None, None, None).unwrap(), None);
    }

    #[test]
    fn sr_and_file_travel_together() {
        let err = opts(None, None, None, Some("sr-1"), None).unwrap_err();
        assert!(matches!(err, Error::Usage(_)), "{err}");
        let sel = opts(None, None, None, Some("sr-1"), Some("/a.xva")).unwrap();
        assert_eq!(
            sel,
            Some(Selector::BySrAndFile {
                sr_id: "sr-1".into(),
                xva_path: PathBuf::from("/a.xva"),
            })
        );
    }
}
