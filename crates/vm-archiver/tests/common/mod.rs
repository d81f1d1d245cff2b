#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde_json::{Value, json};
use walkdir::WalkDir;

use vm_archiver::config::XoSettings;
use vm_archiver::orchestrator::Orchestrator;
use vm_archiver::s3::ObjectStore;
use vm_archiver::session::Session;
use vm_archiver::staging::StagingArea;
use vm_archiver::xo::ControlPlane;
use vm_archiver::{Error, Result};

/// Ordered record of side-effecting calls across both fakes.
pub type Journal = Rc<RefCell<Vec<String>>>;

pub fn journal() -> Journal {
    Rc::new(RefCell::new(Vec::new()))
}

#[derive(Default)]
pub struct FakeControlPlane {
    pub journal: Journal,
    pub records: RefCell<Vec<Value>>,
    pub failing: RefCell<BTreeSet<&'static str>>,
    pub connected: Cell<bool>,
    pub lookups: Cell<usize>,
    imports: Cell<usize>,
}

impl FakeControlPlane {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            connected: Cell::new(true),
            ..Default::default()
        }
    }

    pub fn fail(&self, call: &'static str) {
        self.failing.borrow_mut().insert(call);
    }

    fn fails(&self, call: &str) -> bool {
        self.failing.borrow().contains(call)
    }

    fn log(&self, entry: String) {
        self.journal.borrow_mut().push(entry);
    }

    /// Adds a VM whose disks live on `srs`, one disk per repository.
    pub fn add_vm(&self, id: &str, name: &str, srs: &[&str]) {
        let mut vbds = Vec::new();
        let mut records = self.records.borrow_mut();
        for (i, sr) in srs.iter().enumerate() {
            let vbd = format!("{id}-vbd{i}");
            let vdi = format!("{id}-vdi{i}");
            records.push(json!({"type": "VBD", "id": vbd, "VDI": vdi}));
            records.push(json!({"type": "VDI", "id": vdi, "$SR": sr}));
            vbds.push(vbd);
        }
        // an empty CD drive
        let cd = format!("{id}-cd");
        records.push(json!({"type": "VBD", "id": cd, "VDI": null}));
        vbds.push(cd);
        records.push(json!({
            "type": "VM",
            "id": id,
            "name_label": name,
            "power_state": "Running",
            "$VBDs": vbds,
        }));
    }
}

impl ControlPlane for FakeControlPlane {
    fn register(&self, host: &str, user: &str, _password: Option<&str>, ttl: &str) -> Result<()> {
        self.log(format!("register {host} {user} {ttl}"));
        if self.fails("register") {
            return Err(Error::msg("invalid credentials"));
        }
        self.connected.set(true);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.get()
    }

    fn export_vm(&self, vm_id: &str, dest: &Path, compress: bool) -> Result<()> {
        self.log(format!("export {vm_id}"));
        assert!(compress, "exports are always compressed");
        if self.fails("export") {
            fs::write(dest, b"partial").expect("partial export");
            return Err(Error::msg("connection reset"));
        }
        fs::write(dest, format!("XVA image of {vm_id}")).expect("export write");
        Ok(())
    }

    fn import_vm(&self, sr_id: &str, src: &Path) -> Result<String> {
        self.log(format!("import {sr_id}"));
        if self.fails("import") || !src.is_file() {
            return Err(Error::msg("VDI_IO_ERROR"));
        }
        let n = self.imports.get() + 1;
        self.imports.set(n);
        Ok(format!("imported-{n}"))
    }

    fn delete_vm(&self, vm_id: &str, delete_disks: bool) -> Result<()> {
        self.log(format!("delete {vm_id}"));
        assert!(delete_disks, "disks are always deleted with the VM");
        let key = if vm_id.starts_with("imported-") {
            "delete-proof"
        } else {
            "delete"
        };
        if self.fails(key) {
            return Err(Error::msg("VM_BAD_POWER_STATE"));
        }
        Ok(())
    }

    fn list_objects(&self, filter: &[(&str, &str)]) -> Result<Vec<Value>> {
        self.lookups.set(self.lookups.get() + 1);
        if self.fails("list") {
            return Err(Error::msg("xo-server unreachable"));
        }
        Ok(self
            .records
            .borrow()
            .iter()
            .filter(|r| {
                filter
                    .iter()
                    .all(|(k, v)| r.get(*k).and_then(Value::as_str) == Some(*v))
            })
            .cloned()
            .collect())
    }
}

/// Object store backed by a local directory; one subdirectory per prefix.
pub struct DirStore {
    pub journal: Journal,
    pub root: PathBuf,
    pub bucket: Option<String>,
    pub failing: RefCell<BTreeSet<&'static str>>,
}

impl DirStore {
    pub fn new(journal: &Journal, root: &Path) -> Self {
        Self {
            journal: journal.clone(),
            root: root.to_path_buf(),
            bucket: Some("vm-backups".into()),
            failing: RefCell::new(BTreeSet::new()),
        }
    }

    pub fn fail(&self, call: &'static str) {
        self.failing.borrow_mut().insert(call);
    }

    pub fn prefix_dir(&self, prefix: &str) -> PathBuf {
        self.root.join(prefix)
    }
}

impl ObjectStore for DirStore {
    fn bucket(&self) -> Result<&str> {
        self.bucket
            .as_deref()
            .ok_or_else(|| Error::ConfigurationMissing("bucket".into()))
    }

    fn upload_tree(&self, local_dir: &Path, remote_prefix: &str) -> Result<()> {
        self.journal
            .borrow_mut()
            .push(format!("upload {remote_prefix}"));
        if self.failing.borrow().contains("upload") {
            return Err(Error::msg("SlowDown"));
        }
        copy_tree(local_dir, &self.prefix_dir(remote_prefix));
        Ok(())
    }

    fn download_tree(
        &self,
        remote_prefix: &str,
        local_dir: &Path,
        force_retrieval: bool,
    ) -> Result<()> {
        assert!(force_retrieval, "downloads always force retrieval");
        self.journal
            .borrow_mut()
            .push(format!("download {remote_prefix}"));
        if self.failing.borrow().contains("download") {
            return Err(Error::msg("AccessDenied"));
        }
        let src = self.prefix_dir(remote_prefix);
        if src.is_dir() {
            copy_tree(&src, local_dir);
        }
        Ok(())
    }
}

pub fn copy_tree(src: &Path, dst: &Path) {
    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry.expect("walk");
        let rel = entry.path().strip_prefix(src).expect("rel");
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).expect("mkdir");
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).expect("mkdir parent");
            }
            fs::copy(entry.path(), &target).expect("copy");
        }
    }
}

/// Relative path -> file bytes for every file under `dir`.
pub fn snapshot(dir: &Path) -> BTreeMap<String, Vec<u8>> {
    WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .map(|e| e.expect("walk"))
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e
                .path()
                .strip_prefix(dir)
                .expect("rel")
                .to_string_lossy()
                .to_string();
            (rel, fs::read(e.path()).expect("read"))
        })
        .collect()
}

pub fn session() -> Session {
    Session::new(XoSettings {
        host: Some("https://xo.test".into()),
        user: Some("admin@admin.net".into()),
        password: Some("secret".into()),
        session_ttl: "1h".into(),
    })
}

pub struct Harness {
    pub tmp: tempfile::TempDir,
    pub journal: Journal,
    pub cp: FakeControlPlane,
    pub store: DirStore,
}

impl Harness {
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(tmp.path().join("bucket")).expect("bucket dir");
        let journal = journal();
        let cp = FakeControlPlane::new(&journal);
        let store = DirStore::new(&journal, &tmp.path().join("bucket"));
        Self {
            tmp,
            journal,
            cp,
            store,
        }
    }

    pub fn staging_root(&self) -> PathBuf {
        self.tmp.path().join("staging")
    }

    pub fn orchestrator(&self) -> Orchestrator<'_> {
        Orchestrator::new(
            &self.cp,
            &self.store,
            StagingArea::new(self.staging_root()),
            session(),
        )
    }

    /// Journal entries minus session traffic.
    pub fn calls(&self) -> Vec<String> {
        self.journal
            .borrow()
            .iter()
            .filter(|c| !c.starts_with("register"))
            .cloned()
            .collect()
    }
}
