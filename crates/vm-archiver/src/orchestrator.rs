//! Composes resolution, export, transfer and restore into the supported
//! operations. Each operation is a fixed list of steps run in order; the
//! first failing step ends the command and later steps never run.

use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

use crate::error::{Error, Result};
use crate::export::Extractor;
use crate::local_metadata::validate_local_metadata;
use crate::record::ExportRecord;
use crate::restore::RestoreValidator;
use crate::s3::ObjectStore;
use crate::selector::{Selector, Target, resolve};
use crate::session::Session;
use crate::staging::{StagingArea, StagingDir, check_identity};
use crate::transfer::TransferEngine;
use crate::xo::{ControlPlane, vm_display_name};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Export,
    Push,
    Pull,
    Delete,
    Archive,
    Import,
    TemporarilyRestoresXva,
    Restore,
    GetMetadataFromLocalFiles,
    Clean,
}

impl Operation {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Export => "export",
            Self::Push => "push",
            Self::Pull => "pull",
            Self::Delete => "delete",
            Self::Archive => "archive",
            Self::Import => "import",
            Self::TemporarilyRestoresXva => "temporarily-restores-xva",
            Self::Restore => "restore",
            Self::GetMetadataFromLocalFiles => "get-metadata-from-local-files",
            Self::Clean => "clean",
        }
    }

    const fn expects(self) -> &'static str {
        match self {
            Self::Export | Self::Delete | Self::Archive => "--vm-id or --vm-name",
            Self::Import => "--vm-id, --vm-name, --archived-vm-name or --sr-id with --xva-file",
            Self::TemporarilyRestoresXva => "--sr-id with --xva-file",
            Self::Push
            | Self::Pull
            | Self::Restore
            | Self::GetMetadataFromLocalFiles
            | Self::Clean => "--vm-id, --vm-name or --archived-vm-name",
        }
    }

    /// The step sequence for this operation, or a usage error when the
    /// target kind does not fit it.
    pub fn plan(self, target: &Target) -> Result<Vec<Step>> {
        let local = matches!(target, Target::Vm { .. } | Target::Archive { .. });
        let vm = matches!(target, Target::Vm { .. });
        let xva = matches!(target, Target::Xva { .. });

        let steps = match self {
            Self::Export if vm => vec![Step::ExportImage, Step::ExportMetadata],
            Self::Push if local => vec![Step::Push],
            Self::Pull if local => vec![Step::Pull, Step::ValidateLocalMetadata],
            Self::Delete if vm => vec![Step::DeleteVm],
            Self::Archive if vm => vec![
                Step::ExportImage,
                Step::ExportMetadata,
                Step::ProveRestore,
                Step::Push,
                Step::DeleteVm,
            ],
            Self::Import if xva => vec![Step::Import],
            Self::Import if local => vec![Step::ValidateLocalMetadata, Step::Import],
            Self::TemporarilyRestoresXva if xva => vec![Step::ProveRestore],
            Self::Restore if local => vec![
                Step::Pull,
                Step::ValidateLocalMetadata,
                Step::Import,
                Step::Clean,
            ],
            Self::GetMetadataFromLocalFiles if local => vec![Step::ValidateLocalMetadata],
            Self::Clean if local => vec![Step::Clean],
            _ => {
                return Err(Error::usage(format!(
                    "{} cannot run against {target}; it takes {}",
                    self.name(),
                    self.expects()
                )));
            }
        };
        Ok(steps)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    ExportImage,
    ExportMetadata,
    ProveRestore,
    Push,
    Pull,
    ValidateLocalMetadata,
    Import,
    DeleteVm,
    Clean,
}

impl Step {
    pub const fn name(self) -> &'static str {
        match self {
            Self::ExportImage => "export-image",
            Self::ExportMetadata => "export-metadata",
            Self::ProveRestore => "prove-restore",
            Self::Push => "push",
            Self::Pull => "pull",
            Self::ValidateLocalMetadata => "validate-local-metadata",
            Self::Import => "import",
            Self::DeleteVm => "delete-vm",
            Self::Clean => "clean",
        }
    }

    fn uses_control_plane(self, target: &Target) -> bool {
        match self {
            Self::ExportImage
            | Self::ExportMetadata
            | Self::ProveRestore
            | Self::Import
            | Self::DeleteVm => true,
            // the remote key of a live VM is its current display name
            Self::Push | Self::Pull => matches!(target, Target::Vm { .. }),
            Self::ValidateLocalMetadata | Self::Clean => false,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a finished command produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub operation: Operation,
    pub target: Target,
    pub steps: Vec<Step>,
    pub record: Option<ExportRecord>,
    pub imported_vm: Option<String>,
}

/// Values handed from one step to the next.
#[derive(Debug, Default)]
struct Flow {
    image: Option<PathBuf>,
    sr_id: Option<String>,
    record: Option<ExportRecord>,
    imported_vm: Option<String>,
    remote_key: Option<String>,
}

impl Flow {
    fn record(&self, step: Step) -> Result<ExportRecord> {
        if let Some(r) = &self.record {
            return Ok(r.clone());
        }
        match (&self.image, &self.sr_id) {
            (Some(image), Some(sr_id)) => ExportRecord::new(image.clone(), sr_id),
            _ => Err(Error::msg(format!(
                "{step} needs an exported image and storage repository id, but none were produced"
            ))),
        }
    }
}

pub struct Orchestrator<'a> {
    cp: &'a dyn ControlPlane,
    store: &'a dyn ObjectStore,
    staging: StagingArea,
    session: Session,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        cp: &'a dyn ControlPlane,
        store: &'a dyn ObjectStore,
        staging: StagingArea,
        session: Session,
    ) -> Self {
        Self {
            cp,
            store,
            staging,
            session,
        }
    }

    pub fn resolve(&self, op: Operation, selector: Option<&Selector>) -> Result<Target> {
        let selector = selector.ok_or_else(|| {
            Error::usage(format!("{} needs {}", op.name(), op.expects()))
        })?;
        if matches!(selector, Selector::ByName(_)) {
            self.session.ensure(self.cp)?;
        }
        let target = resolve(self.cp, selector)?;
        tracing::debug!(%selector, %target, "selector resolved");
        Ok(target)
    }

    /// Resolves the selector and returns the plan without side effects. A
    /// name lookup needs a live session; none is registered here.
    pub fn preview(
        &self,
        op: Operation,
        selector: Option<&Selector>,
    ) -> Result<(Target, Vec<Step>)> {
        let selector = selector.ok_or_else(|| {
            Error::usage(format!("{} needs {}", op.name(), op.expects()))
        })?;
        if matches!(selector, Selector::ByName(_)) && !self.cp.is_connected() {
            return Err(Error::Session(
                "no active control-plane session to resolve --vm-name; dry run does not register"
                    .into(),
            ));
        }
        let target = resolve(self.cp, selector)?;
        let steps = op.plan(&target)?;
        Ok((target, steps))
    }

    pub fn run(&self, op: Operation, selector: Option<&Selector>) -> Result<Report> {
        let target = self.resolve(op, selector)?;
        self.execute(op, target)
    }

    pub fn execute(&self, op: Operation, target: Target) -> Result<Report> {
        let steps = op.plan(&target)?;
        let mut flow = Flow::default();

        if let Target::Xva { sr_id, path } = &target {
            if !path.is_file() {
                return Err(Error::usage(format!(
                    "--xva-file {} does not exist",
                    path.display()
                )));
            }
            let record = ExportRecord::new(path.clone(), sr_id)
                .map_err(|e| Error::usage(format!("invalid --sr-id/--xva-file: {e}")))?;
            flow.record = Some(record);
        }

        if steps.iter().any(|s| s.uses_control_plane(&target)) {
            self.session.ensure(self.cp)?;
        }
        if steps.iter().any(|s| matches!(s, Step::Push | Step::Pull)) {
            flow.remote_key = Some(self.remote_key(&target)?);
        }

        tracing::info!(operation = op.name(), %target, steps = steps.len(), "starting");
        let started = Instant::now();
        for step in &steps {
            let t0 = Instant::now();
            tracing::info!("RUN: {step}");
            match self.run_step(*step, &target, &mut flow) {
                Ok(()) => {
                    tracing::info!("DONE: {step} ({}ms)", t0.elapsed().as_millis());
                }
                Err(e) => {
                    tracing::error!("FAIL: {step} ({}ms) {e}", t0.elapsed().as_millis());
                    return Err(e);
                }
            }
        }
        tracing::info!(
            operation = op.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "finished"
        );

        Ok(Report {
            operation: op,
            target,
            steps,
            record: flow.record,
            imported_vm: flow.imported_vm,
        })
    }

    fn run_step(&self, step: Step, target: &Target, flow: &mut Flow) -> Result<()> {
        if step.uses_control_plane(target) {
            self.session.ensure(self.cp)?;
        }

        match step {
            Step::ExportImage => {
                let vm_id = vm_id_of(target)?;
                let image = Extractor::new(self.cp).export_image(&self.dir(target)?, vm_id)?;
                flow.image = Some(image);
            }
            Step::ExportMetadata => {
                let vm_id = vm_id_of(target)?;
                let meta = Extractor::new(self.cp).export_metadata(&self.dir(target)?, vm_id)?;
                flow.sr_id = Some(meta.sr_id);
            }
            Step::ProveRestore => {
                let record = flow.record(step)?;
                RestoreValidator::new(self.cp).validate(&record)?;
                flow.record = Some(record);
            }
            Step::Push => {
                let key = self.key_for(target, flow)?;
                TransferEngine::new(self.store).push(&key, &self.dir(target)?)?;
            }
            Step::Pull => {
                let key = self.key_for(target, flow)?;
                TransferEngine::new(self.store).pull(&key, &self.dir(target)?)?;
            }
            Step::ValidateLocalMetadata => {
                flow.record = Some(validate_local_metadata(&self.dir(target)?)?);
            }
            Step::Import => {
                let record = flow.record(step)?;
                let vm_id = self
                    .cp
                    .import_vm(record.sr_id(), record.image_path())
                    .map_err(|e| Error::ImportFailed(e.to_string()))?;
                tracing::info!(vm_id = %vm_id, sr_id = record.sr_id(), "imported");
                flow.imported_vm = Some(vm_id);
            }
            Step::DeleteVm => {
                let vm_id = vm_id_of(target)?;
                self.cp
                    .delete_vm(vm_id, true)
                    .map_err(|e| Error::DeleteFailed {
                        vm_id: vm_id.to_string(),
                        reason: e.to_string(),
                    })?;
                tracing::info!(vm_id, "deleted VM and its disks");
            }
            Step::Clean => self.dir(target)?.clean()?,
        }
        Ok(())
    }

    fn dir(&self, target: &Target) -> Result<StagingDir> {
        let identity = target
            .staging_identity()
            .ok_or_else(|| Error::msg(format!("{target} has no staging directory")))?;
        self.staging.dir_for(identity)
    }

    fn key_for(&self, target: &Target, flow: &Flow) -> Result<String> {
        match &flow.remote_key {
            Some(key) => Ok(key.clone()),
            None => self.remote_key(target),
        }
    }

    fn remote_key(&self, target: &Target) -> Result<String> {
        match target {
            Target::Vm { id } => {
                let name = vm_display_name(self.cp, id)
                    .map_err(|e| Error::Selector(format!("cannot name VM {id}: {e}")))?;
                Ok(check_identity(&name)?.to_string())
            }
            Target::Archive { name } => Ok(name.clone()),
            Target::Xva { .. } => Err(Error::msg(format!("{target} has no remote key"))),
        }
    }
}

fn vm_id_of(target: &Target) -> Result<&str> {
    match target {
        Target::Vm { id } => Ok(id.as_str()),
        other => Err(Error::msg(format!("{other} is not a VM"))),
    }
}
