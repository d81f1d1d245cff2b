//! Control-plane collaborator: Xen Orchestra reached through `xo-cli`.

use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, Stdio};

use serde_json::Value;

use crate::error::{Error, Result};
use crate::process::{command_summary, run_command_output_redacted, run_command_stdout};

/// Remote operations the workflow needs from the virtualization control plane.
///
/// Every call blocks until the remote side answers; there is no client-side
/// timeout.
pub trait ControlPlane {
    fn register(&self, host: &str, user: &str, password: Option<&str>, ttl: &str) -> Result<()>;
    fn is_connected(&self) -> bool;
    fn export_vm(&self, vm_id: &str, dest: &Path, compress: bool) -> Result<()>;
    /// Imports an image into `sr_id` and returns the id of the new (halted) VM.
    fn import_vm(&self, sr_id: &str, src: &Path) -> Result<String>;
    fn delete_vm(&self, vm_id: &str, delete_disks: bool) -> Result<()>;
    /// Returns the records matching every `key=value` pair, in server order.
    fn list_objects(&self, filter: &[(&str, &str)]) -> Result<Vec<Value>>;
}

pub fn record_str<'a>(record: &'a Value, key: &str) -> Option<&'a str> {
    record
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Fetches the single VM record with id `vm_id`.
pub fn vm_record(cp: &dyn ControlPlane, vm_id: &str) -> Result<Value> {
    let mut hits = cp.list_objects(&[("type", "VM"), ("id", vm_id)])?;
    match hits.len() {
        1 => Ok(hits.remove(0)),
        0 => Err(Error::msg(format!("no VM with id '{vm_id}'"))),
        n => Err(Error::msg(format!("{n} VMs reported for id '{vm_id}'"))),
    }
}

pub fn vm_display_name(cp: &dyn ControlPlane, vm_id: &str) -> Result<String> {
    let record = vm_record(cp, vm_id)?;
    record_str(&record, "name_label")
        .map(ToOwned::to_owned)
        .ok_or_else(|| Error::msg(format!("VM '{vm_id}' has no name_label")))
}

#[derive(Debug, Clone)]
pub struct XoCli {
    bin: String,
}

impl XoCli {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.bin);
        cmd.stdin(Stdio::null());
        cmd
    }

    fn run(&self, mut cmd: Command) -> Result<String> {
        run_command_stdout(&mut cmd).map_err(Error::msg)
    }
}

fn file_param(path: &Path) -> OsString {
    let mut arg = OsString::from("@=");
    arg.push(path.as_os_str());
    arg
}

/// `vm.import` prints the new id either bare or as a JSON string.
fn parse_imported_id(stdout: &str) -> Option<String> {
    let raw = stdout.lines().rev().map(str::trim).find(|l| !l.is_empty())?;
    let id = serde_json::from_str::<String>(raw).unwrap_or_else(|_| raw.to_string());
    let id = id.trim().to_string();
    (!id.is_empty()).then_some(id)
}

impl ControlPlane for XoCli {
    fn register(&self, host: &str, user: &str, password: Option<&str>, ttl: &str) -> Result<()> {
        let mut cmd = Command::new(&self.bin);
        cmd.arg("--register")
            .arg("--expiresIn")
            .arg(ttl)
            .arg(host)
            .arg(user);
        match password {
            Some(pw) => {
                cmd.arg(pw).stdin(Stdio::null());
                let out = run_command_output_redacted(&mut cmd, &[pw])?;
                if out.status.success() {
                    return Ok(());
                }
                Err(Error::msg(command_summary(&out)))
            }
            None => {
                // xo-cli prompts for the password on the terminal.
                let status = cmd
                    .status()
                    .map_err(|e| Error::msg(format!("failed to run {}: {e}", self.bin)))?;
                if status.success() {
                    Ok(())
                } else {
                    Err(Error::msg(format!("{} --register exited with {status}", self.bin)))
                }
            }
        }
    }

    fn is_connected(&self) -> bool {
        let mut cmd = self.command();
        cmd.arg("--list-commands").stdout(Stdio::null()).stderr(Stdio::null());
        cmd.status().map(|s| s.success()).unwrap_or(false)
    }

    fn export_vm(&self, vm_id: &str, dest: &Path, compress: bool) -> Result<()> {
        let mut cmd = self.command();
        cmd.arg("vm.export")
            .arg(format!("vm={vm_id}"))
            .arg(file_param(dest))
            .arg(format!("compress={compress}"));
        self.run(cmd).map(|_| ())
    }

    fn import_vm(&self, sr_id: &str, src: &Path) -> Result<String> {
        let mut cmd = self.command();
        cmd.arg("vm.import")
            .arg(format!("sr={sr_id}"))
            .arg(file_param(src));
        let stdout = self.run(cmd)?;
        parse_imported_id(&stdout)
            .ok_or_else(|| Error::msg("vm.import succeeded but printed no VM id"))
    }

    fn delete_vm(&self, vm_id: &str, delete_disks: bool) -> Result<()> {
        let mut cmd = self.command();
        cmd.arg("vm.delete")
            .arg(format!("id={vm_id}"))
            .arg(format!("deleteDisks={delete_disks}"));
        self.run(cmd).map(|_| ())
    }

    fn list_objects(&self, filter: &[(&str, &str)]) -> Result<Vec<Value>> {
        let mut cmd = self.command();
        cmd.arg("--list-objects");
        for (k, v) in filter {
            cmd.arg(format!("{k}={v}"));
        }
        let stdout = self.run(cmd)?;
        if stdout.is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str::<Value>(&stdout)? {
            Value::Array(items) => Ok(items),
            other => Err(Error::msg(format!(
                "--list-objects returned {} instead of an array",
                kind_of(&other)
            ))),
        }
    }
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
