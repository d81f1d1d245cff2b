//! Object-store collaborator: an S3 bucket reached through the AWS CLI.

use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::config::S3Settings;
use crate::error::{Error, Result};
use crate::process::run_command_stdout;

pub trait ObjectStore {
    /// The configured bucket, or `ConfigurationMissing`.
    fn bucket(&self) -> Result<&str>;
    /// Copies every file under `local_dir` to `<remote_prefix>/`.
    fn upload_tree(&self, local_dir: &Path, remote_prefix: &str) -> Result<()>;
    /// Copies every object under `<remote_prefix>/` into `local_dir`.
    fn download_tree(&self, remote_prefix: &str, local_dir: &Path, force_retrieval: bool)
    -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct AwsS3Cli {
    bin: String,
    cfg: S3Settings,
}

impl AwsS3Cli {
    pub fn new(bin: impl Into<String>, cfg: S3Settings) -> Self {
        Self {
            bin: bin.into(),
            cfg,
        }
    }

    pub fn url_for(&self, remote_prefix: &str) -> Result<String> {
        let bucket = self.bucket()?;
        let mut key = String::new();
        if let Some(prefix) = self
            .cfg
            .prefix
            .as_deref()
            .map(|p| p.trim_matches('/'))
            .filter(|p| !p.is_empty())
        {
            key.push_str(prefix);
            key.push('/');
        }
        key.push_str(remote_prefix.trim_matches('/'));
        Ok(format!("s3://{bucket}/{key}/"))
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.bin);
        cmd.stdin(Stdio::null());
        for (flag, value) in [
            ("--profile", self.cfg.profile.as_deref()),
            ("--region", self.cfg.region.as_deref()),
            ("--endpoint-url", self.cfg.endpoint_url.as_deref()),
        ] {
            if let Some(v) = value.map(str::trim).filter(|s| !s.is_empty()) {
                cmd.arg(flag).arg(v);
            }
        }
        cmd.arg("s3")
            .arg("cp")
            .arg("--recursive")
            .arg("--only-show-errors");
        cmd
    }
}

fn dir_arg(path: &Path) -> OsString {
    let mut arg = path.as_os_str().to_os_string();
    if !path.as_os_str().to_string_lossy().ends_with('/') {
        arg.push("/");
    }
    arg
}

impl ObjectStore for AwsS3Cli {
    fn bucket(&self) -> Result<&str> {
        self.cfg.bucket()
    }

    fn upload_tree(&self, local_dir: &Path, remote_prefix: &str) -> Result<()> {
        let url = self.url_for(remote_prefix)?;
        let mut cmd = self.command();
        cmd.arg(dir_arg(local_dir)).arg(&url);
        if let Some(class) = self.cfg.storage_class.as_deref() {
            cmd.arg("--storage-class").arg(class);
        }
        run_command_stdout(&mut cmd)
            .map(|_| ())
            .map_err(|e| Error::msg(format!("upload to {url} failed: {e}")))
    }

    fn download_tree(
        &self,
        remote_prefix: &str,
        local_dir: &Path,
        force_retrieval: bool,
    ) -> Result<()> {
        let url = self.url_for(remote_prefix)?;
        let mut cmd = self.command();
        cmd.arg(&url).arg(dir_arg(local_dir));
        if force_retrieval {
            cmd.arg("--force-glacier-transfer");
        }
        run_command_stdout(&mut cmd)
            .map(|_| ())
            .map_err(|e| Error::msg(format!("download from {url} failed: {e}")))
    }
}
