use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const ENV_XO_HOST: &str = "VM_ARCHIVER_XO_HOST";
pub const ENV_XO_USER: &str = "VM_ARCHIVER_XO_USER";
pub const ENV_XO_PASSWORD: &str = "VM_ARCHIVER_XO_PASSWORD";
pub const ENV_SESSION_TTL: &str = "VM_ARCHIVER_SESSION_TTL";
pub const ENV_LOCAL_ROOT: &str = "VM_ARCHIVER_LOCAL_ROOT";
pub const ENV_S3_BUCKET: &str = "VM_ARCHIVER_S3_BUCKET";
pub const ENV_S3_PREFIX: &str = "VM_ARCHIVER_S3_PREFIX";
pub const ENV_S3_REGION: &str = "VM_ARCHIVER_S3_REGION";
pub const ENV_S3_ENDPOINT_URL: &str = "VM_ARCHIVER_S3_ENDPOINT_URL";
pub const ENV_S3_PROFILE: &str = "VM_ARCHIVER_S3_PROFILE";
pub const ENV_S3_STORAGE_CLASS: &str = "VM_ARCHIVER_S3_STORAGE_CLASS";
pub const ENV_XO_CLI: &str = "VM_ARCHIVER_XO_CLI";
pub const ENV_AWS_CLI: &str = "VM_ARCHIVER_AWS_CLI";

const DEFAULT_SESSION_TTL: &str = "1d";
const DEFAULT_XO_CLI: &str = "xo-cli";
const DEFAULT_AWS_CLI: &str = "aws";

fn default_local_root() -> PathBuf {
    std::env::temp_dir().join("vm-archiver")
}

#[derive(Debug, Clone, Default)]
pub struct S3Settings {
    pub bucket: Option<String>,
    pub prefix: Option<String>,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub profile: Option<String>,
    pub storage_class: Option<String>,
}

impl S3Settings {
    pub fn bucket(&self) -> Result<&str> {
        self.bucket
            .as_deref()
            .ok_or_else(|| Error::ConfigurationMissing(format!("{ENV_S3_BUCKET} is not set")))
    }
}

#[derive(Debug, Clone)]
pub struct XoSettings {
    pub host: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub session_ttl: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub xo: XoSettings,
    pub s3: S3Settings,
    pub local_root: PathBuf,
    pub xo_cli_bin: String,
    pub aws_cli_bin: String,
}

impl Settings {
    /// Reads settings from the process environment after sourcing `env_file`
    /// (or `./.env` when present).
    pub fn load(env_file: Option<&Path>) -> Result<Self> {
        match env_file {
            Some(path) => dotenv::from_path(path).map_err(|e| {
                Error::ConfigurationMissing(format!(
                    "failed to read env file {}: {e}",
                    path.display()
                ))
            })?,
            None => {
                let _ = dotenv::dotenv();
            }
        }
        Ok(Self::from_lookup(|key| std::env::var(key).ok()))
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Self {
            xo: XoSettings {
                host: get(ENV_XO_HOST),
                user: get(ENV_XO_USER),
                password: get(ENV_XO_PASSWORD),
                session_ttl: get(ENV_SESSION_TTL).unwrap_or_else(|| DEFAULT_SESSION_TTL.into()),
            },
            s3: S3Settings {
                bucket: get(ENV_S3_BUCKET),
                prefix: get(ENV_S3_PREFIX).map(|p| p.trim_matches('/').to_string()),
                region: get(ENV_S3_REGION),
                endpoint_url: get(ENV_S3_ENDPOINT_URL),
                profile: get(ENV_S3_PROFILE),
                storage_class: get(ENV_S3_STORAGE_CLASS),
            },
            local_root: get(ENV_LOCAL_ROOT)
                .map(PathBuf::from)
                .unwrap_or_else(default_local_root),
            xo_cli_bin: get(ENV_XO_CLI).unwrap_or_else(|| DEFAULT_XO_CLI.into()),
            aws_cli_bin: get(ENV_AWS_CLI).unwrap_or_else(|| DEFAULT_AWS_CLI.into()),
        }
    }
}
