use std::process::{Command, Output};

use crate::error::{Error, Result};
use crate::log_sanitize::single_line;

const REDACTED: &str = "<redacted>";

pub(crate) fn run_command_output(cmd: &mut Command) -> Result<Output> {
    run_command_output_redacted(cmd, &[])
}

/// Like [`run_command_output`], but any argument containing one of `secrets`
/// is masked in the debug log.
pub(crate) fn run_command_output_redacted(cmd: &mut Command, secrets: &[&str]) -> Result<Output> {
    tracing::debug!(command = %command_line(cmd, secrets), "spawning");
    cmd.output()
        .map_err(|e| Error::msg(format!("failed to run command {:?}: {e}", cmd.get_program())))
}

/// Runs `cmd` and returns its trimmed stdout, or the failure summary.
pub(crate) fn run_command_stdout(cmd: &mut Command) -> std::result::Result<String, String> {
    let out = run_command_output(cmd).map_err(|e| e.to_string())?;
    if out.status.success() {
        return Ok(String::from_utf8_lossy(&out.stdout).trim().to_string());
    }
    Err(command_summary(&out))
}

pub(crate) fn command_summary(out: &Output) -> String {
    let stderr = single_line(&String::from_utf8_lossy(&out.stderr));
    if !stderr.is_empty() {
        return stderr;
    }
    let stdout = single_line(&String::from_utf8_lossy(&out.stdout));
    if !stdout.is_empty() {
        return stdout;
    }
    format!("status {}", out.status)
}

fn command_line(cmd: &Command, secrets: &[&str]) -> String {
    let mut line = cmd.get_program().to_string_lossy().into_owned();
    for arg in cmd.get_args() {
        let arg = arg.to_string_lossy();
        line.push(' ');
        if secrets.iter().any(|s| !s.is_empty() && arg.contains(s)) {
            line.push_str(REDACTED);
        } else {
            line.push_str(&arg);
        }
    }
    line
}
