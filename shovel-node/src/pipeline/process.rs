//! Subprocess execution for script and shell tasks

use anyhow::{Context, Result, bail};
use shovel_core::domain::task::ShellKind;
use std::path::Path;
use std::process::Output;
use tokio::process::Command;
use tracing::debug;

/// Runs a script file with `args`, picking the interpreter from its extension
///
/// Returns stdout on a zero exit status.
pub(crate) async fn run_script(path: &Path, args: &[String]) -> Result<String> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    let mut command = match extension.as_deref() {
        Some("py") => {
            let mut c = Command::new("python3");
            c.arg(path);
            c
        }
        Some("sh") => {
            let mut c = Command::new("sh");
            c.arg(path);
            c
        }
        Some("ps1") => {
            let mut c = Command::new("powershell");
            c.args(["-NoProfile", "-File"]).arg(path);
            c
        }
        _ => Command::new(path),
    };
    command.args(args);

    debug!("Executing script: {} {:?}", path.display(), args);

    let output = command
        .output()
        .await
        .with_context(|| format!("failed to start script {}", path.display()))?;
    into_stdout(output)
}

/// Runs `line` through the given shell
pub(crate) async fn run_shell(shell: ShellKind, line: &str) -> Result<String> {
    let mut command = match shell {
        ShellKind::Bash => {
            let mut c = Command::new("bash");
            c.arg("-c");
            c
        }
        ShellKind::Sh => {
            let mut c = Command::new("sh");
            c.arg("-c");
            c
        }
        ShellKind::Powershell => {
            let mut c = Command::new("powershell");
            c.args(["-NoProfile", "-Command"]);
            c
        }
        ShellKind::Cmd => {
            let mut c = Command::new("cmd");
            c.arg("/C");
            c
        }
    };
    command.arg(line);

    debug!("Executing {} command: {}", shell, line);

    let output = command
        .output()
        .await
        .with_context(|| format!("{} is not available on this host", shell))?;
    into_stdout(output)
}

fn into_stdout(output: Output) -> Result<String> {
    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
    match output.status.code() {
        Some(code) => bail!("exit status {}: {}", code, stderr),
        None => bail!("terminated by signal: {}", stderr),
    }
}
