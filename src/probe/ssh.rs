//! Remote `ping` over SSH
//!
//! Runs `<ssh_cmd> <ssh_options..> <user>@<source> <ping_cmd> -q -c N -w T <target>`
//! directly (no shell) and returns stdout. The child is spawned with
//! `kill_on_drop(true)`, so dropping the probe future on timeout kills it.

use super::{ProbeError, Prober};
use crate::machine::MachineId;
use std::future::Future;
use std::process::Stdio;
use tokio::process::Command;

/// Longest stderr excerpt carried in a [`ProbeError::Failed`]
const MAX_STDERR_CHARS: usize = 512;

/// Prober that logs into the source machine and pings the target
#[derive(Debug, Clone)]
pub struct SshProber {
    pub ssh_cmd: String,
    pub ssh_options: Vec<String>,
    pub ssh_user: String,
    pub ping_cmd: Vec<String>,
    pub ping_count: u32,
    /// Deadline handed to `ping -w`, in seconds
    pub ping_deadline_secs: u64,
}

impl SshProber {
    /// Argument vector passed to `ssh_cmd` for one pair
    pub fn command_args(&self, source: &MachineId, target: &MachineId) -> Vec<String> {
        let mut args = self.ssh_options.clone();
        args.push(format!("{}@{}", self.ssh_user, source.host));
        args.extend(self.ping_cmd.iter().cloned());
        args.extend([
            "-q".to_string(),
            "-c".to_string(),
            self.ping_count.to_string(),
            "-w".to_string(),
            self.ping_deadline_secs.to_string(),
            target.host.clone(),
        ]);
        args
    }
}

impl Prober for SshProber {
    fn probe(
        &self,
        source: &MachineId,
        target: &MachineId,
    ) -> impl Future<Output = Result<String, ProbeError>> + Send {
        let program = self.ssh_cmd.clone();
        let args = self.command_args(source, target);
        async move { run(program, args).await }
    }
}

async fn run(program: String, args: Vec<String>) -> Result<String, ProbeError> {
    tracing::debug!(program = %program, args = ?args, "Spawning probe");

    let output = Command::new(&program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| ProbeError::Spawn {
            program: program.clone(),
            source,
        })?;

    if !output.status.success() {
        let stderr: String = String::from_utf8_lossy(&output.stderr)
            .trim()
            .chars()
            .take(MAX_STDERR_CHARS)
            .collect();
        return Err(ProbeError::Failed {
            code: output.status.code().unwrap_or(-1),
            stderr,
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
