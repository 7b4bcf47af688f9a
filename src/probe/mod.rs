//! All-pairs probing
//!
//! [`build_matrix`] fans one probe per ordered machine pair out to a bounded
//! set of tokio tasks. Each task hands its `(slot, outcome)` back through the
//! `JoinSet`; only the collecting loop owns the cell buffer, so no task ever
//! touches shared matrix state. The matrix is assembled after every task has
//! finished.
//!
//! Failures never abort the build: a failed, timed out or unparsable probe
//! yields an unavailable sample and a [`ProbeDiagnostic`] on the side.

mod ssh;

pub use ssh::SshProber;

use crate::machine::MachineId;
use crate::matrix::ProbeMatrix;
use crate::sample::{LatencySample, ProbeCell};
use regex::Regex;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Why a single probe produced no raw output
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("probe command exited with status {code}: {stderr}")]
    Failed { code: i32, stderr: String },

    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("probe task aborted: {0}")]
    Aborted(String),
}

/// Capability that measures one ordered pair and returns raw `ping` text
pub trait Prober: Send + Sync + 'static {
    fn probe(
        &self,
        source: &MachineId,
        target: &MachineId,
    ) -> impl Future<Output = Result<String, ProbeError>> + Send;
}

/// Whether a machine probes itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfProbePolicy {
    Allow,
    Skip,
}

/// Knobs for one matrix build
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    /// Upper bound for a single probe, spawn to exit
    pub timeout: Duration,
    /// Maximum number of probes in flight
    pub concurrency: usize,
    /// Multiplier from the prober's raw unit to microseconds
    pub micros_factor: f64,
    pub self_probe: SelfProbePolicy,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            concurrency: 8,
            micros_factor: 1000.0,
            self_probe: SelfProbePolicy::Skip,
        }
    }
}

/// Side-channel record of a pair whose probe did not yield a sample
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeDiagnostic {
    pub source: MachineId,
    pub target: MachineId,
    pub message: String,
}

impl fmt::Display for ProbeDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "An error occurred while trying to ping from {} to {} : {}",
            self.source.host, self.target.host, self.message
        )
    }
}

/// Result of a matrix build: the matrix plus everything that went wrong
#[derive(Debug, Clone)]
pub struct ProbeRun {
    pub matrix: ProbeMatrix,
    pub diagnostics: Vec<ProbeDiagnostic>,
}

fn summary_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d+(?:\.\d+)?)/(\d+(?:\.\d+)?)/(\d+(?:\.\d+)?)/(\d+(?:\.\d+)?)")
            .expect("ping summary regex is valid")
    })
}

/// Extract `min/avg/max/mdev` from raw probe text, scaled to microseconds
///
/// Anything without four `/`-separated numbers yields the unavailable sample.
///
/// # Example
/// ```
/// use linkrtt::probe::parse_probe_output;
///
/// let raw = "rtt min/avg/max/mdev = 0.045/0.050/0.058/0.005 ms";
/// let sample = parse_probe_output(raw, 1000.0);
/// assert_eq!(sample.avg.value(), Some(50.0));
/// ```
pub fn parse_probe_output(raw: &str, micros_factor: f64) -> LatencySample {
    let Some(caps) = summary_regex().captures(raw) else {
        return LatencySample::UNAVAILABLE;
    };

    let mut values = [0.0_f64; 4];
    for (slot, value) in values.iter_mut().enumerate() {
        match caps[slot + 1].parse::<f64>() {
            Ok(v) => *value = v * micros_factor,
            Err(_) => return LatencySample::UNAVAILABLE,
        }
    }
    let [min, avg, max, mdev] = values;
    LatencySample::from_micros(min, avg, max, mdev)
}

/// Probe every ordered pair of `machines` and assemble the current matrix
///
/// The returned matrix lists sources and targets in `machines` order.
pub async fn build_matrix<P: Prober>(
    machines: &[MachineId],
    prober: Arc<P>,
    settings: &ProbeSettings,
) -> ProbeRun {
    let n = machines.len();
    let mut cells: Vec<Option<ProbeCell>> = vec![None; n * n];
    let mut failures: Vec<Option<String>> = vec![None; n * n];

    let permits = Arc::new(Semaphore::new(settings.concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for (i, source) in machines.iter().enumerate() {
        for (j, target) in machines.iter().enumerate() {
            let slot = i * n + j;
            if source == target && settings.self_probe == SelfProbePolicy::Skip {
                cells[slot] = Some(ProbeCell::NotProbed);
                continue;
            }

            let prober = Arc::clone(&prober);
            let permits = Arc::clone(&permits);
            let source = source.clone();
            let target = target.clone();
            let timeout = settings.timeout;

            tasks.spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => return (slot, Err(ProbeError::Aborted(e.to_string()))),
                };
                tracing::trace!(%source, %target, "Probing");
                let outcome = match tokio::time::timeout(timeout, prober.probe(&source, &target))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ProbeError::Timeout(timeout)),
                };
                (slot, outcome)
            });
        }
    }

    while let Some(joined) = tasks.join_next().await {
        let (slot, outcome) = match joined {
            Ok(result) => result,
            Err(e) => {
                // The slot is recovered below as a missing cell
                tracing::warn!("Probe task did not complete: {}", e);
                continue;
            }
        };
        let (source, target) = (&machines[slot / n], &machines[slot % n]);

        let sample = match outcome {
            Ok(raw) => {
                let sample = parse_probe_output(&raw, settings.micros_factor);
                if sample.avg.value().is_none() {
                    tracing::warn!(%source, %target, "Unparsable probe output");
                    failures[slot] = Some(format!("unparsable probe output: {:?}", raw.trim()));
                }
                sample
            }
            Err(e) => {
                tracing::warn!(%source, %target, error = %e, "Probe failed");
                failures[slot] = Some(e.to_string());
                LatencySample::UNAVAILABLE
            }
        };
        cells[slot] = Some(ProbeCell::Measured(sample));
    }

    let mut entries = Vec::with_capacity(n * n);
    let mut diagnostics = Vec::new();
    for (slot, cell) in cells.into_iter().enumerate() {
        let (source, target) = (&machines[slot / n], &machines[slot % n]);
        let cell = cell.unwrap_or_else(|| {
            failures[slot] = Some("probe task did not complete".to_string());
            ProbeCell::Measured(LatencySample::UNAVAILABLE)
        });
        if let Some(message) = failures[slot].take() {
            diagnostics.push(ProbeDiagnostic {
                source: source.clone(),
                target: target.clone(),
                message,
            });
        }
        entries.push((source.clone(), target.clone(), cell));
    }

    tracing::info!(
        pairs = entries.len(),
        failed = diagnostics.len(),
        "Probe matrix complete"
    );

    ProbeRun {
        matrix: entries.into_iter().collect(),
        diagnostics,
    }
}
