//! One complete run: load, probe, then either save a baseline or compare
//!
//! The baseline is loaded before probing so a broken file fails the run
//! before any remote command is issued.

use crate::baseline::{self, BaselineStore};
use crate::config::Config;
use crate::deviation::compare;
use crate::html_output::{render_report, ReportFooter};
use crate::matrix::ProbeMatrix;
use crate::probe::{build_matrix, Prober};
use crate::report::RunReport;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Per-invocation switches, usually from the command line
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Write the probed matrix as the new baseline and stop
    pub gen_reference: bool,
    /// Print every probed pair to stdout
    pub verbose: bool,
}

#[derive(Debug)]
pub enum RunOutcome {
    BaselineWritten { path: PathBuf, pairs: usize },
    Compared { report: Box<RunReport>, html: String },
}

/// Run blocking file I/O off the async workers with a bounded wait
pub async fn bounded_io<T, E, F>(limit: Duration, what: String, work: F) -> Result<T>
where
    T: Send + 'static,
    E: Into<anyhow::Error> + Send + 'static,
    F: FnOnce() -> Result<T, E> + Send + 'static,
{
    let handle = tokio::task::spawn_blocking(work);
    let joined = tokio::time::timeout(limit, handle)
        .await
        .with_context(|| format!("{} did not finish within {:?}", what, limit))?;
    let result = joined.with_context(|| format!("{} was interrupted", what))?;
    result.map_err(Into::into)
}

/// Text dump of a matrix, one `source to target : sample` line per pair
pub fn matrix_dump(matrix: &ProbeMatrix) -> String {
    let mut out = String::new();
    for (source, target, cell) in matrix.iter() {
        out.push_str(&format!("{} to {} : {}\n", source, target, cell));
    }
    out
}

/// Execute one run against `prober`
pub async fn execute<P: Prober>(
    options: &RunOptions,
    config: &Config,
    prober: Arc<P>,
) -> Result<RunOutcome> {
    let reference_file = config.reference_file.clone();

    let baseline = if options.gen_reference {
        None
    } else {
        let path = reference_file.clone();
        let strictness = config.baseline_strictness;
        let store = bounded_io(
            config.file_timeout(),
            format!("reading baseline {}", reference_file.display()),
            move || BaselineStore::load(path, strictness),
        )
        .await?;
        if store.is_empty() {
            tracing::warn!(path = %reference_file.display(), "Baseline has no entries");
        }
        Some(store)
    };

    tracing::info!(
        machines = config.machines.len(),
        concurrency = config.probe_concurrency,
        "Probing all pairs"
    );
    let run = build_matrix(&config.machines, prober, &config.probe_settings()).await;

    if options.verbose {
        print!("{}", matrix_dump(&run.matrix));
    }

    let Some(baseline) = baseline else {
        let pairs = run.matrix.len();
        let path = reference_file.clone();
        let matrix = run.matrix;
        bounded_io(
            config.file_timeout(),
            format!("writing baseline {}", reference_file.display()),
            move || baseline::save(&matrix, path),
        )
        .await?;
        return Ok(RunOutcome::BaselineWritten {
            path: reference_file,
            pairs,
        });
    };

    let thresholds = config.thresholds();
    let comparison = compare(&run.matrix, &baseline, &thresholds);

    let mut diagnostics: Vec<String> = run.diagnostics.iter().map(ToString::to_string).collect();
    diagnostics.extend(
        baseline
            .warnings()
            .iter()
            .map(|w| format!("{}: {}", reference_file.display(), w)),
    );

    let report = RunReport {
        current: run.matrix,
        baseline,
        comparison,
        diagnostics,
        thresholds,
    };
    let html = render_report(
        &report,
        config.display_only_datacenters,
        config.print_reference_table,
        &ReportFooter::current(),
    );

    Ok(RunOutcome::Compared {
        report: Box::new(report),
        html,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::MachineId;
    use crate::probe::ProbeError;
    use crate::sample::ProbeCell;
    use std::collections::HashMap;
    use std::future::Future;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Answers from a table keyed by (source host, target host)
    #[derive(Default)]
    struct TableProber {
        avg_ms: HashMap<(String, String), f64>,
        calls: AtomicUsize,
    }

    impl TableProber {
        fn with(mut self, source: &str, target: &str, avg_ms: f64) -> Self {
            self.avg_ms
                .insert((source.to_string(), target.to_string()), avg_ms);
            self
        }
    }

    impl Prober for TableProber {
        fn probe(
            &self,
            source: &MachineId,
            target: &MachineId,
        ) -> impl Future<Output = Result<String, ProbeError>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let outcome = match self.avg_ms.get(&(source.host.clone(), target.host.clone())) {
                Some(avg) => Ok(format!(
                    "rtt min/avg/max/mdev = {:.3}/{:.3}/{:.3}/0.010 ms",
                    avg - 0.1,
                    avg,
                    avg + 0.1
                )),
                None => Err(ProbeError::Failed {
                    code: 255,
                    stderr: "ssh: connect to host refused".to_string(),
                }),
            };
            std::future::ready(outcome)
        }
    }

    fn config(reference: &Path) -> Config {
        let json = format!(
            r#"{{"configuration": {{
                "machines": [
                    {{"host": "fr-db1", "datacenter": "paris"}},
                    {{"host": "uk-db1", "datacenter": "london"}}
                ],
                "reference_file": {:?},
                "deviation_percent": 20,
                "deviation_micros": 2000,
                "ssh_user": "monitor",
                "probe_timeout_secs": 5
            }}}}"#,
            reference.display().to_string()
        );
        Config::from_json(&json, Path::new("test.json")).unwrap()
    }

    fn steady() -> TableProber {
        TableProber::default()
            .with("fr-db1", "uk-db1", 8.0)
            .with("uk-db1", "fr-db1", 8.0)
    }

    #[tokio::test]
    async fn test_gen_reference_writes_baseline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rtt.ref");
        let prober = Arc::new(steady());
        let options = RunOptions {
            gen_reference: true,
            verbose: false,
        };

        let outcome = execute(&options, &config(&path), Arc::clone(&prober))
            .await
            .unwrap();

        match outcome {
            RunOutcome::BaselineWritten { path: written, pairs } => {
                assert_eq!(written, path);
                assert_eq!(pairs, 4);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        // Self pairs are skipped
        assert_eq!(prober.calls.load(Ordering::SeqCst), 2);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("fr-db1|paris->fr-db1|paris : min=- max=- avg=- mdev=-"));
        assert!(text.contains("fr-db1|paris->uk-db1|london : min=7900 max=8100 avg=8000 mdev=10"));
    }

    #[tokio::test]
    async fn test_compare_against_generated_baseline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rtt.ref");
        let config = config(&path);

        execute(
            &RunOptions {
                gen_reference: true,
                verbose: false,
            },
            &config,
            Arc::new(steady()),
        )
        .await
        .unwrap();

        let slower = TableProber::default()
            .with("fr-db1", "uk-db1", 14.0)
            .with("uk-db1", "fr-db1", 8.0);
        let outcome = execute(&RunOptions::default(), &config, Arc::new(slower))
            .await
            .unwrap();

        let RunOutcome::Compared { report, html } = outcome else {
            panic!("expected a comparison");
        };
        assert_eq!(report.alerts().regression_count(), 1);
        assert_eq!(report.alerts().improvement_count(), 0);
        assert!(report.diagnostics.is_empty());
        assert!(html.contains("RTT from paris to london increased"));
        assert!(html.contains("Reference average RTT"));
    }

    #[tokio::test]
    async fn test_probe_failures_become_diagnostics() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rtt.ref");
        std::fs::write(
            &path,
            "fr-db1|paris->uk-db1|london : min=7900 max=8100 avg=8000 mdev=10\n",
        )
        .unwrap();

        let prober = TableProber::default().with("fr-db1", "uk-db1", 8.0);
        let outcome = execute(&RunOptions::default(), &config(&path), Arc::new(prober))
            .await
            .unwrap();

        let RunOutcome::Compared { report, html } = outcome else {
            panic!("expected a comparison");
        };
        assert!(!report.alerts().has_any_alert());
        assert_eq!(report.diagnostics.len(), 1);
        assert!(report.diagnostics[0]
            .starts_with("An error occurred while trying to ping from uk-db1 to fr-db1"));
        assert!(html.contains("N/A"));
        let london = MachineId::new("uk-db1", "london");
        let paris = MachineId::new("fr-db1", "paris");
        assert!(matches!(
            report.current.get(&london, &paris),
            Some(ProbeCell::Measured(s)) if s.is_unavailable()
        ));
    }

    #[tokio::test]
    async fn test_baseline_warnings_are_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rtt.ref");
        std::fs::write(&path, "garbage line\n").unwrap();

        let outcome = execute(&RunOptions::default(), &config(&path), Arc::new(steady()))
            .await
            .unwrap();
        let RunOutcome::Compared { report, .. } = outcome else {
            panic!("expected a comparison");
        };
        assert_eq!(report.diagnostics.len(), 1);
        assert!(report.diagnostics[0].contains("line 1"));
    }

    #[tokio::test]
    async fn test_missing_baseline_fails_before_probing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.ref");
        let prober = Arc::new(steady());

        let err = execute(&RunOptions::default(), &config(&path), Arc::clone(&prober))
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("absent.ref"));
        assert_eq!(prober.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unwritable_baseline_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing-dir").join("rtt.ref");
        let options = RunOptions {
            gen_reference: true,
            verbose: false,
        };

        let err = execute(&options, &config(&path), Arc::new(steady()))
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("failed to write baseline file"));
    }

    #[tokio::test]
    async fn test_bounded_io_gives_up_after_limit() {
        let err = bounded_io(
            Duration::from_millis(20),
            "reading slow.ref".to_string(),
            || {
                std::thread::sleep(Duration::from_millis(500));
                Ok::<_, std::io::Error>(())
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().starts_with("reading slow.ref did not finish within"));
    }

    #[tokio::test]
    async fn test_bounded_io_passes_result_through() {
        let value = bounded_io(Duration::from_secs(5), "reading".to_string(), || {
            Ok::<_, std::io::Error>(7)
        })
        .await
        .unwrap();
        assert_eq!(value, 7);

        let err = bounded_io(Duration::from_secs(5), "reading".to_string(), || {
            Err::<(), _>(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))
        })
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "gone");
    }

    #[test]
    fn test_matrix_dump() {
        let matrix: ProbeMatrix = vec![(
            MachineId::new("a", "z1"),
            MachineId::new("b", "z2"),
            ProbeCell::NotProbed,
        )]
        .into_iter()
        .collect();
        assert_eq!(
            matrix_dump(&matrix),
            "a|z1 to b|z2 : min=- max=- avg=- mdev=-\n"
        );
    }
}
