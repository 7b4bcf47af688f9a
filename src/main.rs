use anyhow::{Context, Result};
use clap::Parser;
use linkrtt::cli::Cli;
use linkrtt::config::{Config, LOAD_TIMEOUT};
use linkrtt::notify::{self, EmailNotifier};
use linkrtt::run::{self, RunOutcome};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber; `RUST_LOG` replaces the flag-derived level
fn init_tracing(level: tracing::Level) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_level());

    let config_path = args.config.clone();
    let config = run::bounded_io(
        LOAD_TIMEOUT,
        format!("reading configuration {}", config_path.display()),
        move || Config::load(config_path),
    )
    .await?;
    let prober = Arc::new(config.ssh_prober());

    let outcome = run::execute(&args.run_options(), &config, prober).await?;
    let (report, html) = match outcome {
        RunOutcome::BaselineWritten { path, pairs } => {
            println!("Baseline written to {} ({} pairs)", path.display(), pairs);
            return Ok(());
        }
        RunOutcome::Compared { report, html } => (report, html),
    };

    if let Some(output) = args.output.clone() {
        let contents = html.clone();
        run::bounded_io(
            config.file_timeout(),
            format!("writing report {}", output.display()),
            move || {
                std::fs::write(&output, contents)
                    .with_context(|| format!("failed to write report {}", output.display()))
            },
        )
        .await?;
    }

    let alerts = report.alerts();
    let subject = notify::subject(alerts);
    println!("{}", subject);

    if args.no_mail {
        tracing::info!("Mail disabled on the command line");
    } else if notify::should_notify(config.always_send_report, alerts) {
        let settings = config.mail_settings()?;
        EmailNotifier::new(settings)
            .send(&subject, &html)
            .await
            .context("failed to send report")?;
    } else {
        tracing::info!("No deviation, report not sent");
    }

    Ok(())
}
