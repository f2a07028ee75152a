//! Load command - run a load test against the simulated backend

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sipconsole_client_core::sim::SimBackend;
use sipconsole_load_tester::{AttemptOutcome, LoadTestEvent, LoadTester};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::output;
use crate::settings::{self, LoadArgs, LoadFile};

/// Execute load command
pub async fn execute(args: LoadArgs) -> Result<()> {
    let file = match settings::config_path(args.config.as_deref()) {
        Some(path) => {
            info!(path = %path.display(), "Reading load test file");
            settings::load_file(&path)?
        }
        None => LoadFile::default(),
    };
    let (config, profile) = settings::resolve(&args, file)?;
    config.validate()?;

    let backend = SimBackend::new().with_profile(profile);
    let tester = LoadTester::new(Arc::new(backend));
    let mut events = tester.subscribe();

    if !args.json {
        println!("{}", output::config_table(&config));
    }
    let handle = tester
        .launch(config)?
        .context("a load test is already running")?;
    info!(run_id = %handle.run_id(), "📞 Load test running (press Ctrl+C to stop)");

    let wait = handle.wait();
    tokio::pin!(wait);
    let mut ticker = tokio::time::interval(Duration::from_secs(args.progress_secs.max(1)));
    let mut stopping = false;
    let mut events_open = true;

    let summary = loop {
        tokio::select! {
            summary = &mut wait => break summary?,
            _ = ticker.tick() => {
                if !args.json {
                    eprintln!("{}", output::progress_line(&tester.stats()));
                }
            }
            _ = tokio::signal::ctrl_c(), if !stopping => {
                stopping = true;
                warn!("🛑 Interrupted, stopping load test");
                if let Some(report) = tester.stop_run().await {
                    if !args.json {
                        eprintln!("{}", output::teardown_line(&report));
                    }
                }
            }
            event = events.recv(), if events_open => match event {
                Ok(LoadTestEvent::AttemptFinished { attempt, outcome: AttemptOutcome::Failed, cause, .. }) => {
                    warn!(attempt = %attempt, cause = cause.as_deref().unwrap_or("unknown"), "Attempt failed");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event stream lagged"),
                Err(RecvError::Closed) => events_open = false,
            },
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", output::summary_table(&summary));
    }
    Ok(())
}
