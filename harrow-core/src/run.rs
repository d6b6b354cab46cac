// Glue between a parsed configuration and a finished run: pick the
// sinks, drive the engine, flush whatever was collected. Partial data
// is flushed even when the run aborted, so a crash halfway through a
// long scrape still leaves usable output behind.

use crate::sink::{self, TransformRegistry};
use anyhow::Context;
use harrow_engine::{Config, Engine, PageProvider, RunReport};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

pub struct RunOutcome {
    pub report: RunReport,
    pub written: Vec<PathBuf>,
}

impl RunOutcome {
    pub fn is_ok(&self) -> bool {
        self.report.is_ok()
    }
}

/// Execute a full run against the given provider and flush the result
/// tree through every configured sink.
pub async fn execute_run(
    config: Config,
    provider: Arc<dyn PageProvider>,
    transforms: &TransformRegistry,
) -> anyhow::Result<RunOutcome> {
    config.validate().context("invalid configuration")?;

    // Resolve sinks up front so a bad output section fails before any
    // page is fetched.
    let outputs = sink::resolve_outputs(&config.output)?;

    info!(
        pages = config.pages.len(),
        race = config.race,
        "starting run"
    );

    let report = Engine::new(config, provider).run().await;

    if let Some(error) = &report.error {
        warn!(%error, "run aborted, flushing partial results");
    }

    let written = sink::write_outputs(&report.data, &outputs, transforms)?;

    Ok(RunOutcome { report, written })
}
