// Bounded-concurrency visit scheduler. Page specs run strictly one after
// another; the visit targets inside a spec fan out across `race` workers
// fed from a queue of the same capacity, so enqueuing applies
// backpressure once every worker is busy.

use crate::config::{Config, PageSpec};
use crate::error::{EngineError, Result};
use crate::interpreter::Session;
use crate::links::resolve_link_spec;
use crate::provider::{EngineKind, PageProvider, SessionOptions};
use crate::state::{LinkRegistry, SharedState, VisitTarget};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// Everything a run hands back: the result tree and link registry are
/// returned even when an error aborted the run partway through.
pub struct RunReport {
    pub data: Value,
    pub links: LinkRegistry,
    pub pages_visited: usize,
    pub duration: Duration,
    pub error: Option<EngineError>,
}

impl RunReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

pub struct Engine {
    config: Config,
    provider: Arc<dyn PageProvider>,
}

impl Engine {
    pub fn new(config: Config, provider: Arc<dyn PageProvider>) -> Self {
        Engine { config, provider }
    }

    /// Drive the whole configuration. The provider is shut down on every
    /// exit path and partial results always come back with the report.
    pub async fn run(self) -> RunReport {
        let started = Instant::now();
        let state = Arc::new(SharedState::new());

        let mut error = self.run_pages(&state).await.err();

        if let Err(shutdown_err) = self.provider.shutdown().await {
            warn!(error = %shutdown_err, "provider shutdown failed");
            error.get_or_insert(shutdown_err);
        }

        RunReport {
            data: state.data_snapshot().await,
            links: state.links_clone().await,
            pages_visited: state.pages_visited(),
            duration: started.elapsed(),
            error,
        }
    }

    async fn run_pages(&self, state: &Arc<SharedState>) -> Result<()> {
        if let Some(kind) = &self.config.browser.kind {
            EngineKind::from_name(kind)?;
        }

        let options = SessionOptions::from_browser_config(&self.config.browser);
        let race = self.config.race.max(1);

        for page in &self.config.pages {
            let registry = state.links_clone().await;
            let targets = resolve_link_spec(&page.link, &registry);
            info!(targets = targets.len(), race, "starting page spec");

            self.run_page_spec(page, targets, &options, race, state)
                .await?;
        }

        Ok(())
    }

    /// Fan one page spec's targets across the worker pool, wait for the
    /// queue to drain, then retire the workers before returning.
    async fn run_page_spec(
        &self,
        page: &PageSpec,
        targets: Vec<VisitTarget>,
        options: &SessionOptions,
        race: usize,
        state: &Arc<SharedState>,
    ) -> Result<()> {
        // Sentinel-carrying queue: `Some` is a visit, `None` retires one
        // worker. Capacity equals the worker count, which is what makes
        // the producer block once everyone is busy.
        let (tx, rx) = mpsc::channel::<Option<VisitTarget>>(race);
        let rx = Arc::new(Mutex::new(rx));
        let first_error: Arc<Mutex<Option<EngineError>>> = Arc::new(Mutex::new(None));

        let mut workers = Vec::with_capacity(race);
        for worker_id in 0..race {
            let rx = rx.clone();
            let state = state.clone();
            let provider = self.provider.clone();
            let page = page.clone();
            let options = options.clone();
            let first_error = first_error.clone();
            let logging = self.config.logging;

            workers.push(tokio::spawn(async move {
                debug!(worker_id, "worker started");
                loop {
                    let received = { rx.lock().await.recv().await };
                    let Some(Some(target)) = received else { break };

                    // After a failure the queue still has to drain so the
                    // producer never blocks forever; remaining targets
                    // are consumed without being visited.
                    if first_error.lock().await.is_some() {
                        continue;
                    }

                    match visit(&provider, &options, &page, &target, &state, logging).await {
                        Ok(()) => state.mark_visit_complete(),
                        Err(e) => {
                            warn!(worker_id, url = %target.url, error = %e, "visit failed");
                            let mut slot = first_error.lock().await;
                            slot.get_or_insert(e);
                        }
                    }
                }
                debug!(worker_id, "worker finished");
            }));
        }

        for target in targets {
            if tx.send(Some(target)).await.is_err() {
                break;
            }
        }
        for _ in 0..race {
            let _ = tx.send(None).await;
        }

        for handle in workers {
            handle.await?;
        }

        match first_error.lock().await.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// One complete visit: open an isolated session, walk the interaction
/// spec, close the session even when the walk failed.
async fn visit(
    provider: &Arc<dyn PageProvider>,
    options: &SessionOptions,
    page: &PageSpec,
    target: &VisitTarget,
    state: &Arc<SharedState>,
    logging: bool,
) -> Result<()> {
    let page_session = provider.open_session(options).await?;
    let mut session = Session::new(page_session, target, state.clone(), logging);

    let outcome = session.run(page, &target.url).await;
    let closed = session.close().await;

    outcome.and(closed)
}
