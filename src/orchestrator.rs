//! Supervisory control loop.
//!
//! Once per second it re-reads the `enabled` flag and the breaker state, then
//! reconciles the set of running jobs: at most one live instance of each of
//! discovery, target sync, and purge. Disabled or locked means every running
//! job is aborted; jobs stop at their next await point.

use crate::context::AppContext;
use crate::jobs::{discovery, purge, target_sync};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

const TICK: Duration = Duration::from_secs(1);

pub struct Orchestrator {
    ctx: Arc<AppContext>,
    discovery: Option<JoinHandle<()>>,
    target_sync: Option<JoinHandle<()>>,
    purge: Option<JoinHandle<()>>,
}

impl Orchestrator {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self {
            ctx,
            discovery: None,
            target_sync: None,
            purge: None,
        }
    }

    /// Never returns; nothing in the core is fatal to the process.
    pub async fn run(mut self) {
        info!("orchestrator running");
        let mut interval = tokio::time::interval(TICK);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            self.tick().await;
        }
    }

    pub async fn tick(&mut self) {
        let enabled = self.ctx.settings.enabled().await;
        let locked = self.ctx.breaker.is_locked();
        if enabled && !locked {
            self.ensure_jobs_running();
        } else {
            self.cancel_jobs();
        }
    }

    fn ensure_jobs_running(&mut self) {
        if handle_is_dead(&self.discovery) {
            debug!("starting discovery job");
            self.discovery = Some(tokio::spawn(discovery::run(self.ctx.clone())));
        }
        if handle_is_dead(&self.target_sync) {
            debug!("starting target sync job");
            self.target_sync = Some(tokio::spawn(target_sync::run(self.ctx.clone())));
        }
        if handle_is_dead(&self.purge) {
            debug!("starting purge job");
            self.purge = Some(tokio::spawn(purge::run(self.ctx.clone())));
        }
    }

    fn cancel_jobs(&mut self) {
        for handle in [&mut self.discovery, &mut self.target_sync, &mut self.purge] {
            if let Some(handle) = handle.take() {
                handle.abort();
            }
        }
    }

    pub fn running_job_count(&self) -> usize {
        [&self.discovery, &self.target_sync, &self.purge]
            .into_iter()
            .filter(|h| h.as_ref().is_some_and(|job| !job.is_finished()))
            .count()
    }
}

fn handle_is_dead(handle: &Option<JoinHandle<()>>) -> bool {
    handle.as_ref().map_or(true, |h| h.is_finished())
}
