//! Periodic re-evaluation of tree-wide interrupts
//!
//! Monitor passes are triggered by registration; the sweeper re-runs them on
//! an interval so interrupts whose stop signals were lost, or whose nodes got
//! stuck in DISCONTINUING, still converge.

use crate::error::Result;
use crate::models::InterruptType;
use crate::monitor::{InterruptMonitor, SweepReport};
use crate::repositories::InterruptRepository;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const SWEPT_TYPES: [InterruptType; 2] = [InterruptType::AbortAll, InterruptType::ExpireAll];

pub struct InterruptSweeper {
    interrupts: Arc<dyn InterruptRepository>,
    monitor: Arc<InterruptMonitor>,
    interval: Duration,
}

impl InterruptSweeper {
    pub fn new(
        interrupts: Arc<dyn InterruptRepository>,
        monitor: Arc<InterruptMonitor>,
        interval: Duration,
    ) -> Self {
        Self {
            interrupts,
            monitor,
            interval,
        }
    }

    /// Run one monitor pass for every active tree-wide interrupt
    ///
    /// A failing pass is logged and does not stop the others.
    pub async fn sweep_once(&self) -> Result<Vec<SweepReport>> {
        let active = self.interrupts.list_active(&SWEPT_TYPES).await?;
        let mut reports = Vec::with_capacity(active.len());

        for interrupt in &active {
            match self.monitor.handle(interrupt).await {
                Ok(report) => reports.push(report),
                Err(e) => warn!(
                    interrupt_id = %interrupt.id,
                    plan_id = %interrupt.plan_execution_id,
                    error = %e,
                    "Monitor pass failed"
                ),
            }
        }

        debug!(active = active.len(), swept = reports.len(), "Sweep finished");
        Ok(reports)
    }

    /// Sweep on the configured interval until `shutdown` turns true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval = ?self.interval, "Interrupt sweeper started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        warn!(error = %e, "Sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Interrupt sweeper stopped");
    }
}
