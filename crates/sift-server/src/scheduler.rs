//! Periodic `run_all` loop.

use std::{sync::Arc, time::Duration};

use sift_batch::BatchRunner;
use sift_core::ledger::BatchLedger;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};

use crate::config::SchedulerConfig;

/// Run every agent once per interval, forever. The first run happens one
/// full interval after startup. A failed run is logged and the loop goes on.
pub async fn run<L>(runner: Arc<BatchRunner<L>>, config: SchedulerConfig)
where
  L: BatchLedger + 'static,
{
  let period = Duration::from_secs(config.interval_secs.max(1));
  let mut ticker = interval(period);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
  ticker.tick().await;

  info!(interval_secs = period.as_secs(), dry_run = config.dry_run, "scheduler started");
  loop {
    ticker.tick().await;
    match runner.run_all(config.dry_run).await {
      Ok(report) => info!(
        agents = report.totals.agents,
        failed = report.totals.failed,
        deleted = report.totals.deleted,
        moved = report.totals.moved,
        "scheduled run finished"
      ),
      Err(e) => error!(error = %e, "scheduled run failed"),
    }
  }
}
