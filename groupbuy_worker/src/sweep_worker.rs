use std::time::Duration;

use groupbuy_engine::{SqliteDatabase, SweepApi, SweepReport};
use log::*;
use tokio::{task::JoinHandle, time::MissedTickBehavior};

/// Starts the sweep worker. The returned JoinHandle only resolves if the task is aborted or panics.
pub fn start_sweep_worker(api: SweepApi<SqliteDatabase>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        // A slow sweep should not be followed by a burst of catch-up ticks
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("🧹️ Sweep worker started. Sweeping every {}s", interval.as_secs());
        loop {
            timer.tick().await;
            debug!("🧹️ Running group buy sweep");
            match api.sweep_tick().await {
                Ok(report) => log_report(&report),
                Err(e) => error!("🧹️ Error running group buy sweep: {e}"),
            }
        }
    })
}

fn log_report(report: &SweepReport) {
    debug!(
        "🧹️ Tick complete. {} active group buys checked, {} finalized, {} reminded, {} errors",
        report.processed,
        report.finalized.len(),
        report.expiring_notified.len(),
        report.errors.len()
    );
    if !report.finalized.is_empty() {
        info!("🧹️ Finalized group buys: {}", id_list(&report.finalized));
    }
    for e in &report.errors {
        warn!("🧹️ Group buy {} could not be swept. {}", e.group_buy_id, e.reason);
    }
}

fn id_list<T: ToString>(ids: &[T]) -> String {
    ids.iter().map(|id| id.to_string()).collect::<Vec<String>>().join(", ")
}
