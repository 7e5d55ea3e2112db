use std::sync::Arc;

use rocket::{
    fairing::{Fairing, Info, Kind},
    tokio::sync::Mutex,
    Orbit, Rocket,
};

use crate::{config::Config, model::platform::Platform, scheduled_task::RecurringTask};

use super::lifecycle::{LifecycleManager, ScanReport};

/// A fairing that runs a lifecycle scan every `scan_interval` seconds, from
/// liftoff until shutdown. Requires `Config` and `Platform` in managed state.
#[derive(Default)]
pub struct LifecycleFairing {
    task: Mutex<Option<RecurringTask>>,
}

#[rocket::async_trait]
impl Fairing for LifecycleFairing {
    fn info(&self) -> Info {
        Info {
            name: "Lifecycle Scheduler",
            kind: Kind::Liftoff | Kind::Shutdown,
        }
    }

    async fn on_liftoff(&self, rocket: &Rocket<Orbit>) {
        let (platform, config) = match (rocket.state::<Platform>(), rocket.state::<Config>()) {
            (Some(platform), Some(config)) => (platform, config),
            _ => {
                error!("Platform and config must be managed to schedule lifecycle scans");
                return;
            }
        };
        let period = match config.scan_interval().map(|interval| interval.to_std()) {
            Some(Ok(period)) => period,
            Some(Err(e)) => {
                error!("Invalid scan interval: {e}");
                return;
            }
            None => {
                info!("Scheduled lifecycle scans are disabled");
                return;
            }
        };

        let manager = Arc::new(LifecycleManager::new(
            platform.clone(),
            config.voting().clone(),
        ));
        let task = RecurringTask::new(period, move || {
            let manager = manager.clone();
            async move {
                match manager.manage_election_lifecycles().await {
                    Ok(report) => log_report(&report),
                    Err(e) => error!("Lifecycle scan aborted: {e}"),
                }
            }
        });
        *self.task.lock().await = Some(task);
        info!("Lifecycle scans scheduled every {}s", period.as_secs());
    }

    async fn on_shutdown(&self, _rocket: &Rocket<Orbit>) {
        if let Some(task) = self.task.lock().await.take() {
            task.cancel().await;
            info!("Stopped scheduled lifecycle scans");
        }
    }
}

fn log_report(report: &ScanReport) {
    let changed = report.opened.len() + report.closed.len() + report.healed.len();
    let summary = format!(
        "scan{}: {} opened, {} closed, {} healed, {} skipped, {} failed, {} triggers removed",
        report.scan,
        report.opened.len(),
        report.closed.len(),
        report.healed.len(),
        report.skipped.len(),
        report.failures.len(),
        report.removed_triggers.len(),
    );
    if !report.failures.is_empty() {
        warn!("{summary}");
    } else if changed > 0 || !report.removed_triggers.is_empty() {
        info!("{summary}");
    } else {
        trace!("{summary}");
    }
}
