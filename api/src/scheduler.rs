use chrono::{DateTime, Duration, NaiveTime, Utc};
use sea_orm::DatabaseConnection;
use services::{ReconciliationWorker, StudentRoster};
use tokio::task::JoinHandle;
use util::config;

/// Runs attendance reconciliation once a day at `RECONCILE_AT` (UTC).
pub fn spawn_reconciliation_scheduler(db: DatabaseConnection) -> JoinHandle<()> {
    let at = config::reconcile_at();
    let worker = ReconciliationWorker::new(db.clone(), StudentRoster::new(db));

    tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let wait = until_next(now, at);
            tracing::info!(next_run = %(now + wait), "Attendance reconciliation scheduled");
            tokio::time::sleep(wait.to_std().unwrap_or_default()).await;

            if let Err(e) = worker.run(Utc::now()).await {
                tracing::error!(error = %e, "Attendance reconciliation run failed");
            }
        }
    })
}

/// Time from `now` until the next occurrence of `at`, always strictly positive.
pub fn until_next(now: DateTime<Utc>, at: NaiveTime) -> Duration {
    let today = now.date_naive().and_time(at).and_utc();
    let next = if today > now {
        today
    } else {
        today + Duration::days(1)
    };
    next - now
}
