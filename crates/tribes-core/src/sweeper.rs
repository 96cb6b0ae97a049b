//! Background expiry of time-bounded shares

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::db::{ShareRepository, SharedDatabase};
use crate::error::Result;

/// Default time between two sweeps
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Tombstones shares whose expiry has passed
#[derive(Clone)]
pub struct ExpirationSweeper {
    db: SharedDatabase,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl ExpirationSweeper {
    pub fn new(db: SharedDatabase, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            db,
            clock,
            interval,
        }
    }

    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// One pass; returns how many shares were expired
    pub async fn sweep_once(&self, cancel: &CancellationToken) -> Result<usize> {
        let db = self.db.lock().await?;
        ShareRepository::new(db.connection()).cleanup_expired(self.clock.now_millis(), cancel)
    }

    /// On-demand pass for administrative callers
    pub async fn trigger(&self) -> Result<usize> {
        let expired = self.sweep_once(&CancellationToken::new()).await?;
        tracing::info!(expired, "Manual share cleanup finished");
        Ok(expired)
    }

    /// Sweep immediately, then once per interval until `cancel` fires
    ///
    /// A failed pass is logged and the loop keeps going.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(interval = ?self.interval, "Share expiration sweeper started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.sweep_once(&cancel).await {
                Ok(0) => tracing::debug!("No expired shares"),
                Ok(expired) => tracing::info!(expired, "Expired shares swept"),
                Err(error) if cancel.is_cancelled() => {
                    tracing::debug!(%error, "Sweep interrupted by shutdown");
                }
                Err(error) => tracing::warn!(%error, "Share sweep failed"),
            }
        }

        tracing::info!("Share expiration sweeper stopped");
    }

    /// Run the loop on the current runtime
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::db::{Database, ListRepository, DEFAULT_STORAGE_TIMEOUT};
    use crate::models::{NewList, TribeId, UserId};

    const HOUR: i64 = 60 * 60 * 1000;

    async fn shared_list(db: &SharedDatabase, expires_at: Option<i64>) {
        let guard = db.lock().await.unwrap();
        let conn = guard.connection();
        let owner = UserId::new();
        let (list, _) = ListRepository::new(conn)
            .create_with_owner(NewList::new("Date Night Spots"), &owner, 0)
            .unwrap();
        ShareRepository::new(conn)
            .share_with_tribe(&list.id, &TribeId::new(), &owner, expires_at, 0)
            .unwrap();
    }

    fn setup() -> (SharedDatabase, Arc<ManualClock>, ExpirationSweeper) {
        let db = SharedDatabase::new(Database::open_in_memory().unwrap(), DEFAULT_STORAGE_TIMEOUT);
        let clock = Arc::new(ManualClock::new(0));
        let sweeper = ExpirationSweeper::new(db.clone(), clock.clone(), Duration::from_millis(20));
        (db, clock, sweeper)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn trigger_expires_only_past_shares() {
        let (db, clock, sweeper) = setup();
        shared_list(&db, Some(24 * HOUR)).await;
        shared_list(&db, Some(48 * HOUR)).await;
        shared_list(&db, None).await;

        clock.set(25 * HOUR);
        assert_eq!(sweeper.trigger().await.unwrap(), 1);
        assert_eq!(sweeper.trigger().await.unwrap(), 0);

        clock.set(100 * HOUR);
        assert_eq!(sweeper.trigger().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn run_sweeps_at_startup_and_stops_on_cancel() {
        let (db, clock, sweeper) = setup();
        shared_list(&db, Some(HOUR)).await;
        clock.set(2 * HOUR);

        let cancel = CancellationToken::new();
        let handle = sweeper.clone().spawn(cancel.clone());

        let mut remaining = 1;
        for _ in 0..100 {
            remaining = {
                let guard = db.lock().await.unwrap();
                guard
                    .connection()
                    .query_row(
                        "SELECT COUNT(*) FROM list_sharing WHERE deleted_at IS NULL",
                        [],
                        |row| row.get::<_, i64>(0),
                    )
                    .unwrap()
            };
            if remaining == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(remaining, 0);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
