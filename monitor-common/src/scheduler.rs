//! Background tick scheduling.
//!
//! Tickers drive the rule evaluator and the probe runner. Two rules hold
//! everywhere: a tick that would overlap a still-running job is skipped,
//! never queued, and stopping a ticker cancels future ticks without
//! interrupting the job already in flight.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, LocalResult, NaiveTime, TimeZone};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Handle to a running background ticker.
///
/// Dropping the handle requests shutdown, so holding it is what keeps the
/// schedule alive.
pub struct Ticker {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Ticker {
    /// Spawn a ticker that runs `job` every `period`, first firing one
    /// period from now.
    ///
    /// The `busy` flag may be shared between tickers; while it is set,
    /// ticks are skipped so two schedules never run their shared job
    /// concurrently.
    pub fn spawn<F, Fut>(
        name: &'static str,
        period: Duration,
        busy: Arc<AtomicBool>,
        job: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send,
    {
        Self::spawn_after(name, period, period, busy, job)
    }

    /// Spawn a ticker whose first tick fires after `initial_delay`, then
    /// every `period`. Used for the midnight-aligned daily schedule.
    pub fn spawn_after<F, Fut>(
        name: &'static str,
        initial_delay: Duration,
        period: Duration,
        busy: Arc<AtomicBool>,
        job: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let (shutdown, mut rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + initial_delay;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = rx.changed() => break,
                    _ = interval.tick() => {
                        if busy
                            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                            .is_err()
                        {
                            debug!(ticker = name, "tick skipped, previous run still in progress");
                            continue;
                        }
                        job().await;
                        busy.store(false, Ordering::SeqCst);
                    }
                }
            }
            debug!(ticker = name, "ticker stopped");
        });
        Self {
            name,
            shutdown,
            handle,
        }
    }

    /// Cancel future ticks. A job already running completes normally.
    pub fn stop(&self) {
        debug!(ticker = self.name, "stop requested");
        let _ = self.shutdown.send(true);
    }

    /// Whether the ticker task has fully wound down.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// Duration until the next midnight after `now` in `now`'s own timezone.
///
/// Daily probes fire at local midnight. Around DST transitions an
/// ambiguous midnight resolves to its earliest instant and a skipped
/// midnight falls through to the following hour.
pub fn delay_until_next_midnight<Tz: TimeZone>(now: DateTime<Tz>) -> Duration {
    let tz = now.timezone();
    let tomorrow = now.date_naive() + Days::new(1);
    let midnight = tomorrow.and_time(NaiveTime::MIN);
    let next = match tz.from_local_datetime(&midnight) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => tz
            .from_local_datetime(&(midnight + chrono::Duration::hours(1)))
            .earliest()
            .unwrap_or_else(|| now.clone() + chrono::Duration::days(1)),
    };
    next.signed_duration_since(now)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use std::sync::atomic::AtomicUsize;

    fn counting_job(count: Arc<AtomicUsize>) -> impl Fn() -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync {
        move || {
            let count = count.clone();
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_fires_each_period() {
        let count = Arc::new(AtomicUsize::new(0));
        let ticker = Ticker::spawn(
            "test",
            Duration::from_secs(60),
            Arc::new(AtomicBool::new(false)),
            counting_job(count.clone()),
        );

        tokio::time::sleep(Duration::from_secs(185)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        drop(ticker);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_future_ticks() {
        let count = Arc::new(AtomicUsize::new(0));
        let ticker = Ticker::spawn(
            "test",
            Duration::from_secs(60),
            Arc::new(AtomicBool::new(false)),
            counting_job(count.clone()),
        );

        tokio::time::sleep(Duration::from_secs(65)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        ticker.stop();
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(ticker.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_flag_skips_ticks() {
        let count = Arc::new(AtomicUsize::new(0));
        let busy = Arc::new(AtomicBool::new(true));
        let ticker = Ticker::spawn(
            "test",
            Duration::from_secs(60),
            busy.clone(),
            counting_job(count.clone()),
        );

        // Flag held by someone else: every tick is skipped, none queue up.
        tokio::time::sleep(Duration::from_secs(185)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        busy.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(65)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        drop(ticker);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_delay_defers_first_tick() {
        let count = Arc::new(AtomicUsize::new(0));
        let ticker = Ticker::spawn_after(
            "test",
            Duration::from_secs(600),
            Duration::from_secs(60),
            Arc::new(AtomicBool::new(false)),
            counting_job(count.clone()),
        );

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(305)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        drop(ticker);
    }

    #[test]
    fn test_delay_until_next_midnight() {
        let tz = FixedOffset::east_opt(3600).unwrap();
        let afternoon = tz.with_ymd_and_hms(2025, 6, 15, 13, 30, 0).unwrap();
        assert_eq!(
            delay_until_next_midnight(afternoon),
            Duration::from_secs(10 * 3600 + 30 * 60)
        );

        let midnight = tz.with_ymd_and_hms(2025, 6, 15, 0, 0, 0).unwrap();
        assert_eq!(
            delay_until_next_midnight(midnight),
            Duration::from_secs(24 * 3600)
        );

        let just_before = tz.with_ymd_and_hms(2025, 6, 15, 23, 59, 59).unwrap();
        assert_eq!(delay_until_next_midnight(just_before), Duration::from_secs(1));
    }
}
