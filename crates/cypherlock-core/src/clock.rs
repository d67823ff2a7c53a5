//! Time abstraction: wall-clock reads and tickers.
//!
//! Production code uses [`SystemClock`]; tests use [`MockClock`], which
//! delivers ticks synchronously from `advance` so time-driven behavior is
//! deterministic.

use std::{
    sync::{Arc, Mutex},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use tokio::sync::mpsc;

/// Source of wall time and tickers.
///
/// `now` returns unix seconds. Tickers fire on their period until dropped
/// or stopped; each tick carries the clock's `now` at fire time.
pub trait Clock: Clone + Send + Sync + 'static {
    /// Current unix time in seconds.
    fn now(&self) -> i64;

    /// Create a ticker firing every `period`, first fire one period from
    /// now.
    fn new_ticker(&self, period: Duration) -> Ticker;
}

/// A running ticker. Dropping it stops the underlying timer.
pub struct Ticker {
    rx: mpsc::UnboundedReceiver<i64>,
    _guard: TickerGuard,
}

enum TickerGuard {
    /// System ticker task, aborted on drop.
    Task(tokio::task::JoinHandle<()>),
    /// Mock subscription; pruned by the clock once the receiver is gone.
    Subscription,
}

impl Drop for TickerGuard {
    fn drop(&mut self) {
        if let TickerGuard::Task(handle) = self {
            handle.abort();
        }
    }
}

impl Ticker {
    /// Wait for the next tick. Never resolves once the ticker source is
    /// gone, so a stale ticker cannot busy-loop a `select!`.
    pub async fn tick(&mut self) -> i64 {
        match self.rx.recv().await {
            Some(now) => now,
            None => std::future::pending().await,
        }
    }

    /// Stop the ticker.
    pub fn stop(self) {}
}

/// The real wall clock, backed by tokio timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs() as i64,
            Err(e) => -(e.duration().as_secs() as i64),
        }
    }

    fn new_ticker(&self, period: Duration) -> Ticker {
        let (tx, rx) = mpsc::unbounded_channel();
        let clock = *self;
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if tx.send(clock.now()).is_err() {
                    break;
                }
            }
        });
        Ticker { rx, _guard: TickerGuard::Task(handle) }
    }
}

/// A manually driven clock for tests.
///
/// `advance` moves time forward and fires every subscribed ticker whose
/// deadline passed, once per elapsed period, before returning.
#[derive(Clone)]
pub struct MockClock {
    inner: Arc<Mutex<MockClockInner>>,
}

struct MockClockInner {
    now_ms: i64,
    tickers: Vec<MockTicker>,
}

struct MockTicker {
    period_ms: i64,
    next_fire_ms: i64,
    tx: mpsc::UnboundedSender<i64>,
}

impl MockClock {
    /// Create a mock clock fixed at `now` unix seconds.
    pub fn new(now: i64) -> Self {
        MockClock {
            inner: Arc::new(Mutex::new(MockClockInner { now_ms: now * 1000, tickers: Vec::new() })),
        }
    }

    /// Move time forward, delivering due ticks in order.
    pub fn advance(&self, d: Duration) {
        let mut inner = self.inner.lock().expect("mock clock lock poisoned");
        inner.now_ms += d.as_millis() as i64;
        let now_ms = inner.now_ms;

        for ticker in &mut inner.tickers {
            while ticker.next_fire_ms <= now_ms {
                if ticker.tx.send(now_ms / 1000).is_err() {
                    break;
                }
                ticker.next_fire_ms += ticker.period_ms;
            }
        }
        inner.tickers.retain(|t| !t.tx.is_closed());
    }
}

impl Clock for MockClock {
    fn now(&self) -> i64 {
        self.inner.lock().expect("mock clock lock poisoned").now_ms / 1000
    }

    fn new_ticker(&self, period: Duration) -> Ticker {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().expect("mock clock lock poisoned");
        let period_ms = period.as_millis() as i64;
        let next_fire_ms = inner.now_ms + period_ms;
        inner.tickers.push(MockTicker {
            period_ms,
            next_fire_ms,
            tx,
        });
        Ticker { rx, _guard: TickerGuard::Subscription }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_clock_reports_configured_time() {
        let clock = MockClock::new(1000);
        assert_eq!(clock.now(), 1000);

        clock.advance(Duration::from_secs(30));
        assert_eq!(clock.now(), 1030);
    }

    #[tokio::test]
    async fn mock_ticker_fires_once_per_period() {
        let clock = MockClock::new(0);
        let mut ticker = clock.new_ticker(Duration::from_secs(10));

        clock.advance(Duration::from_secs(25));

        assert_eq!(ticker.tick().await, 25);
        assert_eq!(ticker.tick().await, 25);
        // Third fire is not due yet.
        assert!(ticker.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn mock_ticker_respects_sub_second_skew() {
        let clock = MockClock::new(0);
        let mut ticker = clock.new_ticker(Duration::from_secs(10) + Duration::from_millis(10));

        clock.advance(Duration::from_secs(10));
        assert!(ticker.rx.try_recv().is_err());

        clock.advance(Duration::from_millis(10));
        assert_eq!(ticker.tick().await, 10);
    }

    #[tokio::test]
    async fn dropped_ticker_is_pruned() {
        let clock = MockClock::new(0);
        let ticker = clock.new_ticker(Duration::from_secs(1));
        drop(ticker);

        clock.advance(Duration::from_secs(5));
        assert!(clock.inner.lock().unwrap().tickers.is_empty());
    }

    #[tokio::test]
    async fn system_clock_ticker_fires() {
        let clock = SystemClock;
        tokio::time::pause();
        let mut ticker = clock.new_ticker(Duration::from_secs(60));
        tokio::time::advance(Duration::from_secs(61)).await;
        // With tokio's virtual time, the tick task has run by now.
        let fired = tokio::time::timeout(Duration::from_secs(1), ticker.tick()).await;
        assert!(fired.is_ok());
    }
}
