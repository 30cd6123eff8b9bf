use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, error, Instrument};

use crate::{
    clock::{Clock, SystemClock},
    policy::PollMode,
    signal::{FetchSignal, FetchTime, FetchTrigger},
};

/// The inputs a single activation is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Activation {
    pub enabled: bool,
    pub pinned: Option<DateTime<Utc>>,
    pub interval: Duration,
}

impl Activation {
    pub fn live(interval: Duration) -> Self {
        Self {
            enabled: true,
            pinned: None,
            interval,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_pinned(mut self, pinned: Option<DateTime<Utc>>) -> Self {
        self.pinned = pinned;
        self
    }
}

/// Owns the repeating timer of one activation, if it has one.
///
/// Releasing the handle stops every future timer-driven trigger. Dropping it
/// has the same effect.
pub struct ActivationHandle {
    cancel: Arc<AtomicBool>,
    timer: Option<JoinHandle<()>>,
}

impl ActivationHandle {
    fn idle() -> Self {
        Self {
            cancel: Arc::new(AtomicBool::new(true)),
            timer: None,
        }
    }

    pub fn is_polling(&self) -> bool {
        self.timer.is_some()
    }

    pub fn release(&mut self) {
        self.cancel.store(true, Ordering::Release);
        if let Some(timer) = self.timer.take() {
            timer.abort();
            debug!("Released polling timer.");
        }
    }
}

impl Drop for ActivationHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Evaluates one activation: fires the immediate trigger and, for live
/// polling, starts the repeating timer.
///
/// Must be called from within a tokio runtime.
pub fn activate(
    inputs: Activation,
    mode: PollMode,
    trigger: Arc<dyn FetchTrigger>,
    clock: Arc<dyn Clock>,
) -> ActivationHandle {
    let enabled = inputs.enabled || !mode.honours_enabled();
    let pinned = inputs.pinned.filter(|_| mode.honours_pinned());

    if !enabled {
        trigger.fire(FetchSignal::Clear);
        return ActivationHandle::idle();
    }

    if let Some(at) = pinned {
        trigger.fire(FetchSignal::Fetch(FetchTime::Pinned(at)));
        return ActivationHandle::idle();
    }

    trigger.fire(FetchSignal::Fetch(FetchTime::Live(clock.now())));

    let period = inputs.interval.max(Duration::from_millis(1));
    let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let cancel = Arc::new(AtomicBool::new(false));
    let timer_cancel = cancel.clone();
    let timer = tokio::spawn(
        async move {
            loop {
                ticks.tick().await;
                if timer_cancel.load(Ordering::Acquire) {
                    break;
                }

                let signal = FetchSignal::Fetch(FetchTime::Live(clock.now()));
                if catch_unwind(AssertUnwindSafe(|| trigger.fire(signal))).is_err() {
                    error!(%signal, "The fetch trigger panicked, polling continues.");
                }
            }
        }
        .instrument(tracing::debug_span!("poller.timer", interval_ms = period.as_millis() as u64)),
    );

    ActivationHandle {
        cancel,
        timer: Some(timer),
    }
}

/// A named poller which keeps at most one activation alive at a time.
pub struct Poller {
    name: String,
    mode: PollMode,
    clock: Arc<dyn Clock>,
    active: Option<ActivationHandle>,
}

impl Poller {
    pub fn new<N: Into<String>>(name: N, mode: PollMode) -> Self {
        Self {
            name: name.into(),
            mode,
            clock: Arc::new(SystemClock),
            active: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_polling(&self) -> bool {
        self.active.as_ref().map(|a| a.is_polling()).unwrap_or_default()
    }

    /// Tears down the previous activation, then evaluates `inputs` afresh.
    #[tracing::instrument(name = "poller.activate", skip(self, trigger), fields(poller.name = %self.name, poller.mode = %self.mode))]
    pub fn activate(&mut self, inputs: Activation, trigger: Arc<dyn FetchTrigger>) {
        self.release();

        let handle = activate(inputs, self.mode, trigger, self.clock.clone());
        debug!(polling = handle.is_polling(), "Poller activated.");
        self.active = Some(handle);
    }

    pub fn release(&mut self) {
        if let Some(mut previous) = self.active.take() {
            previous.release();
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::TimeZone;
    use tokio::time::sleep;

    use super::*;

    const INTERVAL: Duration = Duration::from_millis(5000);

    #[derive(Clone)]
    struct Recorder {
        started: Instant,
        calls: Arc<Mutex<Vec<(Duration, FetchSignal)>>>,
    }

    impl Recorder {
        fn new() -> Self {
            Self {
                started: Instant::now(),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn trigger(&self) -> Arc<dyn FetchTrigger> {
            let recorder = self.clone();
            Arc::new(move |signal: FetchSignal| {
                let offset = Instant::now() - recorder.started;
                recorder.calls.lock().unwrap().push((offset, signal));
            })
        }

        fn calls(&self) -> Vec<(Duration, FetchSignal)> {
            self.calls.lock().unwrap().clone()
        }

        fn count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn pinned_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 3, 1, 12, 0, 0).unwrap()
    }

    fn near(offset: Duration, expected_ms: u64) -> bool {
        let expected = Duration::from_millis(expected_ms);
        offset >= expected && offset < expected + Duration::from_millis(50)
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_clears_once() {
        let recorder = Recorder::new();
        let mut poller = Poller::new("wind", PollMode::Conditional);

        poller.activate(Activation::live(INTERVAL).with_enabled(false), recorder.trigger());
        assert!(!poller.is_polling());

        sleep(Duration::from_millis(20_000)).await;
        let calls = recorder.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, FetchSignal::Clear);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pinned_fetches_once() {
        let recorder = Recorder::new();
        let mut poller = Poller::new("solar", PollMode::Conditional);

        poller.activate(
            Activation::live(INTERVAL).with_pinned(Some(pinned_time())),
            recorder.trigger(),
        );
        assert!(!poller.is_polling());

        sleep(Duration::from_millis(20_000)).await;
        let calls = recorder.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].1,
            FetchSignal::Fetch(FetchTime::Pinned(pinned_time()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_polls_on_interval() {
        let recorder = Recorder::new();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let mut poller =
            Poller::new("grid", PollMode::Conditional).with_clock(Arc::new(FixedClock(now)));

        poller.activate(Activation::live(INTERVAL), recorder.trigger());
        assert!(poller.is_polling());

        sleep(Duration::from_millis(12_000)).await;

        let calls = recorder.calls();
        assert_eq!(calls.len(), 3, "one immediate trigger and two timer firings");
        assert!(near(calls[0].0, 0));
        assert!(near(calls[1].0, 5000));
        assert!(near(calls[2].0, 10_000));
        for (_, signal) in calls {
            assert_eq!(signal, FetchSignal::Fetch(FetchTime::Live(now)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_stops_firing() {
        let recorder = Recorder::new();
        let mut poller = Poller::new("grid", PollMode::Pinnable);

        poller.activate(Activation::live(INTERVAL), recorder.trigger());
        sleep(Duration::from_millis(11_000)).await;
        assert_eq!(recorder.count(), 3);

        poller.release();
        assert!(!poller.is_active());
        sleep(Duration::from_millis(5_000)).await;
        assert_eq!(recorder.count(), 3, "no firing at 15000ms after release");

        poller.release();
        sleep(Duration::from_millis(10_000)).await;
        assert_eq!(recorder.count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_release_is_idempotent() {
        let recorder = Recorder::new();
        let mut handle = activate(
            Activation::live(INTERVAL),
            PollMode::Conditional,
            recorder.trigger(),
            Arc::new(SystemClock),
        );
        assert!(handle.is_polling());

        handle.release();
        handle.release();
        assert!(!handle.is_polling());

        sleep(Duration::from_millis(20_000)).await;
        assert_eq!(recorder.count(), 1);

        let mut idle = activate(
            Activation::live(INTERVAL).with_enabled(false),
            PollMode::Conditional,
            recorder.trigger(),
            Arc::new(SystemClock),
        );
        idle.release();
        idle.release();
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_firing() {
        let recorder = Recorder::new();
        {
            let _handle = activate(
                Activation::live(INTERVAL),
                PollMode::Continuous,
                recorder.trigger(),
                Arc::new(SystemClock),
            );
            sleep(Duration::from_millis(6_000)).await;
        }

        assert_eq!(recorder.count(), 2);
        sleep(Duration::from_millis(20_000)).await;
        assert_eq!(recorder.count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reactivate_with_pinned_time_stops_timer() {
        let recorder = Recorder::new();
        let mut poller = Poller::new("wind", PollMode::Conditional);

        poller.activate(Activation::live(INTERVAL), recorder.trigger());
        sleep(Duration::from_millis(7_000)).await;
        assert_eq!(recorder.count(), 2);

        poller.activate(
            Activation::live(INTERVAL).with_pinned(Some(pinned_time())),
            recorder.trigger(),
        );
        assert!(!poller.is_polling());

        sleep(Duration::from_millis(30_000)).await;
        let calls = recorder.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[2].1,
            FetchSignal::Fetch(FetchTime::Pinned(pinned_time()))
        );
        assert!(near(calls[2].0, 7_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reactivate_live_never_runs_two_timers() {
        let recorder = Recorder::new();
        let mut poller = Poller::new("grid", PollMode::Pinnable);

        poller.activate(Activation::live(INTERVAL), recorder.trigger());
        sleep(Duration::from_millis(3_000)).await;
        poller.activate(Activation::live(INTERVAL), recorder.trigger());
        assert_eq!(recorder.count(), 2);

        // The replacement timer is anchored to its own activation at 3000ms.
        sleep(Duration::from_millis(9_000)).await;
        let calls = recorder.calls();
        assert_eq!(calls.len(), 3);
        assert!(near(calls[2].0, 8_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_after_polling_clears_and_stops() {
        let recorder = Recorder::new();
        let mut poller = Poller::new("solar", PollMode::Conditional);

        poller.activate(Activation::live(INTERVAL), recorder.trigger());
        sleep(Duration::from_millis(5_500)).await;
        poller.activate(Activation::live(INTERVAL).with_enabled(false), recorder.trigger());

        sleep(Duration::from_millis(20_000)).await;
        let signals: Vec<FetchSignal> = recorder.calls().into_iter().map(|(_, s)| s).collect();
        assert_eq!(signals.len(), 3);
        assert_eq!(signals[2], FetchSignal::Clear);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pinnable_ignores_enabled() {
        let recorder = Recorder::new();
        let mut poller = Poller::new("grid", PollMode::Pinnable);

        poller.activate(Activation::live(INTERVAL).with_enabled(false), recorder.trigger());
        assert!(poller.is_polling());

        poller.activate(
            Activation::live(INTERVAL)
                .with_enabled(false)
                .with_pinned(Some(pinned_time())),
            recorder.trigger(),
        );
        assert!(!poller.is_polling());

        let signals: Vec<FetchSignal> = recorder.calls().into_iter().map(|(_, s)| s).collect();
        assert!(matches!(signals[0], FetchSignal::Fetch(FetchTime::Live(_))));
        assert_eq!(
            signals[1],
            FetchSignal::Fetch(FetchTime::Pinned(pinned_time()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_continuous_ignores_pinned() {
        let recorder = Recorder::new();
        let mut poller = Poller::new("client-version", PollMode::Continuous);

        poller.activate(
            Activation::live(INTERVAL)
                .with_enabled(false)
                .with_pinned(Some(pinned_time())),
            recorder.trigger(),
        );
        assert!(poller.is_polling());

        sleep(Duration::from_millis(10_000)).await;
        let calls = recorder.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls
            .iter()
            .all(|(_, signal)| matches!(signal, FetchSignal::Fetch(FetchTime::Live(_)))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_trigger_keeps_polling() {
        let fired = Arc::new(Mutex::new(0usize));
        let counter = fired.clone();
        let trigger: Arc<dyn FetchTrigger> = Arc::new(move |_signal: FetchSignal| {
            let mut count = counter.lock().unwrap();
            *count += 1;
            if *count == 2 {
                drop(count);
                panic!("store unavailable");
            }
        });

        let mut poller = Poller::new("wind", PollMode::Conditional);
        poller.activate(Activation::live(INTERVAL), trigger);
        sleep(Duration::from_millis(11_000)).await;

        assert_eq!(*fired.lock().unwrap(), 3, "the firing at 10000ms follows the failed one");
        assert!(poller.is_polling());

        poller.release();
        assert!(!poller.is_active());
        sleep(Duration::from_millis(10_000)).await;
        assert_eq!(*fired.lock().unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_clamped() {
        let recorder = Recorder::new();
        let mut poller = Poller::new("grid", PollMode::Pinnable);

        poller.activate(Activation::live(Duration::ZERO), recorder.trigger());
        sleep(Duration::from_millis(10)).await;
        poller.release();

        assert!(recorder.count() > 1);
    }
}
