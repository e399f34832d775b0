//! Countdown timers.
//!
//! A countdown is a pure down-counter advanced by a periodic polling tick —
//! the only recurring timer on the client. Reaching zero transitions to a
//! terminal completed state exactly once; updates after completion are
//! no-ops, and a completed countdown cannot be restarted.

use std::time::Duration;

use tokio::sync::watch;

/// Lifecycle of a countdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CountdownState {
    #[default]
    Idle,
    Running,
    Completed,
}

/// A down-counter over milliseconds.
#[derive(Debug, Clone)]
pub struct Countdown {
    remaining_ms: u64,
    state: CountdownState,
}

impl Countdown {
    pub fn new(duration_ms: u64) -> Self {
        Self {
            remaining_ms: duration_ms,
            state: CountdownState::Idle,
        }
    }

    pub fn remaining_ms(&self) -> u64 {
        self.remaining_ms
    }

    pub fn state(&self) -> CountdownState {
        self.state
    }

    pub fn is_completed(&self) -> bool {
        self.state == CountdownState::Completed
    }

    /// Start counting. Completed countdowns cannot be restarted.
    pub fn start(&mut self) {
        if self.state == CountdownState::Idle {
            self.state = CountdownState::Running;
        }
    }

    /// Advance by `elapsed_ms`. Returns `true` on the single call that
    /// completes the countdown; every later call is a no-op.
    pub fn update(&mut self, elapsed_ms: u64) -> bool {
        if self.state != CountdownState::Running {
            return false;
        }
        self.remaining_ms = self.remaining_ms.saturating_sub(elapsed_ms);
        if self.remaining_ms == 0 {
            self.state = CountdownState::Completed;
            return true;
        }
        false
    }
}

/// Observer of a driven countdown.
pub trait CountdownObserver {
    fn on_tick(&mut self, remaining_ms: u64);
    fn on_complete(&mut self);
}

/// Handle to stop a running [`CountdownDriver`].
///
/// Dropping the handle also stops the driver; either way the polling loop
/// ends and the driver future resolves, which is what allows it to be
/// reclaimed.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    pub fn stop(&self) {
        let _ = self.tx.send(true);
    }
}

/// Drives a [`Countdown`] with a periodic tokio interval.
pub struct CountdownDriver {
    countdown: Countdown,
    tick: Duration,
    stop_rx: watch::Receiver<bool>,
}

impl CountdownDriver {
    pub fn new(countdown: Countdown, tick: Duration) -> (Self, StopHandle) {
        let (tx, stop_rx) = watch::channel(false);
        (
            Self {
                countdown,
                tick,
                stop_rx,
            },
            StopHandle { tx },
        )
    }

    /// Run the polling loop until the countdown completes or the stop
    /// handle fires. Returns the countdown in its final state.
    pub async fn run(mut self, observer: &mut (dyn CountdownObserver + Send)) -> Countdown {
        self.countdown.start();
        let mut interval = tokio::time::interval(self.tick);
        // The first tick of a tokio interval fires immediately; consume it
        // so the countdown only advances after a full period.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let completed = self.countdown.update(self.tick.as_millis() as u64);
                    observer.on_tick(self.countdown.remaining_ms());
                    if completed {
                        observer.on_complete();
                        return self.countdown;
                    }
                }
                changed = self.stop_rx.changed() => {
                    let stopped = changed.is_err() || *self.stop_rx.borrow();
                    if stopped {
                        return self.countdown;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        ticks: Vec<u64>,
        completions: u32,
    }

    impl CountdownObserver for Recorder {
        fn on_tick(&mut self, remaining_ms: u64) {
            self.ticks.push(remaining_ms);
        }
        fn on_complete(&mut self) {
            self.completions += 1;
        }
    }

    #[test]
    fn completes_exactly_once() {
        let mut countdown = Countdown::new(2_500);
        countdown.start();

        assert!(!countdown.update(1_000));
        assert!(!countdown.update(1_000));
        assert!(countdown.update(1_000), "the completing call reports true once");
        assert!(countdown.is_completed());
        assert_eq!(countdown.remaining_ms(), 0);

        // All subsequent updates are no-ops.
        assert!(!countdown.update(1_000));
        assert_eq!(countdown.remaining_ms(), 0);
    }

    #[test]
    fn completed_countdown_cannot_restart() {
        let mut countdown = Countdown::new(100);
        countdown.start();
        countdown.update(100);
        assert!(countdown.is_completed());

        countdown.start();
        assert_eq!(countdown.state(), CountdownState::Completed);
        assert!(!countdown.update(50));
    }

    #[test]
    fn idle_countdown_ignores_updates() {
        let mut countdown = Countdown::new(1_000);
        assert!(!countdown.update(500));
        assert_eq!(countdown.remaining_ms(), 1_000);
    }

    #[tokio::test(start_paused = true)]
    async fn driver_ticks_to_completion() {
        let (driver, _stop) = CountdownDriver::new(Countdown::new(3_000), Duration::from_secs(1));
        let mut recorder = Recorder::default();

        let finished = driver.run(&mut recorder).await;
        assert!(finished.is_completed());
        assert_eq!(recorder.completions, 1);
        assert_eq!(recorder.ticks, vec![2_000, 1_000, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn driver_stops_on_handle() {
        let (driver, stop) = CountdownDriver::new(Countdown::new(60_000), Duration::from_secs(1));

        let task = tokio::spawn(async move {
            let mut recorder = Recorder::default();
            let countdown = driver.run(&mut recorder).await;
            (countdown, recorder.ticks.len())
        });

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        stop.stop();
        let (countdown, ticks) = task.await.unwrap();

        assert!(!countdown.is_completed());
        assert_eq!(ticks, 2);
        assert_eq!(countdown.remaining_ms(), 58_000);
    }
}
