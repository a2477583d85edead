// Copyright 2017 CoreOS, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Drive a function through retries with exponential backoff until it
//! succeeds or a maximum elapsed time is reached.

use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use slog::{info, warn, Logger};

mod client;
pub use self::client::*;

/// Source of time for the retry driver.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, delay: Duration);
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, delay: Duration) {
        (**self).sleep(delay)
    }
}

/// Wall clock, sleeping the current thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, delay: Duration) {
        thread::sleep(delay);
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Retry {
    initial_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
    randomization_factor: f64,
    max_elapsed_time: Duration,
}

impl Default for Retry {
    fn default() -> Self {
        Retry {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            multiplier: 1.2,
            randomization_factor: 0.1,
            max_elapsed_time: Duration::from_secs(30),
        }
    }
}

impl Retry {
    /// Build a new retrying driver.
    ///
    /// This defaults to a 1 second initial backoff growing by 1.2x with
    /// ±10% jitter, giving up once 30 seconds have elapsed.
    pub fn new() -> Self {
        Retry::default()
    }

    /// Set the maximum backoff between two attempts.
    #[cfg(test)]
    pub fn max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// Set the jitter ratio; each delay is drawn uniformly from
    /// `backoff * (1 ± factor)`.
    #[cfg(test)]
    pub fn randomization_factor(mut self, factor: f64) -> Self {
        self.randomization_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// Total time budget, measured from the first attempt.
    ///
    /// No retry is started if its delay would end past this budget, so the
    /// last error is surfaced regardless of how many attempts were made.
    /// If zero, only the initial run will be performed.
    pub fn max_elapsed_time(mut self, max_elapsed_time: Duration) -> Self {
        self.max_elapsed_time = max_elapsed_time;
        self
    }

    /// Retry a function until it either succeeds once or runs out of time,
    /// reading and spending time through `clock`.
    pub fn retry_with_clock<C, F, R>(&self, clock: &C, log: &Logger, mut try_fn: F) -> Result<R>
    where
        C: Clock + ?Sized,
        F: FnMut(u32) -> Result<R>,
    {
        let start = clock.now();
        let mut backoff = self.initial_backoff;
        let mut attempt: u32 = 0;

        loop {
            let err = match try_fn(attempt) {
                Ok(r) => break Ok(r),
                Err(e) => e,
            };
            attempt = attempt.saturating_add(1);

            let delay = self.jitter(backoff, rand::random::<f64>());
            backoff = self.next_backoff(backoff);

            let elapsed = clock.now().saturating_duration_since(start);
            if elapsed + delay > self.max_elapsed_time {
                warn!(log, "giving up";
                      "attempts" => attempt,
                      "elapsed" => ?elapsed,
                      "error" => format!("{err:#}"));
                break Err(err).with_context(|| {
                    format!("giving up after {attempt} attempts ({elapsed:.1?} elapsed)")
                });
            }

            info!(log, "attempt failed, retrying";
                  "attempt" => attempt,
                  "delay" => ?delay,
                  "error" => format!("{err:#}"));
            clock.sleep(delay);
        }
    }

    /// Randomize `backoff` by the configured factor; `sample` is in [0, 1).
    fn jitter(&self, backoff: Duration, sample: f64) -> Duration {
        let delta = self.randomization_factor * backoff.as_secs_f64();
        let low = backoff.as_secs_f64() - delta;
        Duration::from_secs_f64((low + sample * 2.0 * delta).max(0.0))
    }

    fn next_backoff(&self, backoff: Duration) -> Duration {
        let next = backoff.as_secs_f64() * self.multiplier;
        if next >= self.max_backoff.as_secs_f64() {
            self.max_backoff
        } else {
            Duration::from_secs_f64(next)
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anyhow::bail;
    use std::cell::{Cell, RefCell};

    /// Simulated clock; sleeping only advances the reported time.
    pub(crate) struct FakeClock {
        base: Instant,
        offset: Cell<Duration>,
        sleeps: RefCell<Vec<Duration>>,
    }

    impl FakeClock {
        pub(crate) fn new() -> Self {
            FakeClock {
                base: Instant::now(),
                offset: Cell::new(Duration::ZERO),
                sleeps: RefCell::new(vec![]),
            }
        }

        pub(crate) fn advance(&self, by: Duration) {
            self.offset.set(self.offset.get() + by);
        }

        pub(crate) fn elapsed(&self) -> Duration {
            self.offset.get()
        }

        pub(crate) fn sleeps(&self) -> Vec<Duration> {
            self.sleeps.borrow().clone()
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            self.base + self.offset.get()
        }

        fn sleep(&self, delay: Duration) {
            self.sleeps.borrow_mut().push(delay);
            self.advance(delay);
        }
    }

    pub(crate) fn discard() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    type AttemptResult = Result<u32>;

    fn millis(d: Duration) -> u64 {
        (d.as_secs_f64() * 1000.0).round() as u64
    }

    #[test]
    fn test_first_attempt_succeeds() {
        let clock = FakeClock::new();
        let res: AttemptResult = Retry::new().retry_with_clock(&clock, &discard(), Ok);
        assert_eq!(res.unwrap(), 0);
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_no_retries() {
        let clock = FakeClock::new();
        let driver = Retry::new().max_elapsed_time(Duration::ZERO);

        let final_res: AttemptResult = driver.retry_with_clock(&clock, &discard(), |attempt| {
            if attempt != 0 {
                panic!("unreachable attempt {attempt}");
            }

            bail!("expected error")
        });
        final_res.unwrap_err();
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_succeeds_after_retries() {
        let clock = FakeClock::new();
        let final_res = Retry::new().retry_with_clock(&clock, &discard(), |attempt| {
            if attempt == 3 {
                return AttemptResult::Ok(attempt);
            }
            bail!("expected error #{}", attempt)
        });
        assert_eq!(final_res.unwrap(), 3);
        assert_eq!(clock.sleeps().len(), 3);
    }

    #[test]
    fn test_stops_at_max_elapsed_time() {
        let clock = FakeClock::new();
        let attempts = Cell::new(0);

        let final_res: AttemptResult = Retry::new().retry_with_clock(&clock, &discard(), |attempt| {
            attempts.set(attempts.get() + 1);
            bail!("still failing #{}", attempt)
        });

        let err = final_res.unwrap_err();
        assert!(format!("{err:#}").contains("still failing"));
        assert!(clock.elapsed() <= Duration::from_secs(30));
        // 1s growing by 1.2x with ±10% jitter leaves room for about a dozen
        // attempts in 30s.
        assert!(attempts.get() > 5, "only {} attempts", attempts.get());
        assert!(attempts.get() < 20, "{} attempts", attempts.get());
    }

    #[test]
    fn test_slow_attempts_exhaust_budget() {
        let clock = FakeClock::new();
        let attempts = Cell::new(0);

        let final_res: AttemptResult = Retry::new().retry_with_clock(&clock, &discard(), |_| {
            attempts.set(attempts.get() + 1);
            clock.advance(Duration::from_secs(31));
            bail!("timed out")
        });

        final_res.unwrap_err();
        assert_eq!(attempts.get(), 1);
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_backoff_grows() {
        let clock = FakeClock::new();
        let driver = Retry::new().randomization_factor(0.0);

        let _: AttemptResult = driver.retry_with_clock(&clock, &discard(), |attempt| {
            if attempt == 3 {
                return Ok(attempt);
            }
            bail!("expected error")
        });

        let sleeps: Vec<u64> = clock.sleeps().iter().map(|d| millis(*d)).collect();
        assert_eq!(sleeps, vec![1000, 1200, 1440]);
    }

    #[test]
    fn test_backoff_capped() {
        let driver = Retry::new().max_backoff(Duration::from_millis(1100));
        assert_eq!(millis(driver.next_backoff(Duration::from_secs(1))), 1100);
    }

    #[test]
    fn test_jitter_bounds() {
        let driver = Retry::new();
        let backoff = Duration::from_secs(10);
        assert_eq!(millis(driver.jitter(backoff, 0.0)), 9000);
        assert_eq!(millis(driver.jitter(backoff, 0.5)), 10000);
        assert!(millis(driver.jitter(backoff, 0.999_999)) <= 11000);
    }
}
