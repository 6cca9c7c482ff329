//! Host loop: a named thread driving an agent's duty cycle with backoff.
//!
//! The conductor itself never sleeps; a cycle that reports zero work is the
//! host's cue to back off. [`IdleStrategy`] escalates spin → yield → park
//! and resets the moment work reappears.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info};

/// A duty-cycle unit the runner can drive.
pub trait Agent {
    fn role_name(&self) -> &str;

    /// One non-blocking cycle; the returned work count feeds the idle
    /// strategy.
    fn do_work(&mut self) -> Result<usize>;

    /// Idempotent teardown, invoked once when the loop exits.
    fn on_close(&mut self);
}

/// Spin → yield → park escalation for zero-work cycles.
#[derive(Debug, Clone)]
pub struct IdleStrategy {
    max_spins: u32,
    max_yields: u32,
    park: Duration,
    spins: u32,
    yields: u32,
}

impl IdleStrategy {
    pub fn new(max_spins: u32, max_yields: u32, park: Duration) -> Self {
        Self {
            max_spins,
            max_yields,
            park,
            spins: 0,
            yields: 0,
        }
    }

    /// A mild default: brief spin, a few yields, then 1ms parks.
    pub fn backoff() -> Self {
        Self::new(10, 20, Duration::from_millis(1))
    }

    pub fn idle(&mut self, work: usize) {
        if work > 0 {
            self.reset();
            return;
        }
        if self.spins < self.max_spins {
            self.spins += 1;
            std::hint::spin_loop();
        } else if self.yields < self.max_yields {
            self.yields += 1;
            thread::yield_now();
        } else {
            thread::sleep(self.park);
        }
    }

    pub fn reset(&mut self) {
        self.spins = 0;
        self.yields = 0;
    }
}

impl Default for IdleStrategy {
    fn default() -> Self {
        Self::backoff()
    }
}

/// Runs one agent on its own thread until stopped or the agent fails.
///
/// The agent is built *inside* the spawned thread by the factory closure, so
/// single-threaded agents (the conductor holds `Rc` state) never cross a
/// thread boundary. `on_close` runs exactly once on the way out, whatever
/// ended the loop.
pub struct AgentRunner {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl AgentRunner {
    pub fn spawn<A, F>(name: &str, mut idle: IdleStrategy, factory: F) -> Result<Self>
    where
        A: Agent + 'static,
        F: FnOnce() -> Result<A> + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut agent = match factory() {
                    Ok(agent) => agent,
                    Err(e) => {
                        error!("failed to construct agent: {e:#}");
                        return;
                    }
                };
                info!(role = agent.role_name(), "agent running");

                while !stop_flag.load(Ordering::Acquire) {
                    match agent.do_work() {
                        Ok(work) => idle.idle(work),
                        Err(e) => {
                            error!(role = agent.role_name(), "agent failed: {e:#}");
                            break;
                        }
                    }
                }

                agent.on_close();
                info!(role = agent.role_name(), "agent stopped");
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Signal the loop to exit and wait for `on_close` to finish. Idempotent.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for AgentRunner {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingAgent {
        cycles: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
    }

    impl Agent for CountingAgent {
        fn role_name(&self) -> &str {
            "counting"
        }

        fn do_work(&mut self) -> Result<usize> {
            self.cycles.fetch_add(1, Ordering::Relaxed);
            Ok(0)
        }

        fn on_close(&mut self) {
            self.closes.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_runner_stops_and_closes_once() {
        let cycles = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));
        let (cycles_in, closes_in) = (Arc::clone(&cycles), Arc::clone(&closes));

        let mut runner = AgentRunner::spawn("test-agent", IdleStrategy::backoff(), move || {
            Ok(CountingAgent {
                cycles: cycles_in,
                closes: closes_in,
            })
        })
        .unwrap();

        while cycles.load(Ordering::Relaxed) == 0 {
            thread::yield_now();
        }

        runner.stop();
        runner.stop(); // second stop is a no-op

        assert!(cycles.load(Ordering::Relaxed) > 0);
        assert_eq!(closes.load(Ordering::Relaxed), 1);
        assert!(!runner.is_running());
    }

    #[test]
    fn test_idle_strategy_resets_on_work() {
        let mut idle = IdleStrategy::new(2, 2, Duration::from_micros(1));
        idle.idle(0);
        idle.idle(0);
        assert_eq!(idle.spins, 2);

        idle.idle(5);
        assert_eq!(idle.spins, 0);
        assert_eq!(idle.yields, 0);
    }
}
