//! Resource gate: hold the upload back until the host is quiet.
//!
//! The gate walks `Waiting -> Clearing -> Cleared`. `Waiting` polls for the
//! recorder-controller process with a jittered interval, `Clearing` samples
//! aggregate CPU usage and cools down while it sits at or above the ceiling.
//! After a cooldown the recorder is polled again, so on return both
//! conditions held at the last observation.

use std::time::Duration;
use log::{debug, info, warn};
use rand::Rng;
use tokio::time::Instant;
use crate::config::GateConfig;
use crate::host::HostProbe;

/// Phase of the gate state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    /// Recorder process is (possibly) still running
    Waiting,
    /// Recorder gone, waiting for CPU to drop below the ceiling
    Clearing,
    /// Upload may start
    Cleared,
}

/// What the gate observed before clearing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GateReport {
    pub process_polls: u32,
    pub cpu_samples: u32,
    pub cooldowns: u32,
    pub last_cpu_percent: Option<f32>,
    /// The recorder was still running when `max_process_wait_secs` ran out
    pub process_wait_abandoned: bool,
}

/// Poll delay: interval plus uniform jitter in `[0, jitter_max]`
pub fn poll_delay<R: Rng + ?Sized>(interval: Duration, jitter_max: Duration, rng: &mut R) -> Duration {
    let jitter_ms = u64::try_from(jitter_max.as_millis()).unwrap_or(u64::MAX);
    let jitter = if jitter_ms == 0 {
        0
    } else {
        rng.gen_range(0..=jitter_ms)
    };
    interval.saturating_add(Duration::from_millis(jitter))
}

pub struct ResourceGate<'a, P: HostProbe> {
    cfg: &'a GateConfig,
    probe: P,
}

impl<'a, P: HostProbe> ResourceGate<'a, P> {
    pub fn new(cfg: &'a GateConfig, probe: P) -> Self {
        Self { cfg, probe }
    }

    /// Block until the recorder is gone (if configured) and CPU is below the ceiling.
    ///
    /// Never fails; without `max_process_wait_secs` it may wait forever.
    pub async fn await_clearance(&mut self) -> GateReport {
        let mut report = GateReport::default();
        let started = Instant::now();
        let mut phase = self.initial_phase();

        loop {
            phase = match phase {
                GatePhase::Waiting => self.poll_recorder(&mut report, started).await,
                GatePhase::Clearing => self.sample_cpu(&mut report).await,
                GatePhase::Cleared => {
                    info!(
                        "Resource gate cleared after {:?}: {} process poll(s), {} CPU sample(s), {} cooldown(s)",
                        started.elapsed(),
                        report.process_polls,
                        report.cpu_samples,
                        report.cooldowns
                    );
                    return report;
                }
            };
        }
    }

    fn initial_phase(&self) -> GatePhase {
        if self.cfg.wait_for_process {
            GatePhase::Waiting
        } else {
            GatePhase::Clearing
        }
    }

    async fn poll_recorder(&mut self, report: &mut GateReport, started: Instant) -> GatePhase {
        report.process_polls += 1;
        if !self.probe.recorder_running(&self.cfg.process_name) {
            debug!("Recorder process {} not running", self.cfg.process_name);
            return GatePhase::Clearing;
        }

        if let Some(limit) = self.cfg.max_process_wait_secs.map(Duration::from_secs) {
            if started.elapsed() >= limit {
                warn!(
                    "Recorder process {} still running after {:?}; proceeding anyway",
                    self.cfg.process_name, limit
                );
                report.process_wait_abandoned = true;
                return GatePhase::Clearing;
            }
        }

        let delay = poll_delay(self.cfg.poll_interval(), self.cfg.jitter_max(), &mut rand::thread_rng());
        info!("Recorder process {} is running; rechecking in {:?}", self.cfg.process_name, delay);
        tokio::time::sleep(delay).await;
        GatePhase::Waiting
    }

    async fn sample_cpu(&mut self, report: &mut GateReport) -> GatePhase {
        self.probe.refresh_cpu();
        tokio::time::sleep(self.cfg.cpu_sample_window()).await;
        self.probe.refresh_cpu();

        let usage = self.probe.global_cpu_usage();
        report.cpu_samples += 1;
        report.last_cpu_percent = Some(usage);

        if usage < self.cfg.cpu_ceiling_percent {
            debug!("CPU at {:.1}% (ceiling {:.1}%)", usage, self.cfg.cpu_ceiling_percent);
            return GatePhase::Cleared;
        }

        report.cooldowns += 1;
        info!(
            "CPU at {:.1}% (ceiling {:.1}%); cooling down for {:?}",
            usage,
            self.cfg.cpu_ceiling_percent,
            self.cfg.cpu_cooldown()
        );
        tokio::time::sleep(self.cfg.cpu_cooldown()).await;

        // recorder may have been restarted during the cooldown
        if report.process_wait_abandoned {
            GatePhase::Clearing
        } else {
            self.initial_phase()
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::VecDeque;

    /// Scripted host: each poll/sample pops the next value, the last one repeats
    #[derive(Debug, Default)]
    pub struct ScriptedHost {
        pub running: VecDeque<bool>,
        pub cpu: VecDeque<f32>,
        pub cpu_refreshes: u32,
        current_cpu: f32,
    }

    impl ScriptedHost {
        pub fn new(running: &[bool], cpu: &[f32]) -> Self {
            Self {
                running: running.iter().copied().collect(),
                cpu: cpu.iter().copied().collect(),
                ..Default::default()
            }
        }

        fn pop<T: Copy + Default>(queue: &mut VecDeque<T>) -> T {
            if queue.len() > 1 {
                queue.pop_front().unwrap_or_default()
            } else {
                queue.front().copied().unwrap_or_default()
            }
        }
    }

    impl HostProbe for ScriptedHost {
        fn recorder_running(&mut self, _process_name: &str) -> bool {
            Self::pop(&mut self.running)
        }

        fn refresh_cpu(&mut self) {
            self.cpu_refreshes += 1;
            // a sample completes on every second refresh
            if self.cpu_refreshes % 2 == 0 {
                self.current_cpu = Self::pop(&mut self.cpu);
            }
        }

        fn global_cpu_usage(&self) -> f32 {
            self.current_cpu
        }
    }

    /// Paused time lands on millisecond ticks
    fn assert_close(elapsed: Duration, expected: Duration) {
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(10),
            "elapsed {:?}, expected {:?}",
            elapsed,
            expected
        );
    }

    fn gate_config(wait_for_process: bool, ceiling: f32) -> GateConfig {
        GateConfig {
            wait_for_process,
            process_name: "EpgDataCap_Bon".to_string(),
            poll_interval_secs: 30,
            jitter_max_secs: 10,
            cpu_ceiling_percent: ceiling,
            cpu_sample_window_ms: 1000,
            cpu_cooldown_secs: 30,
            max_process_wait_secs: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_host_clears_after_one_sample() {
        let cfg = gate_config(false, 50.0);
        let mut gate = ResourceGate::new(&cfg, ScriptedHost::new(&[true], &[10.0]));

        let start = Instant::now();
        let report = gate.await_clearance().await;

        assert_eq!(report.cpu_samples, 1);
        assert_eq!(report.cooldowns, 0);
        assert_eq!(report.process_polls, 0);
        assert_eq!(report.last_cpu_percent, Some(10.0));
        // only the sample window elapsed, no cooldown or poll sleep
        assert_close(start.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_recorder_to_exit() {
        let cfg = gate_config(true, 50.0);
        let mut gate = ResourceGate::new(&cfg, ScriptedHost::new(&[true, true, false], &[5.0]));

        let start = Instant::now();
        let report = gate.await_clearance().await;

        assert_eq!(report.process_polls, 3);
        assert_eq!(report.cpu_samples, 1);
        let elapsed = start.elapsed();
        // two jittered polls plus one sample window
        assert!(elapsed >= Duration::from_secs(61));
        assert!(elapsed < Duration::from_secs(82));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cools_down_while_cpu_at_ceiling() {
        let cfg = gate_config(false, 50.0);
        let mut gate = ResourceGate::new(&cfg, ScriptedHost::new(&[false], &[90.0, 50.0, 49.9]));

        let start = Instant::now();
        let report = gate.await_clearance().await;

        assert_eq!(report.cpu_samples, 3);
        assert_eq!(report.cooldowns, 2);
        assert_eq!(report.last_cpu_percent, Some(49.9));
        assert_close(start.elapsed(), Duration::from_secs(3 + 60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rechecks_recorder_after_cooldown() {
        let cfg = gate_config(true, 50.0);
        // recorder absent, CPU busy, recorder restarted during cooldown, then gone
        let host = ScriptedHost::new(&[false, true, false], &[80.0, 20.0]);
        let mut gate = ResourceGate::new(&cfg, host);

        let report = gate.await_clearance().await;

        assert_eq!(report.process_polls, 3);
        assert_eq!(report.cpu_samples, 2);
        assert_eq!(report.cooldowns, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_process_wait_bound() {
        let mut cfg = gate_config(true, 50.0);
        cfg.max_process_wait_secs = Some(100);
        let mut gate = ResourceGate::new(&cfg, ScriptedHost::new(&[true], &[1.0]));

        let report = gate.await_clearance().await;

        assert!(report.process_wait_abandoned);
        assert_eq!(report.cpu_samples, 1);
        // polls are 30..40s apart, so the bound is seen on the 4th or 5th poll
        assert!(report.process_polls >= 3 && report.process_polls <= 5);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Jitter added to the poll interval stays within [0, jitter_max]
        #[test]
        fn test_poll_delay_jitter_bounds(interval in 0u64..120_000, jitter in 0u64..120_000) {
            let interval = Duration::from_millis(interval);
            let jitter_max = Duration::from_millis(jitter);
            let delay = poll_delay(interval, jitter_max, &mut rand::thread_rng());
            prop_assert!(delay >= interval);
            prop_assert!(delay - interval <= jitter_max);
        }
    }

    #[test]
    fn test_poll_delay_saturates_on_huge_values() {
        let delay = poll_delay(Duration::MAX, Duration::from_secs(u64::MAX), &mut rand::thread_rng());
        assert_eq!(delay, Duration::MAX);

        let delay = poll_delay(Duration::from_secs(1), Duration::MAX, &mut rand::thread_rng());
        assert!(delay >= Duration::from_secs(1));
    }
}
