use std::time::{Duration, Instant};

use crate::config::RunConfig;

/// Optional bounds on a run. `None` means unbounded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopConfig {
    pub max_iterations: Option<u32>,
    pub max_duration: Option<Duration>,
    pub max_failures: Option<u32>,
}

impl LoopConfig {
    pub fn from_run_config(run: &RunConfig) -> Self {
        let nonzero = |v: u32| (v > 0).then_some(v);
        Self {
            max_iterations: nonzero(run.max_iterations),
            max_duration: nonzero(run.max_duration_minutes)
                .map(|m| Duration::from_secs(u64::from(m) * 60)),
            max_failures: nonzero(run.max_consecutive_failures),
        }
    }
}

/// Tracks one run against its `LoopConfig`. Reset on every START.
pub struct LoopController {
    config: LoopConfig,
    start_time: Instant,
    iterations: u32,
    failure_count: u32,
}

impl LoopController {
    pub fn new(config: LoopConfig) -> Self {
        Self {
            config,
            start_time: Instant::now(),
            iterations: 0,
            failure_count: 0,
        }
    }

    pub fn reset(&mut self) {
        self.start_time = Instant::now();
        self.iterations = 0;
        self.failure_count = 0;
    }

    /// Counts a started iteration and returns its 1-based turn number.
    pub fn begin_iteration(&mut self) -> u32 {
        self.iterations += 1;
        self.iterations
    }

    pub fn record_failure(&mut self) {
        self.failure_count += 1;
    }

    pub fn record_success(&mut self) {
        self.failure_count = 0;
    }

    /// Reason to end the run before the next iteration, if any limit is hit.
    pub fn limit_reached(&self) -> Option<String> {
        if let Some(max) = self.config.max_iterations {
            if self.iterations >= max {
                return Some(format!("{max} iterations"));
            }
        }
        if let Some(max) = self.config.max_duration {
            if self.start_time.elapsed() >= max {
                return Some(format!("{}s elapsed", max.as_secs()));
            }
        }
        if let Some(max) = self.config.max_failures {
            if self.failure_count >= max {
                return Some(format!("{max} consecutive execution failures"));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_means_unbounded() {
        let config = LoopConfig::from_run_config(&RunConfig::default());
        assert_eq!(config, LoopConfig::default());

        let mut ctrl = LoopController::new(config);
        for _ in 0..1000 {
            ctrl.begin_iteration();
            ctrl.record_failure();
        }
        assert_eq!(ctrl.limit_reached(), None);
    }

    #[test]
    fn iteration_limit() {
        let mut ctrl = LoopController::new(LoopConfig { max_iterations: Some(2), ..Default::default() });
        assert_eq!(ctrl.begin_iteration(), 1);
        assert!(ctrl.limit_reached().is_none());
        assert_eq!(ctrl.begin_iteration(), 2);
        assert_eq!(ctrl.limit_reached().as_deref(), Some("2 iterations"));

        ctrl.reset();
        assert!(ctrl.limit_reached().is_none());
    }

    #[test]
    fn failures_must_be_consecutive() {
        let mut ctrl = LoopController::new(LoopConfig { max_failures: Some(2), ..Default::default() });
        ctrl.record_failure();
        ctrl.record_success();
        ctrl.record_failure();
        assert!(ctrl.limit_reached().is_none());
        ctrl.record_failure();
        assert!(ctrl.limit_reached().is_some());
    }

    #[test]
    fn duration_limit() {
        let ctrl = LoopController::new(LoopConfig { max_duration: Some(Duration::ZERO), ..Default::default() });
        assert!(ctrl.limit_reached().is_some());
    }
}
