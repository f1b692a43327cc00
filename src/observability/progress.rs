//! Stage progress logging
//! Logs at every 10% step with throughput, so long runs stay visible
//! under the default `info` filter without a terminal progress bar.

use log::info;
use std::time::{Duration, Instant};

const STEP_PERCENT: usize = 10;

pub struct ProgressReporter {
    stage: &'static str,
    total: usize,
    done: usize,
    next_step: usize,
    started: Instant,
}

impl ProgressReporter {
    pub fn new(stage: &'static str, total: usize) -> Self {
        info!("{}: {} item(s) to process", stage, total);
        Self {
            stage,
            total,
            done: 0,
            next_step: STEP_PERCENT,
            started: Instant::now(),
        }
    }

    /// Record one finished item
    pub fn tick(&mut self) {
        self.done += 1;
        if self.total == 0 {
            return;
        }
        let percent = self.done * 100 / self.total;
        if percent < self.next_step {
            return;
        }
        while self.next_step <= percent {
            self.next_step += STEP_PERCENT;
        }
        info!(
            "{}: {}/{} ({}%), {:.1} items/s",
            self.stage,
            self.done,
            self.total,
            percent,
            self.rate()
        );
    }

    pub fn done(&self) -> usize {
        self.done
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn rate(&self) -> f64 {
        let secs = self.started.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.done as f64 / secs
        } else {
            0.0
        }
    }

    /// Final line with total wall time
    pub fn finish(&self) {
        info!(
            "{}: finished {} item(s) in {:.2}s",
            self.stage,
            self.done,
            self.started.elapsed().as_secs_f64()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_advance_past_large_jumps() {
        let mut progress = ProgressReporter::new("test", 3);
        progress.tick();
        assert_eq!(progress.next_step, 40);
        progress.tick();
        progress.tick();
        assert_eq!(progress.done(), 3);
        assert!(progress.next_step > 100);
    }

    #[test]
    fn empty_stage_never_divides() {
        let mut progress = ProgressReporter::new("empty", 0);
        progress.tick();
        assert_eq!(progress.done(), 1);
    }
}
