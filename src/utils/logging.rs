use log::{log_enabled, Level};
use std::time::Instant;

/// Scoped timer emitting trace-level timings for pipeline phases.
pub struct ScopedTimer<'a> {
    label: &'a str,
    start: Instant,
}

impl<'a> ScopedTimer<'a> {
    pub fn new(label: &'a str) -> Self {
        Self {
            label,
            start: Instant::now(),
        }
    }
}

impl<'a> Drop for ScopedTimer<'a> {
    fn drop(&mut self) {
        if log_enabled!(Level::Trace) {
            let elapsed = self.start.elapsed();
            log::trace!("{} took {} us", self.label, elapsed.as_micros());
        }
    }
}
