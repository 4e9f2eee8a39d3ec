//! CPU-side frame timing.
//!
//! GPU timestamps live with the backend that supports them; this ring keeps
//! the host-visible frame numbers the renderer reports regardless of which
//! backend is active.

use std::collections::VecDeque;
use std::time::Instant;

use log::debug;

pub struct FrameProfiler {
    samples: VecDeque<f32>,
    capacity: usize,
    frame_start: Option<Instant>,
}

impl Default for FrameProfiler {
    fn default() -> Self {
        Self::new(64)
    }
}

impl FrameProfiler {
    /// Keep a rolling window of the most recent `capacity` frame times.
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            frame_start: None,
        }
    }

    pub fn begin_frame(&mut self) {
        self.frame_start = Some(Instant::now());
    }

    /// Close the frame scope and return its duration in milliseconds.
    /// Without a matching `begin_frame` this is a no-op.
    pub fn end_frame(&mut self) -> Option<f32> {
        let start = self.frame_start.take()?;
        let ms = start.elapsed().as_secs_f32() * 1000.0;
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(ms);
        Some(ms)
    }

    pub fn last_frame_ms(&self) -> Option<f32> {
        self.samples.back().copied()
    }

    pub fn average_frame_ms(&self) -> Option<f32> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f32>() / self.samples.len() as f32)
    }

    /// Time a named scope and log it at debug level.
    pub fn scope<T>(&mut self, label: &str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        debug!("{}: {:.3} ms", label, start.elapsed().as_secs_f32() * 1000.0);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_without_begin_is_a_noop() {
        let mut profiler = FrameProfiler::new(4);
        assert_eq!(profiler.end_frame(), None);
        assert_eq!(profiler.last_frame_ms(), None);
    }

    #[test]
    fn frame_times_accumulate_into_the_window() {
        let mut profiler = FrameProfiler::new(2);
        for _ in 0..3 {
            profiler.begin_frame();
            profiler.end_frame().unwrap();
        }
        // Window keeps only the newest two samples.
        assert_eq!(profiler.samples.len(), 2);
        assert!(profiler.average_frame_ms().is_some());
    }

    #[test]
    fn scope_passes_the_result_through() {
        let mut profiler = FrameProfiler::default();
        let v = profiler.scope("work", || 41 + 1);
        assert_eq!(v, 42);
    }
}
