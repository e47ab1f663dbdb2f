//! GPU and CPU timing of whole frames.
//!
//! Results are kept in a small ring of timestamp query pairs. GPU results become available a few frames late, so
//! [`StatisticsCollector::statistics()`] always reports the oldest frame in the ring.

use std::time::{Duration, Instant};

use anyhow::Result;

use crate::backend::Backend;
use crate::config::MAX_FRAMES_IN_FLIGHT;

/// Timing of a recorded frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
    /// Time between the first and the last command of the frame on the GPU.
    pub gpu_time: Option<Duration>,
    /// Time at which the frame started recording.
    pub cpu_start_time: Option<Instant>,
}

#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
struct TimestampSlot<B: Backend> {
    start: B::TimestampQuery,
    end: B::TimestampQuery,
    cpu_start_time: Instant,
}

/// Ring of `MAX_FRAMES_IN_FLIGHT + 1` timestamp pairs.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub(crate) struct StatisticsCollector<B: Backend> {
    slots: Vec<Option<TimestampSlot<B>>>,
    next: usize,
}

impl<B: Backend> StatisticsCollector<B> {
    pub const SLOTS: usize = MAX_FRAMES_IN_FLIGHT + 1;

    pub fn new() -> Self {
        Self {
            slots: (0..Self::SLOTS).map(|_| None).collect(),
            next: 0,
        }
    }

    /// Claim the next slot for a frame that starts recording now. Returns its start and end queries.
    pub fn begin_frame(&mut self, backend: &B) -> Result<(&B::TimestampQuery, &B::TimestampQuery)> {
        let index = self.next;
        self.next = (self.next + 1) % Self::SLOTS;

        let slot = match self.slots[index].take() {
            Some(mut slot) => {
                slot.cpu_start_time = Instant::now();
                slot
            }
            None => TimestampSlot {
                start: backend.new_timestamp_query()?,
                end: backend.new_timestamp_query()?,
                cpu_start_time: Instant::now(),
            },
        };
        let slot = self.slots[index].insert(slot);
        Ok((&slot.start, &slot.end))
    }

    /// Timing of the oldest frame in the ring. Fields are `None` until results are available.
    pub fn statistics(&self, backend: &B) -> Statistics {
        let Some(slot) = &self.slots[self.next] else {
            return Statistics::default();
        };
        let read = |query: &B::TimestampQuery| match backend.read_timestamp(query) {
            Ok(value) => value,
            Err(err) => {
                warn!("Failed to read frame timestamp: {err}");
                None
            }
        };
        let gpu_time = match (read(&slot.start), read(&slot.end)) {
            (Some(start), Some(end)) => Some(Duration::from_nanos(end.saturating_sub(start))),
            _ => None,
        };
        Statistics {
            gpu_time,
            cpu_start_time: Some(slot.cpu_start_time),
        }
    }
}
