//! Cooperative background work.
//!
//! A job is stepped until it reports [`JobStatus::Done`]. Each step gets
//! exclusive access to the model, so a job can evaluate a chunk of cells
//! and yield. Every state change is reported as a [`JobEvent`].

use std::collections::VecDeque;

use crate::events::JobEvent;
use crate::model::Model;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// More work left; step again
    Continue,
    Done,
}

pub trait Job {
    fn name(&self) -> &str;
    fn step(&mut self, model: &mut Model) -> JobStatus;
}

/// A queued job with its id and whether it has been started.
pub(crate) struct QueuedJob {
    pub id: u64,
    pub started: bool,
    pub job: Box<dyn Job>,
}

/// FIFO of pending jobs.
#[derive(Default)]
pub struct JobQueue {
    queue: VecDeque<QueuedJob>,
    next_id: u64,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a job and return its `Queued` event.
    pub fn push(&mut self, job: Box<dyn Job>) -> JobEvent {
        self.next_id += 1;
        let event = JobEvent::Queued {
            id: self.next_id,
            name: job.name().to_string(),
        };
        self.queue.push_back(QueuedJob {
            id: self.next_id,
            started: false,
            job,
        });
        event
    }

    pub(crate) fn pop(&mut self) -> Option<QueuedJob> {
        self.queue.pop_front()
    }

    /// Put a yielded job back at the front so it keeps its turn.
    pub(crate) fn resume(&mut self, job: QueuedJob) {
        self.queue.push_front(job);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Full re-evaluation of the workbook, `chunk_size` cells per step.
pub struct RecomputeJob {
    chunk_size: usize,
    reset: bool,
}

impl RecomputeJob {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            reset: false,
        }
    }
}

impl Job for RecomputeJob {
    fn name(&self) -> &str {
        "recompute"
    }

    fn step(&mut self, model: &mut Model) -> JobStatus {
        let first = !self.reset;
        self.reset = true;
        let remaining = model.recompute_chunk(first, self.chunk_size);
        if remaining == 0 {
            JobStatus::Done
        } else {
            JobStatus::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Countdown(usize);

    impl Job for Countdown {
        fn name(&self) -> &str {
            "countdown"
        }

        fn step(&mut self, _: &mut Model) -> JobStatus {
            self.0 = self.0.saturating_sub(1);
            if self.0 == 0 {
                JobStatus::Done
            } else {
                JobStatus::Continue
            }
        }
    }

    #[test]
    fn test_job_lifecycle_events() {
        let mut model = Model::new();
        model.drain_events();
        model.run_job(Box::new(Countdown(3)));

        let events = model.drain_events();
        let jobs: Vec<&JobEvent> = events
            .iter()
            .filter_map(|e| match e {
                crate::events::ModelEvent::Job(j) => Some(j),
                _ => None,
            })
            .collect();
        assert!(matches!(jobs[0], JobEvent::Queued { name, .. } if name == "countdown"));
        assert!(matches!(jobs[1], JobEvent::Started { .. }));
        assert!(matches!(jobs[2], JobEvent::Continued { .. }));
        assert!(matches!(jobs[3], JobEvent::Continued { .. }));
        assert!(matches!(jobs[4], JobEvent::Done { .. }));
        assert_eq!(jobs.len(), 5);
    }

    #[test]
    fn test_queue_ids_increase() {
        let mut queue = JobQueue::new();
        let a = queue.push(Box::new(Countdown(1)));
        let b = queue.push(Box::new(Countdown(1)));
        assert!(matches!(a, JobEvent::Queued { id: 1, .. }));
        assert!(matches!(b, JobEvent::Queued { id: 2, .. }));
        assert_eq!(queue.len(), 2);
    }
}
