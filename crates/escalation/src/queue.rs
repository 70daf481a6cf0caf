//! Bounded FIFO of call runs between the gate and the dial worker.
//!
//! Pushing never blocks: when the queue is full the oldest pending run is
//! evicted and handed back to the caller, mirroring the audit log's FIFO
//! eviction.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::request::CallRun;

struct QueueState {
    runs: VecDeque<CallRun>,
    closed: bool,
}

pub struct RunQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
}

impl RunQueue {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                runs: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a run. Returns the evicted oldest run when the queue was full.
    pub fn push(&self, run: CallRun) -> Option<CallRun> {
        let dropped = {
            let mut state = self.state.lock().expect("run queue lock poisoned");
            let dropped = if state.runs.len() >= self.capacity {
                state.runs.pop_front()
            } else {
                None
            };
            state.runs.push_back(run);
            dropped
        };
        self.notify.notify_one();
        dropped
    }

    /// Next run in FIFO order. Waits while the queue is empty; `None` once it
    /// is closed and drained.
    pub async fn pop(&self) -> Option<CallRun> {
        loop {
            {
                let mut state = self.state.lock().expect("run queue lock poisoned");
                if let Some(run) = state.runs.pop_front() {
                    return Some(run);
                }
                if state.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// After closing, `pop` returns what is left and then `None`.
    pub fn close(&self) {
        self.state.lock().expect("run queue lock poisoned").closed = true;
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().expect("run queue lock poisoned").closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("run queue lock poisoned").runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use tokio::time::Instant;
    use vigil_core::AlertCondition;

    use crate::request::EscalationRequest;

    fn run(seq: u64) -> CallRun {
        let request = EscalationRequest {
            seq,
            condition: AlertCondition::fall_detected(0.9, Utc::now()),
            received_at: Instant::now(),
        };
        CallRun::new(request, Arc::from(vec!["111".to_string()]))
    }

    #[tokio::test]
    async fn pops_in_push_order() {
        let queue = RunQueue::new(4);
        for seq in 1..=3 {
            assert!(queue.push(run(seq)).is_none());
        }
        assert_eq!(queue.pop().await.map(|r| r.seq), Some(1));
        assert_eq!(queue.pop().await.map(|r| r.seq), Some(2));
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn full_queue_evicts_oldest() {
        let queue = RunQueue::new(2);
        queue.push(run(1));
        queue.push(run(2));
        let dropped = queue.push(run(3));

        assert_eq!(dropped.map(|r| r.seq), Some(1));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().await.map(|r| r.seq), Some(2));
    }

    #[tokio::test]
    async fn closed_queue_drains_then_ends() {
        let queue = RunQueue::new(2);
        queue.push(run(1));
        queue.close();

        assert_eq!(queue.pop().await.map(|r| r.seq), Some(1));
        assert!(queue.pop().await.is_none());
    }

    #[tokio::test]
    async fn waiting_pop_wakes_on_push() {
        let queue = Arc::new(RunQueue::new(2));
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await.map(|r| r.seq) })
        };
        tokio::task::yield_now().await;
        queue.push(run(7));
        assert_eq!(waiter.await.unwrap(), Some(7));
    }

    #[test]
    fn zero_capacity_holds_one() {
        let queue = RunQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        queue.push(run(1));
        assert_eq!(queue.push(run(2)).map(|r| r.seq), Some(1));
    }
}
