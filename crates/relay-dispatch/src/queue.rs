//! Bounded priority queue
//!
//! Four FIFO lanes (urgent, high, normal, low) plus a delay heap for tasks
//! whose `earliest_send_at` is in the future. Capacity covers everything
//! held, delayed tasks included. Poppers always receive the highest-priority
//! ready task; within a lane, arrival order.
//!
//! Pushers and poppers contend on one short mutex; waiting happens outside
//! it on a `Notify`.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::Mutex;
use std::time::Instant;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::task::DispatchTask;

#[cfg(test)]
#[path = "queue_test.rs"]
mod tests;

pub struct PriorityQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    capacity: usize,
}

struct Inner {
    lanes: [VecDeque<DispatchTask>; 4],
    delayed: BinaryHeap<Reverse<Delayed>>,
    len: usize,
    seq: u64,
    closed: bool,
}

/// Heap entry ordered by wake time, then insertion order
struct Delayed {
    at: Instant,
    seq: u64,
    task: DispatchTask,
}

impl PartialEq for Delayed {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}
impl Eq for Delayed {}
impl PartialOrd for Delayed {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Delayed {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.at.cmp(&other.at).then(self.seq.cmp(&other.seq))
    }
}

/// Push failure, handing the task back
#[derive(Debug)]
pub enum PushError {
    Full(DispatchTask),
    Closed(DispatchTask),
}

impl PriorityQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                lanes: Default::default(),
                delayed: BinaryHeap::new(),
                len: 0,
                seq: 0,
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Accept a task, or hand it back when full/closed
    pub fn push(&self, task: DispatchTask) -> Result<(), PushError> {
        {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if inner.closed {
                return Err(PushError::Closed(task));
            }
            if inner.len >= self.capacity {
                return Err(PushError::Full(task));
            }

            if task.is_ready(Instant::now()) {
                inner.lanes[task.priority.lane()].push_back(task);
            } else {
                let seq = inner.seq;
                inner.seq += 1;
                inner.delayed.push(Reverse(Delayed {
                    at: task.earliest_send_at,
                    seq,
                    task,
                }));
            }
            inner.len += 1;
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Pop the highest-priority ready task, waiting as needed
    ///
    /// Returns `None` once `cancel` fires, or when the queue is closed and
    /// drained empty.
    pub async fn pop(&self, cancel: &CancellationToken) -> Option<DispatchTask> {
        loop {
            let wait_until = {
                let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
                let now = Instant::now();

                // Promote delayed tasks whose time has come
                loop {
                    match inner.delayed.peek() {
                        Some(Reverse(head)) if head.at <= now => {}
                        _ => break,
                    }
                    if let Some(Reverse(d)) = inner.delayed.pop() {
                        inner.lanes[d.task.priority.lane()].push_back(d.task);
                    }
                }

                let lane_hit = (0..4).find(|&lane| !inner.lanes[lane].is_empty());
                if let Some(lane) = lane_hit {
                    let task = inner.lanes[lane].pop_front();
                    inner.len -= 1;
                    return task;
                }

                if inner.closed {
                    return None;
                }
                inner.delayed.peek().map(|Reverse(d)| d.at)
            };

            let sleep_task = async {
                match wait_until {
                    Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = self.notify.notified() => {}
                _ = sleep_task => {}
                _ = cancel.cancelled() => return None,
            }
        }
    }

    /// Stop accepting pushes; poppers drain what remains
    pub fn close(&self) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).closed = true;
        self.notify.notify_waiters();
    }

    /// Drop everything still queued, returning how many tasks were abandoned
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let dropped = inner.len;
        for lane in &mut inner.lanes {
            lane.clear();
        }
        inner.delayed.clear();
        inner.len = 0;
        dropped
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Ready-task depth per priority lane, highest first, plus delayed count
    pub fn depths(&self) -> ([usize; 4], usize) {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let lanes = [
            inner.lanes[0].len(),
            inner.lanes[1].len(),
            inner.lanes[2].len(),
            inner.lanes[3].len(),
        ];
        (lanes, inner.delayed.len())
    }

    /// Fraction of capacity in use
    pub fn fill_ratio(&self) -> f64 {
        self.len() as f64 / self.capacity.max(1) as f64
    }
}
