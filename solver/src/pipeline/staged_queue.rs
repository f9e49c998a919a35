//! Bounded single-producer work queue with a stage barrier.
//!
//! The producer feeds one layer of anchors, then calls [`StagedQueue::end_stage`],
//! which returns only when the queue is empty **and** every consumer is parked
//! inside [`StagedQueue::dequeue`]. An empty queue alone is not enough: a
//! consumer may still be solving the last anchor it took, and the next layer
//! reads that value.
//!
//! Flow control: when the queue reaches `capacity` the producer stalls until
//! consumers drain it to `low_water`.
//!
//! ```text
//! Producing ──full──▶ Stalled ──drained──▶ Producing
//! Producing ──end_stage──▶ EndOfStage ──all idle──▶ Producing
//! Producing ──finish──▶ Finished
//! any ──abort──▶ Aborted
//! ```

use std::collections::VecDeque;
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};

use crate::error::QueueError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueuePhase {
    Producing,
    Stalled,
    EndOfStage,
    Finished,
    Aborted,
}

struct QueueState<T> {
    items: VecDeque<T>,
    phase: QueuePhase,
    producer: Option<ThreadId>,
    idle_consumers: usize,
}

pub struct StagedQueue<T> {
    consumers: usize,
    capacity: usize,
    low_water: usize,
    state: Mutex<QueueState<T>>,
    /// Consumers wait here for items or completion.
    item_ready: Condvar,
    /// The producer waits here while stalled or at a stage barrier.
    producer_wake: Condvar,
}

impl<T> StagedQueue<T> {
    /// A queue served by exactly `consumers` threads calling [`StagedQueue::dequeue`].
    pub fn new(consumers: usize, capacity: usize, low_water: usize) -> Result<Self, QueueError> {
        if consumers == 0 {
            return Err(QueueError::InvalidBounds("at least one consumer required".into()));
        }
        if capacity == 0 {
            return Err(QueueError::InvalidBounds("capacity must be at least 1".into()));
        }
        if low_water >= capacity {
            return Err(QueueError::InvalidBounds(format!(
                "low water mark {low_water} must be below capacity {capacity}"
            )));
        }
        Ok(Self {
            consumers,
            capacity,
            low_water,
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                phase: QueuePhase::Producing,
                producer: None,
                idle_consumers: 0,
            }),
            item_ready: Condvar::new(),
            producer_wake: Condvar::new(),
        })
    }

    /// Make the calling thread the queue's only producer.
    pub fn bind_producer(&self) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        if state.producer.is_some() {
            return Err(QueueError::ProducerAlreadyBound);
        }
        state.producer = Some(thread::current().id());
        Ok(())
    }

    pub fn phase(&self) -> QueuePhase {
        self.state.lock().phase
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_producer(state: &QueueState<T>, op: &'static str) -> Result<(), QueueError> {
        if state.producer != Some(thread::current().id()) {
            return Err(QueueError::NotProducer { op });
        }
        match state.phase {
            QueuePhase::Aborted => Err(QueueError::Aborted),
            QueuePhase::Finished => Err(QueueError::Finished),
            _ => Ok(()),
        }
    }

    /// Add an item, stalling while the queue is full.
    pub fn enqueue(&self, item: T) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        Self::check_producer(&state, "enqueue")?;

        if state.items.len() >= self.capacity {
            state.phase = QueuePhase::Stalled;
            while state.phase == QueuePhase::Stalled && state.items.len() > self.low_water {
                self.producer_wake.wait(&mut state);
            }
            if state.phase == QueuePhase::Aborted {
                return Err(QueueError::Aborted);
            }
            state.phase = QueuePhase::Producing;
        }

        state.items.push_back(item);
        self.item_ready.notify_one();
        Ok(())
    }

    /// Block until every queued item has been taken and every consumer is idle.
    pub fn end_stage(&self) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        Self::check_producer(&state, "end_stage")?;

        state.phase = QueuePhase::EndOfStage;
        while state.phase == QueuePhase::EndOfStage && !self.stage_drained(&state) {
            self.producer_wake.wait(&mut state);
        }
        if state.phase == QueuePhase::Aborted {
            return Err(QueueError::Aborted);
        }
        state.phase = QueuePhase::Producing;
        Ok(())
    }

    /// No more items: consumers drain what is queued, then get `None`.
    pub fn finish(&self) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        Self::check_producer(&state, "finish")?;
        state.phase = QueuePhase::Finished;
        self.item_ready.notify_all();
        Ok(())
    }

    /// Wake everyone and fail all further producer calls. Callable from any thread.
    pub fn abort(&self) {
        let mut state = self.state.lock();
        if state.phase == QueuePhase::Aborted {
            return;
        }
        state.phase = QueuePhase::Aborted;
        state.items.clear();
        self.item_ready.notify_all();
        self.producer_wake.notify_all();
    }

    /// Next item, or `None` once the queue is finished and empty or aborted.
    pub fn dequeue(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if state.phase == QueuePhase::Aborted {
                return None;
            }
            if let Some(item) = state.items.pop_front() {
                if state.phase == QueuePhase::Stalled && state.items.len() <= self.low_water {
                    self.producer_wake.notify_one();
                }
                return Some(item);
            }
            if state.phase == QueuePhase::Finished {
                return None;
            }

            state.idle_consumers += 1;
            if state.phase == QueuePhase::EndOfStage && self.stage_drained(&state) {
                self.producer_wake.notify_one();
            }
            self.item_ready.wait(&mut state);
            state.idle_consumers -= 1;
        }
    }

    fn stage_drained(&self, state: &QueueState<T>) -> bool {
        state.items.is_empty() && state.idle_consumers == self.consumers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    fn wait_for(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn bounds_are_validated() {
        assert!(StagedQueue::<u32>::new(0, 4, 1).is_err());
        assert!(StagedQueue::<u32>::new(1, 0, 0).is_err());
        assert!(StagedQueue::<u32>::new(1, 4, 4).is_err());
        assert!(StagedQueue::<u32>::new(1, 4, 3).is_ok());
    }

    #[test]
    fn producer_operations_require_the_bound_thread() {
        let q = StagedQueue::new(1, 4, 1).unwrap();
        assert_eq!(q.enqueue(1), Err(QueueError::NotProducer { op: "enqueue" }));

        q.bind_producer().unwrap();
        assert_eq!(q.bind_producer(), Err(QueueError::ProducerAlreadyBound));
        q.enqueue(1).unwrap();

        thread::scope(|s| {
            s.spawn(|| {
                assert_eq!(q.enqueue(2), Err(QueueError::NotProducer { op: "enqueue" }));
                assert_eq!(q.end_stage(), Err(QueueError::NotProducer { op: "end_stage" }));
                assert_eq!(q.finish(), Err(QueueError::NotProducer { op: "finish" }));
            });
        });
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn full_queue_stalls_until_low_water() {
        let q = StagedQueue::new(1, 4, 1).unwrap();
        thread::scope(|s| {
            s.spawn(|| {
                q.bind_producer().unwrap();
                for i in 0..10u32 {
                    q.enqueue(i).unwrap();
                }
                q.finish().unwrap();
            });

            wait_for(|| q.phase() == QueuePhase::Stalled);
            assert_eq!(q.len(), 4);

            let mut seen = Vec::new();
            while let Some(i) = q.dequeue() {
                seen.push(i);
            }
            assert_eq!(seen, (0..10).collect::<Vec<_>>());
        });
    }

    #[test]
    fn end_stage_waits_for_in_flight_items() {
        let consumers = 3;
        let q = StagedQueue::new(consumers, 8, 2).unwrap();
        let done = AtomicUsize::new(0);
        thread::scope(|s| {
            for _ in 0..consumers {
                s.spawn(|| {
                    while q.dequeue().is_some() {
                        thread::sleep(Duration::from_micros(200));
                        done.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }

            q.bind_producer().unwrap();
            for stage in 1..=3 {
                for i in 0..25 {
                    q.enqueue(i).unwrap();
                }
                q.end_stage().unwrap();
                assert_eq!(done.load(Ordering::SeqCst), 25 * stage);
                assert_eq!(q.phase(), QueuePhase::Producing);
            }
            q.finish().unwrap();
        });
    }

    #[test]
    fn abort_wakes_producer_and_consumers() {
        // two consumers declared, one running: end_stage can only end by abort
        let q = StagedQueue::new(2, 4, 1).unwrap();
        thread::scope(|s| {
            let consumer = s.spawn(|| {
                let mut taken = 0;
                while let Some(item) = q.dequeue() {
                    taken += 1;
                    if item == "boom" {
                        q.abort();
                    }
                }
                taken
            });

            q.bind_producer().unwrap();
            q.enqueue("ok").unwrap();
            q.enqueue("boom").unwrap();
            assert_eq!(q.end_stage(), Err(QueueError::Aborted));
            assert_eq!(q.enqueue("late"), Err(QueueError::Aborted));
            assert_eq!(consumer.join().unwrap(), 2);
        });
        assert_eq!(q.phase(), QueuePhase::Aborted);
        assert_eq!(q.dequeue(), None);
    }

    #[test]
    fn finish_drains_before_none() {
        let q = StagedQueue::new(1, 8, 0).unwrap();
        q.bind_producer().unwrap();
        for i in 0..5 {
            q.enqueue(i).unwrap();
        }
        q.finish().unwrap();
        assert_eq!(q.enqueue(9), Err(QueueError::Finished));
        let drained: Vec<i32> = std::iter::from_fn(|| q.dequeue()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
    }
}
