// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! FIFO admission gate bounding how many jobs run at once.

use std::collections::BTreeSet;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct GateState {
    permits: usize,
    next_ticket: u64,
    now_serving: u64,
    withdrawn: BTreeSet<u64>,
    closed: bool,
}

impl GateState {
    /// Skips over tickets whose holders gave up before being admitted.
    fn advance(&mut self) {
        while self.withdrawn.remove(&self.now_serving) {
            self.now_serving += 1;
        }
    }
}

/// A counting semaphore with `capacity` admission slots.
///
/// Tickets are handed out in submission order and admitted in that same
/// order. Closing the gate turns every pending and future admission into a
/// refusal.
#[derive(Debug)]
pub struct AdmissionGate {
    capacity: usize,
    state: Mutex<GateState>,
    changed: Condvar,
}

impl AdmissionGate {
    /// Creates a gate with `capacity` slots (at least one).
    pub fn new(capacity: usize) -> Arc<Self> {
        let capacity = capacity.max(1);
        Arc::new(Self {
            capacity,
            state: Mutex::new(GateState {
                permits: capacity,
                next_ticket: 0,
                now_serving: 0,
                withdrawn: BTreeSet::new(),
                closed: false,
            }),
            changed: Condvar::new(),
        })
    }

    fn state(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes the next place in line.
    pub fn ticket(self: &Arc<Self>) -> Ticket {
        let mut state = self.state();
        let number = state.next_ticket;
        state.next_ticket += 1;
        Ticket {
            gate: Arc::clone(self),
            number,
            admitted: false,
        }
    }

    /// Refuses all further admissions and wakes every waiter.
    pub fn close(&self) {
        self.state().closed = true;
        self.changed.notify_all();
    }

    /// Whether the gate has been closed.
    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots currently held.
    pub fn in_use(&self) -> usize {
        self.capacity - self.state().permits
    }
}

/// A place in the admission line. Dropping it unused gives up the place.
#[derive(Debug)]
pub struct Ticket {
    gate: Arc<AdmissionGate>,
    number: u64,
    admitted: bool,
}

impl Ticket {
    /// Blocks until this ticket is at the head of the line and a slot is free.
    ///
    /// Returns `None` if the gate is closed before that happens.
    pub fn admit(mut self) -> Option<Permit> {
        let gate = Arc::clone(&self.gate);
        let mut state = gate.state();
        loop {
            if state.closed {
                return None;
            }
            if state.now_serving == self.number && state.permits > 0 {
                state.permits -= 1;
                state.now_serving += 1;
                state.advance();
                self.admitted = true;
                gate.changed.notify_all();
                return Some(Permit {
                    gate: Arc::clone(&gate),
                });
            }
            state = gate
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if self.admitted {
            return;
        }
        let mut state = self.gate.state();
        state.withdrawn.insert(self.number);
        state.advance();
        drop(state);
        self.gate.changed.notify_all();
    }
}

/// A held admission slot, released on drop.
#[derive(Debug)]
pub struct Permit {
    gate: Arc<AdmissionGate>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.gate.state().permits += 1;
        self.gate.changed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn never_admits_more_than_capacity() {
        let gate = AdmissionGate::new(3);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..12)
            .map(|_| {
                let ticket = gate.ticket();
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                thread::spawn(move || {
                    let _permit = ticket.admit().unwrap();
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(20));
                    running.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(gate.in_use(), 0);
    }

    #[test]
    fn admits_in_ticket_order() {
        let gate = AdmissionGate::new(1);
        let order = Arc::new(Mutex::new(Vec::new()));
        let first = gate.ticket().admit().unwrap();

        // Threads start in reverse, but tickets were issued in order.
        let tickets: Vec<_> = (0..4).map(|i| (i, gate.ticket())).collect();
        let handles: Vec<_> = tickets
            .into_iter()
            .rev()
            .map(|(i, ticket)| {
                let order = Arc::clone(&order);
                thread::spawn(move || {
                    let _permit = ticket.admit().unwrap();
                    order.lock().unwrap().push(i);
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        drop(first);
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn withdrawn_ticket_does_not_block_the_line() {
        let gate = AdmissionGate::new(1);
        let skipped = gate.ticket();
        let next = gate.ticket();
        drop(skipped);
        assert!(next.admit().is_some());
    }

    #[test]
    fn close_releases_waiters() {
        let gate = AdmissionGate::new(1);
        let _held = gate.ticket().admit().unwrap();
        let waiter = {
            let ticket = gate.ticket();
            thread::spawn(move || ticket.admit().is_none())
        };

        thread::sleep(Duration::from_millis(20));
        gate.close();

        assert!(waiter.join().unwrap());
        assert!(gate.is_closed());
        assert!(gate.ticket().admit().is_none());
    }
}
