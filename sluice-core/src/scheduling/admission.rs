//! Global admission control across destination pools.
//!
//! [`Admission`] is the bookkeeping half of the client's driver task. It
//! tracks, per pool, how many requests are queued (`pending`) and executing
//! (`active`), the pool's slot capacity and its best queued priority. Pools
//! that have queued work and spare capacity sit in an [`IndexedHeap`] keyed by
//! that priority. [`Admission::admit`] hands out execution grants from the top
//! of the heap until the global limit is reached.
//!
//! A granted pool leaves the heap until it reports its new best priority with
//! [`Admission::report_priority`], so a pool is never ranked by a request it
//! has already started.
//!
//! Invariant: `in_flight` always equals the sum of `active` over all pools and
//! never exceeds the global limit.

use std::collections::HashMap;
use std::hash::Hash;

use crate::domain::priority::Priority;
use crate::scheduling::indexed_heap::{HeapIndex, IndexedHeap};

/// Point-in-time view of one pool's scheduling state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSnapshot {
    /// Requests queued in the pool and not yet granted.
    pub pending: usize,
    /// Requests granted and still executing.
    pub active: usize,
    /// Connection slot capacity last reported by the pool.
    pub capacity: usize,
    /// Best queued priority last reported by the pool.
    pub priority: Priority,
    /// Whether the pool is currently waiting in the admission heap.
    pub queued: bool,
    /// Whether the pool was granted and has not reported since.
    pub awaiting_report: bool,
}

#[derive(Debug)]
struct PoolState {
    pending: usize,
    active: usize,
    capacity: usize,
    priority: Priority,
    seq: u64,
    position: Option<usize>,
    awaiting_report: bool,
}

impl PoolState {
    fn eligible(&self) -> bool {
        self.pending > 0 && self.active < self.capacity && !self.awaiting_report
    }
}

#[derive(Debug)]
struct PoolTable<Id> {
    states: HashMap<Id, PoolState>,
}

impl<Id: Copy + Eq + Hash> HeapIndex<Id> for PoolTable<Id> {
    type Key = (Priority, u64);

    fn key(&self, id: Id) -> Self::Key {
        self.states
            .get(&id)
            .map_or((Priority::MAX, u64::MAX), |s| (s.priority, s.seq))
    }

    fn set_position(&mut self, id: Id, position: Option<usize>) {
        if let Some(state) = self.states.get_mut(&id) {
            state.position = position;
        }
    }
}

/// Admission state for all pools of one client.
#[derive(Debug)]
pub struct Admission<Id> {
    global_limit: usize,
    in_flight: usize,
    next_seq: u64,
    table: PoolTable<Id>,
    heap: IndexedHeap<Id>,
}

impl<Id: Copy + Eq + Hash> Admission<Id> {
    /// Creates admission state allowing at most `global_limit` concurrent
    /// executions. A limit of zero is raised to one.
    pub fn new(global_limit: usize) -> Self {
        Self {
            global_limit: global_limit.max(1),
            in_flight: 0,
            next_seq: 0,
            table: PoolTable {
                states: HashMap::new(),
            },
            heap: IndexedHeap::new(),
        }
    }

    /// The global concurrency limit.
    pub fn global_limit(&self) -> usize {
        self.global_limit
    }

    /// Number of granted executions that have not completed.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Number of pools waiting for a grant.
    pub fn waiting_pools(&self) -> usize {
        self.heap.len()
    }

    /// A pool queued one more request; `priority` is its best queued priority.
    pub fn report_pending(&mut self, id: Id, priority: Priority, capacity: usize) {
        let state = self.state_mut(id);
        state.pending += 1;
        state.priority = priority;
        state.capacity = capacity;
        self.reevaluate(id);
    }

    /// A granted pool started its request; `priority` is its best remaining
    /// queued priority, `None` when nothing is left. Makes the pool eligible
    /// again.
    pub fn report_priority(&mut self, id: Id, priority: Option<Priority>, capacity: usize) {
        let state = self.state_mut(id);
        state.priority = priority.unwrap_or(Priority::MAX);
        state.capacity = capacity;
        state.awaiting_report = false;
        self.reevaluate(id);
    }

    /// A granted execution finished, successfully or not.
    pub fn report_completed(&mut self, id: Id, capacity: usize) {
        let state = self.state_mut(id);
        if state.active == 0 {
            return;
        }
        state.active -= 1;
        state.capacity = capacity;
        self.in_flight = self.in_flight.saturating_sub(1);
        self.reevaluate(id);
    }

    /// A pool's slot capacity changed.
    pub fn report_capacity(&mut self, id: Id, capacity: usize) {
        self.state_mut(id).capacity = capacity;
        self.reevaluate(id);
    }

    /// Grants executions until the global limit is reached or no pool is
    /// eligible. Returns one id per grant, in grant order. A pool is granted
    /// at most once per report.
    pub fn admit(&mut self) -> Vec<Id> {
        let mut granted = Vec::new();
        while self.in_flight < self.global_limit {
            let Some(id) = self.heap.pop(&mut self.table) else {
                break;
            };
            let state = self.state_mut(id);
            state.pending -= 1;
            state.active += 1;
            state.awaiting_report = true;
            self.in_flight += 1;
            granted.push(id);
            self.reevaluate(id);
        }
        granted
    }

    /// Scheduling state of one pool, if it has ever reported.
    pub fn snapshot(&self, id: Id) -> Option<PoolSnapshot> {
        self.table.states.get(&id).map(|s| PoolSnapshot {
            pending: s.pending,
            active: s.active,
            capacity: s.capacity,
            priority: s.priority,
            queued: s.position.is_some(),
            awaiting_report: s.awaiting_report,
        })
    }

    /// Scheduling state of every known pool.
    pub fn snapshots(&self) -> impl Iterator<Item = (Id, PoolSnapshot)> + '_ {
        self.table
            .states
            .keys()
            .filter_map(move |id| self.snapshot(*id).map(|s| (*id, s)))
    }

    fn state_mut(&mut self, id: Id) -> &mut PoolState {
        self.table.states.entry(id).or_insert(PoolState {
            pending: 0,
            active: 0,
            capacity: 1,
            priority: Priority::MAX,
            seq: 0,
            position: None,
            awaiting_report: false,
        })
    }

    /// Takes the pool out of the heap and puts it back if it is eligible, so
    /// its key reflects the latest report.
    fn reevaluate(&mut self, id: Id) {
        let Some(state) = self.table.states.get(&id) else {
            return;
        };
        let eligible = state.eligible();
        if let Some(position) = state.position {
            self.heap.remove(position, &mut self.table);
        }
        if eligible {
            if let Some(state) = self.table.states.get_mut(&id) {
                state.seq = self.next_seq;
                self.next_seq += 1;
            }
            self.heap.push(id, &mut self.table);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Admits once and answers every grant with the pool's next priority.
    fn admit_and_report(
        adm: &mut Admission<&'static str>,
        next: &[(&'static str, Option<Priority>)],
    ) -> Vec<&'static str> {
        let granted = adm.admit();
        for id in &granted {
            let priority = next.iter().find(|(p, _)| p == id).and_then(|(_, pri)| *pri);
            let capacity = adm.snapshot(*id).unwrap().capacity;
            adm.report_priority(*id, priority, capacity);
        }
        granted
    }

    #[test]
    fn grants_up_to_the_global_limit() {
        let mut adm = Admission::new(2);
        for _ in 0..3 {
            adm.report_pending("a", 10, 6);
        }
        assert_eq!(admit_and_report(&mut adm, &[("a", Some(10))]), vec!["a"]);
        assert_eq!(admit_and_report(&mut adm, &[("a", Some(10))]), vec!["a"]);
        assert_eq!(adm.in_flight(), 2);
        assert!(adm.admit().is_empty());

        adm.report_completed("a", 6);
        assert_eq!(admit_and_report(&mut adm, &[("a", None)]), vec!["a"]);
        let snap = adm.snapshot("a").unwrap();
        assert_eq!((snap.pending, snap.active), (0, 2));
        assert!(!snap.queued);
    }

    #[test]
    fn granted_pool_waits_for_its_report() {
        let mut adm = Admission::new(4);
        adm.report_pending("a", 1, 6);
        adm.report_pending("a", 1, 6);
        assert_eq!(adm.admit(), vec!["a"]);

        let snap = adm.snapshot("a").unwrap();
        assert!(snap.awaiting_report);
        assert!(!snap.queued);
        assert!(adm.admit().is_empty());

        adm.report_priority("a", Some(7), 6);
        assert_eq!(adm.snapshot("a").unwrap().priority, 7);
        assert_eq!(adm.admit(), vec!["a"]);
    }

    #[test]
    fn stale_priority_never_outranks_another_pool() {
        let mut adm = Admission::new(2);
        adm.report_pending("c", 0, 6);
        adm.report_pending("c", 0, 6);
        assert_eq!(admit_and_report(&mut adm, &[("c", Some(0))]), vec!["c"]);
        assert_eq!(admit_and_report(&mut adm, &[("c", None)]), vec!["c"]);

        // Pool a holds priorities 1 and 100, pool b holds 50.
        adm.report_pending("a", 1, 6);
        adm.report_pending("a", 1, 6);
        adm.report_pending("b", 50, 6);

        adm.report_completed("c", 6);
        assert_eq!(adm.admit(), vec!["a"]);
        adm.report_completed("c", 6);
        assert_eq!(adm.admit(), vec!["b"]);

        adm.report_priority("a", Some(100), 6);
        adm.report_priority("b", None, 6);
        assert!(adm.admit().is_empty());
        adm.report_completed("b", 6);
        assert_eq!(adm.admit(), vec!["a"]);
    }

    #[test]
    fn respects_per_pool_capacity() {
        let mut adm = Admission::new(10);
        for _ in 0..4 {
            adm.report_pending("a", 1, 2);
        }
        assert_eq!(admit_and_report(&mut adm, &[("a", Some(1))]), vec!["a"]);
        assert_eq!(admit_and_report(&mut adm, &[("a", Some(1))]), vec!["a"]);
        assert!(adm.admit().is_empty());
        assert_eq!(adm.snapshot("a").unwrap().pending, 2);
        assert_eq!(adm.waiting_pools(), 0);

        adm.report_capacity("a", 3);
        assert_eq!(adm.admit(), vec!["a"]);
    }

    #[test]
    fn most_urgent_pool_is_granted_first() {
        let mut adm = Admission::new(1);
        adm.report_pending("slow", 100, 6);
        adm.report_pending("fast", 1, 6);
        adm.report_pending("mid", 50, 6);
        assert_eq!(admit_and_report(&mut adm, &[]), vec!["fast"]);

        adm.report_completed("fast", 6);
        assert_eq!(admit_and_report(&mut adm, &[]), vec!["mid"]);
        adm.report_completed("mid", 6);
        assert_eq!(admit_and_report(&mut adm, &[]), vec!["slow"]);
    }

    #[test]
    fn pending_reports_rekey_a_waiting_pool() {
        let mut adm = Admission::new(1);
        adm.report_pending("x", 1, 6);
        assert_eq!(admit_and_report(&mut adm, &[]), vec!["x"]);

        adm.report_pending("a", 10, 6);
        adm.report_pending("b", 20, 6);
        adm.report_pending("b", 5, 6);
        adm.report_completed("x", 6);
        assert_eq!(adm.admit(), vec!["b"]);
    }

    #[test]
    fn stray_completion_is_ignored() {
        let mut adm: Admission<u8> = Admission::new(1);
        adm.report_completed(7, 1);
        assert_eq!(adm.in_flight(), 0);
    }

    #[derive(Debug, Clone)]
    enum Event {
        Submit(u8, u32),
        Complete(u8),
        Resize(u8, usize),
        Report(u8, u32),
    }

    fn event() -> impl Strategy<Value = Event> {
        prop_oneof![
            (0u8..5, 0u32..10).prop_map(|(p, pri)| Event::Submit(p, pri)),
            (0u8..5).prop_map(Event::Complete),
            (0u8..5, 1usize..4).prop_map(|(p, c)| Event::Resize(p, c)),
            (0u8..5, 0u32..10).prop_map(|(p, pri)| Event::Report(p, pri)),
        ]
    }

    proptest! {
        #[test]
        fn limits_hold_under_any_event_order(
            global in 1usize..6,
            events in proptest::collection::vec(event(), 0..200),
        ) {
            let mut adm = Admission::new(global);
            let mut capacity = [2usize; 5];

            for event in events {
                match event {
                    Event::Submit(p, pri) => adm.report_pending(p, pri, capacity[p as usize]),
                    Event::Complete(p) => adm.report_completed(p, capacity[p as usize]),
                    Event::Resize(p, c) => {
                        capacity[p as usize] = c;
                        adm.report_capacity(p, c);
                    }
                    Event::Report(p, pri) => {
                        if let Some(snap) = adm.snapshot(p).filter(|s| s.awaiting_report) {
                            let best = (snap.pending > 0).then_some(pri);
                            adm.report_priority(p, best, capacity[p as usize]);
                        }
                    }
                }

                let before: HashMap<u8, usize> =
                    adm.snapshots().map(|(id, s)| (id, s.active)).collect();
                let granted = adm.admit();
                let mut grants: HashMap<u8, usize> = HashMap::new();
                for id in granted {
                    *grants.entry(id).or_default() += 1;
                }
                for (id, n) in grants {
                    let prior = before.get(&id).copied().unwrap_or(0);
                    prop_assert!(prior + n <= capacity[id as usize]);
                }

                let snaps: Vec<(u8, PoolSnapshot)> = adm.snapshots().collect();
                let active: usize = snaps.iter().map(|(_, s)| s.active).sum();
                prop_assert_eq!(active, adm.in_flight());
                prop_assert!(adm.in_flight() <= global);
                for (_, s) in &snaps {
                    prop_assert_eq!(
                        s.queued,
                        s.pending > 0 && s.active < s.capacity && !s.awaiting_report
                    );
                    prop_assert!(!s.queued || !s.awaiting_report);
                }
                // Fixed point: spare global capacity implies nothing eligible waits.
                if adm.in_flight() < global {
                    prop_assert_eq!(adm.waiting_pools(), 0);
                }
            }
        }
    }
}
