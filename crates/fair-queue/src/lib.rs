//! Round-robin fair scheduling queue.
//!
//! Orders pending items across distinct submitters so that no single
//! submitter can monopolize the head of the queue: lanes are served
//! round-robin while each lane preserves its own submission order.

use std::collections::VecDeque;

/// Identifies which fairness lane an item belongs to.
pub trait Submitter {
    /// Stable identity of the item's submitter.
    fn submitter(&self) -> u64;
}

struct Lane<T> {
    submitter: u64,
    items: VecDeque<T>,
}

/// Fairness-ordered queue over per-submitter lanes.
///
/// ## Ordering
/// - Lanes are served round-robin: serving a lane rotates it to the back,
///   so the least-recently-served lane is always next.
/// - Within one lane, items keep submission order (FIFO).
/// - An emptied lane leaves the rotation; a later add re-creates it at the
///   back rather than restoring its old position.
/// - [`FairQueue::push_front`] bypasses fairness for the very next pull;
///   everything behind it keeps the fair interleave.
///
/// Lanes are never stored empty.
pub struct FairQueue<T: Submitter> {
    /// Items forced ahead of all lanes ("play next" overrides).
    front: VecDeque<T>,
    /// Lanes in rotation order; index 0 is served next.
    lanes: Vec<Lane<T>>,
}

impl<T: Submitter> FairQueue<T> {
    pub fn new() -> Self {
        Self {
            front: VecDeque::new(),
            lanes: Vec::new(),
        }
    }

    /// Append `item` to its submitter's lane.
    ///
    /// Returns the 1-based position at which the item will be pulled under
    /// the current fairness order, assuming no further mutation.
    pub fn add(&mut self, item: T) -> usize {
        let submitter = item.submitter();
        let lane_idx = match self.lanes.iter().position(|l| l.submitter == submitter) {
            Some(idx) => {
                self.lanes[idx].items.push_back(item);
                idx
            }
            None => {
                let mut items = VecDeque::new();
                items.push_back(item);
                self.lanes.push(Lane { submitter, items });
                self.lanes.len() - 1
            }
        };
        self.fair_position(lane_idx)
    }

    /// Force `item` to be returned by the very next [`FairQueue::pull`],
    /// ahead of every lane.
    pub fn push_front(&mut self, item: T) {
        self.front.push_front(item);
    }

    /// Remove and return the next item in fairness order.
    pub fn pull(&mut self) -> Option<T> {
        if let Some(item) = self.front.pop_front() {
            return Some(item);
        }
        if self.lanes.is_empty() {
            return None;
        }
        let item = self.lanes[0].items.pop_front();
        if self.lanes[0].items.is_empty() {
            self.lanes.remove(0);
        } else {
            self.lanes.rotate_left(1);
        }
        item
    }

    pub fn is_empty(&self) -> bool {
        self.front.is_empty() && self.lanes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.front.len() + self.lanes.iter().map(|l| l.items.len()).sum::<usize>()
    }

    /// Drop all entries regardless of lane.
    pub fn clear(&mut self) {
        self.front.clear();
        self.lanes.clear();
    }

    /// The exact sequence repeated [`FairQueue::pull`] calls would produce,
    /// without mutating the queue.
    pub fn ordered(&self) -> Vec<&T> {
        let mut out: Vec<&T> = self.front.iter().collect();
        let total = self.len();
        let mut cursors = vec![0usize; self.lanes.len()];
        while out.len() < total {
            for (idx, lane) in self.lanes.iter().enumerate() {
                if cursors[idx] < lane.items.len() {
                    out.push(&lane.items[cursors[idx]]);
                    cursors[idx] += 1;
                }
            }
        }
        out
    }

    /// Remove and return the item at `index` in fairness order (0-based,
    /// matching [`FairQueue::ordered`]).
    pub fn remove(&mut self, index: usize) -> Option<T> {
        if index < self.front.len() {
            return self.front.remove(index);
        }
        let (lane_idx, item_idx) = self.locate(index - self.front.len())?;
        let item = self.lanes[lane_idx].items.remove(item_idx);
        if self.lanes[lane_idx].items.is_empty() {
            self.lanes.remove(lane_idx);
        }
        item
    }

    /// Drop every entry from `submitter`, returning how many were removed.
    pub fn remove_all(&mut self, submitter: u64) -> usize {
        let before = self.len();
        self.front.retain(|item| item.submitter() != submitter);
        if let Some(idx) = self.lanes.iter().position(|l| l.submitter == submitter) {
            self.lanes.remove(idx);
        }
        before - self.len()
    }

    /// Simulate repeated pulls until the tail item of `lane_idx` surfaces.
    ///
    /// The simulation is the authoritative definition of the fairness order,
    /// so the returned position always matches what `pull` would do.
    fn fair_position(&self, lane_idx: usize) -> usize {
        let mut remaining: Vec<usize> = self.lanes.iter().map(|l| l.items.len()).collect();
        let target = remaining[lane_idx];
        let mut served = 0usize;
        let mut position = self.front.len();
        loop {
            for (idx, left) in remaining.iter_mut().enumerate() {
                if *left == 0 {
                    continue;
                }
                *left -= 1;
                position += 1;
                if idx == lane_idx {
                    served += 1;
                    if served == target {
                        return position;
                    }
                }
            }
        }
    }

    /// Map a fairness-order offset (past the forced-front items) to a
    /// `(lane, item)` coordinate.
    fn locate(&self, mut slot: usize) -> Option<(usize, usize)> {
        let lane_total: usize = self.lanes.iter().map(|l| l.items.len()).sum();
        if slot >= lane_total {
            return None;
        }
        let mut cursors = vec![0usize; self.lanes.len()];
        loop {
            for (idx, lane) in self.lanes.iter().enumerate() {
                if cursors[idx] < lane.items.len() {
                    if slot == 0 {
                        return Some((idx, cursors[idx]));
                    }
                    slot -= 1;
                    cursors[idx] += 1;
                }
            }
        }
    }
}

impl<T: Submitter> Default for FairQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
