// Copyright The FlashQ Authors
// SPDX-License-Identifier: Apache-2.0

//! Per-tenant software queues.
//!
//! A software queue is a FIFO of cost-annotated request contexts plus the
//! tenant's token accounting: a signed credit (latency-critical tenants), a
//! saved-token stash (best-effort tenants), and the total token demand of
//! everything queued. It is owned and mutated exclusively by the tenant's
//! owning core.

use crate::request::RequestKey;
use std::collections::VecDeque;

/// One queued request: the pool key plus its cached token cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedRequest {
    /// Key of the request context in the core's pool.
    pub key: RequestKey,

    /// Token cost, fixed at submission.
    pub cost: u64,
}

/// A per-tenant FIFO with token accounting.
#[derive(Debug)]
pub struct SwQueue {
    entries: VecDeque<QueuedRequest>,
    capacity: usize,
    token_credit: i64,
    saved_tokens: u64,
    total_token_demand: u64,
}

impl SwQueue {
    /// An empty queue holding at most `capacity` requests.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
            token_credit: 0,
            saved_tokens: 0,
            total_token_demand: 0,
        }
    }

    /// Appends a request, returning it back if the queue is full.
    pub fn push_back(&mut self, entry: QueuedRequest) -> Result<(), QueuedRequest> {
        if self.entries.len() >= self.capacity {
            return Err(entry);
        }
        self.total_token_demand += entry.cost;
        self.entries.push_back(entry);
        Ok(())
    }

    /// Removes and returns the head request.
    pub fn pop_front(&mut self) -> Option<QueuedRequest> {
        let entry = self.entries.pop_front()?;
        self.total_token_demand -= entry.cost;
        Some(entry)
    }

    /// True when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of queued requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Token cost of the head request, if any.
    #[must_use]
    pub fn peek_head_cost(&self) -> Option<u64> {
        self.entries.front().map(|e| e.cost)
    }

    /// Signed token credit (latency-critical accounting).
    #[must_use]
    pub fn token_credit(&self) -> i64 {
        self.token_credit
    }

    /// Adds (or, negative, removes) credit.
    pub fn add_credit(&mut self, tokens: i64) {
        self.token_credit += tokens;
    }

    /// Charges the cost of an issued request against the credit.
    pub fn charge_credit(&mut self, cost: u64) {
        self.token_credit -= cost as i64;
    }

    /// Tokens parked with this tenant from a previous best-effort round.
    #[must_use]
    pub fn saved_tokens(&self) -> u64 {
        self.saved_tokens
    }

    /// Takes and zeroes the saved tokens.
    pub fn take_saved_tokens(&mut self) -> u64 {
        std::mem::take(&mut self.saved_tokens)
    }

    /// Parks up to `budget` tokens with this tenant, capped at its queued
    /// demand, and returns how many were parked. A tenant with an empty
    /// queue keeps nothing.
    pub fn save_tokens(&mut self, budget: u64) -> u64 {
        if self.entries.is_empty() {
            return 0;
        }
        self.saved_tokens = budget.min(self.total_token_demand);
        self.saved_tokens
    }

    /// Sum of the costs of everything queued.
    #[must_use]
    pub fn total_token_demand(&self) -> u64 {
        self.total_token_demand
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::KeyData;

    fn entry(token: u64, cost: u64) -> QueuedRequest {
        QueuedRequest {
            key: KeyData::from_ffi(token).into(),
            cost,
        }
    }

    #[test]
    fn demand_tracks_queued_costs() {
        let mut queue = SwQueue::with_capacity(8);
        assert!(queue.push_back(entry(1, 100)).is_ok());
        assert!(queue.push_back(entry(2, 400)).is_ok());
        assert_eq!(queue.total_token_demand(), 500);

        let head = queue.pop_front().expect("head");
        assert_eq!(head.cost, 100);
        assert_eq!(queue.total_token_demand(), 400);
        assert_eq!(queue.peek_head_cost(), Some(400));

        let _ = queue.pop_front();
        assert_eq!(queue.total_token_demand(), 0);
        assert!(queue.is_empty());
        assert!(queue.pop_front().is_none());
    }

    #[test]
    fn push_past_capacity_returns_the_request() {
        let mut queue = SwQueue::with_capacity(1);
        assert!(queue.push_back(entry(1, 100)).is_ok());
        let rejected = queue.push_back(entry(2, 200));
        assert_eq!(rejected, Err(entry(2, 200)));
        assert_eq!(queue.total_token_demand(), 100);
    }

    #[test]
    fn fifo_order_is_preserved() {
        let mut queue = SwQueue::with_capacity(8);
        for token in 0..4 {
            assert!(queue.push_back(entry(token, 100)).is_ok());
        }
        for token in 0..4 {
            assert_eq!(
                queue.pop_front().map(|e| e.key),
                Some(KeyData::from_ffi(token).into())
            );
        }
    }

    #[test]
    fn saved_tokens_cap_at_demand() {
        let mut queue = SwQueue::with_capacity(8);
        assert_eq!(queue.save_tokens(500), 0, "empty queue keeps nothing");

        assert!(queue.push_back(entry(1, 300)).is_ok());
        assert_eq!(queue.save_tokens(500), 300);
        assert_eq!(queue.saved_tokens(), 300);
        assert_eq!(queue.take_saved_tokens(), 300);
        assert_eq!(queue.saved_tokens(), 0);

        assert_eq!(queue.save_tokens(100), 100);
    }

    #[test]
    fn credit_accounting_is_signed() {
        let mut queue = SwQueue::with_capacity(8);
        queue.add_credit(50);
        queue.charge_credit(120);
        assert_eq!(queue.token_credit(), -70);
        queue.add_credit(30);
        assert_eq!(queue.token_credit(), -40);
    }
}
