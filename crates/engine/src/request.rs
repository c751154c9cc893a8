// Copyright The FlashQ Authors
// SPDX-License-Identifier: Apache-2.0

//! Request contexts and the bounded per-core context pool.

use crate::cost::Op;
use crate::error::Error;
use crate::flow::FlowHandle;
use flashq_nvme::driver::{CompletionToken, IoBuf};
use flashq_nvme::mem::VirtAddr;
use slotmap::{Key, KeyData, SlotMap};

slotmap::new_key_type! {
    /// Key of a pooled request context. Doubles as the driver completion
    /// token, so a polled completion maps straight back to its context.
    pub struct RequestKey;
}

/// The completion token encoding of a pool key.
#[must_use]
pub fn token_of(key: RequestKey) -> CompletionToken {
    CompletionToken(key.data().as_ffi())
}

/// Recovers the pool key from a completion token.
#[must_use]
pub fn key_of(token: CompletionToken) -> RequestKey {
    KeyData::from_ffi(token.0).into()
}

/// A cost-annotated request context, alive from submission until its
/// completion upcall fires.
#[derive(Debug)]
pub struct Request {
    /// Read or write.
    pub op: Op,

    /// Starting logical block address.
    pub lba: u64,

    /// Number of sectors.
    pub lba_count: u32,

    /// The DMA buffer.
    pub buf: IoBuf,

    /// Token cost, computed at submission.
    pub cost: u64,

    /// User cookie echoed in the completion upcall.
    pub cookie: u64,

    /// The tenant this request belongs to.
    pub flow: FlowHandle,

    /// Core whose event loop accepted the request; completions fire there.
    pub owning_core: usize,

    /// Original user virtual address, echoed in read responses.
    pub user_buf: VirtAddr,
}

/// Bounded per-core pool of request contexts.
#[derive(Debug)]
pub struct RequestPool {
    slots: SlotMap<RequestKey, Request>,
    capacity: usize,
}

impl RequestPool {
    /// A pool holding at most `capacity` contexts.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: SlotMap::with_key(),
            capacity,
        }
    }

    /// Stores a context, or fails with
    /// [`Error::RequestPoolExhausted`] when the pool is at capacity.
    pub fn insert(&mut self, request: Request) -> Result<RequestKey, Error> {
        if self.slots.len() >= self.capacity {
            log::warn!("request-context pool exhausted ({} contexts)", self.capacity);
            return Err(Error::RequestPoolExhausted);
        }
        Ok(self.slots.insert(request))
    }

    /// Releases a context, returning it.
    pub fn remove(&mut self, key: RequestKey) -> Option<Request> {
        self.slots.remove(key)
    }

    /// Borrows a live context.
    #[must_use]
    pub fn get(&self, key: RequestKey) -> Option<&Request> {
        self.slots.get(key)
    }

    /// Number of live contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when no context is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flashq_nvme::mem::PhysAddr;

    fn request(cookie: u64) -> Request {
        Request {
            op: Op::Read,
            lba: 0,
            lba_count: 8,
            buf: IoBuf::Contig(PhysAddr(0x1000)),
            cost: 100,
            cookie,
            flow: FlowHandle(1),
            owning_core: 0,
            user_buf: VirtAddr(0x1000),
        }
    }

    #[test]
    fn pool_is_bounded() {
        let mut pool = RequestPool::with_capacity(2);
        let a = pool.insert(request(1)).expect("first");
        let _b = pool.insert(request(2)).expect("second");
        assert!(matches!(
            pool.insert(request(3)),
            Err(Error::RequestPoolExhausted)
        ));

        let freed = pool.remove(a).expect("live context");
        assert_eq!(freed.cookie, 1);
        assert!(pool.insert(request(3)).is_ok());
    }

    #[test]
    fn keys_round_trip_through_completion_tokens() {
        let mut pool = RequestPool::with_capacity(4);
        let key = pool.insert(request(7)).expect("insert");
        let token = token_of(key);
        assert_eq!(key_of(token), key);
        assert_eq!(pool.get(key_of(token)).map(|r| r.cookie), Some(7));
    }
}
