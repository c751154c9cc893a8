// Copyright The FlashQ Authors
// SPDX-License-Identifier: Apache-2.0

//! Hardware IO-queue slot allocation.

use crate::bitmap::SlotBitmap;
use crate::error::Error;
use flashq_config::limits::MAX_NUM_IO_QUEUES;
use parking_lot::Mutex;
use std::fmt;

/// Handle of an allocated IO queue slot, returned by `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IoQueueHandle(pub u32);

impl fmt::Display for IoQueueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Allocator over the device's IO queue slots. Slot 0 is reserved.
#[derive(Debug)]
pub struct IoQueueAllocator {
    bitmap: Mutex<SlotBitmap>,
}

impl IoQueueAllocator {
    /// An allocator with every slot free.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bitmap: Mutex::new(SlotBitmap::new(MAX_NUM_IO_QUEUES)),
        }
    }

    /// Claims the lowest free slot.
    pub fn allocate(&self) -> Result<IoQueueHandle, Error> {
        let mut bitmap = self.bitmap.lock();
        let slot = bitmap.first_clear_from(1).ok_or(Error::IoQueuesExhausted)?;
        bitmap.set(slot);
        Ok(IoQueueHandle(slot as u32))
    }

    /// Releases a slot.
    pub fn release(&self, handle: IoQueueHandle) {
        self.bitmap.lock().clear(handle.0 as usize);
    }
}

impl Default for IoQueueAllocator {
    fn default() -> Self {
        Self::new()
    }
}
