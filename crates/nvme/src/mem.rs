// Copyright The FlashQ Authors
// SPDX-License-Identifier: Apache-2.0

//! DMA address types and the virtual-to-physical translation seam.

use std::fmt;

/// A user virtual address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VirtAddr(pub u64);

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// A physical address suitable for DMA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhysAddr(pub u64);

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Translates user virtual addresses to physical addresses.
///
/// Translation is the host system's concern (page tables, pinned hugepage
/// regions); the engine only needs a lookup that either resolves or does
/// not. A failed lookup surfaces to the submitter as a fault before any
/// request is queued.
pub trait MemoryTranslator {
    /// Returns the physical address backing `vaddr`, if mapped.
    fn phys_of(&self, vaddr: VirtAddr) -> Option<PhysAddr>;
}

/// Identity mapping, for tests and deployments where buffers are already
/// physically addressed.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityTranslator;

impl MemoryTranslator for IdentityTranslator {
    fn phys_of(&self, vaddr: VirtAddr) -> Option<PhysAddr> {
        Some(PhysAddr(vaddr.0))
    }
}
