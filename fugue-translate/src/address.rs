use std::fmt;

use crate::space::{AddressSpace, AddressSpaceId};
use crate::space_manager::SpaceManager;

/// A location within an address space: the space handle and an offset into it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct Address {
    space: AddressSpaceId,
    offset: u64,
}

pub struct AddressFormatter<'a> {
    address: &'a Address,
    manager: &'a SpaceManager,
}

impl<'a> fmt::Display for AddressFormatter<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.manager.space_by_id(self.address.space) {
            Some(space) => write!(f, "{}:{:#x}", space.name(), self.address.offset),
            None => write!(f, "{}:{:#x}", self.address.space, self.address.offset),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.offset)
    }
}

impl Address {
    pub fn new(space: &AddressSpace, offset: u64) -> Self {
        Self {
            space: space.id(),
            offset: space.wrap_offset(offset),
        }
    }

    /// Builds an address without wrapping `offset` into the space.
    pub fn from_id(space: AddressSpaceId, offset: u64) -> Self {
        Self { space, offset }
    }

    pub fn space(&self) -> AddressSpaceId {
        self.space
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn display<'a>(&'a self, manager: &'a SpaceManager) -> AddressFormatter<'a> {
        AddressFormatter {
            address: self,
            manager,
        }
    }

    /// Is (`self`, `size`) immediately followed by (`other`, `other_size`)
    /// when `self` is taken as the most significant piece?
    pub fn is_contiguous(&self, size: usize, other: &Self, other_size: usize, space: &AddressSpace) -> bool {
        if self.space != other.space {
            false
        } else if space.is_big_endian() {
            space.wrap_offset(self.offset.wrapping_add(size as u64)) == other.offset
        } else {
            space.wrap_offset(other.offset.wrapping_add(other_size as u64)) == self.offset
        }
    }
}
