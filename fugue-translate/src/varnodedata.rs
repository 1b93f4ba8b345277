use std::fmt;

use crate::address::Address;
use crate::space::AddressSpaceId;
use crate::space_manager::SpaceManager;

/// A storage location: space, offset and size in bytes.
///
/// The derived ordering compares space index, then offset, then size.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Ord, PartialOrd, Hash)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct VarnodeData {
    space: AddressSpaceId,
    pub(crate) offset: u64,
    pub(crate) size: usize,
}

pub struct VarnodeDataFormatter<'a> {
    varnode: &'a VarnodeData,
    manager: &'a SpaceManager,
}

impl<'a> fmt::Display for VarnodeDataFormatter<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        let space = match self.manager.space_by_id(self.varnode.space) {
            Some(space) => space,
            None => {
                return write!(
                    f,
                    "Varnode(space={}, offset={:#x}, size={})",
                    self.varnode.space, self.varnode.offset, self.varnode.size
                )
            }
        };

        if space.is_constant() {
            write!(
                f,
                "Constant(value={:#x}, size={})",
                self.varnode.offset, self.varnode.size
            )
        } else {
            write!(
                f,
                "Varnode(space={}, offset={:#x}, size={})",
                space.name(),
                self.varnode.offset,
                self.varnode.size
            )
        }
    }
}

impl VarnodeData {
    pub fn new(space: AddressSpaceId, offset: u64, size: usize) -> Self {
        Self {
            space,
            offset,
            size,
        }
    }

    pub fn display<'a>(&'a self, manager: &'a SpaceManager) -> VarnodeDataFormatter<'a> {
        VarnodeDataFormatter {
            varnode: self,
            manager,
        }
    }

    pub fn address(&self) -> Address {
        Address::from_id(self.space, self.offset)
    }

    pub fn space(&self) -> AddressSpaceId {
        self.space
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Does this location share at least one byte with `other`?
    pub fn overlaps(&self, other: &VarnodeData) -> bool {
        self.space == other.space
            && self.offset < other.offset.saturating_add(other.size as u64)
            && other.offset < self.offset.saturating_add(self.size as u64)
    }
}

impl From<(Address, usize)> for VarnodeData {
    fn from((address, size): (Address, usize)) -> Self {
        Self::new(address.space(), address.offset(), size)
    }
}
