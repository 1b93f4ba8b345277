use std::ops::{Deref, DerefMut};

use crate::deserialise::parse::XmlExt;
use crate::deserialise::Error;
use crate::space::{property, AddressSpace, AddressSpaceId, Space, SpaceKind};
use crate::varnodedata::VarnodeData;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Deserialize, serde::Serialize)]
struct BaseRegister {
    location: VarnodeData,
    original: VarnodeData,
}

/// A virtual space whose offsets are relative to a base register, such as a
/// stack frame addressed through the stack pointer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct SpacebaseSpace {
    space: Space,
    contain: AddressSpaceId,
    base: Option<BaseRegister>,
    negative_stack: bool,
}

impl Deref for SpacebaseSpace {
    type Target = Space;

    fn deref(&self) -> &Self::Target {
        &self.space
    }
}

impl DerefMut for SpacebaseSpace {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.space
    }
}

impl SpacebaseSpace {
    pub(crate) fn new<S: AsRef<str>>(
        name: S,
        index: usize,
        address_size: usize,
        contain: &AddressSpace,
        delay: usize,
    ) -> Self {
        let mut properties = property::Heritaged | property::DoesDeadcode;
        if contain.is_big_endian() {
            properties |= property::BigEndian;
        }

        Self {
            space: Space::new(
                SpaceKind::Spacebase,
                name,
                address_size,
                contain.word_size(),
                index,
                properties,
                delay,
            ),
            contain: contain.id(),
            base: None,
            negative_stack: true,
        }
    }

    pub(crate) fn from_xml(input: xml::Node, contain: &AddressSpace) -> Result<Self, Error> {
        input.expect_tag("space_base")?;

        let mut space = Space::from_xml(SpaceKind::Spacebase, input, contain.is_big_endian())?;
        if space.word_size() != contain.word_size() {
            return Err(Error::Invariant(
                "spacebase word size must match its containing space",
            ));
        }
        space.clear_properties(property::HasPhysical);

        Ok(Self {
            space,
            contain: contain.id(),
            base: None,
            negative_stack: true,
        })
    }

    /// Attaches the base register. `truncated_size` is the logical size of
    /// the register when it is narrower than `data`, or zero. When the
    /// register's space is big endian the truncated location is moved to
    /// the least significant bytes of the original.
    ///
    /// Assigning the same register twice is accepted; assigning a different
    /// one is an error.
    pub(crate) fn set_base_register(
        &mut self,
        data: VarnodeData,
        truncated_size: usize,
        stack_grows_negative: bool,
        register_big_endian: bool,
    ) -> Result<(), Error> {
        let mut location = data;
        if truncated_size > 0 && truncated_size < data.size() {
            if register_big_endian {
                location.offset += (data.size() - truncated_size) as u64;
            }
            location.size = truncated_size;
        }

        if let Some(ref base) = self.base {
            if base.location != location || self.negative_stack != stack_grows_negative {
                return Err(Error::DuplicateBaseRegister(self.name().to_owned()));
            }
            return Ok(());
        }

        if location != data {
            self.space.set_properties(property::Truncated);
        }

        self.base = Some(BaseRegister {
            location,
            original: data,
        });
        self.negative_stack = stack_grows_negative;

        Ok(())
    }

    pub fn contain(&self) -> AddressSpaceId {
        self.contain
    }

    pub fn num_spacebase(&self) -> usize {
        if self.base.is_some() { 1 } else { 0 }
    }

    /// Base register as used for addressing (after any truncation).
    pub fn spacebase(&self, i: usize) -> Option<&VarnodeData> {
        self.base
            .as_ref()
            .filter(|_| i == 0)
            .map(|base| &base.location)
    }

    /// Base register as originally defined (before any truncation).
    pub fn spacebase_full(&self, i: usize) -> Option<&VarnodeData> {
        self.base
            .as_ref()
            .filter(|_| i == 0)
            .map(|base| &base.original)
    }

    pub fn stack_grows_negative(&self) -> bool {
        self.negative_stack
    }
}
