use std::fmt;
use std::mem;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Deref, DerefMut, Not};

use itertools::Itertools;

use crate::bits::highest_offset;
use crate::deserialise::parse::XmlExt;
use crate::deserialise::Error;
use crate::spacebase::SpacebaseSpace;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Deserialize, serde::Serialize)]
pub enum SpaceKind {
    Constant,
    Processor,
    Spacebase,
    Internal,
    Fspec,
    Iop,
    Join,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Deserialize, serde::Serialize)]
#[repr(transparent)]
pub struct SpaceProperty(usize);

impl Not for SpaceProperty {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0)
    }
}

impl BitAnd for SpaceProperty {
    type Output = Self;

    fn bitand(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }
}

impl BitAndAssign for SpaceProperty {
    fn bitand_assign(&mut self, other: Self) {
        self.0 &= other.0;
    }
}

impl BitOr for SpaceProperty {
    type Output = Self;

    fn bitor(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl BitOrAssign for SpaceProperty {
    fn bitor_assign(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

const PROPERTY_NAMES: [&str; 9] = [
    "BigEndian",
    "Heritaged",
    "DoesDeadcode",
    "ProgramSpecific",
    "ReverseJustification",
    "Overlay",
    "OverlayBase",
    "Truncated",
    "HasPhysical",
];

impl fmt::Debug for SpaceProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_set() {
            return write!(f, "SpaceProperty::default()");
        }

        let kinds = Self::iter()
            .zip(PROPERTY_NAMES.iter())
            .filter_map(|(o, v)| if (o & *self).is_set() { Some(v) } else { None });

        write!(f, "SpaceProperty({})", kinds.format(" | "))
    }
}

impl Default for SpaceProperty {
    fn default() -> Self {
        Self(0)
    }
}

pub mod property {
    #![allow(non_upper_case_globals)]

    use super::SpaceProperty;

    pub const BigEndian: SpaceProperty = SpaceProperty(1);
    pub const Heritaged: SpaceProperty = SpaceProperty(2);
    pub const DoesDeadcode: SpaceProperty = SpaceProperty(4);
    pub const ProgramSpecific: SpaceProperty = SpaceProperty(8);
    pub const ReverseJustification: SpaceProperty = SpaceProperty(16);
    pub const Overlay: SpaceProperty = SpaceProperty(32);
    pub const OverlayBase: SpaceProperty = SpaceProperty(64);
    pub const Truncated: SpaceProperty = SpaceProperty(128);
    pub const HasPhysical: SpaceProperty = SpaceProperty(256);
}

impl SpaceProperty {
    pub fn is_set(&self) -> bool {
        self.0 != 0
    }

    pub fn is_big_endian(&self) -> bool {
        (*self & property::BigEndian).is_set()
    }

    pub fn is_heritaged(&self) -> bool {
        (*self & property::Heritaged).is_set()
    }

    pub fn does_deadcode(&self) -> bool {
        (*self & property::DoesDeadcode).is_set()
    }

    pub fn is_program_specific(&self) -> bool {
        (*self & property::ProgramSpecific).is_set()
    }

    pub fn is_reverse_justified(&self) -> bool {
        (*self & property::ReverseJustification).is_set()
    }

    pub fn is_overlay(&self) -> bool {
        (*self & property::Overlay).is_set()
    }

    pub fn is_overlay_base(&self) -> bool {
        (*self & property::OverlayBase).is_set()
    }

    pub fn is_truncated(&self) -> bool {
        (*self & property::Truncated).is_set()
    }

    pub fn has_physical(&self) -> bool {
        (*self & property::HasPhysical).is_set()
    }

    pub fn iter() -> impl Iterator<Item = Self> {
        (0..PROPERTY_NAMES.len()).map(|i| Self(1 << i))
    }
}

/// Stable handle to a space owned by a [`SpaceManager`](crate::SpaceManager);
/// the wrapped value is the space's index.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Deserialize, serde::Serialize)]
#[repr(transparent)]
pub struct AddressSpaceId(pub(crate) u32);

impl AddressSpaceId {
    pub const fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for AddressSpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "space#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct Space {
    index: usize,
    kind: SpaceKind,
    properties: SpaceProperty,
    highest: u64,
    name: String,
    shortcut: Option<char>,
    address_size: usize,
    word_size: usize,
    delay: usize,
    deadcode_delay: usize,
}

impl Space {
    pub fn new<S: AsRef<str>>(
        kind: SpaceKind,
        name: S,
        address_size: usize,
        word_size: usize,
        index: usize,
        properties: SpaceProperty,
        delay: usize,
    ) -> Self {
        Self {
            index,
            kind,
            properties,
            highest: highest_offset(address_size, word_size),
            name: name.as_ref().to_owned(),
            shortcut: None,
            address_size,
            word_size,
            delay,
            deadcode_delay: delay,
        }
    }

    pub fn kind(&self) -> SpaceKind {
        self.kind
    }

    pub fn properties(&self) -> SpaceProperty {
        self.properties
    }

    pub fn is_big_endian(&self) -> bool {
        self.properties.is_big_endian()
    }

    pub fn is_reverse_justified(&self) -> bool {
        self.properties.is_reverse_justified()
    }

    pub fn is_truncated(&self) -> bool {
        self.properties.is_truncated()
    }

    pub fn delay(&self) -> usize {
        self.delay
    }

    pub fn deadcode_delay(&self) -> usize {
        self.deadcode_delay
    }

    pub fn name(&self) -> &str {
        self.name.as_ref()
    }

    pub fn shortcut(&self) -> Option<char> {
        self.shortcut
    }

    pub fn id(&self) -> AddressSpaceId {
        AddressSpaceId::new(self.index)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn word_size(&self) -> usize {
        self.word_size
    }

    pub fn address_size(&self) -> usize {
        self.address_size
    }

    pub fn highest_offset(&self) -> u64 {
        self.highest
    }

    pub fn wrap_offset(&self, offset: u64) -> u64 {
        if offset <= self.highest {
            offset
        } else {
            offset % (self.highest + 1)
        }
    }

    /// Converts an offset counted in words into a byte offset.
    pub fn address_to_byte(&self, offset: u64) -> u64 {
        offset.wrapping_mul(self.word_size as u64)
    }

    pub(crate) fn set_properties(&mut self, properties: SpaceProperty) {
        self.properties |= properties;
    }

    pub(crate) fn clear_properties(&mut self, properties: SpaceProperty) {
        self.properties &= !properties;
    }

    pub(crate) fn set_shortcut(&mut self, shortcut: char) {
        self.shortcut = Some(shortcut);
    }

    pub(crate) fn set_deadcode_delay(&mut self, delay: usize) {
        self.deadcode_delay = delay;
    }

    pub(crate) fn truncate_space(&mut self, size: usize) {
        self.properties |= property::Truncated;
        self.address_size = size;
        self.highest = highest_offset(self.address_size, self.word_size);
    }

    /// Reads the attributes common to every configured space kind.
    pub(crate) fn from_xml(
        kind: SpaceKind,
        input: xml::Node,
        big_endian: bool,
    ) -> Result<Self, Error> {
        let name = input.attribute_string("name")?;
        let index = input.attribute_int("index")?;
        let address_size = input.attribute_int("size")?;
        let word_size = input.attribute_int_opt("wordsize", 1)?;
        let delay = input.attribute_int_opt("delay", 0)?;
        let deadcode_delay = input.attribute_int_opt("deadcodedelay", delay)?;

        if word_size == 0 {
            return Err(Error::Invariant("space word size must be non-zero"));
        }

        let mut properties = property::Heritaged | property::DoesDeadcode;
        if input.attribute_bool_opt("bigendian", big_endian)? {
            properties |= property::BigEndian;
        }

        if input.attribute_bool_opt("physical", true)? {
            properties |= property::HasPhysical;
        }

        let shortcut = input
            .attribute("shortcut")
            .and_then(|s| s.chars().next());

        Ok(Self {
            index,
            kind,
            properties,
            highest: highest_offset(address_size, word_size),
            name,
            shortcut,
            address_size,
            word_size,
            delay,
            deadcode_delay,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Deserialize, serde::Serialize)]
pub enum AddressSpace {
    Constant(Space),
    Unique(Space),
    Space(Space),
    Spacebase(SpacebaseSpace),
    Fspec(Space),
    Iop(Space),
    Join(Space),
}

impl Deref for AddressSpace {
    type Target = Space;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Constant(space)
            | Self::Unique(space)
            | Self::Space(space)
            | Self::Fspec(space)
            | Self::Iop(space)
            | Self::Join(space) => space,
            Self::Spacebase(space) => &**space,
        }
    }
}

impl DerefMut for AddressSpace {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            Self::Constant(space)
            | Self::Unique(space)
            | Self::Space(space)
            | Self::Fspec(space)
            | Self::Iop(space)
            | Self::Join(space) => space,
            Self::Spacebase(space) => &mut **space,
        }
    }
}

impl AddressSpace {
    pub fn constant<S: AsRef<str>>(name: S, index: usize) -> Self {
        let mut properties = SpaceProperty::default();
        if cfg!(target_endian = "big") {
            properties |= property::BigEndian;
        }

        Self::Constant(Space::new(
            SpaceKind::Constant,
            name,
            mem::size_of::<u64>(),
            1,
            index,
            properties,
            0,
        ))
    }

    pub fn unique<S: AsRef<str>>(name: S, index: usize, big_endian: bool) -> Self {
        let mut properties = property::Heritaged | property::DoesDeadcode | property::HasPhysical;
        if big_endian {
            properties |= property::BigEndian;
        }

        Self::Unique(Space::new(
            SpaceKind::Internal,
            name,
            mem::size_of::<u32>(),
            1,
            index,
            properties,
            0,
        ))
    }

    pub fn processor<S: AsRef<str>>(
        name: S,
        index: usize,
        address_size: usize,
        word_size: usize,
        big_endian: bool,
        delay: usize,
    ) -> Self {
        let mut properties = property::Heritaged | property::DoesDeadcode | property::HasPhysical;
        if big_endian {
            properties |= property::BigEndian;
        }

        Self::Space(Space::new(
            SpaceKind::Processor,
            name,
            address_size,
            word_size,
            index,
            properties,
            delay,
        ))
    }

    pub fn fspec(index: usize) -> Self {
        Self::Fspec(Space::new(
            SpaceKind::Fspec,
            "fspec",
            mem::size_of::<u64>(),
            1,
            index,
            SpaceProperty::default(),
            1,
        ))
    }

    pub fn iop(index: usize) -> Self {
        Self::Iop(Space::new(
            SpaceKind::Iop,
            "iop",
            mem::size_of::<u64>(),
            1,
            index,
            SpaceProperty::default(),
            1,
        ))
    }

    pub fn join(index: usize) -> Self {
        Self::Join(Space::new(
            SpaceKind::Join,
            "join",
            mem::size_of::<u32>(),
            1,
            index,
            SpaceProperty::default(),
            0,
        ))
    }

    /// A space addressed relative to a base register, e.g., the stack.
    pub fn spacebase<S: AsRef<str>>(
        name: S,
        index: usize,
        address_size: usize,
        contain: &AddressSpace,
        delay: usize,
    ) -> Self {
        Self::Spacebase(SpacebaseSpace::new(name, index, address_size, contain, delay))
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Self::Constant(..))
    }

    pub fn as_spacebase(&self) -> Option<&SpacebaseSpace> {
        if let Self::Spacebase(space) = self {
            Some(space)
        } else {
            None
        }
    }

    pub(crate) fn as_spacebase_mut(&mut self) -> Option<&mut SpacebaseSpace> {
        if let Self::Spacebase(space) = self {
            Some(space)
        } else {
            None
        }
    }

    /// Restores a space that does not reference another space; spacebase and
    /// overlay tags are handled by the manager, which can resolve the space
    /// they are contained in.
    pub fn from_xml(input: xml::Node, big_endian: bool) -> Result<Self, Error> {
        match input.tag_name().name() {
            "space_unique" => Ok(Self::Unique(Space::from_xml(SpaceKind::Internal, input, big_endian)?)),
            "space" | "space_other" => Ok(Self::Space(Space::from_xml(SpaceKind::Processor, input, big_endian)?)),
            tag => Err(Error::TagUnexpected(tag.to_owned())),
        }
    }
}

impl From<&'_ AddressSpace> for AddressSpaceId {
    fn from(space: &AddressSpace) -> Self {
        space.id()
    }
}

/// Configuration override that narrows the pointer size of a named space.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct TruncationTag {
    space_name: String,
    size: usize,
}

impl TruncationTag {
    pub fn new<S: Into<String>>(space_name: S, size: usize) -> Self {
        Self {
            space_name: space_name.into(),
            size,
        }
    }

    pub fn name(&self) -> &str {
        &self.space_name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn from_xml(input: xml::Node) -> Result<Self, Error> {
        input.expect_tag("truncate_space")?;

        let space_name = input.attribute_string("space")?;
        let size = input.attribute_int("size")?;

        Ok(Self { space_name, size })
    }
}
