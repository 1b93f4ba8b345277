use std::collections::BTreeMap;
use std::sync::Arc;

use ahash::AHashMap as Map;
use smallvec::{smallvec, SmallVec};

use crate::address::Address;
use crate::bits::round_up;
use crate::deserialise::parse::XmlExt;
use crate::deserialise::Error;
use crate::join::{self, JoinKey, JoinRecord};
use crate::resolver::{AddressResolver, ResolvedAddress};
use crate::space::{property, AddressSpace, AddressSpaceId, SpaceKind, TruncationTag};
use crate::spacebase::SpacebaseSpace;
use crate::varnodedata::VarnodeData;

const CONSTANT_SPACE_INDEX: usize = 0;
const JOIN_ALIGNMENT: u64 = 16;

/// Owner of every address space for a processor model.
///
/// Spaces live in an arena indexed by their [`AddressSpaceId`]; the
/// constant space is always present at index zero.
#[derive(Debug, Clone)]
pub struct SpaceManager {
    spaces: Vec<AddressSpace>,
    resolvers: Vec<Option<Arc<dyn AddressResolver>>>,
    spaces_by_name: Map<String, AddressSpaceId>,
    spaces_by_shortcut: Map<char, AddressSpaceId>,
    constant_space: AddressSpaceId,
    default_space: Option<AddressSpaceId>,
    iop_space: Option<AddressSpaceId>,
    fspec_space: Option<AddressSpaceId>,
    join_space: Option<AddressSpaceId>,
    stack_space: Option<AddressSpaceId>,
    unique_space: Option<AddressSpaceId>,
    join_allocate: u64,
    split_set: BTreeMap<JoinKey, usize>,
    split_list: Vec<JoinRecord>,
}

impl Default for SpaceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SpaceManager {
    pub fn new() -> Self {
        let mut slf = Self {
            spaces: Vec::new(),
            resolvers: Vec::new(),
            spaces_by_name: Map::default(),
            spaces_by_shortcut: Map::default(),
            constant_space: AddressSpaceId::new(CONSTANT_SPACE_INDEX),
            default_space: None,
            iop_space: None,
            fspec_space: None,
            join_space: None,
            stack_space: None,
            unique_space: None,
            join_allocate: 0,
            split_set: BTreeMap::new(),
            split_list: Vec::new(),
        };

        let constant = AddressSpace::constant("const", CONSTANT_SPACE_INDEX);
        slf.spaces_by_name.insert(constant.name().to_owned(), constant.id());
        slf.spaces.push(constant);
        slf.resolvers.push(None);
        slf.assign_shortcut(CONSTANT_SPACE_INDEX);

        slf
    }

    /// Index the next inserted space must carry.
    pub fn next_space_index(&self) -> usize {
        self.spaces.len()
    }

    /// Appends `space` to the model. Its index must be the next free index,
    /// its name must be unique, and special spaces must use their reserved
    /// names and may only be defined once.
    pub fn insert_space(&mut self, space: AddressSpace) -> Result<AddressSpaceId, Error> {
        let index = space.index();
        let id = space.id();

        if index != self.spaces.len() {
            if index < self.spaces.len() {
                return Err(Error::DuplicateSpaceIndex(index));
            }
            return Err(Error::SpaceIndexMismatch {
                name: space.name().to_owned(),
                expected: self.spaces.len(),
                found: index,
            });
        }

        let mismatch = |role| Error::SpaceRoleMismatch {
            name: space.name().to_owned(),
            role,
        };

        match space.kind() {
            SpaceKind::Constant => return Err(Error::DuplicateSpace(space.name().to_owned())),
            SpaceKind::Internal => {
                if space.name() != "unique" {
                    return Err(mismatch("unique"));
                }
                if self.unique_space.is_some() {
                    return Err(Error::DuplicateSpace(space.name().to_owned()));
                }
            }
            SpaceKind::Fspec => {
                if space.name() != "fspec" {
                    return Err(mismatch("fspec"));
                }
                if self.fspec_space.is_some() {
                    return Err(Error::DuplicateSpace(space.name().to_owned()));
                }
            }
            SpaceKind::Iop => {
                if space.name() != "iop" {
                    return Err(mismatch("iop"));
                }
                if self.iop_space.is_some() {
                    return Err(Error::DuplicateSpace(space.name().to_owned()));
                }
            }
            SpaceKind::Join => {
                if space.name() != "join" {
                    return Err(mismatch("join"));
                }
                if self.join_space.is_some() {
                    return Err(Error::DuplicateSpace(space.name().to_owned()));
                }
            }
            SpaceKind::Spacebase => {
                if space.name() == "stack" && self.stack_space.is_some() {
                    return Err(Error::DuplicateSpace(space.name().to_owned()));
                }
            }
            SpaceKind::Processor => (),
        }

        if self.spaces_by_name.contains_key(space.name()) {
            return Err(Error::DuplicateSpace(space.name().to_owned()));
        }

        match space.kind() {
            SpaceKind::Internal => self.unique_space = Some(id),
            SpaceKind::Fspec => self.fspec_space = Some(id),
            SpaceKind::Iop => self.iop_space = Some(id),
            SpaceKind::Join => self.join_space = Some(id),
            SpaceKind::Spacebase if space.name() == "stack" => self.stack_space = Some(id),
            _ => (),
        }

        log::debug!(
            "inserted space `{}` at index {} ({:?}, {} byte addresses)",
            space.name(),
            index,
            space.kind(),
            space.address_size(),
        );

        self.spaces_by_name.insert(space.name().to_owned(), id);
        self.spaces.push(space);
        self.resolvers.push(None);
        self.assign_shortcut(index);

        Ok(id)
    }

    /// Picks the single character mnemonic for the space at `index`. An
    /// explicitly configured shortcut is kept as is; otherwise the choice
    /// depends on the space kind and name, moving to the next free letter
    /// on collision.
    fn assign_shortcut(&mut self, index: usize) {
        let space = &mut self.spaces[index];
        let id = space.id();

        if let Some(shortcut) = space.shortcut() {
            self.spaces_by_shortcut.entry(shortcut).or_insert(id);
            return;
        }

        let mut shortcut = match space.kind() {
            SpaceKind::Constant => '#',
            SpaceKind::Processor if space.name() == "register" => '%',
            SpaceKind::Processor => space.name().chars().next().unwrap_or('x'),
            SpaceKind::Spacebase => 's',
            SpaceKind::Internal => 'u',
            SpaceKind::Fspec => 'f',
            SpaceKind::Join => 'j',
            SpaceKind::Iop => 'i',
        }
        .to_ascii_lowercase();

        let mut collisions = 0;
        while self.spaces_by_shortcut.contains_key(&shortcut) {
            collisions += 1;
            if collisions > 26 {
                log::trace!("no free shortcut for space `{}`; using `z`", space.name());
                space.set_shortcut('z');
                return;
            }

            shortcut = if shortcut.is_ascii_lowercase() && shortcut != 'z' {
                (shortcut as u8 + 1) as char
            } else {
                'a'
            };
        }

        if collisions > 0 {
            log::trace!(
                "shortcut for space `{}` moved to `{}` after {} collision(s)",
                space.name(),
                shortcut,
                collisions
            );
        }

        space.set_shortcut(shortcut);
        self.spaces_by_shortcut.insert(shortcut, id);
    }

    pub fn set_default_space(&mut self, id: AddressSpaceId) -> Result<(), Error> {
        if self.default_space.is_some() {
            return Err(Error::Invariant("default space set multiple times"));
        }

        let space = self
            .space_by_id(id)
            .ok_or_else(|| Error::UnknownSpace(id.to_string()))?;

        if space.is_constant() {
            return Err(Error::SpaceRoleMismatch {
                name: space.name().to_owned(),
                role: "default",
            });
        }

        self.default_space = Some(id);
        Ok(())
    }

    pub fn set_reverse_justified(&mut self, id: AddressSpaceId) {
        if let Some(space) = self.spaces.get_mut(id.index()) {
            space.set_properties(property::ReverseJustification);
        }
    }

    /// Populates an empty manager with the spaces of `other`.
    pub fn copy_spaces(&mut self, other: &SpaceManager) -> Result<(), Error> {
        if self.spaces.len() != 1 {
            return Err(Error::Invariant("spaces can only be copied into an empty manager"));
        }

        for space in other.spaces.iter().skip(1) {
            self.insert_space(space.clone())?;
        }

        for (i, resolver) in other.resolvers.iter().enumerate() {
            self.resolvers[i] = resolver.clone();
        }

        if let Some(id) = other.default_space {
            self.set_default_space(id)?;
        }

        Ok(())
    }

    /// Attaches the base register to the spacebase space `id`.
    pub fn add_spacebase_pointer(
        &mut self,
        id: AddressSpaceId,
        pointer: VarnodeData,
        truncated_size: usize,
        stack_grows_negative: bool,
    ) -> Result<(), Error> {
        let register_big_endian = self
            .space_by_id(pointer.space())
            .map(|space| space.is_big_endian())
            .ok_or_else(|| Error::UnknownSpace(pointer.space().to_string()))?;

        let space = self
            .spaces
            .get_mut(id.index())
            .ok_or_else(|| Error::UnknownSpace(id.to_string()))?;

        let name = space.name().to_owned();
        let spacebase = space.as_spacebase_mut().ok_or(Error::SpaceRoleMismatch {
            name,
            role: "spacebase",
        })?;

        spacebase.set_base_register(pointer, truncated_size, stack_grows_negative, register_big_endian)
    }

    /// Overrides constant resolution for the space `id`.
    pub fn insert_resolver(&mut self, id: AddressSpaceId, resolver: Arc<dyn AddressResolver>) {
        if let Some(slot) = self.resolvers.get_mut(id.index()) {
            log::debug!("installed address resolver {:?} for space index {}", resolver, id.index());
            *slot = Some(resolver);
        }
    }

    /// Builds the space described by `input` without inserting it.
    pub fn restore_xml_space(&self, input: xml::Node, big_endian: bool) -> Result<AddressSpace, Error> {
        match input.tag_name().name() {
            "space_base" => {
                let contain_name = input.attribute_string("contain")?;
                let contain = self
                    .space_by_name(&contain_name)
                    .ok_or(Error::UnknownSpace(contain_name))?;
                Ok(AddressSpace::Spacebase(SpacebaseSpace::from_xml(input, contain)?))
            }
            _ => AddressSpace::from_xml(input, big_endian),
        }
    }

    /// Restores the configured spaces from a `spaces` tag, designates the
    /// default space, and synthesises the internal spaces (`unique` when
    /// not configured, then `iop`, `fspec` and `join`).
    pub fn restore_xml_spaces(&mut self, input: xml::Node, big_endian: bool) -> Result<(), Error> {
        input.expect_tag("spaces")?;

        let default_name = input.attribute_string("defaultspace")?;

        for child in input.children().filter(xml::Node::is_element) {
            let space = self.restore_xml_space(child, big_endian)?;
            self.insert_space(space)?;
        }

        let default_space = self
            .space_by_name(&default_name)
            .map(|space| space.id())
            .ok_or(Error::UnknownSpace(default_name))?;

        self.set_default_space(default_space)?;

        if self.unique_space.is_none() {
            let index = self.next_space_index();
            self.insert_space(AddressSpace::unique("unique", index, big_endian))?;
        }

        let index = self.next_space_index();
        self.insert_space(AddressSpace::iop(index))?;

        let index = self.next_space_index();
        self.insert_space(AddressSpace::fspec(index))?;

        let index = self.next_space_index();
        self.insert_space(AddressSpace::join(index))?;

        Ok(())
    }

    pub fn default_size(&self) -> Option<usize> {
        self.default_space().map(|space| space.address_size())
    }

    pub fn num_spaces(&self) -> usize {
        self.spaces.len()
    }

    pub fn spaces(&self) -> &[AddressSpace] {
        self.spaces.as_ref()
    }

    pub fn space(&self, index: usize) -> Option<&AddressSpace> {
        self.spaces.get(index)
    }

    pub fn space_by_id(&self, id: AddressSpaceId) -> Option<&AddressSpace> {
        self.spaces.get(id.index())
    }

    pub fn space_by_name<S: AsRef<str>>(&self, name: S) -> Option<&AddressSpace> {
        self.spaces_by_name
            .get(name.as_ref())
            .and_then(|id| self.space_by_id(*id))
    }

    pub fn space_by_shortcut(&self, shortcut: char) -> Option<&AddressSpace> {
        self.spaces_by_shortcut
            .get(&shortcut)
            .and_then(|id| self.space_by_id(*id))
    }

    /// The space following `id` in index order, or the first space when
    /// `id` is `None`.
    pub fn next_space_in_order(&self, id: Option<AddressSpaceId>) -> Option<AddressSpaceId> {
        let index = id.map(|id| id.index() + 1).unwrap_or(0);
        self.spaces.get(index).map(|space| space.id())
    }

    pub fn constant_space(&self) -> &AddressSpace {
        &self.spaces[self.constant_space.index()]
    }

    pub fn constant_space_id(&self) -> AddressSpaceId {
        self.constant_space
    }

    pub fn default_space(&self) -> Option<&AddressSpace> {
        self.default_space.and_then(|id| self.space_by_id(id))
    }

    pub fn default_space_id(&self) -> Option<AddressSpaceId> {
        self.default_space
    }

    pub fn iop_space(&self) -> Option<&AddressSpace> {
        self.iop_space.and_then(|id| self.space_by_id(id))
    }

    pub fn fspec_space(&self) -> Option<&AddressSpace> {
        self.fspec_space.and_then(|id| self.space_by_id(id))
    }

    pub fn join_space(&self) -> Option<&AddressSpace> {
        self.join_space.and_then(|id| self.space_by_id(id))
    }

    pub fn join_space_id(&self) -> Option<AddressSpaceId> {
        self.join_space
    }

    pub fn stack_space(&self) -> Option<&AddressSpace> {
        self.stack_space.and_then(|id| self.space_by_id(id))
    }

    pub fn stack_space_id(&self) -> Option<AddressSpaceId> {
        self.stack_space
    }

    pub fn unique_space(&self) -> Option<&AddressSpace> {
        self.unique_space.and_then(|id| self.space_by_id(id))
    }

    pub fn unique_space_id(&self) -> Option<AddressSpaceId> {
        self.unique_space
    }

    /// `value` as an address in the constant space.
    pub fn constant(&self, value: u64) -> Address {
        Address::from_id(self.constant_space, value)
    }

    /// A constant encoding the identity of the space `id`.
    pub fn constant_from_space(&self, id: AddressSpaceId) -> Address {
        Address::from_id(self.constant_space, id.index() as u64)
    }

    /// The space encoded by a constant built with [`Self::constant_from_space`].
    pub fn space_from_constant(&self, value: u64) -> Option<&AddressSpace> {
        self.space(usize::try_from(value).ok()?)
    }

    /// Resolves `value`, observed at `point`, as an address in the space `id`.
    /// Uses the resolver installed for the space when there is one, and
    /// otherwise treats `value` as a word offset into the space.
    pub fn resolve_constant(
        &self,
        id: AddressSpaceId,
        value: u64,
        size: usize,
        point: &Address,
    ) -> Option<ResolvedAddress> {
        if let Some(Some(resolver)) = self.resolvers.get(id.index()) {
            return resolver.resolve(value, size, point);
        }

        let space = self.space_by_id(id)?;
        let offset = space.wrap_offset(space.address_to_byte(value));

        Some(ResolvedAddress::new(Address::from_id(id, offset), value))
    }

    /// Offset at which the next join record will be placed.
    pub fn join_allocate(&self) -> u64 {
        self.join_allocate
    }

    pub fn join_records(&self) -> &[JoinRecord] {
        &self.split_list
    }

    /// Finds the join record for `pieces` (most significant first), creating
    /// it if this is the first request. The unified size is the larger of
    /// `logical_size` and the total size of the pieces; a repeated request
    /// returns the existing record whatever `logical_size` it passes.
    pub fn find_add_join(
        &mut self,
        pieces: &[VarnodeData],
        logical_size: usize,
    ) -> Result<&JoinRecord, join::Error> {
        let join_space = self.join_space.ok_or(join::Error::NoJoinSpace)?;

        let joinable = pieces.iter().all(|piece| {
            self.space_by_id(piece.space()).map_or(false, |space| {
                matches!(space.kind(), SpaceKind::Processor | SpaceKind::Spacebase)
            })
        });
        if !joinable {
            return Err(join::Error::InvalidLocation);
        }

        let key = JoinKey {
            pieces: pieces.iter().copied().collect(),
        };

        if let Some(index) = self.split_set.get(&key) {
            return Ok(&self.split_list[*index]);
        }

        let size = join::unified_size(pieces, logical_size)?;

        let offset = self.join_allocate;
        self.join_allocate += round_up(size as u64, JOIN_ALIGNMENT);

        log::debug!(
            "allocated join record at {:#x} ({} bytes, {} pieces)",
            offset,
            size,
            pieces.len()
        );

        let index = self.split_list.len();
        self.split_list.push(JoinRecord {
            unified: VarnodeData::new(join_space, offset, size),
            pieces: key.pieces.clone(),
        });
        self.split_set.insert(key, index);

        Ok(&self.split_list[index])
    }

    /// Finds the join record whose allocation in the join space covers
    /// `offset`.
    pub fn find_join(&self, offset: u64) -> Option<&JoinRecord> {
        let position = self
            .split_list
            .partition_point(|record| record.unified.offset() <= offset);

        let record = self.split_list.get(position.checked_sub(1)?)?;
        let start = record.unified.offset();
        let allocated = round_up(record.unified.size() as u64, JOIN_ALIGNMENT);

        if offset - start < allocated {
            Some(record)
        } else {
            None
        }
    }

    /// Number of instructions of latency assumed before writes into the
    /// space `id` are considered dead.
    pub fn set_deadcode_delay(&mut self, id: AddressSpaceId, delay: usize) {
        if let Some(space) = self.spaces.get_mut(id.index()) {
            space.set_deadcode_delay(delay);
        }
    }

    pub fn truncate_space(&mut self, tag: &TruncationTag) -> Result<(), Error> {
        let id = self
            .spaces_by_name
            .get(tag.name())
            .copied()
            .ok_or_else(|| Error::UnknownSpace(tag.name().to_owned()))?;

        let space = &mut self.spaces[id.index()];

        log::debug!(
            "truncating space `{}` from {} to {} bytes",
            space.name(),
            space.address_size(),
            tag.size()
        );

        space.truncate_space(tag.size());
        Ok(())
    }

    /// Address of a logically wider view over `real_size` bytes at `real`.
    pub fn construct_float_extension_address(
        &mut self,
        real: Address,
        real_size: usize,
        logical_size: usize,
    ) -> Result<Address, join::Error> {
        if logical_size == real_size {
            return Ok(real);
        }

        let pieces: SmallVec<[VarnodeData; 1]> = smallvec![VarnodeData::from((real, real_size))];
        let record = self.find_add_join(&pieces, logical_size)?;

        Ok(record.unified().address())
    }

    /// Address of the value formed by `hi` (most significant) and `lo`.
    /// Contiguous pieces are addressed directly when they live in a mapped
    /// space, or in a register space that is not reverse justified.
    pub fn construct_join_address(
        &mut self,
        hi: Address,
        hi_size: usize,
        lo: Address,
        lo_size: usize,
    ) -> Result<Address, join::Error> {
        let hi_space = self
            .space_by_id(hi.space())
            .ok_or(join::Error::InvalidLocation)?;
        let lo_space = self
            .space_by_id(lo.space())
            .ok_or(join::Error::InvalidLocation)?;

        let joinable = |kind: SpaceKind| matches!(kind, SpaceKind::Processor | SpaceKind::Spacebase);
        if !joinable(hi_space.kind()) || !joinable(lo_space.kind()) {
            return Err(join::Error::InvalidLocation);
        }

        let mapped = hi_space.kind() == SpaceKind::Spacebase
            || lo_space.kind() == SpaceKind::Spacebase
            || Some(hi.space()) == self.default_space
            || Some(lo.space()) == self.default_space;

        if hi.is_contiguous(hi_size, &lo, lo_size, hi_space)
            && (mapped || !hi_space.is_reverse_justified())
        {
            return Ok(if hi_space.is_big_endian() { hi } else { lo });
        }

        let pieces = [
            VarnodeData::from((hi, hi_size)),
            VarnodeData::from((lo, lo_size)),
        ];
        let record = self.find_add_join(&pieces, 0)?;

        Ok(record.unified().address())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const SPACES: &str = r#"
        <spaces defaultspace="ram">
          <space name="ram" index="1" size="4" bigendian="false" delay="1"/>
          <space name="register" index="2" size="4" bigendian="false" delay="0"/>
          <space_base name="stack" index="3" size="4" contain="ram" delay="1"/>
          <space_unique name="unique" index="4" size="4" delay="0"/>
        </spaces>
    "#;

    fn manager() -> Result<SpaceManager, Error> {
        let doc = xml::Document::parse(SPACES)?;
        let mut manager = SpaceManager::new();
        manager.restore_xml_spaces(doc.root_element(), false)?;
        Ok(manager)
    }

    fn register(manager: &SpaceManager, offset: u64, size: usize) -> VarnodeData {
        let space = manager.space_by_name("register").map(|space| space.id());
        VarnodeData::new(space.unwrap_or(AddressSpaceId::new(2)), offset, size)
    }

    #[test]
    fn restore_spaces() -> Result<(), Error> {
        let manager = manager()?;

        assert_eq!(manager.num_spaces(), 8);
        assert_eq!(manager.constant_space().name(), "const");
        assert_eq!(manager.default_space().map(|s| s.name()), Some("ram"));
        assert_eq!(manager.default_size(), Some(4));
        assert_eq!(manager.stack_space().map(|s| s.index()), Some(3));
        assert_eq!(manager.unique_space().map(|s| s.index()), Some(4));
        assert_eq!(manager.iop_space().map(|s| s.index()), Some(5));
        assert_eq!(manager.fspec_space().map(|s| s.index()), Some(6));
        assert_eq!(manager.join_space().map(|s| s.index()), Some(7));

        let stack = manager
            .stack_space()
            .and_then(AddressSpace::as_spacebase)
            .ok_or(Error::SpecialSpaceMissing("stack"))?;
        assert_eq!(stack.contain(), AddressSpaceId::new(1));
        assert_eq!(stack.num_spacebase(), 0);

        Ok(())
    }

    #[test]
    fn shortcuts() -> Result<(), Error> {
        let manager = manager()?;

        let shortcut = |name: &str| manager.space_by_name(name).and_then(|s| s.shortcut());
        assert_eq!(shortcut("const"), Some('#'));
        assert_eq!(shortcut("ram"), Some('r'));
        assert_eq!(shortcut("register"), Some('%'));
        assert_eq!(shortcut("stack"), Some('s'));
        assert_eq!(shortcut("unique"), Some('u'));
        assert_eq!(shortcut("iop"), Some('i'));
        assert_eq!(shortcut("fspec"), Some('f'));
        assert_eq!(shortcut("join"), Some('j'));

        assert_eq!(manager.space_by_shortcut('%').map(|s| s.name()), Some("register"));
        assert!(manager.space_by_shortcut('q').is_none());

        Ok(())
    }

    #[test]
    fn shortcut_collision() -> Result<(), Error> {
        let mut manager = SpaceManager::new();
        let index = manager.next_space_index();
        manager.insert_space(AddressSpace::processor("ram", index, 4, 1, false, 1))?;
        let index = manager.next_space_index();
        manager.insert_space(AddressSpace::processor("rom", index, 4, 1, false, 1))?;
        let index = manager.next_space_index();
        manager.insert_space(AddressSpace::processor("Zero", index, 4, 1, false, 1))?;
        let index = manager.next_space_index();
        manager.insert_space(AddressSpace::processor("zed", index, 4, 1, false, 1))?;

        let shortcut = |name: &str| manager.space_by_name(name).and_then(|s| s.shortcut());
        assert_eq!(shortcut("ram"), Some('r'));
        assert_eq!(shortcut("rom"), Some('s'));
        assert_eq!(shortcut("Zero"), Some('z'));
        assert_eq!(shortcut("zed"), Some('a'));

        Ok(())
    }

    #[test]
    fn insert_errors() -> Result<(), Error> {
        let mut manager = manager()?;

        let index = manager.next_space_index();
        assert!(matches!(
            manager.insert_space(AddressSpace::processor("ram", index, 4, 1, false, 1)),
            Err(Error::DuplicateSpace(_))
        ));
        assert!(matches!(
            manager.insert_space(AddressSpace::processor("other", 2, 4, 1, false, 1)),
            Err(Error::DuplicateSpaceIndex(2))
        ));
        assert!(matches!(
            manager.insert_space(AddressSpace::processor("other", index + 3, 4, 1, false, 1)),
            Err(Error::SpaceIndexMismatch { .. })
        ));
        assert!(matches!(
            manager.insert_space(AddressSpace::join(index)),
            Err(Error::DuplicateSpace(_))
        ));
        assert!(matches!(
            manager.insert_space(AddressSpace::unique("temp", index, false)),
            Err(Error::SpaceRoleMismatch { role: "unique", .. })
        ));
        assert_eq!(manager.next_space_index(), index);

        Ok(())
    }

    #[test]
    fn insert_stack() -> Result<(), Error> {
        let mut manager = SpaceManager::new();
        let ram = AddressSpace::processor("ram", 1, 4, 1, true, 1);
        let ram_id = manager.insert_space(ram.clone())?;

        let stack = manager.insert_space(AddressSpace::spacebase("stack", 2, 4, &ram, 1))?;
        assert_eq!(manager.stack_space_id(), Some(stack));

        let spacebase = manager
            .stack_space()
            .and_then(AddressSpace::as_spacebase)
            .ok_or(Error::SpecialSpaceMissing("stack"))?;
        assert_eq!(spacebase.contain(), ram_id);
        assert_eq!(spacebase.num_spacebase(), 0);
        assert!(manager.stack_space().map_or(false, |space| space.is_big_endian()));

        let frame = manager.insert_space(AddressSpace::spacebase("frame", 3, 4, &ram, 1))?;
        assert_eq!(manager.stack_space_id(), Some(stack));
        assert_ne!(frame, stack);

        assert!(matches!(
            manager.insert_space(AddressSpace::spacebase("stack", 4, 4, &ram, 1)),
            Err(Error::DuplicateSpace(_))
        ));

        Ok(())
    }

    #[test]
    fn restore_errors() -> Result<(), Error> {
        let doc = xml::Document::parse(
            r#"<spaces defaultspace="ram">
                 <space name="ram" index="1" size="4"/>
                 <space name="ram" index="2" size="4"/>
               </spaces>"#,
        )?;
        assert!(matches!(
            SpaceManager::new().restore_xml_spaces(doc.root_element(), false),
            Err(Error::DuplicateSpace(_))
        ));

        let doc = xml::Document::parse(
            r#"<spaces defaultspace="code"><space name="ram" index="1" size="4"/></spaces>"#,
        )?;
        assert!(matches!(
            SpaceManager::new().restore_xml_spaces(doc.root_element(), false),
            Err(Error::UnknownSpace(_))
        ));

        let doc = xml::Document::parse(
            r#"<spaces defaultspace="ram">
                 <space name="ram" index="1" size="4"/>
                 <space_base name="stack" index="2" size="4" contain="data"/>
               </spaces>"#,
        )?;
        assert!(matches!(
            SpaceManager::new().restore_xml_spaces(doc.root_element(), false),
            Err(Error::UnknownSpace(_))
        ));

        Ok(())
    }

    #[test]
    fn next_in_order() -> Result<(), Error> {
        let manager = manager()?;

        let mut order = Vec::new();
        let mut current = manager.next_space_in_order(None);
        while let Some(id) = current {
            order.push(id.index());
            current = manager.next_space_in_order(Some(id));
        }

        assert_eq!(order, (0..manager.num_spaces()).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn constants() -> Result<(), Error> {
        let manager = manager()?;
        let ram = manager.space_by_name("ram").map(|space| space.id()).ok_or(Error::SpecialSpaceMissing("ram"))?;

        let c = manager.constant(0x1234);
        assert_eq!(c.space(), manager.constant_space_id());
        assert_eq!(c.offset(), 0x1234);

        let s = manager.constant_from_space(ram);
        assert_eq!(s.space(), manager.constant_space_id());
        assert_eq!(manager.space_from_constant(s.offset()).map(|s| s.id()), Some(ram));

        Ok(())
    }

    #[derive(Debug)]
    struct Segmented {
        space: AddressSpaceId,
    }

    impl AddressResolver for Segmented {
        fn resolve(&self, value: u64, size: usize, point: &Address) -> Option<ResolvedAddress> {
            if size != 2 {
                return None;
            }
            let segment = point.offset() & 0xffff_0000;
            Some(ResolvedAddress::new(Address::from_id(self.space, segment | value), segment | value))
        }
    }

    #[test]
    fn resolve() -> Result<(), Error> {
        let mut manager = manager()?;
        let ram = manager.space_by_name("ram").map(|space| space.id()).ok_or(Error::SpecialSpaceMissing("ram"))?;
        let point = Address::from_id(ram, 0x0004_1000);

        let literal = manager.resolve_constant(ram, 0x2000, 2, &point);
        assert_eq!(literal, Some(ResolvedAddress::new(Address::from_id(ram, 0x2000), 0x2000)));

        manager.insert_resolver(ram, Arc::new(Segmented { space: ram }));

        let resolved = manager.resolve_constant(ram, 0x2000, 2, &point);
        assert_eq!(resolved.map(|r| r.address.offset()), Some(0x0004_2000));
        assert_eq!(resolved.map(|r| r.full_encoding), Some(0x0004_2000));
        assert!(manager.resolve_constant(ram, 0x2000, 4, &point).is_none());

        Ok(())
    }

    #[test]
    fn joins() -> Result<(), Error> {
        let mut manager = manager()?;
        let r0 = register(&manager, 0, 4);
        let r1 = register(&manager, 4, 4);

        let first = manager.find_add_join(&[r1, r0], 8).map(|r| r.clone());
        let first = first.map_err(|_| Error::Invariant("join"))?;
        assert_eq!(first.unified().size(), 8);
        assert_eq!(first.unified().offset(), 0);
        assert_eq!(Some(first.unified().space()), manager.join_space_id());
        assert_eq!(manager.join_allocate(), 16);

        let again = manager.find_add_join(&[r1, r0], 0).map(|r| r.unified().offset());
        assert_eq!(again, Ok(0));
        assert_eq!(manager.join_allocate(), 16);

        let swapped = manager.find_add_join(&[r0, r1], 0).map(|r| r.unified().offset());
        assert_eq!(swapped, Ok(16));
        assert_eq!(manager.join_allocate(), 32);

        for offset in 0..16 {
            assert_eq!(manager.find_join(offset), Some(&first));
        }
        assert_eq!(manager.find_join(16).map(|r| r.pieces()), Some(&[r0, r1][..]));
        assert!(manager.find_join(32).is_none());

        Ok(())
    }

    #[test]
    fn join_repeats_ignore_logical_size() -> Result<(), Error> {
        let mut manager = manager()?;
        let r0 = register(&manager, 0, 4);
        let r1 = register(&manager, 4, 4);

        let first = manager.find_add_join(&[r1, r0], 8).map(|r| *r.unified());
        assert_eq!(first.map(|u| (u.offset(), u.size())), Ok((0, 8)));

        let wider = manager.find_add_join(&[r1, r0], 16).map(|r| *r.unified());
        assert_eq!(wider.map(|u| (u.offset(), u.size())), Ok((0, 8)));
        assert_eq!(manager.join_allocate(), 16);

        let f0 = register(&manager, 0x100, 8);
        let extended = manager.find_add_join(&[f0], 10).map(|r| r.unified().size());
        assert_eq!(extended, Ok(10));
        let again = manager.find_add_join(&[f0], 12).map(|r| r.unified().size());
        assert_eq!(again, Ok(10));
        let narrow = manager.find_add_join(&[f0], 4).map(|r| r.unified().size());
        assert_eq!(narrow, Ok(10));

        assert_eq!(manager.join_records().len(), 2);
        assert_eq!(manager.join_allocate(), 32);

        Ok(())
    }

    #[test]
    fn join_pieces_must_be_joinable() -> Result<(), Error> {
        let mut manager = manager()?;
        let r0 = register(&manager, 0, 4);
        let constant = VarnodeData::new(manager.constant_space_id(), 4, 4);
        let joined = manager.join_space_id().ok_or(Error::SpecialSpaceMissing("join"))?;
        let nested = VarnodeData::new(joined, 0, 4);
        let unknown = VarnodeData::new(AddressSpaceId::new(42), 0, 4);

        for hi in [constant, nested, unknown] {
            assert_eq!(
                manager.find_add_join(&[hi, r0], 8).map(|r| *r.unified()),
                Err(join::Error::InvalidLocation)
            );
        }
        assert_eq!(manager.join_allocate(), 0);
        assert!(manager.join_records().is_empty());

        let stack = manager.stack_space_id().ok_or(Error::SpecialSpaceMissing("stack"))?;
        let local = VarnodeData::new(stack, 0x10, 4);
        assert!(manager.find_add_join(&[local, r0], 8).is_ok());

        Ok(())
    }

    #[test]
    fn float_extension() -> Result<(), Error> {
        let mut manager = manager()?;
        let f0 = register(&manager, 0x100, 8);

        let same = manager.construct_float_extension_address(f0.address(), 8, 8);
        assert_eq!(same, Ok(f0.address()));

        let wide = manager
            .construct_float_extension_address(f0.address(), 8, 10)
            .map_err(|_| Error::Invariant("join"))?;
        assert_eq!(Some(wide.space()), manager.join_space_id());

        let record = manager.find_join(wide.offset()).ok_or(Error::Invariant("join"))?;
        assert!(record.is_float_extension());
        assert_eq!(record.unified().size(), 10);
        assert_eq!(record.piece(0), Some(&f0));

        Ok(())
    }

    #[test]
    fn join_addresses() -> Result<(), Error> {
        let mut manager = manager()?;
        let ram = manager.space_by_name("ram").map(|space| space.id()).ok_or(Error::SpecialSpaceMissing("ram"))?;
        let reg = register(&manager, 0, 4).space();

        let hi = Address::from_id(ram, 0x104);
        let lo = Address::from_id(ram, 0x100);
        assert_eq!(manager.construct_join_address(hi, 4, lo, 4), Ok(lo));
        assert_eq!(manager.join_allocate(), 0);

        let hi = Address::from_id(reg, 0x10);
        let lo = Address::from_id(reg, 0x0);
        let joined = manager.construct_join_address(hi, 4, lo, 4);
        assert_eq!(joined.map(|a| a.space()), Ok(manager.join_space_id().unwrap_or(ram)));

        manager.set_reverse_justified(reg);
        let hi = Address::from_id(reg, 0x4);
        let joined = manager.construct_join_address(hi, 4, lo, 4);
        assert_eq!(joined.map(|a| a.space()), Ok(manager.join_space_id().unwrap_or(ram)));

        let constant = manager.constant(1);
        assert_eq!(
            manager.construct_join_address(constant, 4, lo, 4),
            Err(join::Error::InvalidLocation)
        );

        Ok(())
    }

    #[test]
    fn truncation_and_delay() -> Result<(), Error> {
        let mut manager = manager()?;

        manager.truncate_space(&TruncationTag::new("ram", 2))?;
        let ram = manager.space_by_name("ram").ok_or(Error::SpecialSpaceMissing("ram"))?;
        assert_eq!(ram.address_size(), 2);
        assert!(ram.is_truncated());
        let ram = ram.id();

        assert!(matches!(
            manager.truncate_space(&TruncationTag::new("flash", 2)),
            Err(Error::UnknownSpace(_))
        ));

        manager.set_deadcode_delay(ram, 3);
        assert_eq!(manager.space_by_id(ram).map(|s| s.deadcode_delay()), Some(3));

        Ok(())
    }

    #[test]
    fn spacebase_pointer() -> Result<(), Error> {
        let mut manager = manager()?;
        let stack = manager.stack_space_id().ok_or(Error::SpecialSpaceMissing("stack"))?;
        let sp = register(&manager, 0x20, 4);

        manager.add_spacebase_pointer(stack, sp, 0, true)?;

        let spacebase = manager
            .stack_space()
            .and_then(AddressSpace::as_spacebase)
            .ok_or(Error::SpecialSpaceMissing("stack"))?;
        assert_eq!(spacebase.num_spacebase(), 1);
        assert_eq!(spacebase.spacebase(0), Some(&sp));
        assert!(spacebase.stack_grows_negative());

        let ram = manager.default_space_id().ok_or(Error::SpecialSpaceMissing("ram"))?;
        assert!(matches!(
            manager.add_spacebase_pointer(ram, sp, 0, true),
            Err(Error::SpaceRoleMismatch { role: "spacebase", .. })
        ));

        Ok(())
    }

    #[test]
    fn copy() -> Result<(), Error> {
        let source = manager()?;
        let mut copy = SpaceManager::new();
        copy.copy_spaces(&source)?;

        assert_eq!(copy.num_spaces(), source.num_spaces());
        assert_eq!(copy.default_space_id(), source.default_space_id());
        assert_eq!(copy.join_space_id(), source.join_space_id());
        assert!(copy.copy_spaces(&source).is_err());

        Ok(())
    }
}
