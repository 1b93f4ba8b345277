use std::collections::BTreeMap;

use thiserror::Error;
use ustr::Ustr;

use crate::address::Address;
use crate::deserialise::parse::XmlExt;
use crate::deserialise::{DocumentStorage, Error as DeserialiseError};
use crate::emit::{AssemblyEmit, Instruction, PCodeEmit, PCodeRaw};
use crate::endian::Endian;
use crate::float_format::FloatFormat;
use crate::join;
use crate::packed;
use crate::register::RegisterNames;
use crate::space::{AddressSpaceId, TruncationTag};
use crate::space_manager::SpaceManager;
use crate::varnodedata::VarnodeData;

#[derive(Debug, Error)]
pub enum Error {
    #[error("instruction at {address} is not implemented ({length} bytes)")]
    Unimplemented { address: Address, length: usize },
    #[error("bad instruction data at {address}: {reason}")]
    BadData { address: Address, reason: String },
    #[error("address `{:#x}` misaligned; expected alignment is {}", address, alignment)]
    IncorrectAlignment { address: u64, alignment: usize },
    #[error("translator used before initialisation")]
    Uninitialised,
    #[error("processor properties are fixed once the translator is initialised")]
    AlreadyInitialised,
    #[error("configuration deserialisation error: {0}")]
    Deserialise(#[from] DeserialiseError),
    #[error(transparent)]
    Join(#[from] join::Error),
    #[error(transparent)]
    Packed(#[from] packed::Error),
}

impl Error {
    pub fn bad_data<R: Into<String>>(address: Address, reason: R) -> Self {
        Self::BadData {
            address,
            reason: reason.into(),
        }
    }
}

/// State shared by every architecture backend: the space model, register
/// names, user-defined operations, float formats, and the fixed processor
/// properties.
#[derive(Debug, Clone)]
pub struct TranslatorState {
    manager: SpaceManager,
    registers: RegisterNames,
    user_ops: Vec<Ustr>,
    float_formats: Vec<FloatFormat>,
    big_endian: bool,
    alignment: usize,
    unique_base: u64,
    initialised: bool,
}

impl Default for TranslatorState {
    fn default() -> Self {
        Self::new()
    }
}

impl TranslatorState {
    pub fn new() -> Self {
        Self {
            manager: SpaceManager::new(),
            registers: RegisterNames::new(),
            user_ops: Vec::new(),
            float_formats: Vec::new(),
            big_endian: false,
            alignment: 1,
            unique_base: 0,
            initialised: false,
        }
    }

    pub fn manager(&self) -> &SpaceManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut SpaceManager {
        &mut self.manager
    }

    pub fn registers(&self) -> &RegisterNames {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut RegisterNames {
        &mut self.registers
    }

    pub fn user_ops(&self) -> &[Ustr] {
        &self.user_ops
    }

    pub fn is_big_endian(&self) -> bool {
        self.big_endian
    }

    pub fn is_little_endian(&self) -> bool {
        !self.big_endian
    }

    pub fn endian(&self) -> Endian {
        Endian::from(self.big_endian)
    }

    pub fn set_big_endian(&mut self, big_endian: bool) -> Result<(), Error> {
        if self.initialised {
            return Err(Error::AlreadyInitialised);
        }
        self.big_endian = big_endian;
        Ok(())
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    pub fn set_alignment(&mut self, alignment: usize) -> Result<(), Error> {
        if self.initialised {
            return Err(Error::AlreadyInitialised);
        }
        self.alignment = alignment.max(1);
        Ok(())
    }

    /// First offset in the unique space not reserved by the decoder.
    pub fn unique_base(&self) -> u64 {
        self.unique_base
    }

    /// Raises the unique base to `base`; lower values are ignored.
    pub fn set_unique_base(&mut self, base: u64) {
        if base > self.unique_base {
            self.unique_base = base;
        }
    }

    pub fn float_formats(&self) -> &[FloatFormat] {
        &self.float_formats
    }

    pub fn float_format(&self, size: usize) -> Option<&FloatFormat> {
        self.float_formats.iter().find(|format| format.size() == size)
    }

    pub fn add_float_format(&mut self, format: FloatFormat) {
        self.float_formats.push(format);
    }

    /// Installs the IEEE single and double formats when none are configured.
    pub fn set_default_float_formats(&mut self) {
        if self.float_formats.is_empty() {
            log::debug!("no float formats configured; using float4 and float8");
            self.float_formats.push(FloatFormat::float4());
            self.float_formats.push(FloatFormat::float8());
        }
    }

    pub fn is_initialised(&self) -> bool {
        self.initialised
    }

    pub fn mark_initialised(&mut self) {
        self.initialised = true;
    }

    /// Fails unless the translator is initialised and `address` satisfies
    /// the instruction alignment.
    pub fn check_decode(&self, address: &Address) -> Result<(), Error> {
        if !self.initialised {
            return Err(Error::Uninitialised);
        }

        if self.alignment != 1 && address.offset() % self.alignment as u64 != 0 {
            return Err(Error::IncorrectAlignment {
                address: address.offset(),
                alignment: self.alignment,
            });
        }

        Ok(())
    }

    /// Restores the processor properties, float formats, spaces,
    /// truncations, registers, user operations and stack pointer from
    /// `store`. On failure `self` is left as it was.
    pub fn restore_xml(&mut self, store: &DocumentStorage) -> Result<(), DeserialiseError> {
        if self.initialised {
            return Err(DeserialiseError::Invariant("translator already initialised"));
        }

        let mut state = self.clone();
        state.restore_xml_state(store)?;
        *self = state;

        Ok(())
    }

    fn restore_xml_state(&mut self, store: &DocumentStorage) -> Result<(), DeserialiseError> {
        let root = store
            .tag("sleigh")
            .ok_or(DeserialiseError::TagExpected("sleigh"))?;

        self.big_endian = root.attribute_bool("bigendian")?;
        self.alignment = root.attribute_int_opt::<usize>("align", 1)?.max(1);
        self.set_unique_base(root.attribute_int_opt("uniqbase", 0)?);

        for node in store.tags("floatformat") {
            self.float_formats.push(FloatFormat::from_xml(node)?);
        }
        self.set_default_float_formats();

        let spaces = store
            .tag("spaces")
            .ok_or(DeserialiseError::TagExpected("spaces"))?;
        self.manager.restore_xml_spaces(spaces, self.big_endian)?;

        for node in store.tags("truncate_space") {
            self.manager.truncate_space(&TruncationTag::from_xml(node)?)?;
        }

        for node in store.tags("register_data") {
            self.restore_xml_registers(node)?;
        }

        for node in store.tags("userop") {
            let name = node.attribute_string("name")?;
            let index: usize = node.attribute_int("index")?;
            if index != self.user_ops.len() {
                return Err(DeserialiseError::Invariant("user operations must be indexed in order"));
            }
            self.user_ops.push(Ustr::from(name.as_str()));
        }

        if let Some(node) = store.tag("stackpointer") {
            self.restore_xml_stack_pointer(node)?;
        }

        log::debug!(
            "restored {} spaces, {} registers and {} user operations",
            self.manager.num_spaces(),
            self.registers.len(),
            self.user_ops.len()
        );

        Ok(())
    }

    fn restore_xml_registers(&mut self, input: xml::Node) -> Result<(), DeserialiseError> {
        for child in input.children().filter(xml::Node::is_element) {
            child.expect_tag("register")?;

            let name = child.attribute_string("name")?;
            let space_name = child.attribute_string("space")?;
            let space = self
                .manager
                .space_by_name(&space_name)
                .map(|space| space.id())
                .ok_or(DeserialiseError::UnknownSpace(space_name))?;

            let offset = child.attribute_int("offset")?;
            let size = child.attribute_int("size")?;

            self.registers.insert(name, VarnodeData::new(space, offset, size))?;
        }
        Ok(())
    }

    /// Binds the register named by a `stackpointer` tag as the base of the
    /// `stack` space, e.g., `<stackpointer register="sp" growth="negative"/>`.
    fn restore_xml_stack_pointer(&mut self, input: xml::Node) -> Result<(), DeserialiseError> {
        let name = input.attribute_string("register")?;
        let grows_negative = input.attribute_string_opt("growth", "negative") != "positive";
        let truncated_size = input.attribute_int_opt("size", 0)?;

        let register = *self
            .registers
            .get_by_name(&name)
            .ok_or(DeserialiseError::Invariant("stack pointer is not a known register"))?;

        let stack = self
            .manager
            .stack_space_id()
            .ok_or(DeserialiseError::SpecialSpaceMissing("stack"))?;

        self.manager
            .add_spacebase_pointer(stack, register, truncated_size, grows_negative)
    }
}

/// The decoding contract an architecture backend fulfils.
///
/// Backends own a [`TranslatorState`] and implement the three decode
/// operations; everything else has a default in terms of the state.
pub trait Translate {
    fn state(&self) -> &TranslatorState;
    fn state_mut(&mut self) -> &mut TranslatorState;

    fn manager(&self) -> &SpaceManager {
        self.state().manager()
    }

    fn manager_mut(&mut self) -> &mut SpaceManager {
        self.state_mut().manager_mut()
    }

    /// Consumes the configuration in `store`. Must be called once, before
    /// any decode operation.
    fn initialize(&mut self, store: &DocumentStorage) -> Result<(), Error>;

    /// Defines a context variable over bits `start_bit..=end_bit`.
    fn register_context(&mut self, _name: &str, _start_bit: usize, _end_bit: usize) -> Result<(), Error> {
        Ok(())
    }

    fn set_context_default(&mut self, _name: &str, _value: u32) -> Result<(), Error> {
        Ok(())
    }

    fn allow_context_set(&mut self, _allow: bool) {}

    /// Registers every `context_field` and applies the `context_data`
    /// defaults found in `store`.
    fn restore_context(&mut self, store: &DocumentStorage) -> Result<(), Error> {
        for node in store.tags("context_field") {
            let name = node.attribute_string("name")?;
            let start_bit = node.attribute_int("startbit")?;
            let end_bit = node.attribute_int("endbit")?;
            self.register_context(&name, start_bit, end_bit)?;
        }

        for data in store.tags("context_data") {
            for set in data
                .descendants()
                .filter(|node| node.is_element() && node.tag_name().name() == "set")
            {
                let name = set.attribute_string("name")?;
                let value = set.attribute_int("val")?;
                self.set_context_default(&name, value)?;
            }
        }

        Ok(())
    }

    fn add_register(&mut self, name: &str, space: AddressSpaceId, offset: u64, size: usize) -> Result<(), Error> {
        self.state_mut()
            .registers_mut()
            .insert(name, VarnodeData::new(space, offset, size))?;
        Ok(())
    }

    fn register(&self, name: &str) -> Option<&VarnodeData> {
        self.state().registers().get_by_name(name)
    }

    /// The name of the register occupying exactly `size` bytes at `offset`.
    fn register_name(&self, space: AddressSpaceId, offset: u64, size: usize) -> Option<&str> {
        self.state()
            .registers()
            .get(space, offset, size)
            .map(|name| name.as_str())
    }

    fn all_registers(&self) -> BTreeMap<VarnodeData, String> {
        self.state().registers().all()
    }

    /// Names of the architecture specific operations, by index.
    fn user_op_names(&self) -> Vec<String> {
        self.state().user_ops().iter().map(|op| op.to_string()).collect()
    }

    fn is_big_endian(&self) -> bool {
        self.state().is_big_endian()
    }

    fn alignment(&self) -> usize {
        self.state().alignment()
    }

    fn unique_base(&self) -> u64 {
        self.state().unique_base()
    }

    fn float_format(&self, size: usize) -> Option<&FloatFormat> {
        self.state().float_format(size)
    }

    /// Length in bytes of the instruction at `address`.
    fn instruction_length(&self, address: &Address, bytes: &[u8]) -> Result<usize, Error>;

    /// Decodes the instruction at `address`, passing each of its p-code
    /// operations to `emit`, and returns its length. Nothing is emitted when
    /// decoding fails.
    fn one_instruction(&self, emit: &mut dyn PCodeEmit, address: &Address, bytes: &[u8]) -> Result<usize, Error>;

    /// Decodes the instruction at `address`, passing its assembly to `emit`
    /// exactly once, and returns its length.
    fn print_assembly(&self, emit: &mut dyn AssemblyEmit, address: &Address, bytes: &[u8]) -> Result<usize, Error>;

    fn lift(&self, address: Address, bytes: &[u8]) -> Result<PCodeRaw, Error> {
        self.state().check_decode(&address)?;

        let mut pcode = PCodeRaw::nop(address, 0);
        match self.one_instruction(&mut pcode, &address, bytes) {
            Ok(length) => {
                pcode.length = length;

                #[cfg(feature = "extra-logging")]
                log::trace!("lifted {}", pcode.display(self.manager()));

                Ok(pcode)
            }
            Err(e) => {
                log::trace!("lifting at {} failed: {}", address.display(self.manager()), e);
                Err(e)
            }
        }
    }

    fn disassemble(&self, address: Address, bytes: &[u8]) -> Result<Instruction, Error> {
        self.state().check_decode(&address)?;

        let mut insn = Instruction::empty(address);
        match self.print_assembly(&mut insn, &address, bytes) {
            Ok(length) => {
                insn.length = length;
                Ok(insn)
            }
            Err(e) => {
                log::trace!("disassembly at {} failed: {}", address.display(self.manager()), e);
                Err(e)
            }
        }
    }
}
