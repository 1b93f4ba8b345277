//! Tag-delimited binary encoding of the p-code for single instructions.
//!
//! Every byte other than a tag is biased by `0x20` so that payload bytes
//! never collide with the `end` tag. Offsets are split into 6-bit groups,
//! least significant first, and closed by `end`.

use smallvec::SmallVec;
use thiserror::Error;

use crate::address::Address;
use crate::emit::{PCodeData, PCodeEmit, PCodeRaw};
use crate::opcode::{self, Opcode};
use crate::space::AddressSpaceId;
use crate::space_manager::SpaceManager;
use crate::varnodedata::VarnodeData;

pub const UNIMPL_TAG: u8 = 0x20;
pub const INST_TAG: u8 = 0x21;
pub const OP_TAG: u8 = 0x22;
pub const VOID_TAG: u8 = 0x23;
pub const SPACEID_TAG: u8 = 0x24;
pub const ADDRSZ_TAG: u8 = 0x25;
pub const END_TAG: u8 = 0x60;

const BIAS: u8 = 0x20;
const OFFSET_BITS: u32 = 6;
const OFFSET_MASK: u64 = 0x3f;
const MAX_OFFSET_SHIFT: u32 = 67;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("expected {expected} at position {position}, found {found:#04x}")]
    UnexpectedTag {
        expected: &'static str,
        found: u8,
        position: usize,
    },
    #[error("packed p-code truncated at position {0}")]
    Truncated(usize),
    #[error("bad packed offset at position {0}")]
    BadOffset(usize),
    #[error("invalid packed byte {byte:#04x} at position {position}")]
    BadByte { byte: u8, position: usize },
    #[error("space index {0} is not defined")]
    UnknownSpace(usize),
    #[error(transparent)]
    Opcode(#[from] opcode::Error),
    #[error("{what} of {value} cannot be packed into a single byte")]
    Unrepresentable { what: &'static str, value: usize },
}

/// A decoded `inst` or `unimpl` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackedInstruction {
    Decoded(PCodeRaw),
    Unimplemented { length: usize },
}

/// Cursor over a packed p-code byte stream.
#[derive(Debug, Clone)]
pub struct PackedDecoder<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> PackedDecoder<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_empty(&self) -> bool {
        self.position >= self.bytes.len()
    }

    fn peek(&self) -> Result<u8, Error> {
        self.bytes
            .get(self.position)
            .copied()
            .ok_or(Error::Truncated(self.position))
    }

    fn next_byte(&mut self) -> Result<u8, Error> {
        let byte = self.peek()?;
        self.position += 1;
        Ok(byte)
    }

    fn expect(&mut self, tag: u8, expected: &'static str) -> Result<(), Error> {
        let position = self.position;
        let found = self.next_byte()?;
        if found != tag {
            return Err(Error::UnexpectedTag {
                expected,
                found,
                position,
            });
        }
        Ok(())
    }

    fn unbias(&mut self) -> Result<usize, Error> {
        let position = self.position;
        let byte = self.next_byte()?;
        if byte < BIAS {
            return Err(Error::BadByte { byte, position });
        }
        Ok((byte - BIAS) as usize)
    }

    fn space(&mut self, manager: &SpaceManager) -> Result<AddressSpaceId, Error> {
        let index = self.unbias()?;
        manager
            .space(index)
            .map(|space| space.id())
            .ok_or(Error::UnknownSpace(index))
    }

    /// Reads an offset terminated by the `end` tag.
    pub fn unpack_offset(&mut self) -> Result<u64, Error> {
        let start = self.position;
        let mut result = 0u64;
        let mut shift = 0;

        while shift < MAX_OFFSET_SHIFT {
            let position = self.position;
            let byte = self.next_byte()?;
            if byte == END_TAG {
                return Ok(result);
            }
            if !(BIAS..END_TAG).contains(&byte) {
                return Err(Error::BadByte { byte, position });
            }
            if shift >= u64::BITS {
                break;
            }
            let group = (byte - BIAS) as u64;
            if shift + OFFSET_BITS > u64::BITS && group >> (u64::BITS - shift) != 0 {
                break;
            }
            result |= group << shift;
            shift += OFFSET_BITS;
        }

        Err(Error::BadOffset(start))
    }

    /// Reads an `addrsz` operand, or a `spaceid` operand which becomes a
    /// constant identifying the space.
    pub fn unpack_varnode_data(&mut self, manager: &SpaceManager) -> Result<VarnodeData, Error> {
        let position = self.position;
        match self.next_byte()? {
            ADDRSZ_TAG => {
                let space = self.space(manager)?;
                let offset = self.unpack_offset()?;
                let size = self.unbias()?;
                Ok(VarnodeData::new(space, offset, size))
            }
            SPACEID_TAG => {
                let space = self.space(manager)?;
                let constant = manager.constant_from_space(space);
                Ok(VarnodeData::from((constant, std::mem::size_of::<u64>())))
            }
            found => Err(Error::UnexpectedTag {
                expected: "operand",
                found,
                position,
            }),
        }
    }

    fn unpack_op(&mut self, manager: &SpaceManager) -> Result<PCodeData, Error> {
        self.expect(OP_TAG, "op")?;

        let position = self.position;
        let value = self.next_byte()?;
        let opcode = value
            .checked_sub(BIAS)
            .ok_or(Error::BadByte {
                byte: value,
                position,
            })
            .and_then(|value| Ok(Opcode::try_from(value)?))?;

        let output = if self.peek()? == VOID_TAG {
            self.position += 1;
            None
        } else {
            Some(self.unpack_varnode_data(manager)?)
        };

        let mut inputs = SmallVec::new();
        while self.peek()? != END_TAG {
            inputs.push(self.unpack_varnode_data(manager)?);
        }
        self.position += 1;

        Ok(PCodeData {
            opcode,
            output,
            inputs,
        })
    }

    /// Reads one `op` record and passes it to `emit`. Nothing is emitted if
    /// the record is malformed.
    pub fn restore_packed_op(
        &mut self,
        manager: &SpaceManager,
        address: &Address,
        emit: &mut dyn PCodeEmit,
    ) -> Result<(), Error> {
        let op = self.unpack_op(manager)?;
        emit.dump(address, op.opcode, op.output.as_ref(), &op.inputs);
        Ok(())
    }

    /// Reads a complete `inst` or `unimpl` record.
    pub fn restore_packed_instruction(
        &mut self,
        manager: &SpaceManager,
    ) -> Result<PackedInstruction, Error> {
        let position = self.position;
        match self.next_byte()? {
            UNIMPL_TAG => {
                let length = self.unpack_offset()? as usize;
                Ok(PackedInstruction::Unimplemented { length })
            }
            INST_TAG => {
                let length = self.unpack_offset()? as usize;
                let space = self.space(manager)?;
                let offset = self.unpack_offset()?;
                let address = Address::from_id(space, offset);

                let mut pcode = PCodeRaw::nop(address, length);
                while self.peek()? != END_TAG {
                    self.restore_packed_op(manager, &address, &mut pcode)?;
                }
                self.position += 1;

                Ok(PackedInstruction::Decoded(pcode))
            }
            found => Err(Error::UnexpectedTag {
                expected: "inst or unimpl",
                found,
                position,
            }),
        }
    }
}

/// Builds packed p-code records.
#[derive(Debug, Clone, Default)]
pub struct PackedEncoder {
    bytes: Vec<u8>,
}

impl PackedEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    fn bias(what: &'static str, value: usize) -> Result<u8, Error> {
        u8::try_from(value)
            .ok()
            .and_then(|value| value.checked_add(BIAS))
            .ok_or(Error::Unrepresentable { what, value })
    }

    pub fn pack_offset(&mut self, mut offset: u64) {
        while offset != 0 {
            self.bytes.push(BIAS + (offset & OFFSET_MASK) as u8);
            offset >>= OFFSET_BITS;
        }
        self.bytes.push(END_TAG);
    }

    pub fn pack_varnode_data(&mut self, varnode: &VarnodeData) -> Result<(), Error> {
        let space = Self::bias("space index", varnode.space().index())?;
        let size = Self::bias("size", varnode.size())?;

        self.bytes.push(ADDRSZ_TAG);
        self.bytes.push(space);
        self.pack_offset(varnode.offset());
        self.bytes.push(size);

        Ok(())
    }

    pub fn pack_space_id(&mut self, space: AddressSpaceId) -> Result<(), Error> {
        let space = Self::bias("space index", space.index())?;
        self.bytes.extend_from_slice(&[SPACEID_TAG, space]);
        Ok(())
    }

    pub fn pack_op(
        &mut self,
        opcode: Opcode,
        output: Option<&VarnodeData>,
        inputs: &[VarnodeData],
    ) -> Result<(), Error> {
        let mut record = PackedEncoder::new();

        record.bytes.push(OP_TAG);
        record.bytes.push(Self::bias("opcode", opcode.value() as usize)?);

        match output {
            Some(output) => record.pack_varnode_data(output)?,
            None => record.bytes.push(VOID_TAG),
        }

        for input in inputs {
            record.pack_varnode_data(input)?;
        }
        record.bytes.push(END_TAG);

        self.bytes.extend_from_slice(&record.bytes);
        Ok(())
    }

    pub fn pack_instruction(&mut self, pcode: &PCodeRaw) -> Result<(), Error> {
        let mut record = PackedEncoder::new();

        record.bytes.push(INST_TAG);
        record.pack_offset(pcode.length as u64);
        record.bytes.push(Self::bias("space index", pcode.address.space().index())?);
        record.pack_offset(pcode.address.offset());

        for op in pcode.operations.iter() {
            record.pack_op(op.opcode, op.output.as_ref(), &op.inputs)?;
        }
        record.bytes.push(END_TAG);

        self.bytes.extend_from_slice(&record.bytes);
        Ok(())
    }

    pub fn pack_unimplemented(&mut self, length: usize) {
        self.bytes.push(UNIMPL_TAG);
        self.pack_offset(length as u64);
    }
}
