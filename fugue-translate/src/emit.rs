use std::fmt;

use smallvec::SmallVec;

use crate::address::Address;
use crate::opcode::Opcode;
use crate::space_manager::SpaceManager;
use crate::varnodedata::VarnodeData;

/// Receives the p-code operations produced for an instruction, in order.
pub trait PCodeEmit {
    fn dump(
        &mut self,
        address: &Address,
        opcode: Opcode,
        output: Option<&VarnodeData>,
        inputs: &[VarnodeData],
    );
}

impl<F> PCodeEmit for F
where
    F: FnMut(&Address, Opcode, Option<&VarnodeData>, &[VarnodeData]),
{
    fn dump(
        &mut self,
        address: &Address,
        opcode: Opcode,
        output: Option<&VarnodeData>,
        inputs: &[VarnodeData],
    ) {
        self(address, opcode, output, inputs)
    }
}

/// Receives the textual form of a single instruction.
pub trait AssemblyEmit {
    fn dump(&mut self, address: &Address, mnemonic: &str, body: &str);
}

impl<F> AssemblyEmit for F
where
    F: FnMut(&Address, &str, &str),
{
    fn dump(&mut self, address: &Address, mnemonic: &str, body: &str) {
        self(address, mnemonic, body)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct PCodeData {
    pub opcode: Opcode,
    pub output: Option<VarnodeData>,
    pub inputs: SmallVec<[VarnodeData; 4]>,
}

pub struct PCodeDataFormatter<'a> {
    pcode: &'a PCodeData,
    manager: &'a SpaceManager,
}

impl<'a> fmt::Display for PCodeDataFormatter<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(f, "{}(", self.pcode.opcode)?;
        if let Some(ref output) = self.pcode.output {
            write!(f, "out={}", output.display(self.manager))?;
        }
        if !self.pcode.inputs.is_empty() {
            write!(f, "{}in=[", if self.pcode.output.is_some() { ", " } else { "" })?;
            for (i, input) in self.pcode.inputs.iter().enumerate() {
                write!(f, "{}{}", if i == 0 { "" } else { ", " }, input.display(self.manager))?;
            }
            write!(f, "]")?;
        }
        write!(f, ")")
    }
}

impl PCodeData {
    pub fn new(opcode: Opcode, output: Option<VarnodeData>, inputs: &[VarnodeData]) -> Self {
        Self {
            opcode,
            output,
            inputs: inputs.iter().copied().collect(),
        }
    }

    pub fn display<'a>(&'a self, manager: &'a SpaceManager) -> PCodeDataFormatter<'a> {
        PCodeDataFormatter {
            pcode: self,
            manager,
        }
    }
}

/// The p-code for one decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct PCodeRaw {
    pub address: Address,
    pub operations: SmallVec<[PCodeData; 16]>,
    pub length: usize,
}

pub struct PCodeRawFormatter<'a> {
    pcode: &'a PCodeRaw,
    manager: &'a SpaceManager,
}

impl<'a> fmt::Display for PCodeRawFormatter<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        let address = self.pcode.address.display(self.manager);
        let len = self.pcode.operations.len();
        if len > 0 {
            for (i, op) in self.pcode.operations.iter().enumerate() {
                write!(f, "{}.{:02}: {}{}", address, i,
                       op.display(self.manager),
                       if i == len - 1 { "" } else { "\n" })?;
            }
            Ok(())
        } else {
            write!(f, "{}.00: Nop", address)
        }
    }
}

impl PCodeRaw {
    pub fn nop(address: Address, length: usize) -> Self {
        Self {
            address,
            operations: SmallVec::new(),
            length,
        }
    }

    pub fn display<'a>(&'a self, manager: &'a SpaceManager) -> PCodeRawFormatter<'a> {
        PCodeRawFormatter {
            pcode: self,
            manager,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn operations(&self) -> &[PCodeData] {
        self.operations.as_ref()
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Replays the collected operations into `emit`.
    pub fn emit(&self, emit: &mut dyn PCodeEmit) {
        for op in self.operations.iter() {
            emit.dump(&self.address, op.opcode, op.output.as_ref(), &op.inputs);
        }
    }
}

impl PCodeEmit for PCodeRaw {
    fn dump(
        &mut self,
        _address: &Address,
        opcode: Opcode,
        output: Option<&VarnodeData>,
        inputs: &[VarnodeData],
    ) {
        self.operations.push(PCodeData::new(opcode, output.copied(), inputs));
    }
}

/// The assembly text for one decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct Instruction {
    pub address: Address,
    pub mnemonic: String,
    pub operands: String,
    pub length: usize,
}

impl Instruction {
    pub fn empty(address: Address) -> Self {
        Self {
            address,
            mnemonic: String::new(),
            operands: String::new(),
            length: 0,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    pub fn operands(&self) -> &str {
        &self.operands
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn display<'a>(&'a self, manager: &'a SpaceManager) -> InstructionFormatter<'a> {
        InstructionFormatter {
            insn: self,
            manager,
        }
    }
}

impl AssemblyEmit for Instruction {
    fn dump(&mut self, address: &Address, mnemonic: &str, body: &str) {
        self.address = *address;
        self.mnemonic = mnemonic.to_owned();
        self.operands = body.to_owned();
    }
}

pub struct InstructionFormatter<'a> {
    insn: &'a Instruction,
    manager: &'a SpaceManager,
}

impl<'a> fmt::Display for InstructionFormatter<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(f, "{} {}", self.insn.address.display(self.manager), self.insn.mnemonic.trim())?;
        if !self.insn.operands.is_empty() {
            write!(f, " {}", self.insn.operands.trim())?;
        }
        Ok(())
    }
}
