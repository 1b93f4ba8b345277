#![allow(dead_code)]

use fugue_translate::context::ContextLayout;
use fugue_translate::translator::Error;
use fugue_translate::{
    Address, AssemblyEmit, DocumentStorage, Opcode, PCodeData, PCodeEmit, Translate,
    TranslatorState, VarnodeData,
};
use smallvec::SmallVec;

pub const CONFIG: &str = r#"
<sleigh bigendian="false" align="1" uniqbase="0x10000">
  <spaces defaultspace="ram">
    <space name="ram" index="1" size="4" wordsize="1" delay="1"/>
    <space name="register" index="2" size="4" delay="0"/>
    <space_base name="stack" index="3" size="4" contain="ram" delay="1"/>
    <space_unique name="unique" index="4" size="4" delay="0"/>
  </spaces>
  <truncate_space space="ram" size="2"/>
  <register_data>
    <register name="r0" space="register" offset="0x0" size="4"/>
    <register name="r1" space="register" offset="0x4" size="4"/>
    <register name="r2" space="register" offset="0x8" size="4"/>
    <register name="r3" space="register" offset="0xc" size="4"/>
    <register name="sp" space="register" offset="0x20" size="4"/>
    <register name="pc" space="register" offset="0x24" size="4"/>
  </register_data>
  <userop name="syscall" index="0"/>
  <stackpointer register="sp" growth="negative"/>
  <context>
    <context_field name="mode" startbit="0" endbit="1"/>
    <context_field name="wide" startbit="2" endbit="2"/>
  </context>
  <context_data>
    <context_set space="ram"><set name="mode" val="1"/></context_set>
  </context_data>
</sleigh>
"#;

const REGISTERS: [&str; 4] = ["r0", "r1", "r2", "r3"];

/// A small single-byte-opcode architecture:
///
/// | byte | operands | meaning |
/// |---|---|---|
/// | `00` | | nop |
/// | `01` | `ds` | mov rd, rs |
/// | `02` | `ds` | add rd, rs |
/// | `03` | `lo hi` | jmp imm16 |
/// | `05` | `0s` | push rs |
/// | `06` | | syscall |
/// | `fe` | `xx` | recognised, not translated |
#[derive(Debug, Default)]
pub struct Toy {
    state: TranslatorState,
    context: ContextLayout,
    context_set: bool,
}

impl Toy {
    pub fn context(&self) -> &ContextLayout {
        &self.context
    }

    pub fn context_set_allowed(&self) -> bool {
        self.context_set
    }

    pub fn ram(&self, offset: u64) -> Address {
        let ram = self.manager().default_space_id();
        Address::from_id(ram.unwrap_or(self.manager().constant_space_id()), offset)
    }

    fn reg(&self, address: &Address, index: u8) -> Result<VarnodeData, Error> {
        REGISTERS
            .get(index as usize)
            .and_then(|name| self.register(name))
            .copied()
            .ok_or_else(|| Error::bad_data(*address, format!("invalid register r{}", index)))
    }

    fn operand(&self, address: &Address, bytes: &[u8], index: usize) -> Result<u8, Error> {
        bytes
            .get(index)
            .copied()
            .ok_or_else(|| Error::bad_data(*address, "truncated instruction"))
    }

    fn length(&self, address: &Address, bytes: &[u8]) -> Result<usize, Error> {
        let opcode = self.operand(address, bytes, 0)?;
        let length = match opcode {
            0x00 | 0x06 => 1,
            0x01 | 0x02 | 0x05 | 0xfe => 2,
            0x03 => 3,
            _ => return Err(Error::bad_data(*address, format!("unknown opcode {:#04x}", opcode))),
        };

        if bytes.len() < length {
            return Err(Error::bad_data(*address, "truncated instruction"));
        }

        Ok(length)
    }

    fn decode(&self, address: &Address, bytes: &[u8]) -> Result<(usize, SmallVec<[PCodeData; 4]>), Error> {
        let length = self.length(address, bytes)?;
        let constant = |value: u64, size: usize| VarnodeData::from((self.manager().constant(value), size));

        let mut ops = SmallVec::new();
        match bytes[0] {
            0x00 => (),
            0x01 | 0x02 => {
                let rd = self.reg(address, bytes[1] >> 4)?;
                let rs = self.reg(address, bytes[1] & 0xf)?;
                if bytes[0] == 0x01 {
                    ops.push(PCodeData::new(Opcode::Copy, Some(rd), &[rs]));
                } else {
                    ops.push(PCodeData::new(Opcode::IntAdd, Some(rd), &[rd, rs]));
                }
            }
            0x03 => {
                let target = u16::from_le_bytes([bytes[1], bytes[2]]) as u64;
                let target = VarnodeData::from((self.ram(target), 2));
                ops.push(PCodeData::new(Opcode::Branch, None, &[target]));
            }
            0x05 => {
                let rs = self.reg(address, bytes[1] & 0xf)?;
                let sp = self
                    .register("sp")
                    .copied()
                    .ok_or_else(|| Error::bad_data(*address, "no stack pointer"))?;
                let ram = self.ram(0).space();
                let space = VarnodeData::from((self.manager().constant_from_space(ram), 8));

                ops.push(PCodeData::new(Opcode::IntSub, Some(sp), &[sp, constant(4, 4)]));
                ops.push(PCodeData::new(Opcode::Store, None, &[space, sp, rs]));
            }
            0x06 => {
                ops.push(PCodeData::new(Opcode::CallOther, None, &[constant(0, 4)]));
            }
            _ => return Err(Error::Unimplemented { address: *address, length }),
        }

        Ok((length, ops))
    }
}

impl Translate for Toy {
    fn state(&self) -> &TranslatorState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut TranslatorState {
        &mut self.state
    }

    fn initialize(&mut self, store: &DocumentStorage) -> Result<(), Error> {
        self.state.restore_xml(store)?;
        self.restore_context(store)?;
        self.state.mark_initialised();
        Ok(())
    }

    fn register_context(&mut self, name: &str, start_bit: usize, end_bit: usize) -> Result<(), Error> {
        Ok(self.context.register_variable(name, start_bit, end_bit)?)
    }

    fn set_context_default(&mut self, name: &str, value: u32) -> Result<(), Error> {
        Ok(self.context.set_variable_default(name, value)?)
    }

    fn allow_context_set(&mut self, allow: bool) {
        self.context_set = allow;
    }

    fn instruction_length(&self, address: &Address, bytes: &[u8]) -> Result<usize, Error> {
        self.state.check_decode(address)?;
        self.length(address, bytes)
    }

    fn one_instruction(&self, emit: &mut dyn PCodeEmit, address: &Address, bytes: &[u8]) -> Result<usize, Error> {
        self.state.check_decode(address)?;

        let (length, ops) = self.decode(address, bytes)?;
        for op in ops.iter() {
            emit.dump(address, op.opcode, op.output.as_ref(), &op.inputs);
        }

        Ok(length)
    }

    fn print_assembly(&self, emit: &mut dyn AssemblyEmit, address: &Address, bytes: &[u8]) -> Result<usize, Error> {
        self.state.check_decode(address)?;

        let length = self.length(address, bytes)?;
        let reg = |index: u8| REGISTERS.get(index as usize).copied().unwrap_or("?");

        let (mnemonic, body) = match bytes[0] {
            0x00 => ("nop", String::new()),
            0x01 => ("mov", format!("{}, {}", reg(bytes[1] >> 4), reg(bytes[1] & 0xf))),
            0x02 => ("add", format!("{}, {}", reg(bytes[1] >> 4), reg(bytes[1] & 0xf))),
            0x03 => ("jmp", format!("{:#x}", u16::from_le_bytes([bytes[1], bytes[2]]))),
            0x05 => ("push", reg(bytes[1] & 0xf).to_owned()),
            0x06 => ("syscall", String::new()),
            _ => ("unimpl", format!("{:#04x}", bytes[1])),
        };

        emit.dump(address, mnemonic, &body);
        Ok(length)
    }
}

pub fn toy() -> Result<Toy, Error> {
    let mut store = DocumentStorage::new();
    store.parse_document(CONFIG)?;

    let mut toy = Toy::default();
    toy.initialize(&store)?;

    Ok(toy)
}
