mod bits;

pub mod address;
pub mod context;
pub mod deserialise;
pub mod emit;
pub mod endian;
pub mod float_format;
pub mod join;
pub mod opcode;
pub mod packed;
pub mod register;
pub mod resolver;
pub mod space;
pub mod space_manager;
pub mod spacebase;
pub mod translator;
pub mod varnodedata;

pub use address::Address;
pub use deserialise::DocumentStorage;
pub use emit::{AssemblyEmit, Instruction, PCodeData, PCodeEmit, PCodeRaw};
pub use endian::Endian;
pub use join::JoinRecord;
pub use opcode::Opcode;
pub use resolver::{AddressResolver, ResolvedAddress};
pub use space::{AddressSpace, AddressSpaceId, SpaceKind, TruncationTag};
pub use space_manager::SpaceManager;
pub use spacebase::SpacebaseSpace;
pub use translator::{Translate, TranslatorState};
pub use varnodedata::VarnodeData;
