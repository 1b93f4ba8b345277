use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("invalid opcode value {0}")]
    InvalidValue(u8),
    #[error("invalid opcode name `{0}`")]
    InvalidName(String),
}

macro_rules! opcodes {
    ($($variant:ident = $value:literal => $name:literal),* $(,)?) => {
        /// Operations of the intermediate language, numbered as in the
        /// reference encoding used on the wire.
        #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[derive(serde::Deserialize, serde::Serialize)]
        #[repr(u8)]
        pub enum Opcode {
            $($variant = $value),*
        }

        impl Opcode {
            pub const ALL: &'static [Opcode] = &[$(Opcode::$variant),*];

            /// The canonical upper-case mnemonic, e.g., `INT_ADD`.
            pub fn name(&self) -> &'static str {
                match self {
                    $(Opcode::$variant => $name),*
                }
            }
        }

        impl TryFrom<u8> for Opcode {
            type Error = Error;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok(Opcode::$variant),)*
                    _ => Err(Error::InvalidValue(value)),
                }
            }
        }

        impl FromStr for Opcode {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Opcode::$variant),)*
                    _ => Err(Error::InvalidName(s.to_owned())),
                }
            }
        }
    };
}

opcodes! {
    Copy = 1 => "COPY",
    Load = 2 => "LOAD",
    Store = 3 => "STORE",
    Branch = 4 => "BRANCH",
    CBranch = 5 => "CBRANCH",
    IBranch = 6 => "BRANCHIND",
    Call = 7 => "CALL",
    ICall = 8 => "CALLIND",
    CallOther = 9 => "CALLOTHER",
    Return = 10 => "RETURN",
    IntEq = 11 => "INT_EQUAL",
    IntNotEq = 12 => "INT_NOTEQUAL",
    IntSLess = 13 => "INT_SLESS",
    IntSLessEq = 14 => "INT_SLESSEQUAL",
    IntLess = 15 => "INT_LESS",
    IntLessEq = 16 => "INT_LESSEQUAL",
    IntZExt = 17 => "INT_ZEXT",
    IntSExt = 18 => "INT_SEXT",
    IntAdd = 19 => "INT_ADD",
    IntSub = 20 => "INT_SUB",
    IntCarry = 21 => "INT_CARRY",
    IntSCarry = 22 => "INT_SCARRY",
    IntSBorrow = 23 => "INT_SBORROW",
    IntNeg = 24 => "INT_2COMP",
    IntNot = 25 => "INT_NEGATE",
    IntXor = 26 => "INT_XOR",
    IntAnd = 27 => "INT_AND",
    IntOr = 28 => "INT_OR",
    IntLShift = 29 => "INT_LEFT",
    IntRShift = 30 => "INT_RIGHT",
    IntSRShift = 31 => "INT_SRIGHT",
    IntMul = 32 => "INT_MULT",
    IntDiv = 33 => "INT_DIV",
    IntSDiv = 34 => "INT_SDIV",
    IntRem = 35 => "INT_REM",
    IntSRem = 36 => "INT_SREM",
    BoolNot = 37 => "BOOL_NEGATE",
    BoolXor = 38 => "BOOL_XOR",
    BoolAnd = 39 => "BOOL_AND",
    BoolOr = 40 => "BOOL_OR",
    FloatEq = 41 => "FLOAT_EQUAL",
    FloatNotEq = 42 => "FLOAT_NOTEQUAL",
    FloatLess = 43 => "FLOAT_LESS",
    FloatLessEq = 44 => "FLOAT_LESSEQUAL",
    FloatIsNaN = 46 => "FLOAT_NAN",
    FloatAdd = 47 => "FLOAT_ADD",
    FloatDiv = 48 => "FLOAT_DIV",
    FloatMul = 49 => "FLOAT_MULT",
    FloatSub = 50 => "FLOAT_SUB",
    FloatNeg = 51 => "FLOAT_NEG",
    FloatAbs = 52 => "FLOAT_ABS",
    FloatSqrt = 53 => "FLOAT_SQRT",
    FloatOfInt = 54 => "INT2FLOAT",
    FloatOfFloat = 55 => "FLOAT2FLOAT",
    FloatTruncate = 56 => "TRUNC",
    FloatCeiling = 57 => "CEIL",
    FloatFloor = 58 => "FLOOR",
    FloatRound = 59 => "ROUND",
    MultiEqual = 60 => "MULTIEQUAL",
    Indirect = 61 => "INDIRECT",
    Piece = 62 => "PIECE",
    Subpiece = 63 => "SUBPIECE",
    Cast = 64 => "CAST",
    PtrAdd = 65 => "PTRADD",
    PtrSub = 66 => "PTRSUB",
    SegmentOp = 67 => "SEGMENTOP",
    CPoolRef = 68 => "CPOOLREF",
    New = 69 => "NEW",
    Insert = 70 => "INSERT",
    Extract = 71 => "EXTRACT",
    PopCount = 72 => "POPCOUNT",
    LZCount = 73 => "LZCOUNT",
}

impl Opcode {
    pub fn value(&self) -> u8 {
        *self as u8
    }

    pub fn is_branch(&self) -> bool {
        matches!(
            self,
            Opcode::Branch
                | Opcode::CBranch
                | Opcode::IBranch
                | Opcode::Call
                | Opcode::ICall
                | Opcode::Return
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<Opcode> for u8 {
    fn from(opcode: Opcode) -> u8 {
        opcode.value()
    }
}
