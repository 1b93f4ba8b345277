use std::num::ParseIntError;
use std::str::ParseBoolError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("attribute `{0}` expected")]
    AttributeExpected(&'static str),
    #[error("space `{0}` defined more than once")]
    DuplicateSpace(String),
    #[error("space index {0} assigned more than once")]
    DuplicateSpaceIndex(usize),
    #[error("register `{0}` defined more than once")]
    DuplicateRegister(String),
    #[error("context variable `{name}` spans bits {start_bit}..={end_bit}, which is not within a single word")]
    ContextRange {
        name: String,
        start_bit: usize,
        end_bit: usize,
    },
    #[error("unknown context variable `{0}`")]
    UnknownContextVariable(String),
    #[error("more than one base register assigned to space `{0}`")]
    DuplicateBaseRegister(String),
    #[error("invariant not satisfied: {0}")]
    Invariant(&'static str),
    #[error("space `{name}` cannot be used as the {role} space")]
    SpaceRoleMismatch {
        name: String,
        role: &'static str,
    },
    #[error("space `{name}` defined with index {found}; expected {expected}")]
    SpaceIndexMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("{0} space not defined")]
    SpecialSpaceMissing(&'static str),
    #[error("unknown space `{0}`")]
    UnknownSpace(String),
    #[error("could not parse boolean: {0}")]
    ParseBool(#[from] ParseBoolError),
    #[error("could not parse integer: {0}")]
    ParseInteger(#[from] ParseIntError),
    #[error("tag `{0}` expected")]
    TagExpected(&'static str),
    #[error("unexpected tag `{0}`")]
    TagUnexpected(String),
    #[error(transparent)]
    Xml(#[from] xml::Error),
}
