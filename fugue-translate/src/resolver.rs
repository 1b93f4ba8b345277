use std::fmt::Debug;

use crate::address::Address;

/// The address a constant resolves to, along with the complete encoding of
/// the constant when only part of it was supplied (e.g., a segment offset).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedAddress {
    pub address: Address,
    pub full_encoding: u64,
}

impl ResolvedAddress {
    pub fn new(address: Address, full_encoding: u64) -> Self {
        Self {
            address,
            full_encoding,
        }
    }
}

/// Architecture specific rule for turning a constant into an address within
/// a particular space (segmented memory, near/far pointers, etc.).
pub trait AddressResolver: Debug + Send + Sync {
    /// Resolves `value`, a constant of `size` bytes observed at `point`.
    /// `size` is zero when unknown. Returns `None` if the constant cannot be
    /// resolved.
    fn resolve(&self, value: u64, size: usize, point: &Address) -> Option<ResolvedAddress>;
}
