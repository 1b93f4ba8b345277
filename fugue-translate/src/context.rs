use std::borrow::Borrow;
use std::collections::BTreeMap as Map;
use std::mem;

use crate::deserialise::Error;

const WORD_BITS: usize = 8 * mem::size_of::<u32>();

/// Location of a context variable within a packed context buffer. Bit zero
/// is the most significant bit of the first word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextBitRange {
    word: usize,
    start_bit: usize,
    end_bit: usize,
    shift: u32,
    mask: u32,
}

impl ContextBitRange {
    fn new(start_bit: usize, end_bit: usize) -> Self {
        let word = start_bit / WORD_BITS;
        let start_bit = start_bit - word * WORD_BITS;
        let end_bit = end_bit - word * WORD_BITS;
        let shift = (WORD_BITS - end_bit - 1) as u32;
        let mask = (!0u32).checked_shr(start_bit as u32 + shift).unwrap_or(0);

        Self {
            word,
            start_bit,
            end_bit,
            shift,
            mask,
        }
    }

    pub fn word(&self) -> usize {
        self.word
    }

    pub fn start_bit(&self) -> usize {
        self.start_bit
    }

    pub fn end_bit(&self) -> usize {
        self.end_bit
    }

    pub fn shift(&self) -> u32 {
        self.shift
    }

    pub fn mask(&self) -> u32 {
        self.mask
    }

    pub fn get(&self, values: &[u32]) -> Option<u32> {
        let word = values.get(self.word)?;
        Some(word.checked_shr(self.shift).unwrap_or(0) & self.mask)
    }

    pub fn set(&self, values: &mut [u32], value: u32) -> Option<()> {
        let word = values.get_mut(self.word)?;
        *word &= !(self.mask.checked_shl(self.shift).unwrap_or(0));
        *word |= (value & self.mask).checked_shl(self.shift).unwrap_or(0);
        Some(())
    }
}

/// Named context variables and their default values.
///
/// Variables must all be registered before defaults are assigned.
#[derive(Debug, Clone, Default)]
pub struct ContextLayout {
    variables: Map<String, ContextBitRange>,
    defaults: Vec<u32>,
}

impl ContextLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of 32-bit words in a context buffer.
    pub fn size(&self) -> usize {
        self.defaults.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn variable<S: Borrow<str>>(&self, name: S) -> Option<&ContextBitRange> {
        let name: &str = name.borrow();
        self.variables.get(name)
    }

    pub fn variables(&self) -> impl Iterator<Item = (&str, &ContextBitRange)> {
        self.variables.iter().map(|(name, range)| (name.as_str(), range))
    }

    /// Defines `name` over bits `start_bit..=end_bit`. The range must not
    /// cross a word boundary.
    pub fn register_variable<S: Borrow<str>>(
        &mut self,
        name: S,
        start_bit: usize,
        end_bit: usize,
    ) -> Result<(), Error> {
        let name: &str = name.borrow();
        if start_bit > end_bit || start_bit / WORD_BITS != end_bit / WORD_BITS {
            return Err(Error::ContextRange {
                name: name.to_owned(),
                start_bit,
                end_bit,
            });
        }

        let size = start_bit / WORD_BITS + 1;
        if size > self.defaults.len() {
            self.defaults.resize(size, 0);
        }

        log::trace!("context variable `{}` at bits {}..={}", name, start_bit, end_bit);

        self.variables
            .insert(name.to_owned(), ContextBitRange::new(start_bit, end_bit));

        Ok(())
    }

    pub fn set_variable_default<S: Borrow<str>>(&mut self, name: S, value: u32) -> Result<(), Error> {
        let name: &str = name.borrow();
        let range = self
            .variables
            .get(name)
            .ok_or_else(|| Error::UnknownContextVariable(name.to_owned()))?;

        range
            .set(&mut self.defaults, value)
            .ok_or(Error::Invariant("context variable outside of context buffer"))
    }

    pub fn default_context(&self) -> &[u32] {
        &self.defaults
    }

    pub fn get_variable<S: Borrow<str>>(&self, name: S, context: &[u32]) -> Option<u32> {
        self.variable(name)?.get(context)
    }

    pub fn set_variable<S: Borrow<str>>(&self, name: S, context: &mut [u32], value: u32) -> Option<()> {
        self.variable(name)?.set(context, value)
    }

}
