use std::collections::BTreeMap;

use ahash::AHashMap as Map;
use ustr::Ustr;

use crate::deserialise::Error;
use crate::space::AddressSpaceId;
use crate::varnodedata::VarnodeData;

/// Bidirectional mapping between register names and their locations.
///
/// Only whole registers resolve to a name; a location that is part of (or
/// wider than) a register does not.
#[derive(Debug, Clone, Default)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct RegisterNames {
    exact: Map<VarnodeData, Ustr>,
    reversed: Map<Ustr, VarnodeData>,
}

impl RegisterNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the register `name` at `location`. The first name registered
    /// for a location is the one reported by [`Self::get`].
    pub fn insert<N: AsRef<str>>(&mut self, name: N, location: VarnodeData) -> Result<(), Error> {
        let name = Ustr::from(name.as_ref());

        if let Some(existing) = self.reversed.get(&name) {
            if *existing != location {
                return Err(Error::DuplicateRegister(name.to_string()));
            }
            return Ok(());
        }

        self.exact.entry(location).or_insert(name);
        self.reversed.insert(name, location);

        Ok(())
    }

    pub fn get(&self, space: AddressSpaceId, offset: u64, size: usize) -> Option<&Ustr> {
        self.exact.get(&VarnodeData::new(space, offset, size))
    }

    pub fn get_by_name<N>(&self, name: N) -> Option<&VarnodeData>
    where N: AsRef<str> {
        self.reversed.get(&Ustr::from(name.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.reversed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reversed.is_empty()
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&Ustr, &VarnodeData)> {
        self.reversed.iter()
    }

    /// Every register keyed by location, in location order.
    pub fn all(&self) -> BTreeMap<VarnodeData, String> {
        self.exact
            .iter()
            .map(|(location, name)| (*location, name.to_string()))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn exact_names() -> Result<(), Error> {
        let reg = AddressSpaceId::new(2);
        let mut names = RegisterNames::new();

        names.insert("r0", VarnodeData::new(reg, 0, 4))?;
        names.insert("r0l", VarnodeData::new(reg, 0, 2))?;
        names.insert("r1", VarnodeData::new(reg, 4, 4))?;

        assert_eq!(names.get(reg, 0, 4).map(|n| n.as_str()), Some("r0"));
        assert_eq!(names.get(reg, 0, 2).map(|n| n.as_str()), Some("r0l"));
        assert!(names.get(reg, 1, 2).is_none());
        assert!(names.get(reg, 0, 8).is_none());
        assert!(names.get(AddressSpaceId::new(1), 0, 4).is_none());

        assert_eq!(names.get_by_name("r1"), Some(&VarnodeData::new(reg, 4, 4)));
        assert!(names.get_by_name("r2").is_none());

        let all = names.all();
        assert_eq!(all.len(), 3);
        assert_eq!(
            all.values().map(String::as_str).collect::<Vec<_>>(),
            vec!["r0l", "r0", "r1"]
        );

        Ok(())
    }

    #[test]
    fn aliases_and_duplicates() -> Result<(), Error> {
        let reg = AddressSpaceId::new(2);
        let mut names = RegisterNames::new();

        names.insert("sp", VarnodeData::new(reg, 0x20, 4))?;
        names.insert("r13", VarnodeData::new(reg, 0x20, 4))?;
        names.insert("sp", VarnodeData::new(reg, 0x20, 4))?;

        assert_eq!(names.len(), 2);
        assert_eq!(names.get(reg, 0x20, 4).map(|n| n.as_str()), Some("sp"));
        assert!(matches!(
            names.insert("sp", VarnodeData::new(reg, 0x24, 4)),
            Err(Error::DuplicateRegister(_))
        ));

        Ok(())
    }
}
