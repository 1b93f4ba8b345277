use super::Error;

pub trait XmlExt {
    fn attribute_string(&self, name: &'static str) -> Result<String, Error>;

    fn attribute_string_opt(&self, name: &'static str, default: &str) -> String;

    fn attribute_int<T: FromStrRadix>(&self, name: &'static str) -> Result<T, Error>;

    fn attribute_int_opt<T: FromStrRadix>(&self, name: &'static str, default: T) -> Result<T, Error>;

    fn attribute_bool(&self, name: &'static str) -> Result<bool, Error>;

    fn attribute_bool_opt(&self, name: &'static str, default: bool) -> Result<bool, Error>;

    fn expect_tag(&self, name: &'static str) -> Result<(), Error>;
}

#[inline(always)]
fn parse_int_radix<T: FromStrRadix>(s: &str) -> Result<T, Error> {
    let s = s.trim();
    let b = s.as_bytes();
    if b.len() > 2 && b[0] == b'0' && (b[1] == b'X' || b[1] == b'x') {
        T::from_str_base(&s[2..], 16)
    } else {
        T::from_str_base(s, 10)
    }
}

pub trait FromStrRadix: Sized {
    fn from_str_base(s: &str, radix: u32) -> Result<Self, Error>;
}

macro_rules! impl_from_str_radix {
    ($($t:ty),*) => {
        $(
            impl FromStrRadix for $t {
                fn from_str_base(s: &str, radix: u32) -> Result<Self, Error> {
                    Self::from_str_radix(s, radix).map_err(Error::ParseInteger)
                }
            }
        )*
    };
}

impl_from_str_radix!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl XmlExt for xml::Node<'_, '_> {
    fn attribute_string(&self, name: &'static str) -> Result<String, Error> {
        self.attribute(name)
            .map(String::from)
            .ok_or_else(|| Error::AttributeExpected(name))
    }

    fn attribute_string_opt(&self, name: &'static str, default: &str) -> String {
        self.attribute(name)
            .map(String::from)
            .unwrap_or_else(|| default.to_owned())
    }

    fn attribute_int<T: FromStrRadix>(&self, name: &'static str) -> Result<T, Error> {
        let s = self
            .attribute(name)
            .ok_or_else(|| Error::AttributeExpected(name))?;
        parse_int_radix(s)
    }

    fn attribute_int_opt<T: FromStrRadix>(&self, name: &'static str, default: T) -> Result<T, Error> {
        if let Some(s) = self.attribute(name) {
            parse_int_radix(s)
        } else {
            Ok(default)
        }
    }

    fn attribute_bool(&self, name: &'static str) -> Result<bool, Error> {
        self.attribute(name)
            .ok_or_else(|| Error::AttributeExpected(name))?
            .parse::<bool>()
            .map_err(Error::ParseBool)
    }

    fn attribute_bool_opt(&self, name: &'static str, default: bool) -> Result<bool, Error> {
        if let Some(s) = self.attribute(name) {
            s.parse::<bool>().map_err(Error::ParseBool)
        } else {
            Ok(default)
        }
    }

    fn expect_tag(&self, name: &'static str) -> Result<(), Error> {
        if self.tag_name().name() != name {
            Err(Error::TagUnexpected(self.tag_name().name().to_owned()))
        } else {
            Ok(())
        }
    }
}
