use std::num::FpCategory;

use crate::bits::calculate_mask;
use crate::deserialise::error::Error;
use crate::deserialise::parse::XmlExt;

/// Bit layout of a floating point encoding.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct FloatFormat {
    size: usize,
    sign_pos: u32,
    frac_pos: u32,
    frac_size: u32,
    exp_pos: u32,
    exp_max: i32,
    exp_size: u32,
    bias: i32,
    j_bit_implied: bool,
}

impl FloatFormat {
    pub const fn float4() -> Self {
        FloatFormat {
            size: 4,
            sign_pos: 31,
            frac_pos: 0,
            frac_size: 23,
            exp_pos: 23,
            exp_size: 8,
            exp_max: (1 << 8) - 1,
            bias: 127,
            j_bit_implied: true,
        }
    }

    pub const fn float8() -> Self {
        FloatFormat {
            size: 8,
            sign_pos: 63,
            frac_pos: 0,
            frac_size: 52,
            exp_pos: 52,
            exp_size: 11,
            exp_max: (1 << 11) - 1,
            bias: 1023,
            j_bit_implied: true,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn bits(&self) -> usize {
        self.size * 8
    }

    pub fn bias(&self) -> i32 {
        self.bias
    }

    pub fn j_bit_implied(&self) -> bool {
        self.j_bit_implied
    }

    pub fn sign(&self, x: u64) -> bool {
        let y = x.checked_shr(self.sign_pos).unwrap_or(0);
        (y & 1) != 0
    }

    pub fn exponent_code(&self, x: u64) -> i32 {
        let y = x.checked_shr(self.exp_pos).unwrap_or(0);
        (y & calculate_mask_bits(self.exp_size)) as i32
    }

    /// The fraction field, right aligned.
    pub fn fractional_code(&self, x: u64) -> u64 {
        let y = x.checked_shr(self.frac_pos).unwrap_or(0);
        y & calculate_mask_bits(self.frac_size)
    }

    fn with_sign(&self, x: u64, sign: bool) -> u64 {
        if !sign {
            x
        } else {
            x | 1u64.checked_shl(self.sign_pos).unwrap_or(0)
        }
    }

    fn with_exponent_code(&self, x: u64, code: u64) -> u64 {
        x | code.checked_shl(self.exp_pos).unwrap_or(0)
    }

    fn with_fractional_code(&self, x: u64, code: u64) -> u64 {
        x | code.checked_shl(self.frac_pos).unwrap_or(0)
    }

    pub fn zero_encoding(&self, sign: bool) -> u64 {
        self.with_sign(0, sign)
    }

    pub fn infinity_encoding(&self, sign: bool) -> u64 {
        let res = self.with_exponent_code(0, self.exp_max as u64);
        self.with_sign(res, sign)
    }

    pub fn nan_encoding(&self, sign: bool) -> u64 {
        let quiet = 1u64.checked_shl(self.frac_size.saturating_sub(1)).unwrap_or(0);
        let res = self.with_fractional_code(0, quiet);
        let res = self.with_exponent_code(res, self.exp_max as u64);
        self.with_sign(res, sign)
    }

    /// Classifies `encoding` and computes its value as a host double.
    pub fn host_float(&self, encoding: u64) -> (FpCategory, f64) {
        let encoding = encoding & calculate_mask(self.size);

        let sign = self.sign(encoding);
        let frac = self.fractional_code(encoding);
        let exp = self.exponent_code(encoding);

        let signed = |value: f64| if sign { -value } else { value };
        let scale = 2f64.powi(self.frac_size as i32);

        if exp == 0 {
            if frac == 0 {
                return (FpCategory::Zero, signed(0.0));
            }
            let value = (frac as f64 / scale) * 2f64.powi(1 - self.bias);
            return (FpCategory::Subnormal, signed(value));
        }

        if exp == self.exp_max {
            return if frac == 0 {
                (FpCategory::Infinite, signed(f64::INFINITY))
            } else {
                (FpCategory::Nan, signed(f64::NAN))
            };
        }

        let mantissa = if self.j_bit_implied {
            1.0 + frac as f64 / scale
        } else {
            frac as f64 / scale * 2.0
        };

        (FpCategory::Normal, signed(mantissa * 2f64.powi(exp - self.bias)))
    }

    pub fn from_xml(input: xml::Node) -> Result<Self, Error> {
        input.expect_tag("floatformat")?;

        let size = input.attribute_int("size")?;
        let sign_pos = input.attribute_int("signpos")?;
        let frac_pos = input.attribute_int("fracpos")?;
        let frac_size = input.attribute_int("fracsize")?;
        let exp_pos = input.attribute_int("exppos")?;
        let exp_size: u32 = input.attribute_int("expsize")?;
        let bias = input.attribute_int("bias")?;
        let j_bit_implied = input.attribute_bool_opt("jbitimplied", false)?;

        if exp_size == 0 || exp_size >= 31 {
            return Err(Error::Invariant("float format exponent size out of range"));
        }

        Ok(FloatFormat {
            size,
            sign_pos,
            frac_pos,
            frac_size,
            exp_pos,
            exp_size,
            exp_max: (1i32 << exp_size) - 1,
            bias,
            j_bit_implied,
        })
    }
}

fn calculate_mask_bits(bits: u32) -> u64 {
    1u64.checked_shl(bits).unwrap_or(0).wrapping_sub(1)
}
