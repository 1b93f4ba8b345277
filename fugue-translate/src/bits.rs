#[inline]
pub fn calculate_mask(size: usize) -> u64 {
    if size >= 8 {
        !0u64
    } else {
        (1u64 << (size * 8)) - 1
    }
}

/// Largest addressable offset for a space of `size` bytes addressed in
/// units of `word_size` bytes.
#[inline]
pub fn highest_offset(size: usize, word_size: usize) -> u64 {
    let word_size = word_size.max(1) as u64;
    calculate_mask(size)
        .wrapping_mul(word_size)
        .wrapping_add(word_size - 1)
}

#[inline]
pub fn round_up(value: u64, multiple: u64) -> u64 {
    (value + (multiple - 1)) & !(multiple - 1)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn masks() {
        assert_eq!(calculate_mask(1), 0xff);
        assert_eq!(calculate_mask(4), 0xffff_ffff);
        assert_eq!(calculate_mask(8), !0u64);
        assert_eq!(highest_offset(2, 2), 0x1ffff);
        assert_eq!(round_up(8, 16), 16);
        assert_eq!(round_up(16, 16), 16);
        assert_eq!(round_up(17, 16), 32);
    }
}
