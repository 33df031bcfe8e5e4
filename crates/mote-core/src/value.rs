//! Fixed-point sample values

use core::fmt;

/// Scale factor of every sample: two implied decimal digits
pub const SCALE: i32 = 100;

/// A reading or aggregate scaled by [`SCALE`].
///
/// `2371` represents `23.71` units. The [`Display`](fmt::Display) impl renders
/// the plain decimal form with exactly two fraction digits, keeping the sign in
/// front of the integer part (`-105` renders as `-1.05`, `-5` as `-0.05`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ScaledValue(i32);

impl ScaledValue {
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// The scaled integer
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Integer part, truncated toward zero
    pub const fn whole(self) -> i32 {
        self.0 / SCALE
    }

    /// Absolute value of the two fraction digits
    pub const fn fraction(self) -> u32 {
        (self.0 % SCALE).unsigned_abs()
    }
}

impl From<i32> for ScaledValue {
    fn from(raw: i32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ScaledValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // whole() is 0 for -0.99..=-0.01, so the sign has to be emitted separately
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(
            f,
            "{}{}.{:02}",
            sign,
            self.whole().unsigned_abs(),
            self.fraction()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Write;

    fn render(raw: i32) -> heapless::String<16> {
        let mut out = heapless::String::new();
        write!(out, "{}", ScaledValue::new(raw)).unwrap();
        out
    }

    #[test]
    fn test_plain_decimal() {
        assert_eq!(render(2371), "23.71");
        assert_eq!(render(2405), "24.05");
        assert_eq!(render(100), "1.00");
        assert_eq!(render(0), "0.00");
    }

    #[test]
    fn test_negative_values_keep_single_sign() {
        assert_eq!(render(-105), "-1.05");
        assert_eq!(render(-5), "-0.05");
        assert_eq!(render(-2371), "-23.71");
    }

    #[test]
    fn test_extremes() {
        assert_eq!(render(i32::MIN), "-21474836.48");
        assert_eq!(render(i32::MAX), "21474836.47");
    }
}
