#![no_std]

//! Fixed-point arithmetic shared by the market contracts.
//!
//! All rates, indices, exchange rates and prices in the protocol are
//! unsigned 1e18 fixed point. Every balance-affecting multiply/divide
//! goes through `mul_div_floor` / `mul_div_ceil`, which keep the full
//! 256-bit intermediate product so `a * b` overflowing `u128` never
//! corrupts a quotient that would itself fit.

pub const SCALE_1E18: u128 = 1_000_000_000_000_000_000u128;

/// `a * b / den` rounded toward zero. `None` when `den == 0` or the
/// quotient does not fit in `u128`.
pub fn mul_div_floor(a: u128, b: u128, den: u128) -> Option<u128> {
    let (hi, lo) = mul_wide(a, b);
    div_wide(hi, lo, den).map(|(quo, _rem)| quo)
}

/// `a * b / den` rounded away from zero. `None` when `den == 0` or the
/// rounded quotient does not fit in `u128`.
pub fn mul_div_ceil(a: u128, b: u128, den: u128) -> Option<u128> {
    let (hi, lo) = mul_wide(a, b);
    let (quo, rem) = div_wide(hi, lo, den)?;
    if rem == 0 {
        Some(quo)
    } else {
        quo.checked_add(1)
    }
}

/// `a * b / 1e18`, floor.
pub fn mul_exp(a: u128, b: u128) -> Option<u128> {
    mul_div_floor(a, b, SCALE_1E18)
}

/// `a * 1e18 / b`, floor.
pub fn div_exp(a: u128, b: u128) -> Option<u128> {
    mul_div_floor(a, SCALE_1E18, b)
}

pub fn checked_add(a: u128, b: u128) -> Option<u128> {
    a.checked_add(b)
}

pub fn checked_sub(a: u128, b: u128) -> Option<u128> {
    a.checked_sub(b)
}

/// Integer square root, floor. Newton's method; converges in well under
/// 128 iterations for any `u128` input.
pub fn isqrt(x: u128) -> u128 {
    if x < 2 {
        return x;
    }
    let mut z = x;
    let mut y = (x >> 1) + 1;
    while y < z {
        z = y;
        y = (x / y + y) >> 1;
    }
    z
}

/// Schoolbook 128x128 -> 256 multiply over 64-bit limbs.
fn mul_wide(a: u128, b: u128) -> (u128, u128) {
    const MASK: u128 = (1u128 << 64) - 1;
    let (a1, a0) = (a >> 64, a & MASK);
    let (b1, b0) = (b >> 64, b & MASK);

    let p00 = a0 * b0;
    let p01 = a0 * b1;
    let p10 = a1 * b0;
    let p11 = a1 * b1;

    // mid holds bits 64..192 of the product; the discarded add carry has
    // weight 2^128 in the product, i.e. 2^64 in the high limb.
    let mid = p10 + (p00 >> 64);
    let (mid, overflowed) = mid.overflowing_add(p01);
    let carry = if overflowed { 1u128 << 64 } else { 0 };

    let lo = (p00 & MASK) | (mid << 64);
    let hi = p11 + (mid >> 64) + carry;
    (hi, lo)
}

/// Bitwise long division of the 256-bit value `(hi, lo)` by `den`.
/// Returns `(quotient, remainder)`; `None` when `den == 0` or the
/// quotient exceeds `u128` (which happens exactly when `hi >= den`).
fn div_wide(hi: u128, mut lo: u128, den: u128) -> Option<(u128, u128)> {
    if den == 0 {
        return None;
    }
    if hi == 0 {
        return Some((lo / den, lo % den));
    }
    if hi >= den {
        return None;
    }
    let mut rem = hi;
    let mut quo = 0u128;
    for _ in 0..128 {
        // rem < den <= u128::MAX, so at most one bit is shifted out and
        // it is folded into the comparison below.
        let shifted_out = rem >> 127;
        rem = (rem << 1) | (lo >> 127);
        lo <<= 1;
        quo <<= 1;
        if shifted_out == 1 || rem >= den {
            rem = rem.wrapping_sub(den);
            quo |= 1;
        }
    }
    Some((quo, rem))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn small_quotients_exact() {
        assert_eq!(mul_div_floor(6, 7, 3), Some(14));
        assert_eq!(mul_div_ceil(6, 7, 3), Some(14));
        assert_eq!(mul_div_floor(7, 7, 3), Some(16));
        assert_eq!(mul_div_ceil(7, 7, 3), Some(17));
    }

    #[test]
    fn zero_divisor_is_none() {
        assert_eq!(mul_div_floor(1, 1, 0), None);
        assert_eq!(mul_div_ceil(1, 1, 0), None);
    }

    #[test]
    fn wide_product_narrow_quotient() {
        // a * b overflows u128 but the quotient fits.
        let a = u128::MAX;
        let b = 1_000_000u128;
        assert_eq!(mul_div_floor(a, b, b), Some(a));
        assert_eq!(mul_div_ceil(a, b, b), Some(a));
        assert_eq!(mul_div_floor(a, b, b * 2), Some(a / 2));
    }

    #[test]
    fn wide_quotient_overflow_is_none() {
        assert_eq!(mul_div_floor(u128::MAX, 2, 1), None);
        assert_eq!(mul_div_ceil(u128::MAX, u128::MAX, 1), None);
    }

    #[test]
    fn ceil_exceeds_floor_by_at_most_one() {
        let cases: [(u128, u128, u128); 4] = [
            (u128::MAX, 3, 7),
            (1u128 << 100, (1u128 << 90) + 17, (1u128 << 80) + 1),
            (SCALE_1E18, SCALE_1E18 + 1, SCALE_1E18 - 1),
            (12345, 67890, 991),
        ];
        for (a, b, d) in cases {
            let floor = mul_div_floor(a, b, d).unwrap();
            let ceil = mul_div_ceil(a, b, d).unwrap();
            assert!(ceil == floor || ceil == floor + 1);
        }
    }

    #[test]
    fn exp_wrappers() {
        assert_eq!(mul_exp(SCALE_1E18, SCALE_1E18), Some(SCALE_1E18));
        assert_eq!(mul_exp(2 * SCALE_1E18, SCALE_1E18 / 2), Some(SCALE_1E18));
        assert_eq!(div_exp(SCALE_1E18, 2 * SCALE_1E18), Some(SCALE_1E18 / 2));
        assert_eq!(div_exp(1, 0), None);
    }

    #[test]
    fn isqrt_bounds() {
        for n in [0u128, 1, 2, 3, 4, 15, 16, 17, 1_000_000, u128::MAX] {
            let r = isqrt(n);
            assert!(r.checked_mul(r).map(|s| s <= n).unwrap_or(false) || n == 0);
            if let Some(next_sq) = (r + 1).checked_mul(r + 1) {
                assert!(next_sq > n);
            }
        }
    }

    #[test]
    fn isqrt_perfect_squares() {
        assert_eq!(isqrt(144), 12);
        assert_eq!(isqrt(SCALE_1E18 * SCALE_1E18), SCALE_1E18);
    }
}
