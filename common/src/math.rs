//! Share and majority arithmetic.
//!
//! Products of two amounts overflow `u128` well before realistic pool depths
//! do, so every ratio is computed over `BigUint` and narrowed at the end.

use {
    crate::{Uint, DEFAULT_DECIMALS},
    num_bigint::BigUint,
    num_traits::ToPrimitive,
};

pub fn big(value: Uint) -> BigUint {
    BigUint::from(value)
}

/// Narrow a `BigUint` back to `Uint`, saturating on overflow.
pub fn narrow(value: &BigUint) -> Uint {
    value.to_u128().unwrap_or(Uint::MAX)
}

/// `a * b / c`, zero when `c` is zero.
pub fn mul_div(a: Uint, b: Uint, c: Uint) -> Uint {
    if c == 0 {
        return 0;
    }
    narrow(&(big(a) * big(b) / big(c)))
}

/// `allocation * part / total` with `part` capped at `total`.
pub fn get_safe_share(part: Uint, total: Uint, allocation: Uint) -> Uint {
    get_uncapped_share(part.min(total), total, allocation)
}

/// `allocation * part / total` without capping `part`.
pub fn get_uncapped_share(part: Uint, total: Uint, allocation: Uint) -> Uint {
    if part == 0 || total == 0 || allocation == 0 {
        return 0;
    }
    mul_div(allocation, part, total)
}

pub fn safe_sub(a: Uint, b: Uint) -> Uint {
    a.saturating_sub(b)
}

/// Truncate an 8 decimal amount to `decimals` places of precision.
pub fn round_to_decimal(amount: Uint, decimals: i64) -> Uint {
    if decimals <= 0 || decimals >= DEFAULT_DECIMALS {
        return amount;
    }
    let scale = 10u128.pow((DEFAULT_DECIMALS - decimals) as u32);
    amount / scale * scale
}

/// Strictly more than half of `total`.
pub fn has_simple_majority(signers: usize, total: usize) -> bool {
    if signers > total || total == 0 {
        return false;
    }
    signers * 2 > total
}

/// At least two thirds of `total`.
pub fn has_super_majority(signers: usize, total: usize) -> bool {
    if signers > total || total == 0 {
        return false;
    }
    signers * 3 >= total * 2
}

/// At least one third of `total`.
pub fn has_minority(signers: usize, total: usize) -> bool {
    if signers > total || total == 0 {
        return false;
    }
    signers * 3 >= total
}

/// Median of `values`, the lower middle for even lengths.
pub fn get_median(values: &[i64]) -> i64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    sorted[(sorted.len() - 1) / 2]
}
