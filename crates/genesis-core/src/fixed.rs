use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
pub type Fixed64 = I32F32;

/// Milliseconds of virtual time. Every clock in the engine counts in these.
pub type Millis = u64;

/// Percentage at which a manual action completes.
pub const PROGRESS_COMPLETE: Fixed64 = Fixed64::from_bits(100 << 32);

/// Convert an f64 to Fixed64. Use only for initialization, never in sim loop.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Fixed64 {
    Fixed64::saturating_from_num(v)
}

/// Convert Fixed64 to f64. Use only for display, never in sim loop.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}

/// Scale a per-unit amount by a machine count, saturating instead of
/// overflowing.
#[inline]
pub fn scale(amount: Fixed64, count: u32) -> Fixed64 {
    amount.saturating_mul(Fixed64::saturating_from_num(count))
}

/// Percentage of `duration` covered by `elapsed`, clamped to `[0, 100]`.
///
/// A zero duration counts as already complete.
pub fn percent_elapsed(elapsed: Millis, duration: Millis) -> Fixed64 {
    if duration == 0 || elapsed >= duration {
        return PROGRESS_COMPLETE;
    }
    let ratio = Fixed64::saturating_from_num(elapsed) / Fixed64::saturating_from_num(duration);
    ratio.saturating_mul(PROGRESS_COMPLETE).min(PROGRESS_COMPLETE)
}
