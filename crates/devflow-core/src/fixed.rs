use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
///
/// Every stock level and flow volume is a `Fixed64`. Addition and
/// subtraction are exact, which is what keeps the ticket total conserved
/// bit-for-bit across any number of steps.
pub type Fixed64 = I32F32;

/// Ticks are the atomic unit of simulation time (one step).
pub type Ticks = u64;

/// Upper bound on any single quantity (rate, capacity, or total ticket
/// count) accepted by a configuration. Keeps every intermediate value well
/// inside the `Fixed64` integer range.
pub const MAX_TICKETS: u32 = 1_000_000_000;

/// Convert an f64 to Fixed64, or `None` if it is NaN or out of range.
/// Use only at the configuration boundary, never in the step loop.
#[inline]
pub fn checked_f64_to_fixed64(v: f64) -> Option<Fixed64> {
    Fixed64::checked_from_num(v)
}

/// Convert Fixed64 to f64. Use only for display and reports.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}

/// Remaining room below `limit` for a stock currently at `level`, floored
/// at zero.
#[inline]
pub fn headroom(limit: Fixed64, level: Fixed64) -> Fixed64 {
    (limit - level).max(Fixed64::ZERO)
}
