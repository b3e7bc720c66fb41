//! Relative difference between a new and a current price.

use ora_decimal::DecFloatPoint;

/// `|new - old| / old * 100`, or `+inf` when `old` is zero.
pub fn spread(new: &DecFloatPoint, old: &DecFloatPoint) -> f64 {
    match (new - old).abs().checked_div(old) {
        Some(ratio) => ratio.abs().to_f64() * 100.0,
        None => f64::INFINITY,
    }
}
