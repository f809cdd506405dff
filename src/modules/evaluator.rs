//! Threshold comparison for price alerts

use crate::error::WatchError;

/// Which way the price moved relative to the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Increased,
    Decreased,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Increased => "increased",
            Direction::Decreased => "decreased",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Direction::Increased => "\u{1F7E2}",
            Direction::Decreased => "\u{1F534}",
        }
    }
}

/// Outcome of comparing a current price against the last-alerted baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub change_percent: f64,
    pub direction: Direction,
    pub fired: bool,
}

/// Compare `current_price` against `last_price` under `alert_percent`.
///
/// Fires when the absolute percentage move is at or above the threshold.
/// A non-positive or non-finite baseline is an explicit error rather than
/// an infinite/NaN comparison.
pub fn evaluate(
    last_price: f64,
    current_price: f64,
    alert_percent: f64,
) -> Result<Evaluation, WatchError> {
    if !last_price.is_finite() || last_price <= 0.0 {
        return Err(WatchError::InvalidBaseline);
    }

    let change_percent = ((current_price - last_price) / last_price * 100.0).abs();
    let direction = if current_price > last_price {
        Direction::Increased
    } else {
        Direction::Decreased
    };

    Ok(Evaluation {
        change_percent,
        direction,
        fired: change_percent >= alert_percent,
    })
}

pub fn should_fire(
    last_price: f64,
    current_price: f64,
    alert_percent: f64,
) -> Result<bool, WatchError> {
    evaluate(last_price, current_price, alert_percent).map(|e| e.fired)
}
