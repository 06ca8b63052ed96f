use crate::model::TrendDirection;
use crate::utils::round2;

/// Change between two prices, rounded to two decimals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceDelta {
    pub change: f64,
    /// `None` when the previous price is zero.
    pub percentage_change: Option<f64>,
    pub direction: TrendDirection,
}

pub struct MarketAnalyzer;

impl MarketAnalyzer {
    /// Compares `current` against `previous`. The direction is taken from the
    /// unrounded difference.
    pub fn price_delta(current: f64, previous: f64) -> PriceDelta {
        let change = current - previous;
        let percentage_change = if previous == 0.0 {
            None
        } else {
            Some(round2(change / previous * 100.0))
        };

        PriceDelta {
            change: round2(change),
            percentage_change,
            direction: Self::trend_direction(change),
        }
    }

    pub fn trend_direction(change: f64) -> TrendDirection {
        if change > 0.0 {
            TrendDirection::Up
        } else if change < 0.0 {
            TrendDirection::Down
        } else {
            TrendDirection::NoChange
        }
    }
}
