use crate::error::InvalidMetricsError;
use crate::models::{Interpretation, OiSnapshot, Signal};
use crate::processor::AggregatedMetrics;

/// Direction of a change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Up,
    Down,
    Flat,
}

impl Trend {
    pub fn of_price(change: f64) -> Self {
        if change > 0.0 {
            Trend::Up
        } else if change < 0.0 {
            Trend::Down
        } else {
            Trend::Flat
        }
    }

    pub fn of_oi(change: i64) -> Self {
        match change.signum() {
            1 => Trend::Up,
            -1 => Trend::Down,
            _ => Trend::Flat,
        }
    }
}

/// One row of the decision table
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub price: Trend,
    pub oi: Trend,
    pub interpretation: Interpretation,
    pub signal: Signal,
}

/// Evaluated top to bottom, first match wins
pub const RULES: [Rule; 5] = [
    Rule { price: Trend::Up, oi: Trend::Up, interpretation: Interpretation::LongBuildup, signal: Signal::Buy },
    Rule { price: Trend::Down, oi: Trend::Up, interpretation: Interpretation::ShortBuildup, signal: Signal::Sell },
    Rule { price: Trend::Down, oi: Trend::Down, interpretation: Interpretation::LongUnwinding, signal: Signal::Sell },
    Rule { price: Trend::Up, oi: Trend::Down, interpretation: Interpretation::ShortCovering, signal: Signal::Buy },
    Rule { price: Trend::Flat, oi: Trend::Flat, interpretation: Interpretation::Neutral, signal: Signal::Hold },
];

/// Used when no row matches (one side flat, the other moving)
pub const FALLBACK: (Interpretation, Signal) = (Interpretation::Neutral, Signal::Hold);

/// Look up the table for a price change and an OI change
pub fn evaluate(price_change: f64, oi_change: i64) -> (Interpretation, Signal) {
    let price = Trend::of_price(price_change);
    let oi = Trend::of_oi(oi_change);

    RULES
        .iter()
        .find(|rule| rule.price == price && rule.oi == oi)
        .map(|rule| (rule.interpretation, rule.signal))
        .unwrap_or(FALLBACK)
}

/// OI change the rules look at: futures when comparable with the previous observation, calls otherwise
pub fn relevant_oi_change(metrics: &AggregatedMetrics) -> i64 {
    if metrics.has_futures {
        metrics.change_in_future_oi
    } else {
        metrics.change_in_call_oi
    }
}

/// Classify one cycle's metrics
pub fn classify(metrics: &AggregatedMetrics) -> Result<(Interpretation, Signal), InvalidMetricsError> {
    for (field, value) in [("ltp", metrics.ltp), ("change_in_ltp", metrics.change_in_ltp)] {
        if !value.is_finite() {
            return Err(InvalidMetricsError {
                symbol: metrics.symbol.clone(),
                reason: format!("{} is not a number: {}", field, value),
            });
        }
    }

    Ok(evaluate(metrics.change_in_ltp, relevant_oi_change(metrics)))
}

/// Interpretation between two stored snapshots of a symbol (lookback windows)
pub fn interpret_between(current: &OiSnapshot, past: &OiSnapshot) -> Interpretation {
    let price_change = current.ltp - past.ltp;
    let oi_change = if current.future_oi > 0 && past.future_oi > 0 {
        current.future_oi as i64 - past.future_oi as i64
    } else {
        current.call_oi as i64 - past.call_oi as i64
    };

    evaluate(price_change, oi_change).0
}
