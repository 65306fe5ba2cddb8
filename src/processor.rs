use crate::error::MalformedPayloadError;
use crate::models::{OiSnapshot, SymbolKind};
use crate::nse::models::{ChainBody, IndexChain, RawChainPayload, SideDetail, StrikeRecord};
use serde::{Deserialize, Serialize};

/// Largest count accepted from the provider; keeps every delta within `i64`
const MAX_COUNT: u64 = i64::MAX as u64;

/// Per-symbol totals and deltas for one fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedMetrics {
    pub symbol: String,
    pub kind: SymbolKind,
    pub provider_timestamp: Option<String>,

    pub ltp: f64,
    pub volume: u64,
    pub future_oi_total: u64,
    pub call_oi_total: u64,
    pub put_oi_total: u64,

    pub change_in_ltp: f64,
    pub change_in_future_oi: i64,
    pub change_in_call_oi: i64,
    pub change_in_put_oi: i64,

    /// Futures OI is comparable with the previous observation, so it drives the rules
    pub has_futures: bool,
    pub pcr: Option<f64>,
    pub max_pain: Option<f64>,
}

/// Underlying price and volume, located differently per chain shape
struct Underlying {
    ltp: f64,
    volume: u64,
}

/// Reduce a raw chain into totals and deltas against `previous`
pub fn aggregate(
    payload: &RawChainPayload,
    previous: Option<&OiSnapshot>,
) -> Result<AggregatedMetrics, MalformedPayloadError> {
    let symbol = payload.symbol.as_str();
    let strikes = payload.body.strikes();

    // Step 1: Sum both option sides across strikes
    let mut call_oi_total: u64 = 0;
    let mut put_oi_total: u64 = 0;
    let mut by_strike: Vec<(f64, u64, u64)> = Vec::with_capacity(strikes.len());

    for record in strikes {
        let strike = record
            .strike_price
            .filter(|s| s.is_finite())
            .ok_or_else(|| MalformedPayloadError::new(symbol, "strike record without strikePrice"))?;

        let call_oi = side_oi(symbol, strike, "CE", record.call.as_ref())?;
        let put_oi = side_oi(symbol, strike, "PE", record.put.as_ref())?;

        call_oi_total = add_count(symbol, "call openInterest total", call_oi_total, call_oi)?;
        put_oi_total = add_count(symbol, "put openInterest total", put_oi_total, put_oi)?;
        by_strike.push((strike, call_oi, put_oi));
    }

    // Step 2: Futures OI (absent quote counts as zero)
    let mut future_oi_total: u64 = 0;
    if let Some(contracts) = &payload.futures {
        for contract in contracts {
            let oi = to_count(symbol, "futures openInterest", contract.open_interest)?;
            future_oi_total = add_count(symbol, "futures openInterest total", future_oi_total, oi)?;
        }
    }
    // A previous observation without futures stores zero OI, which is no baseline
    let has_futures = payload.futures.as_ref().is_some_and(|c| !c.is_empty())
        && previous.is_none_or(|prev| prev.future_oi > 0);

    // Step 3: Underlying, per shape
    let underlying = match &payload.body {
        ChainBody::Index(chain) => index_underlying(symbol, chain)?,
        ChainBody::Equity(_) => equity_underlying(symbol, strikes)?,
    };

    // Step 4: Deltas (zero on the first observation)
    let (change_in_ltp, change_in_future_oi, change_in_call_oi, change_in_put_oi) = match previous {
        Some(prev) => (
            underlying.ltp - prev.ltp,
            delta(symbol, "future_oi", future_oi_total, prev.future_oi)?,
            delta(symbol, "call_oi", call_oi_total, prev.call_oi)?,
            delta(symbol, "put_oi", put_oi_total, prev.put_oi)?,
        ),
        None => (0.0, 0, 0, 0),
    };

    Ok(AggregatedMetrics {
        symbol: symbol.to_string(),
        kind: payload.kind(),
        provider_timestamp: payload.body.timestamp().map(str::to_string),
        ltp: underlying.ltp,
        volume: underlying.volume,
        future_oi_total,
        call_oi_total,
        put_oi_total,
        change_in_ltp,
        change_in_future_oi,
        change_in_call_oi,
        change_in_put_oi,
        has_futures,
        pcr: put_call_ratio(put_oi_total, call_oi_total),
        max_pain: calculate_max_pain(&by_strike),
    })
}

/// Index chains: `records.underlyingValue` and `filtered.CE/PE.totVol`
fn index_underlying(symbol: &str, chain: &IndexChain) -> Result<Underlying, MalformedPayloadError> {
    let ltp = chain
        .records
        .underlying_value
        .filter(|v| v.is_finite())
        .ok_or_else(|| MalformedPayloadError::new(symbol, "missing records.underlyingValue"))?;

    let filtered = chain
        .filtered
        .as_ref()
        .ok_or_else(|| MalformedPayloadError::new(symbol, "missing filtered section"))?;

    let ce_volume = to_count(symbol, "filtered.CE.totVol", filtered.ce_totals.as_ref().and_then(|t| t.total_volume))?;
    let pe_volume = to_count(symbol, "filtered.PE.totVol", filtered.pe_totals.as_ref().and_then(|t| t.total_volume))?;

    let volume = add_count(symbol, "filtered totVol", ce_volume, pe_volume)?;
    Ok(Underlying { ltp, volume })
}

/// Equity chains: the underlying is repeated inside each side detail,
/// volume is the sum of per-side traded volume
fn equity_underlying(symbol: &str, strikes: &[StrikeRecord]) -> Result<Underlying, MalformedPayloadError> {
    let ltp = strikes
        .iter()
        .flat_map(|r| [r.call.as_ref(), r.put.as_ref()])
        .flatten()
        .find_map(|side| side.underlying_value.filter(|v| v.is_finite()))
        .ok_or_else(|| MalformedPayloadError::new(symbol, "no underlyingValue in any strike"))?;

    let mut volume: u64 = 0;
    for record in strikes {
        for (label, side) in [("CE", record.call.as_ref()), ("PE", record.put.as_ref())] {
            if let Some(side) = side {
                let field = format!("{} totalTradedVolume", label);
                let traded = to_count(symbol, &field, side.total_traded_volume)?;
                volume = add_count(symbol, "totalTradedVolume total", volume, traded)?;
            }
        }
    }

    Ok(Underlying { ltp, volume })
}

/// OI of one side; a strike may list only one side
fn side_oi(symbol: &str, strike: f64, label: &str, side: Option<&SideDetail>) -> Result<u64, MalformedPayloadError> {
    match side {
        Some(detail) => to_count(symbol, &format!("{} {} openInterest", strike, label), detail.open_interest),
        None => Ok(0),
    }
}

/// Convert a provider number into a non-negative integer count
fn to_count(symbol: &str, field: &str, value: Option<f64>) -> Result<u64, MalformedPayloadError> {
    let v = value.ok_or_else(|| MalformedPayloadError::new(symbol, format!("missing {}", field)))?;

    if !v.is_finite() || v < 0.0 || v.fract() != 0.0 || v >= MAX_COUNT as f64 {
        return Err(MalformedPayloadError::new(
            symbol,
            format!("{} is not a non-negative integer: {}", field, v),
        ));
    }
    Ok(v as u64)
}

/// Running total that stays representable as a signed delta
fn add_count(symbol: &str, field: &str, total: u64, value: u64) -> Result<u64, MalformedPayloadError> {
    total
        .checked_add(value)
        .filter(|sum| *sum <= MAX_COUNT)
        .ok_or_else(|| MalformedPayloadError::new(symbol, format!("{} overflows", field)))
}

fn delta(symbol: &str, field: &str, current: u64, previous: u64) -> Result<i64, MalformedPayloadError> {
    let overflow = || MalformedPayloadError::new(symbol, format!("{} delta out of range", field));
    let current = i64::try_from(current).map_err(|_| overflow())?;
    let previous = i64::try_from(previous).map_err(|_| overflow())?;
    current.checked_sub(previous).ok_or_else(overflow)
}

/// Put-call ratio from OI totals
pub fn put_call_ratio(put_oi: u64, call_oi: u64) -> Option<f64> {
    if call_oi == 0 {
        None
    } else {
        Some(put_oi as f64 / call_oi as f64)
    }
}

/// Strike at which option writers pay out the least at expiry.
/// Input rows are `(strike, call_oi, put_oi)`; ties go to the lower strike.
pub fn calculate_max_pain(by_strike: &[(f64, u64, u64)]) -> Option<f64> {
    let mut best: Option<(f64, f64)> = None;

    for &(settle, _, _) in by_strike {
        let payout: f64 = by_strike
            .iter()
            .map(|&(strike, call_oi, put_oi)| {
                let call_loss = (settle - strike).max(0.0) * call_oi as f64;
                let put_loss = (strike - settle).max(0.0) * put_oi as f64;
                call_loss + put_loss
            })
            .sum();

        best = match best {
            Some((b_strike, b_payout))
                if b_payout < payout || (b_payout == payout && b_strike <= settle) =>
            {
                Some((b_strike, b_payout))
            }
            _ => Some((settle, payout)),
        };
    }

    best.map(|(strike, _)| strike)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_count_rejects_bad_numbers() {
        assert_eq!(to_count("X", "oi", Some(1500.0)).unwrap(), 1500);
        assert!(to_count("X", "oi", None).is_err());
        assert!(to_count("X", "oi", Some(-1.0)).is_err());
        assert!(to_count("X", "oi", Some(12.5)).is_err());
        assert!(to_count("X", "oi", Some(f64::NAN)).is_err());
    }

    #[test]
    fn test_counts_beyond_signed_range_are_rejected() {
        assert!(to_count("X", "oi", Some(1e19)).is_err());
        assert!(add_count("X", "oi", MAX_COUNT, 1).is_err());
        assert!(add_count("X", "oi", u64::MAX, 1).is_err());
        assert_eq!(add_count("X", "oi", 2, 3).unwrap(), 5);
        assert!(delta("X", "oi", u64::MAX, 0).is_err());
        assert_eq!(delta("X", "oi", 800, 1000).unwrap(), -200);
    }

    #[test]
    fn test_max_pain() {
        // Writers lose least when settling at 110
        let rows = vec![(100.0, 100, 900), (110.0, 500, 500), (120.0, 900, 100)];
        assert_eq!(calculate_max_pain(&rows), Some(110.0));
        assert_eq!(calculate_max_pain(&[]), None);
    }

    #[test]
    fn test_max_pain_tie_prefers_lower_strike() {
        let rows = vec![(100.0, 0, 0), (110.0, 0, 0)];
        assert_eq!(calculate_max_pain(&rows), Some(100.0));
    }

    #[test]
    fn test_put_call_ratio() {
        assert_eq!(put_call_ratio(150, 100), Some(1.5));
        assert_eq!(put_call_ratio(150, 0), None);
    }
}
