use chrono::NaiveDateTime;

use crate::error::ValidationError;
use crate::models::{Interpretation, OiSnapshot, Signal, Symbol};
use crate::processor::AggregatedMetrics;

/// Assemble the persistable record for one cycle. Touches no storage.
pub fn build(
    symbol: &Symbol,
    metrics: &AggregatedMetrics,
    interpretation: Interpretation,
    signal: Signal,
    captured_at: NaiveDateTime,
) -> Result<OiSnapshot, ValidationError> {
    if symbol.name.trim().is_empty() {
        return Err(ValidationError { field: "symbol", reason: "empty symbol name".to_string() });
    }
    if metrics.symbol != symbol.name {
        return Err(ValidationError {
            field: "symbol",
            reason: format!("metrics are for {} not {}", metrics.symbol, symbol.name),
        });
    }
    require_finite("ltp", metrics.ltp)?;
    require_finite("change_in_ltp", metrics.change_in_ltp)?;
    if let Some(pcr) = metrics.pcr {
        require_finite("pcr", pcr)?;
    }

    Ok(OiSnapshot {
        symbol: symbol.name.clone(),
        date: captured_at.date(),
        time: captured_at.time(),
        ltp: metrics.ltp,
        change_in_ltp: metrics.change_in_ltp,
        volume: metrics.volume,
        future_oi: metrics.future_oi_total,
        change_in_future_oi: metrics.change_in_future_oi,
        call_oi: metrics.call_oi_total,
        change_in_call_oi: metrics.change_in_call_oi,
        put_oi: metrics.put_oi_total,
        change_in_put_oi: metrics.change_in_put_oi,
        pcr: metrics.pcr,
        max_pain: metrics.max_pain,
        interpretation,
        signal,
    })
}

fn require_finite(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ValidationError { field, reason: format!("not a finite number: {}", value) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SymbolKind;
    use chrono::NaiveDate;

    fn metrics(symbol: &str) -> AggregatedMetrics {
        AggregatedMetrics {
            symbol: symbol.to_string(),
            kind: SymbolKind::Index,
            provider_timestamp: None,
            ltp: 24500.0,
            volume: 10,
            future_oi_total: 1200,
            call_oi_total: 500,
            put_oi_total: 700,
            change_in_ltp: 1.5,
            change_in_future_oi: 200,
            change_in_call_oi: 0,
            change_in_put_oi: 0,
            has_futures: true,
            pcr: Some(1.4),
            max_pain: Some(24500.0),
        }
    }

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 12, 1).unwrap().and_hms_opt(10, 15, 0).unwrap()
    }

    #[test]
    fn test_build_copies_metrics() {
        let symbol = Symbol { id: 1, name: "NIFTY".into(), kind: SymbolKind::Index };
        let snap = build(&symbol, &metrics("NIFTY"), Interpretation::LongBuildup, Signal::Buy, at()).unwrap();
        assert_eq!(snap.captured_at(), at());
        assert_eq!(snap.future_oi, 1200);
        assert_eq!(snap.change_in_future_oi, 200);
        assert_eq!(snap.interpretation, Interpretation::LongBuildup);
    }

    #[test]
    fn test_build_rejects_foreign_metrics() {
        let symbol = Symbol { id: 1, name: "NIFTY".into(), kind: SymbolKind::Index };
        let err = build(&symbol, &metrics("RELIANCE"), Interpretation::Neutral, Signal::Hold, at()).unwrap_err();
        assert_eq!(err.field, "symbol");
    }

    #[test]
    fn test_build_rejects_nan_ltp() {
        let symbol = Symbol { id: 1, name: "NIFTY".into(), kind: SymbolKind::Index };
        let mut m = metrics("NIFTY");
        m.ltp = f64::NAN;
        let err = build(&symbol, &m, Interpretation::Neutral, Signal::Hold, at()).unwrap_err();
        assert_eq!(err.field, "ltp");
    }
}
