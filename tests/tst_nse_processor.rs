use chrono::{NaiveDate, NaiveTime};
use nse_oi_tracker::models::{Interpretation, OiSnapshot, Signal, SymbolKind};
use nse_oi_tracker::nse::nse_client::parse_chain;
use nse_oi_tracker::nse::{FuturesContract, RawChainPayload};
use nse_oi_tracker::processor::{aggregate, calculate_max_pain, put_call_ratio};

const INDEX_CHAIN: &str = r#"{
    "records": {
        "timestamp": "01-Dec-2025 10:00:00",
        "underlyingValue": 24510.0,
        "data": []
    },
    "filtered": {
        "data": [
            {"strikePrice": 24400, "CE": {"openInterest": 100}, "PE": {"openInterest": 400}},
            {"strikePrice": 24500, "CE": {"openInterest": 300}, "PE": {"openInterest": 200}},
            {"strikePrice": 24600, "CE": {"openInterest": 600}}
        ],
        "CE": {"totOI": 1000, "totVol": 500},
        "PE": {"totOI": 600, "totVol": 700}
    }
}"#;

const EQUITY_CHAIN: &str = r#"{
    "records": {
        "data": [
            {"strikePrice": 1400,
             "CE": {"openInterest": 300, "underlyingValue": 1412.3, "totalTradedVolume": 50},
             "PE": {"openInterest": 150, "underlyingValue": 1412.3, "totalTradedVolume": 20}},
            {"strikePrice": 1420,
             "PE": {"openInterest": 90, "underlyingValue": 1412.3, "totalTradedVolume": 5}}
        ]
    }
}"#;

fn payload(symbol: &str, kind: SymbolKind, text: &str, futures: Option<Vec<FuturesContract>>) -> RawChainPayload {
    RawChainPayload {
        symbol: symbol.to_string(),
        body: parse_chain(symbol, kind, text).unwrap(),
        futures,
    }
}

fn futures(oi: f64) -> Option<Vec<FuturesContract>> {
    Some(vec![FuturesContract {
        expiry_date: Some("30-Dec-2025".to_string()),
        open_interest: Some(oi),
    }])
}

fn previous(ltp: f64, future_oi: u64, call_oi: u64, put_oi: u64) -> OiSnapshot {
    OiSnapshot {
        symbol: "NIFTY".to_string(),
        date: NaiveDate::from_ymd_opt(2025, 12, 1).unwrap(),
        time: NaiveTime::from_hms_opt(9, 59, 0).unwrap(),
        ltp,
        change_in_ltp: 0.0,
        volume: 0,
        future_oi,
        change_in_future_oi: 0,
        call_oi,
        change_in_call_oi: 0,
        put_oi,
        change_in_put_oi: 0,
        pcr: None,
        max_pain: None,
        interpretation: Interpretation::Neutral,
        signal: Signal::Hold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_totals_and_first_observation() {
        let m = aggregate(&payload("NIFTY", SymbolKind::Index, INDEX_CHAIN, None), None).unwrap();

        assert_eq!(m.ltp, 24510.0);
        assert_eq!(m.volume, 1200);
        assert_eq!(m.call_oi_total, 1000);
        assert_eq!(m.put_oi_total, 600);
        assert_eq!(m.future_oi_total, 0);
        assert!(!m.has_futures);

        assert_eq!(m.change_in_ltp, 0.0);
        assert_eq!(m.change_in_future_oi, 0);
        assert_eq!(m.change_in_call_oi, 0);
        assert_eq!(m.change_in_put_oi, 0);
        assert_eq!(m.provider_timestamp.as_deref(), Some("01-Dec-2025 10:00:00"));
    }

    #[test]
    fn test_future_oi_delta() {
        let prev = previous(24500.0, 1000, 900, 650);
        let m = aggregate(&payload("NIFTY", SymbolKind::Index, INDEX_CHAIN, futures(1200.0)), Some(&prev)).unwrap();

        assert!(m.has_futures);
        assert_eq!(m.future_oi_total, 1200);
        assert_eq!(m.change_in_future_oi, 200);
        assert_eq!(m.change_in_call_oi, 100);
        assert_eq!(m.change_in_put_oi, -50);
        assert!((m.change_in_ltp - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_equity_shape() {
        let m = aggregate(&payload("RELIANCE", SymbolKind::Equity, EQUITY_CHAIN, None), None).unwrap();

        assert_eq!(m.kind, SymbolKind::Equity);
        assert_eq!(m.ltp, 1412.3);
        assert_eq!(m.volume, 75);
        assert_eq!(m.call_oi_total, 300);
        assert_eq!(m.put_oi_total, 240);
    }

    #[test]
    fn test_pcr_and_max_pain() {
        let m = aggregate(&payload("NIFTY", SymbolKind::Index, INDEX_CHAIN, None), None).unwrap();
        assert_eq!(m.pcr, Some(0.6));
        assert!(m.max_pain.is_some());

        assert_eq!(put_call_ratio(10, 0), None);
        assert_eq!(calculate_max_pain(&[]), None);
    }

    #[test]
    fn test_missing_index_volume_is_malformed() {
        let text = r#"{
            "records": {"underlyingValue": 100.0},
            "filtered": {"data": [{"strikePrice": 100, "CE": {"openInterest": 1}}], "CE": {"totOI": 1}}
        }"#;
        let err = aggregate(&payload("NIFTY", SymbolKind::Index, text, None), None).unwrap_err();
        assert_eq!(err.symbol, "NIFTY");
    }

    #[test]
    fn test_negative_oi_is_malformed() {
        let text = r#"{"records": {"data": [
            {"strikePrice": 100, "CE": {"openInterest": -5, "underlyingValue": 101, "totalTradedVolume": 1}}
        ]}}"#;
        assert!(aggregate(&payload("ABC", SymbolKind::Equity, text, None), None).is_err());
    }

    #[test]
    fn test_missing_futures_oi_is_malformed() {
        let contracts = Some(vec![FuturesContract { expiry_date: None, open_interest: None }]);
        assert!(aggregate(&payload("NIFTY", SymbolKind::Index, INDEX_CHAIN, contracts), None).is_err());
    }
}
