use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use nse_oi_tracker::error::{EmptyDataError, FetchError, PipelineError, SourceError};
use nse_oi_tracker::models::{Interpretation, Signal, SymbolKind};
use nse_oi_tracker::nse::nse_client::parse_chain;
use nse_oi_tracker::nse::{ChainSource, FuturesContract, RawChainPayload};
use nse_oi_tracker::pipeline::Pipeline;
use nse_oi_tracker::scheduler::Scheduler;
use nse_oi_tracker::store::{MemoryStore, SnapshotStore};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted provider response
enum Reply {
    Chain { ltp: f64, call_oi: u64, future_oi: Option<u64> },
    Empty,
    Timeout,
}

fn chain(ltp: f64, call_oi: u64, future_oi: Option<u64>) -> Reply {
    Reply::Chain { ltp, call_oi, future_oi }
}

#[derive(Default)]
struct StubSource {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl StubSource {
    fn with(script: Vec<(&str, Vec<Reply>)>) -> Self {
        let replies = script
            .into_iter()
            .map(|(symbol, replies)| (symbol.to_string(), replies.into()))
            .collect();
        Self { replies: Mutex::new(replies), ..Default::default() }
    }

    fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl ChainSource for StubSource {
    async fn fetch(&self, symbol: &str, kind: SymbolKind) -> Result<RawChainPayload, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .get_mut(symbol)
            .and_then(VecDeque::pop_front);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match reply {
            Some(Reply::Chain { ltp, call_oi, future_oi }) => {
                let text = match kind {
                    SymbolKind::Index => format!(
                        r#"{{"records": {{"underlyingValue": {ltp}}},
                            "filtered": {{"data": [{{"strikePrice": 100, "CE": {{"openInterest": {call_oi}}}, "PE": {{"openInterest": 50}}}}],
                                          "CE": {{"totVol": 10}}, "PE": {{"totVol": 20}}}}}}"#
                    ),
                    SymbolKind::Equity => format!(
                        r#"{{"records": {{"data": [{{"strikePrice": 100,
                            "CE": {{"openInterest": {call_oi}, "underlyingValue": {ltp}, "totalTradedVolume": 10}}}}]}}}}"#
                    ),
                };
                Ok(RawChainPayload {
                    symbol: symbol.to_string(),
                    body: parse_chain(symbol, kind, &text)?,
                    futures: future_oi.map(|oi| {
                        vec![FuturesContract { expiry_date: None, open_interest: Some(oi as f64) }]
                    }),
                })
            }
            Some(Reply::Empty) => Err(EmptyDataError { symbol: symbol.to_string() }.into()),
            Some(Reply::Timeout) | None => Err(FetchError::Timeout(format!("{} timed out", symbol)).into()),
        }
    }
}

fn at(hh: u32, mm: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 12, 1).unwrap().and_hms_opt(hh, mm, 0).unwrap()
}

fn pipeline(source: StubSource) -> Pipeline<StubSource, Arc<MemoryStore>> {
    let indices = vec!["NIFTY".to_string(), "BANKNIFTY".to_string()];
    Pipeline::new(source, Arc::new(MemoryStore::new()), indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_observation_has_zero_deltas() {
        let p = pipeline(StubSource::with(vec![("NIFTY", vec![chain(24500.0, 1000, Some(5000))])]));

        let snap = p.run_cycle_at("nifty", at(10, 0)).await.unwrap();
        assert_eq!(snap.symbol, "NIFTY");
        assert_eq!(snap.change_in_ltp, 0.0);
        assert_eq!(snap.change_in_future_oi, 0);
        assert_eq!(snap.change_in_call_oi, 0);
        assert_eq!(snap.change_in_put_oi, 0);
        assert_eq!((snap.interpretation, snap.signal), (Interpretation::Neutral, Signal::Hold));

        let symbol = p.store().get_symbol("NIFTY").await.unwrap().unwrap();
        assert_eq!(symbol.kind, SymbolKind::Index);
    }

    #[tokio::test]
    async fn test_second_observation_uses_previous_snapshot() {
        let p = pipeline(StubSource::with(vec![(
            "NIFTY",
            vec![chain(24500.0, 1000, Some(1000)), chain(24501.5, 900, Some(1200))],
        )]));

        p.run_cycle_at("NIFTY", at(10, 0)).await.unwrap();
        let snap = p.run_cycle_at("NIFTY", at(10, 1)).await.unwrap();

        assert_eq!(snap.change_in_future_oi, 200);
        assert_eq!(snap.change_in_call_oi, -100);
        assert!((snap.change_in_ltp - 1.5).abs() < 1e-9);
        // Futures drive the rules when present
        assert_eq!((snap.interpretation, snap.signal), (Interpretation::LongBuildup, Signal::Buy));
    }

    #[tokio::test]
    async fn test_futures_appearing_later_do_not_drive_rules() {
        let p = pipeline(StubSource::with(vec![(
            "NIFTY",
            vec![chain(100.0, 1000, None), chain(101.0, 800, Some(5000)), chain(102.0, 700, Some(5400))],
        )]));

        p.run_cycle_at("NIFTY", at(10, 0)).await.unwrap();

        // No futures baseline yet: price up with call OI down
        let snap = p.run_cycle_at("NIFTY", at(10, 1)).await.unwrap();
        assert_eq!(snap.change_in_call_oi, -200);
        assert_eq!((snap.interpretation, snap.signal), (Interpretation::ShortCovering, Signal::Buy));

        // Both sides now carry futures; they win over the falling call OI
        let snap = p.run_cycle_at("NIFTY", at(10, 2)).await.unwrap();
        assert_eq!(snap.change_in_future_oi, 400);
        assert_eq!((snap.interpretation, snap.signal), (Interpretation::LongBuildup, Signal::Buy));
    }

    #[tokio::test]
    async fn test_empty_data_keeps_last_snapshot() {
        let p = pipeline(StubSource::with(vec![("RELIANCE", vec![chain(1400.0, 300, None), Reply::Empty])]));

        let first = p.run_cycle_at("RELIANCE", at(10, 0)).await.unwrap();
        let err = p.run_cycle_at("RELIANCE", at(10, 1)).await.unwrap_err();

        assert!(matches!(err, PipelineError::EmptyData(_)), "got {:?}", err);
        assert!(err.is_retryable());
        assert_eq!(p.store().snapshot_count().await, 1);

        let symbol = p.store().get_symbol("RELIANCE").await.unwrap().unwrap();
        assert_eq!(symbol.kind, SymbolKind::Equity);
        assert_eq!(p.store().latest_snapshot(&symbol).await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_failed_first_fetch_registers_nothing() {
        let p = pipeline(StubSource::with(vec![("TYPO", vec![Reply::Timeout])]));

        let err = p.run_cycle_at("TYPO", at(10, 0)).await.unwrap_err();
        assert_eq!(err.kind(), "fetch");
        assert!(p.store().get_symbol("TYPO").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lock_registry_does_not_grow_with_unknown_names() {
        let p = pipeline(StubSource::default());

        for name in ["NOPE1", "NOPE2", "NOPE3"] {
            assert!(p.run_cycle_at(name, at(10, 0)).await.is_err());
        }
        assert_eq!(p.locks().tracked_count().await, 0);
    }

    #[tokio::test]
    async fn test_blank_symbol_is_invalid() {
        let p = pipeline(StubSource::default());
        let err = p.run_cycle("  ").await.unwrap_err();
        assert!(matches!(err, PipelineError::Fetch(FetchError::InvalidSymbol(_))));
    }

    #[tokio::test]
    async fn test_out_of_order_capture_is_rejected() {
        let p = pipeline(StubSource::with(vec![("NIFTY", vec![chain(1.0, 1, None), chain(2.0, 2, None)])]));

        p.run_cycle_at("NIFTY", at(10, 5)).await.unwrap();
        let err = p.run_cycle_at("NIFTY", at(10, 0)).await.unwrap_err();
        assert_eq!(err.kind(), "storage");
        assert_eq!(p.store().snapshot_count().await, 1);
    }

    #[tokio::test]
    async fn test_two_symbols_concurrently_do_not_interfere() {
        let p = pipeline(
            StubSource::with(vec![
                ("NIFTY", vec![chain(100.0, 10, None), chain(101.0, 20, None)]),
                ("RELIANCE", vec![chain(50.0, 500, None), chain(49.0, 400, None)]),
            ])
            .delayed(Duration::from_millis(10)),
        );

        let (a, b) = tokio::join!(p.run_cycle_at("NIFTY", at(10, 0)), p.run_cycle_at("RELIANCE", at(10, 0)));
        a.unwrap();
        b.unwrap();

        let (a, b) = tokio::join!(p.run_cycle_at("NIFTY", at(10, 1)), p.run_cycle_at("RELIANCE", at(10, 1)));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.change_in_call_oi, 10);
        assert_eq!(a.interpretation, Interpretation::LongBuildup);
        assert_eq!(b.change_in_call_oi, -100);
        assert_eq!(b.interpretation, Interpretation::LongUnwinding);
    }

    #[tokio::test]
    async fn test_same_symbol_cycles_are_serialized() {
        let p = Arc::new(pipeline(
            StubSource::with(vec![("NIFTY", vec![chain(100.0, 100, None), chain(100.0, 150, None)])])
                .delayed(Duration::from_millis(20)),
        ));

        let (a, b) = tokio::join!(p.run_cycle("NIFTY"), p.run_cycle("NIFTY"));
        a.unwrap();
        b.unwrap();

        let symbol = p.store().get_symbol("NIFTY").await.unwrap().unwrap();
        let rows = p.store().recent_snapshots(&symbol, 10).await.unwrap();
        assert_eq!(rows.len(), 2);
        // The later save saw the earlier one as its previous snapshot
        assert_eq!(rows[0].change_in_call_oi, 50);
        assert!(rows[0].captured_at() > rows[1].captured_at());
    }

    #[tokio::test]
    async fn test_scheduler_isolates_failures() {
        let p = Arc::new(pipeline(StubSource::with(vec![
            ("NIFTY", vec![chain(100.0, 100, None)]),
            ("BROKEN", vec![Reply::Timeout]),
            ("RELIANCE", vec![Reply::Empty]),
        ])));
        let symbols = vec!["NIFTY".to_string(), "BROKEN".to_string(), "RELIANCE".to_string()];
        let scheduler = Scheduler::new(Arc::clone(&p), symbols, Duration::from_secs(60), 2);

        let outcomes = scheduler.run_once().await;
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].result.is_ok());
        assert_eq!(outcomes[1].symbol, "BROKEN");
        assert!(outcomes[1].result.as_ref().is_err_and(|e| e.kind() == "fetch"));
        assert!(outcomes[2].result.as_ref().is_err_and(|e| e.kind() == "empty_data"));
        assert_eq!(p.store().snapshot_count().await, 1);
    }
}
