use serde::{Deserialize, Serialize};

use crate::models::SymbolKind;

/// Call or put side of one strike
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SideDetail {
    #[serde(rename = "strikePrice")]
    pub strike_price: Option<f64>,

    #[serde(rename = "expiryDate")]
    pub expiry_date: Option<String>,

    #[serde(rename = "underlyingValue")]
    pub underlying_value: Option<f64>,

    #[serde(rename = "openInterest")]
    pub open_interest: Option<f64>,

    #[serde(rename = "changeinOpenInterest")]
    pub change_in_oi: Option<f64>,

    #[serde(rename = "totalTradedVolume")]
    pub total_traded_volume: Option<f64>,

    #[serde(rename = "lastPrice")]
    pub last_price: Option<f64>,
}

/// One strike row of the chain
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrikeRecord {
    #[serde(rename = "strikePrice")]
    pub strike_price: Option<f64>,

    #[serde(rename = "expiryDate")]
    pub expiry_date: Option<String>,

    #[serde(rename = "CE")]
    pub call: Option<SideDetail>,

    #[serde(rename = "PE")]
    pub put: Option<SideDetail>,
}

/// `filtered.CE` / `filtered.PE` totals of the index chain
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SideTotals {
    #[serde(rename = "totOI")]
    pub total_oi: Option<f64>,

    #[serde(rename = "totVol")]
    pub total_volume: Option<f64>,
}

// -----------------------------------------------
// INDEX CHAIN (option-chain-indices)
// -----------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexRecords {
    pub timestamp: Option<String>,

    #[serde(rename = "underlyingValue")]
    pub underlying_value: Option<f64>,

    #[serde(default, rename = "expiryDates")]
    pub expiry_dates: Vec<String>,

    #[serde(default)]
    pub data: Vec<StrikeRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexFiltered {
    #[serde(default)]
    pub data: Vec<StrikeRecord>,

    #[serde(rename = "CE")]
    pub ce_totals: Option<SideTotals>,

    #[serde(rename = "PE")]
    pub pe_totals: Option<SideTotals>,
}

/// Index chains carry the underlying price and side volumes at the top level
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexChain {
    #[serde(default)]
    pub records: IndexRecords,

    pub filtered: Option<IndexFiltered>,
}

// -----------------------------------------------
// EQUITY CHAIN (option-chain-equities)
// -----------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EquityRecords {
    pub timestamp: Option<String>,

    #[serde(default, rename = "expiryDates")]
    pub expiry_dates: Vec<String>,

    #[serde(default)]
    pub data: Vec<StrikeRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EquityFiltered {
    #[serde(default)]
    pub data: Vec<StrikeRecord>,
}

/// Equity chains only expose the underlying inside each strike's side detail
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EquityChain {
    #[serde(default)]
    pub records: EquityRecords,

    pub filtered: Option<EquityFiltered>,
}

// -----------------------------------------------
// FUTURES (quote-derivative)
// -----------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DerivativeQuote {
    #[serde(default)]
    pub stocks: Vec<DerivativeStock>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DerivativeStock {
    pub metadata: Option<DerivativeMetadata>,

    #[serde(rename = "marketDeptOrderBook")]
    pub order_book: Option<DerivativeOrderBook>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DerivativeMetadata {
    #[serde(rename = "instrumentType")]
    pub instrument_type: Option<String>,

    #[serde(rename = "expiryDate")]
    pub expiry_date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DerivativeOrderBook {
    #[serde(rename = "tradeInfo")]
    pub trade_info: Option<DerivativeTradeInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DerivativeTradeInfo {
    #[serde(rename = "openInterest")]
    pub open_interest: Option<f64>,
}

/// One futures contract and its open interest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuturesContract {
    pub expiry_date: Option<String>,
    pub open_interest: Option<f64>,
}

impl DerivativeQuote {
    /// Keep only futures contracts ("Index Futures" / "Stock Futures")
    pub fn futures_contracts(&self) -> Vec<FuturesContract> {
        self.stocks
            .iter()
            .filter_map(|stock| {
                let meta = stock.metadata.as_ref()?;
                let is_future = meta
                    .instrument_type
                    .as_deref()
                    .is_some_and(|t| t.contains("Futures"));
                if !is_future {
                    return None;
                }
                Some(FuturesContract {
                    expiry_date: meta.expiry_date.clone(),
                    open_interest: stock
                        .order_book
                        .as_ref()
                        .and_then(|ob| ob.trade_info.as_ref())
                        .and_then(|ti| ti.open_interest),
                })
            })
            .collect()
    }
}

// -----------------------------------------------
// NORMALIZED PAYLOAD
// -----------------------------------------------

/// Response body, tagged by the endpoint shape it came from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChainBody {
    Index(IndexChain),
    Equity(EquityChain),
}

impl ChainBody {
    pub fn kind(&self) -> SymbolKind {
        match self {
            ChainBody::Index(_) => SymbolKind::Index,
            ChainBody::Equity(_) => SymbolKind::Equity,
        }
    }

    /// Strikes of the current expiry (`filtered`), or every strike when
    /// the filtered section is missing
    pub fn strikes(&self) -> &[StrikeRecord] {
        let (filtered, all) = match self {
            ChainBody::Index(chain) => (chain.filtered.as_ref().map(|f| &f.data), &chain.records.data),
            ChainBody::Equity(chain) => (chain.filtered.as_ref().map(|f| &f.data), &chain.records.data),
        };
        match filtered {
            Some(data) if !data.is_empty() => data,
            _ => all,
        }
    }

    pub fn timestamp(&self) -> Option<&str> {
        match self {
            ChainBody::Index(chain) => chain.records.timestamp.as_deref(),
            ChainBody::Equity(chain) => chain.records.timestamp.as_deref(),
        }
    }
}

/// One fetch result; lives for a single pipeline invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawChainPayload {
    pub symbol: String,
    pub body: ChainBody,
    /// `None` when futures were not requested or the quote had no futures
    pub futures: Option<Vec<FuturesContract>>,
}

impl RawChainPayload {
    pub fn kind(&self) -> SymbolKind {
        self.body.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_body_has_no_strikes() {
        let chain: IndexChain = serde_json::from_str("{}").unwrap();
        assert!(ChainBody::Index(chain).strikes().is_empty());
    }

    #[test]
    fn test_strikes_prefer_filtered_section() {
        let chain: EquityChain = serde_json::from_str(
            r#"{
                "records": {"data": [{"strikePrice": 100}, {"strikePrice": 110}]},
                "filtered": {"data": [{"strikePrice": 100}]}
            }"#,
        )
        .unwrap();
        assert_eq!(ChainBody::Equity(chain).strikes().len(), 1);
    }

    #[test]
    fn test_futures_contracts_skip_options() {
        let quote: DerivativeQuote = serde_json::from_str(
            r#"{"stocks": [
                {"metadata": {"instrumentType": "Index Futures", "expiryDate": "30-Dec-2025"},
                 "marketDeptOrderBook": {"tradeInfo": {"openInterest": 1200}}},
                {"metadata": {"instrumentType": "Index Options", "expiryDate": "30-Dec-2025"},
                 "marketDeptOrderBook": {"tradeInfo": {"openInterest": 99999}}}
            ]}"#,
        )
        .unwrap();
        let futures = quote.futures_contracts();
        assert_eq!(futures.len(), 1);
        assert_eq!(futures[0].open_interest, Some(1200.0));
    }
}
