use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which option-chain endpoint serves a symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    Index,
    Equity,
}

impl SymbolKind {
    /// Index if the name is in the configured index list, equity otherwise
    pub fn resolve<S: AsRef<str>>(name: &str, indices: &[S]) -> Self {
        if indices.iter().any(|i| i.as_ref().eq_ignore_ascii_case(name)) {
            SymbolKind::Index
        } else {
            SymbolKind::Equity
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Index => "Index",
            SymbolKind::Equity => "Equity",
        }
    }
}

impl FromStr for SymbolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Index" => Ok(SymbolKind::Index),
            "Equity" => Ok(SymbolKind::Equity),
            other => Err(format!("unknown symbol kind '{}'", other)),
        }
    }
}

/// A tracked instrument, owned by the storage collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: i64,
    pub name: String,
    pub kind: SymbolKind,
}

/// OI interpretation label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interpretation {
    #[serde(rename = "Long Buildup")]
    LongBuildup,
    #[serde(rename = "Short Buildup")]
    ShortBuildup,
    #[serde(rename = "Long Unwinding")]
    LongUnwinding,
    #[serde(rename = "Short Covering")]
    ShortCovering,
    Neutral,
}

impl Interpretation {
    /// The four directional groups, in summary display order
    pub const GROUPS: [Interpretation; 4] = [
        Interpretation::LongBuildup,
        Interpretation::ShortBuildup,
        Interpretation::ShortCovering,
        Interpretation::LongUnwinding,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Interpretation::LongBuildup => "Long Buildup",
            Interpretation::ShortBuildup => "Short Buildup",
            Interpretation::LongUnwinding => "Long Unwinding",
            Interpretation::ShortCovering => "Short Covering",
            Interpretation::Neutral => "Neutral",
        }
    }
}

impl fmt::Display for Interpretation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interpretation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Long Buildup" => Ok(Interpretation::LongBuildup),
            "Short Buildup" => Ok(Interpretation::ShortBuildup),
            "Long Unwinding" => Ok(Interpretation::LongUnwinding),
            "Short Covering" => Ok(Interpretation::ShortCovering),
            "Neutral" => Ok(Interpretation::Neutral),
            other => Err(format!("unknown interpretation '{}'", other)),
        }
    }
}

/// Buy/sell signal attached to an interpretation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Buy => "Buy",
            Signal::Sell => "Sell",
            Signal::Hold => "Hold",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Signal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Buy" => Ok(Signal::Buy),
            "Sell" => Ok(Signal::Sell),
            "Hold" => Ok(Signal::Hold),
            other => Err(format!("unknown signal '{}'", other)),
        }
    }
}

/// One persisted observation of a symbol. Deltas are against the
/// previous snapshot of the same symbol (zero for the first one).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OiSnapshot {
    pub symbol: String,
    pub date: NaiveDate,
    pub time: NaiveTime,

    pub ltp: f64,
    pub change_in_ltp: f64,
    pub volume: u64,

    pub future_oi: u64,
    pub change_in_future_oi: i64,
    pub call_oi: u64,
    pub change_in_call_oi: i64,
    pub put_oi: u64,
    pub change_in_put_oi: i64,

    /// Put-call ratio, absent when there is no call OI
    pub pcr: Option<f64>,
    pub max_pain: Option<f64>,

    pub interpretation: Interpretation,
    pub signal: Signal,
}

impl OiSnapshot {
    pub fn captured_at(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_resolution() {
        let indices = ["NIFTY", "BANKNIFTY"];
        assert_eq!(SymbolKind::resolve("NIFTY", &indices), SymbolKind::Index);
        assert_eq!(SymbolKind::resolve("banknifty", &indices), SymbolKind::Index);
        assert_eq!(SymbolKind::resolve("RELIANCE", &indices), SymbolKind::Equity);
    }

    #[test]
    fn test_labels_serialize_as_display_text() {
        let json = serde_json::to_string(&Interpretation::ShortCovering).unwrap();
        assert_eq!(json, "\"Short Covering\"");
        for label in Interpretation::GROUPS {
            assert_eq!(label.as_str().parse::<Interpretation>().unwrap(), label);
        }
        assert_eq!("Hold".parse::<Signal>().unwrap(), Signal::Hold);
    }
}
