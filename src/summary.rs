use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::config;
use crate::error::StoreError;
use crate::models::{Interpretation, OiSnapshot};
use crate::rules;
use crate::store::SnapshotStore;

/// Interpretation over a lookback window; `None` when no snapshot is close enough
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowView {
    pub minutes: i64,
    pub interpretation: Option<Interpretation>,
}

/// Latest state of one symbol
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub symbol: String,
    pub ltp: f64,
    pub change_in_ltp: f64,
    pub pct_oi_change: f64,
    pub interpretation: Interpretation,
    pub windows: Vec<WindowView>,
    pub time: NaiveTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryGroup {
    pub interpretation: Interpretation,
    pub rows: Vec<SummaryRow>,
}

/// Latest rows of every symbol grouped by sentiment
pub async fn build_summary<S: SnapshotStore + ?Sized>(store: &S) -> Result<Vec<SummaryGroup>, StoreError> {
    let mut rows = Vec::new();

    for symbol in store.list_symbols().await? {
        let records = store.recent_snapshots(&symbol, config::SUMMARY_HISTORY_DEPTH).await?;
        if let Some(row) = summarize_symbol(&records) {
            rows.push(row);
        }
    }

    Ok(group_rows(rows))
}

/// Summary for one symbol from its recent snapshots (newest first)
pub fn summarize_symbol(records: &[OiSnapshot]) -> Option<SummaryRow> {
    let current = records.first()?;
    let now = current.captured_at();

    let windows = config::SUMMARY_WINDOWS_MINUTES
        .iter()
        .map(|&minutes| WindowView {
            minutes,
            interpretation: find_past_record(records, now - Duration::minutes(minutes))
                .map(|past| rules::interpret_between(current, past)),
        })
        .collect();

    Some(SummaryRow {
        symbol: current.symbol.clone(),
        ltp: current.ltp,
        change_in_ltp: current.change_in_ltp,
        pct_oi_change: pct_oi_change(current),
        interpretation: current.interpretation,
        windows,
        time: current.time,
    })
}

/// Snapshot closest to `target`, if one lies within the match tolerance
pub fn find_past_record(records: &[OiSnapshot], target: NaiveDateTime) -> Option<&OiSnapshot> {
    let tolerance = config::SUMMARY_MATCH_TOLERANCE_SECS;

    records
        .iter()
        .map(|r| (r, (r.captured_at() - target).num_seconds().abs()))
        .filter(|(_, diff)| *diff <= tolerance)
        .min_by_key(|(_, diff)| *diff)
        .map(|(r, _)| r)
}

/// Call OI change as a percentage of the previous call OI
pub fn pct_oi_change(snapshot: &OiSnapshot) -> f64 {
    let base = snapshot.call_oi as i64 - snapshot.change_in_call_oi;
    if base == 0 {
        0.0
    } else {
        snapshot.change_in_call_oi as f64 / base as f64 * 100.0
    }
}

/// Split rows into the four directional groups, biggest movers first.
/// Neutral rows are left out.
pub fn group_rows(rows: Vec<SummaryRow>) -> Vec<SummaryGroup> {
    Interpretation::GROUPS
        .iter()
        .map(|&interpretation| {
            let mut group: Vec<SummaryRow> = rows
                .iter()
                .filter(|r| r.interpretation == interpretation)
                .cloned()
                .collect();
            group.sort_by(|a, b| b.pct_oi_change.abs().total_cmp(&a.pct_oi_change.abs()));
            SummaryGroup { interpretation, rows: group }
        })
        .collect()
}
