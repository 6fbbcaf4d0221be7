use super::panel::{Field, LabelOrder, PanelColumns, WidePanel};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Header of every long-form table, in column order.
pub const CANONICAL_COLUMNS: [&str; 8] = [
    "ticker",
    "date",
    "open",
    "high",
    "low",
    "close",
    "adj_close",
    "volume",
];

#[derive(Error, Debug, PartialEq)]
pub enum NormalizeError {
    /// Neither column level names a recognised price/volume field.
    #[error("unrecognised panel shape: no price fields in outer labels {outer:?} or inner labels {inner:?}")]
    ShapeMismatch {
        outer: Vec<String>,
        inner: Vec<String>,
    },
}

/// One trading day for one ticker. `None` marks a missing value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongRow {
    pub date: NaiveDate,
    pub ticker: String,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub adj_close: Option<f64>,
    pub volume: Option<f64>,
}

impl LongRow {
    fn from_values(date: NaiveDate, ticker: &str, values: [Option<f64>; 6]) -> Self {
        let [open, high, low, close, adj_close, volume] = values;
        Self {
            date,
            ticker: ticker.to_string(),
            open,
            high,
            low,
            close,
            adj_close,
            volume,
        }
    }

    /// Overlays `values`, keeping the current value wherever `values` is missing.
    fn merge(&mut self, values: [Option<f64>; 6]) {
        let slots = [
            &mut self.open,
            &mut self.high,
            &mut self.low,
            &mut self.close,
            &mut self.adj_close,
            &mut self.volume,
        ];
        for (slot, value) in slots.into_iter().zip(values) {
            if value.is_some() {
                *slot = value;
            }
        }
    }

    pub fn get(&self, field: Field) -> Option<f64> {
        match field {
            Field::Open => self.open,
            Field::High => self.high,
            Field::Low => self.low,
            Field::Close => self.close,
            Field::AdjClose => self.adj_close,
            Field::Volume => self.volume,
        }
    }
}

/// Post-normalization row ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Ticker, then date.
    TickerDate,
    /// Date, then ticker. Used for the consolidated daily CSV.
    DateTicker,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ticker" | "ticker_date" | "ticker-date" => Ok(SortOrder::TickerDate),
            "date" | "date_ticker" | "date-ticker" => Ok(SortOrder::DateTicker),
            other => Err(format!("unknown sort order '{other}', expected 'date' or 'ticker'")),
        }
    }
}

/// Long-form price table: one row per (date, ticker).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LongTable {
    rows: Vec<LongRow>,
}

impl LongTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Column header. Stable regardless of how many rows the table holds.
    pub fn columns(&self) -> &'static [&'static str] {
        &CANONICAL_COLUMNS
    }

    pub fn rows(&self) -> &[LongRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct tickers in order of first appearance.
    pub fn tickers(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .map(|r| r.ticker.as_str())
            .filter(|t| seen.insert(*t))
            .collect()
    }

    /// Stable sort by the requested key.
    pub fn sort(&mut self, order: SortOrder) {
        match order {
            SortOrder::TickerDate => self
                .rows
                .sort_by(|a, b| a.ticker.cmp(&b.ticker).then(a.date.cmp(&b.date))),
            SortOrder::DateTicker => self
                .rows
                .sort_by(|a, b| a.date.cmp(&b.date).then(a.ticker.cmp(&b.ticker))),
        }
    }

    pub fn sorted(mut self, order: SortOrder) -> Self {
        self.sort(order);
        self
    }
}

/// Flattens a wide panel into a long-form table for the requested tickers.
///
/// Tickers are visited in the order given and requested tickers missing from
/// the panel are skipped. Rows within a ticker follow the panel index; use
/// [`LongTable::sort`] for a different order. A date produces a row for a
/// ticker only when at least one of that ticker's fields has a value there.
/// Index entries that fall on the same calendar date collapse into one row:
/// field by field, a value from the later entry replaces the earlier one and a
/// missing value never erases a present one.
///
/// # Errors
/// [`NormalizeError::ShapeMismatch`] when neither column level carries a
/// recognised field name.
pub fn normalize<S: AsRef<str>>(
    panel: &WidePanel,
    tickers: &[S],
) -> Result<LongTable, NormalizeError> {
    let Some(first) = tickers.first() else {
        return Ok(LongTable::empty());
    };
    if panel.columns().is_empty() {
        return Ok(LongTable::empty());
    }

    let labels = panel.nested_labels(first.as_ref());
    let order = match panel.columns() {
        // A lifted flat panel is ticker-outer but still has to name a field.
        PanelColumns::Flat(_) => labels
            .iter()
            .any(|(_, f)| Field::from_label(f).is_some())
            .then_some(LabelOrder::TickerOuter),
        PanelColumns::Nested(_) => {
            LabelOrder::detect(labels.iter().map(|(o, i)| (o.as_str(), i.as_str())))
        }
    }
    .ok_or_else(|| shape_mismatch(&labels))?;
    debug!(?order, columns = labels.len(), "detected panel label order");

    let mut rows: Vec<LongRow> = Vec::new();
    let mut visited = HashSet::new();

    for ticker in tickers {
        let ticker = ticker.as_ref();
        if !visited.insert(ticker) {
            continue;
        }

        let mut field_columns: [Option<usize>; 6] = [None; 6];
        let mut present = false;
        for (column, (outer, inner)) in labels.iter().enumerate() {
            let (label_ticker, label_field) = order.split(outer, inner);
            if label_ticker != ticker {
                continue;
            }
            present = true;
            if let Some(field) = Field::from_label(label_field) {
                field_columns[field.index()].get_or_insert(column);
            }
        }

        if !present {
            debug!(ticker, "requested ticker not in panel, skipping");
            continue;
        }

        let start = rows.len();
        let mut by_date: HashMap<NaiveDate, usize> = HashMap::new();
        for (position, timestamp) in panel.index().iter().enumerate() {
            let values: [Option<f64>; 6] = std::array::from_fn(|k| {
                field_columns[k].and_then(|column| panel.value(column, position))
            });
            if values.iter().all(Option::is_none) {
                continue;
            }

            // Wall-clock date in the timestamp's own offset.
            let date = timestamp.date_naive();
            match by_date.entry(date) {
                Entry::Occupied(slot) => rows[*slot.get()].merge(values),
                Entry::Vacant(slot) => {
                    slot.insert(rows.len());
                    rows.push(LongRow::from_values(date, ticker, values));
                }
            }
        }
        debug!(ticker, rows = rows.len() - start, "normalized ticker");
    }

    Ok(LongTable { rows })
}

fn shape_mismatch(labels: &[(String, String)]) -> NormalizeError {
    let outer: BTreeSet<&String> = labels.iter().map(|(o, _)| o).collect();
    let inner: BTreeSet<&String> = labels.iter().map(|(_, i)| i).collect();
    NormalizeError::ShapeMismatch {
        outer: outer.into_iter().cloned().collect(),
        inner: inner.into_iter().cloned().collect(),
    }
}
