use chrono::{DateTime, FixedOffset};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use thiserror::Error;

/// A price/volume field reported by the data provider.
///
/// The declaration order is the canonical column order of every long-form
/// table produced by the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Open,
    High,
    Low,
    Close,
    AdjClose,
    Volume,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::Open,
        Field::High,
        Field::Low,
        Field::Close,
        Field::AdjClose,
        Field::Volume,
    ];

    /// Position of the field in the canonical order.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Provider spelling, e.g. `Adj Close`.
    pub fn label(self) -> &'static str {
        match self {
            Field::Open => "Open",
            Field::High => "High",
            Field::Low => "Low",
            Field::Close => "Close",
            Field::AdjClose => "Adj Close",
            Field::Volume => "Volume",
        }
    }

    /// Recognises provider and snake-case spellings, ignoring case.
    pub fn from_label(label: &str) -> Option<Field> {
        let key = label.trim().to_ascii_lowercase().replace(['_', '-'], " ");
        match key.as_str() {
            "open" => Some(Field::Open),
            "high" => Some(Field::High),
            "low" => Some(Field::Low),
            "close" => Some(Field::Close),
            "adj close" | "adjclose" | "adjusted close" => Some(Field::AdjClose),
            "volume" => Some(Field::Volume),
            _ => None,
        }
    }

    /// Sorts fields into canonical order and drops duplicates.
    pub fn canonical_order(fields: impl IntoIterator<Item = Field>) -> Vec<Field> {
        let set: BTreeSet<Field> = fields.into_iter().collect();
        set.into_iter().collect()
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which level of a two-level column label carries the field name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelOrder {
    /// `(field, ticker)`
    FieldOuter,
    /// `(ticker, field)`
    TickerOuter,
}

impl LabelOrder {
    /// Decides the nesting order of a set of `(outer, inner)` labels.
    ///
    /// The outer level is the field level when it contains the complete field
    /// enumeration. Otherwise the inner level is assumed to hold fields, unless
    /// it has none at all while the outer level does (a field-outer panel that
    /// lacks `Adj Close`). Returns `None` when neither level names a field.
    pub fn detect<'a, I>(labels: I) -> Option<LabelOrder>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut outer_fields = HashSet::new();
        let mut inner_has_field = false;

        for (outer, inner) in labels {
            if let Some(field) = Field::from_label(outer) {
                outer_fields.insert(field);
            }
            inner_has_field |= Field::from_label(inner).is_some();
        }

        if Field::ALL.iter().all(|f| outer_fields.contains(f)) {
            Some(LabelOrder::FieldOuter)
        } else if inner_has_field {
            Some(LabelOrder::TickerOuter)
        } else if !outer_fields.is_empty() {
            Some(LabelOrder::FieldOuter)
        } else {
            None
        }
    }

    /// Splits an `(outer, inner)` label into `(ticker, field)`.
    pub fn split<'a>(self, outer: &'a str, inner: &'a str) -> (&'a str, &'a str) {
        match self {
            LabelOrder::FieldOuter => (inner, outer),
            LabelOrder::TickerOuter => (outer, inner),
        }
    }

    fn join(self, ticker: &str, field: Field) -> (String, String) {
        match self {
            LabelOrder::FieldOuter => (field.label().to_string(), ticker.to_string()),
            LabelOrder::TickerOuter => (ticker.to_string(), field.label().to_string()),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum PanelError {
    #[error("column {label} has {found} values but the index has {expected} entries")]
    RaggedColumn {
        label: String,
        expected: usize,
        found: usize,
    },
}

/// Column labels of a wide panel.
#[derive(Debug, Clone, PartialEq)]
pub enum PanelColumns {
    /// Single-ticker panel: one label per column, the field name.
    Flat(Vec<String>),
    /// Two-level labels `(outer, inner)` in either nesting order.
    Nested(Vec<(String, String)>),
}

impl PanelColumns {
    pub fn len(&self) -> usize {
        match self {
            PanelColumns::Flat(labels) => labels.len(),
            PanelColumns::Nested(labels) => labels.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A date-indexed price table whose columns are addressed by ticker and field.
///
/// Each column holds one optional value per index entry. Index entries may
/// carry a UTC offset; the normalizer reduces them to calendar dates.
#[derive(Debug, Clone, PartialEq)]
pub struct WidePanel {
    index: Vec<DateTime<FixedOffset>>,
    columns: PanelColumns,
    values: Vec<Vec<Option<f64>>>,
}

impl WidePanel {
    /// Builds a single-ticker panel whose columns are labelled by field name only.
    ///
    /// # Errors
    /// [`PanelError::RaggedColumn`] when a column's length differs from the index.
    pub fn flat(
        index: Vec<DateTime<FixedOffset>>,
        columns: Vec<(String, Vec<Option<f64>>)>,
    ) -> Result<Self, PanelError> {
        let (labels, values): (Vec<_>, Vec<_>) = columns.into_iter().unzip();
        Self::validate(&index, labels.iter().map(String::as_str), &values)?;
        Ok(Self {
            index,
            columns: PanelColumns::Flat(labels),
            values,
        })
    }

    /// Builds a panel with two-level `(outer, inner)` column labels.
    ///
    /// # Arguments
    /// * `index` - Trading timestamps shared by every column
    /// * `columns` - `(outer, inner)` label pairs with their aligned values;
    ///   either level may hold the tickers
    ///
    /// # Errors
    /// [`PanelError::RaggedColumn`] when a column's length differs from the index.
    pub fn nested(
        index: Vec<DateTime<FixedOffset>>,
        columns: Vec<((String, String), Vec<Option<f64>>)>,
    ) -> Result<Self, PanelError> {
        let (labels, values): (Vec<_>, Vec<_>) = columns.into_iter().unzip();
        let joined: Vec<String> = labels.iter().map(|(o, i)| format!("{o}/{i}")).collect();
        Self::validate(&index, joined.iter().map(String::as_str), &values)?;
        Ok(Self {
            index,
            columns: PanelColumns::Nested(labels),
            values,
        })
    }

    fn validate<'a>(
        index: &[DateTime<FixedOffset>],
        labels: impl Iterator<Item = &'a str>,
        values: &[Vec<Option<f64>>],
    ) -> Result<(), PanelError> {
        for (label, column) in labels.zip(values) {
            if column.len() != index.len() {
                return Err(PanelError::RaggedColumn {
                    label: label.to_string(),
                    expected: index.len(),
                    found: column.len(),
                });
            }
        }
        Ok(())
    }

    pub fn index(&self) -> &[DateTime<FixedOffset>] {
        &self.index
    }

    pub fn columns(&self) -> &PanelColumns {
        &self.columns
    }

    /// Number of index entries.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty() || self.columns.is_empty()
    }

    pub fn value(&self, column: usize, row: usize) -> Option<f64> {
        self.values
            .get(column)
            .and_then(|c| c.get(row))
            .copied()
            .flatten()
    }

    /// Two-level labels for every column. A flat panel is lifted to
    /// `(ticker, field)` using the supplied ticker.
    pub fn nested_labels(&self, single_ticker: &str) -> Vec<(String, String)> {
        match &self.columns {
            PanelColumns::Nested(labels) => labels.clone(),
            PanelColumns::Flat(labels) => labels
                .iter()
                .map(|field| (single_ticker.to_string(), field.clone()))
                .collect(),
        }
    }
}

/// Assembles a [`WidePanel`] from per-ticker series that may cover
/// different dates. The resulting index is the sorted union of all
/// timestamps; cells a series did not report are missing.
#[derive(Debug)]
pub struct PanelBuilder {
    order: LabelOrder,
    index: BTreeSet<DateTime<FixedOffset>>,
    columns: Vec<(String, Field, BTreeMap<DateTime<FixedOffset>, Option<f64>>)>,
}

impl PanelBuilder {
    pub fn new(order: LabelOrder) -> Self {
        Self {
            order,
            index: BTreeSet::new(),
            columns: Vec::new(),
        }
    }

    pub fn add_column<I>(&mut self, ticker: &str, field: Field, points: I) -> &mut Self
    where
        I: IntoIterator<Item = (DateTime<FixedOffset>, Option<f64>)>,
    {
        let series: BTreeMap<_, _> = points.into_iter().collect();
        self.index.extend(series.keys().copied());
        self.columns.push((ticker.to_string(), field, series));
        self
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn build(self) -> WidePanel {
        let index: Vec<_> = self.index.into_iter().collect();
        let mut labels = Vec::with_capacity(self.columns.len());
        let mut values = Vec::with_capacity(self.columns.len());

        for (ticker, field, series) in self.columns {
            labels.push(self.order.join(&ticker, field));
            values.push(
                index
                    .iter()
                    .map(|ts| series.get(ts).copied().flatten())
                    .collect(),
            );
        }

        WidePanel {
            index,
            columns: PanelColumns::Nested(labels),
            values,
        }
    }
}
