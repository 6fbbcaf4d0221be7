use super::normalizer::LongRow;
use std::str::FromStr;
use thiserror::Error;

/// Built-in ASX holdings, used when no holdings are configured.
pub const DEFAULT_HOLDINGS: [(&str, u64); 13] = [
    ("ALK.AX", 153_181),
    ("AMP.AX", 70_000),
    ("ASM.AX", 57_458),
    ("BHP.AX", 16_391),
    ("CAN.AX", 44_090),
    ("CBA.AX", 0),
    ("CNB.AX", 10_000),
    ("E25.AX", 20_000),
    ("ERA.AX", 700_000),
    ("PTR.AX", 9_412),
    ("VML.AX", 6_000),
    ("WBC.AX", 0),
    ("WDS.AX", 1_288),
];

#[derive(Error, Debug, PartialEq)]
pub enum HoldingsError {
    #[error("no holdings defined")]
    Empty,
    #[error("invalid share count '{shares}' for {ticker}")]
    InvalidShares { ticker: String, shares: String },
    #[error("holding entry '{0}' has no ticker")]
    MissingTicker(String),
}

/// Share count held per ticker, in the order the tickers should be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holdings {
    positions: Vec<(String, u64)>,
}

impl Default for Holdings {
    fn default() -> Self {
        Self {
            positions: DEFAULT_HOLDINGS
                .iter()
                .map(|(ticker, shares)| (ticker.to_string(), *shares))
                .collect(),
        }
    }
}

impl Holdings {
    /// # Errors
    /// [`HoldingsError::Empty`] for an empty position list.
    pub fn new(positions: Vec<(String, u64)>) -> Result<Self, HoldingsError> {
        if positions.is_empty() {
            return Err(HoldingsError::Empty);
        }
        Ok(Self { positions })
    }

    pub fn tickers(&self) -> Vec<String> {
        self.positions.iter().map(|(t, _)| t.clone()).collect()
    }

    pub fn positions(&self) -> &[(String, u64)] {
        &self.positions
    }

    pub fn shares(&self, ticker: &str) -> Option<u64> {
        self.positions
            .iter()
            .find(|(t, _)| t == ticker)
            .map(|(_, shares)| *shares)
    }

    /// Market value of the holding on the row's date: `shares × close`,
    /// rounded to cents. Missing when the close or the holding is.
    pub fn value(&self, row: &LongRow) -> Option<f64> {
        let shares = self.shares(&row.ticker)?;
        let close = row.close?;
        Some(round_to(shares as f64 * close, 2))
    }
}

/// Parses `"ALK.AX:153181, AMP.AX:70000"`. A ticker without a share count
/// is held at zero shares.
impl FromStr for Holdings {
    type Err = HoldingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut positions = Vec::new();
        for entry in s.split([',', ';']).map(str::trim).filter(|e| !e.is_empty()) {
            let (ticker, shares) = match entry.split_once(':') {
                Some((ticker, shares)) => (ticker.trim(), shares.trim()),
                None => (entry, "0"),
            };
            if ticker.is_empty() {
                return Err(HoldingsError::MissingTicker(entry.to_string()));
            }
            let shares = shares
                .replace('_', "")
                .parse::<u64>()
                .map_err(|_| HoldingsError::InvalidShares {
                    ticker: ticker.to_string(),
                    shares: shares.to_string(),
                })?;
            positions.push((ticker.to_ascii_uppercase(), shares));
        }
        Holdings::new(positions)
    }
}

pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
