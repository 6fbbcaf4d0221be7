use crate::data::dates::DateRangeError;
use crate::data::holdings::HoldingsError;
use crate::data::{DateRange, Holdings, IngestionConfig, SortOrder};
use crate::reporting::ExportLayout;
use chrono::{Local, NaiveDate};
use std::env;
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_OUTPUT_DIR: &str = "asx_eod_output";
pub const DEFAULT_OUTPUT_CSV: &str = "DailyData.csv";

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error(transparent)]
    Dates(#[from] DateRangeError),
    #[error("ASX_HOLDINGS: {0}")]
    Holdings(#[from] HoldingsError),
    #[error("{key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Everything one downloader run needs.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloaderConfig {
    pub holdings: Holdings,
    pub range: DateRange,
    pub output_dir: PathBuf,
    pub output_csv: String,
    pub sort: SortOrder,
    pub layout: ExportLayout,
    pub ingestion: IngestionConfig,
}

impl DownloaderConfig {
    /// Reads the configuration from the process environment.
    ///
    /// Call `dotenv()` first so values from `.env` are visible.
    ///
    /// # Errors
    /// See [`DownloaderConfig::from_lookup`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok(), Local::now().date_naive())
    }

    /// Builds the configuration from a key lookup.
    ///
    /// | key | default |
    /// |---|---|
    /// | `ASX_HOLDINGS` | built-in holdings, `TICKER:SHARES` comma separated |
    /// | `ASX_START_DATE` | 60 days before `today` |
    /// | `ASX_END_DATE` | `today` |
    /// | `ASX_OUTPUT_DIR` | `asx_eod_output` |
    /// | `ASX_OUTPUT_CSV` | `DailyData.csv` |
    /// | `ASX_SORT` | `date` (or `ticker`) |
    /// | `ASX_LAYOUT` | `prices` (or `holdings`) |
    /// | `YAHOO_BASE_URL` | Yahoo chart endpoint |
    /// | `YAHOO_CACHE_DIR` | unset, cache disabled |
    ///
    /// Blank values count as unset.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] naming the offending key for unparseable
    /// dates, holdings, sort order or layout, or a reversed date range.
    pub fn from_lookup<F>(lookup: F, today: NaiveDate) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let holdings = match get("ASX_HOLDINGS") {
            Some(raw) => raw.parse::<Holdings>()?,
            None => Holdings::default(),
        };

        let range = DateRange::from_inputs(
            get("ASX_START_DATE").as_deref(),
            get("ASX_END_DATE").as_deref(),
            today,
        )?;

        let sort = match get("ASX_SORT") {
            Some(s) => s
                .parse::<SortOrder>()
                .map_err(|message| ConfigError::Invalid { key: "ASX_SORT", message })?,
            None => SortOrder::DateTicker,
        };

        let layout = match get("ASX_LAYOUT") {
            Some(s) => s
                .parse::<ExportLayout>()
                .map_err(|message| ConfigError::Invalid { key: "ASX_LAYOUT", message })?,
            None => ExportLayout::Prices,
        };

        let mut ingestion = IngestionConfig {
            cache_dir: get("YAHOO_CACHE_DIR").map(PathBuf::from),
            ..IngestionConfig::default()
        };
        if let Some(url) = get("YAHOO_BASE_URL") {
            ingestion.base_url = url;
        }

        Ok(Self {
            holdings,
            range,
            output_dir: get("ASX_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            output_csv: get("ASX_OUTPUT_CSV").unwrap_or_else(|| DEFAULT_OUTPUT_CSV.to_string()),
            sort,
            layout,
            ingestion,
        })
    }
}
