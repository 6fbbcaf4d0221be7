use super::dates::DateRange;
use super::panel::{Field, LabelOrder, PanelBuilder, WidePanel};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// Daily bars for one ticker, one series per field the provider reported.
pub type TickerSeries = Vec<(Field, Vec<(DateTime<FixedOffset>, Option<f64>)>)>;

/// Settings for the price retrieval.
///
/// `cache_dir` controls the on-disk response cache: `None` disables it, so
/// every run goes to the network. With a directory set, raw chart responses
/// are stored there and reused for identical requests.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestionConfig {
    pub base_url: String,
    pub interval: String,
    pub include_adj_close: bool,
    pub cache_dir: Option<PathBuf>,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            interval: "1d".to_string(),
            include_adj_close: true,
            cache_dir: None,
        }
    }
}

/// Anything that can produce a wide price panel for a set of tickers.
#[async_trait]
pub trait PanelSource {
    async fn fetch_panel(&self, tickers: &[String], range: &DateRange) -> Result<WidePanel>;
}

/// Fetches end-of-day bars from the Yahoo Finance chart endpoint.
///
/// Tickers are requested one after another. A ticker that fails or returns
/// no bars is logged and left out of the panel; the call only fails when
/// every ticker failed.
pub struct DataIngestion {
    config: IngestionConfig,
    client: reqwest::Client,
}

impl DataIngestion {
    /// Creates a new chart client.
    ///
    /// # Arguments
    /// * `config` - Endpoint, interval and cache settings
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: IngestionConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self { config, client })
    }

    /// Fetches and parses the chart for a single ticker.
    ///
    /// # Arguments
    /// * `ticker` - Provider symbol, e.g. `BHP.AX`
    /// * `range` - Inclusive range of exchange-local trading dates
    ///
    /// # Returns
    /// One series per reported field, holding only bars whose local date
    /// lies within `range`.
    ///
    /// # Errors
    /// Returns an error if the request fails, the provider reports an error
    /// or the response cannot be parsed.
    pub async fn fetch_ticker(&self, ticker: &str, range: &DateRange) -> Result<TickerSeries> {
        let data = self.fetch_chart(ticker, range).await?;
        let series = parse_chart(ticker, &data, self.config.include_adj_close)?;
        Ok(clip_to_range(series, range))
    }

    async fn fetch_chart(&self, ticker: &str, range: &DateRange) -> Result<serde_json::Value> {
        let cache_path = self.cache_path(ticker, range);

        if let Some(path) = &cache_path {
            if let Ok(bytes) = tokio::fs::read(path).await {
                match serde_json::from_slice(&bytes) {
                    Ok(value) => {
                        debug!(ticker, path = %path.display(), "using cached chart response");
                        return Ok(value);
                    }
                    Err(e) => warn!(ticker, path = %path.display(), "ignoring corrupt cache entry: {}", e),
                }
            }
        }

        let (period1, period2) = request_bounds(range);
        let url = format!(
            "{}/{}?period1={}&period2={}&interval={}&events=history",
            self.config.base_url.trim_end_matches('/'),
            urlencoding::encode(ticker),
            period1,
            period2,
            self.config.interval,
        );
        debug!(ticker, %url, "requesting chart");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Request failed for {}: {}", ticker, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("HTTP error for {}: {} - {}", ticker, status, body));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse JSON for {}: {}", ticker, e))?;

        if let Some(path) = &cache_path {
            if let Err(e) = write_cache(path, &data).await {
                warn!(ticker, path = %path.display(), "failed to write cache entry: {:#}", e);
            }
        }

        Ok(data)
    }

    fn cache_path(&self, ticker: &str, range: &DateRange) -> Option<PathBuf> {
        let dir = self.config.cache_dir.as_ref()?;
        let safe: String = ticker
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        Some(dir.join(format!(
            "{}_{}_{}_{}.json",
            safe,
            range.start(),
            range.end(),
            self.config.interval
        )))
    }
}

#[async_trait]
impl PanelSource for DataIngestion {
    async fn fetch_panel(&self, tickers: &[String], range: &DateRange) -> Result<WidePanel> {
        let mut builder = PanelBuilder::new(LabelOrder::TickerOuter);
        let mut last_error = None;
        let mut failures = 0usize;

        for ticker in tickers {
            match self.fetch_ticker(ticker, range).await {
                Ok(series) if series.iter().all(|(_, points)| points.is_empty()) => {
                    warn!(ticker = %ticker, "no bars returned");
                }
                Ok(series) => {
                    let bars = series.first().map(|(_, p)| p.len()).unwrap_or(0);
                    info!(ticker = %ticker, bars, "downloaded");
                    for (field, points) in series {
                        builder.add_column(ticker, field, points);
                    }
                }
                Err(e) => {
                    warn!(ticker = %ticker, "download failed: {:#}", e);
                    failures += 1;
                    last_error = Some(e);
                }
            }
        }

        if failures > 0 && failures == tickers.len() {
            let e = last_error.unwrap_or_else(|| anyhow!("no tickers requested"));
            return Err(e.context(format!("download failed for all {} tickers", failures)));
        }

        debug!(columns = builder.column_count(), "assembled panel");
        Ok(builder.build())
    }
}

fn midnight_timestamp(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or(0)
}

/// `period1`/`period2` for a range of exchange-local dates.
///
/// Bars are stamped in exchange time, up to a day away from UTC (ASX bars
/// open at 23:00 UTC the previous day), so the UTC window is padded by a day
/// on each side and [`clip_to_range`] drops the surplus.
fn request_bounds(range: &DateRange) -> (i64, i64) {
    (
        midnight_timestamp(range.start() - Duration::days(1)),
        midnight_timestamp(range.end_exclusive() + Duration::days(1)),
    )
}

/// Keeps the bars whose local calendar date lies within `range`.
fn clip_to_range(series: TickerSeries, range: &DateRange) -> TickerSeries {
    series
        .into_iter()
        .map(|(field, points)| {
            let points = points
                .into_iter()
                .filter(|(ts, _)| range.contains(ts.date_naive()))
                .collect();
            (field, points)
        })
        .collect()
}

async fn write_cache(path: &Path, data: &serde_json::Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    tokio::fs::write(path, serde_json::to_vec(data)?)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Parses a chart response into per-field series.
///
/// Timestamps carry the exchange's UTC offset from `meta.gmtoffset`. A chart
/// with no bars in range yields an empty series list rather than an error.
///
/// # Errors
/// Returns an error if the response carries a `chart.error` object, has no
/// result or quote block, or holds an invalid offset or timestamp.
pub fn parse_chart(
    ticker: &str,
    data: &serde_json::Value,
    include_adj_close: bool,
) -> Result<TickerSeries> {
    if let Some(error) = data
        .get("chart")
        .and_then(|c| c.get("error"))
        .and_then(|e| e.as_object())
    {
        let code = error.get("code").and_then(|c| c.as_str()).unwrap_or("unknown");
        let desc = error
            .get("description")
            .and_then(|d| d.as_str())
            .unwrap_or("No description");
        return Err(anyhow!("Yahoo API error for {}: {} - {}", ticker, code, desc));
    }

    let chart = data
        .get("chart")
        .and_then(|c| c.get("result"))
        .and_then(|r| r.get(0))
        .ok_or_else(|| anyhow!("Invalid response format for {}", ticker))?;

    let offset_secs = chart
        .get("meta")
        .and_then(|m| m.get("gmtoffset"))
        .and_then(|o| o.as_i64())
        .unwrap_or(0);
    let offset = i32::try_from(offset_secs)
        .ok()
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| anyhow!("Invalid gmtoffset {} for {}", offset_secs, ticker))?;

    let Some(timestamps) = chart.get("timestamp").and_then(|t| t.as_array()) else {
        return Ok(Vec::new());
    };
    let index = timestamps
        .iter()
        .map(|ts| {
            ts.as_i64()
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .map(|dt| dt.with_timezone(&offset))
                .ok_or_else(|| anyhow!("Invalid timestamp {} for {}", ts, ticker))
        })
        .collect::<Result<Vec<_>>>()?;

    let quote = chart
        .get("indicators")
        .and_then(|i| i.get("quote"))
        .and_then(|q| q.get(0))
        .ok_or_else(|| anyhow!("Missing quote data for {}", ticker))?;

    let mut series = Vec::new();
    for (field, key) in [
        (Field::Open, "open"),
        (Field::High, "high"),
        (Field::Low, "low"),
        (Field::Close, "close"),
        (Field::Volume, "volume"),
    ] {
        if let Some(values) = quote.get(key).and_then(|v| v.as_array()) {
            series.push((field, align(&index, values)));
        }
    }

    if include_adj_close {
        let adj_close = chart
            .get("indicators")
            .and_then(|i| i.get("adjclose"))
            .and_then(|a| a.get(0))
            .and_then(|a| a.get("adjclose"))
            .and_then(|c| c.as_array());
        if let Some(values) = adj_close {
            series.push((Field::AdjClose, align(&index, values)));
        }
    }

    Ok(series)
}

fn align(
    index: &[DateTime<FixedOffset>],
    values: &[serde_json::Value],
) -> Vec<(DateTime<FixedOffset>, Option<f64>)> {
    index
        .iter()
        .enumerate()
        .map(|(i, ts)| (*ts, values.get(i).and_then(|v| v.as_f64())))
        .collect()
}
