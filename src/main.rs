mod config;
mod data;
mod error;
mod reporting;

use config::DownloaderConfig;
use data::{normalize, DataIngestion, LongTable, PanelSource};
use dotenv::dotenv;
use error::AppError;
use reporting::{coverage_issues, render_summary, sample, summarize, write_csv_file, TickerSummary};
use std::path::PathBuf;
use tracing::{info, warn};

/// Result of a completed download run.
struct DownloadOutcome {
    path: PathBuf,
    table: LongTable,
    summary: Vec<TickerSummary>,
}

/// Fetches the configured tickers, normalizes the panel and writes the
/// consolidated CSV.
///
/// # Errors
/// Each failure class maps to its own [`AppError`] variant: a failed
/// download, an empty provider response, a panel with no rows for the
/// requested tickers, an unrecognised panel shape, or a failed write.
async fn download(
    config: &DownloaderConfig,
    source: &dyn PanelSource,
) -> Result<DownloadOutcome, AppError> {
    let tickers = config.holdings.tickers();
    let range = &config.range;

    println!(
        "\nDownloading EOD for {} from {} to {} ...",
        tickers.join(", "),
        range.start(),
        range.end()
    );

    let panel = source
        .fetch_panel(&tickers, range)
        .await
        .map_err(AppError::Download)?;
    if panel.is_empty() {
        return Err(AppError::NoData);
    }

    let table = normalize(&panel, &tickers)?;
    if table.is_empty() {
        return Err(AppError::NoValidData);
    }
    let table = table.sorted(config.sort);
    info!(rows = table.len(), tickers = table.tickers().len(), "normalized panel");

    let path = write_csv_file(
        &config.output_dir,
        &config.output_csv,
        &table,
        config.layout,
        &config.holdings,
    )
    .map_err(AppError::Output)?;

    let summary = summarize(&table);
    for issue in coverage_issues(&summary, range) {
        warn!("{}", issue);
    }

    Ok(DownloadOutcome {
        path,
        table,
        summary,
    })
}

/// Prints where the CSV went, the per-ticker summary and a short sample.
fn print_report(outcome: &DownloadOutcome) {
    println!("\nSaved consolidated CSV: {}", outcome.path.display());

    println!("\nSummary:");
    print!("{}", render_summary(&outcome.summary));

    println!("\nSample rows (head 2 + tail 2 per ticker):");
    for row in sample(&outcome.table, 2, 2) {
        println!(
            "{} {:<8} close={}",
            row.date,
            row.ticker,
            reporting::export::format_price(row.close)
        );
    }
}

async fn run() -> Result<(), AppError> {
    let config = DownloaderConfig::from_env()?;

    println!("\n=== ASX EOD Downloader ===");
    println!("Using holdings:");
    for (ticker, shares) in config.holdings.positions() {
        println!("  - {}: {} shares", ticker, shares);
    }

    let ingestion = DataIngestion::new(config.ingestion.clone()).map_err(AppError::Download)?;
    let outcome = download(&config, &ingestion).await?;
    print_report(&outcome);

    println!("\nDone.");
    Ok(())
}

/// Downloads end-of-day ASX prices into a consolidated CSV.
///
/// Exit status: 0 on success, otherwise [`AppError::exit_code`]:
/// 2 configuration, 3 download, 4 no data, 5 no valid rows,
/// 6 panel shape, 7 output.
#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file
    dotenv().ok();

    if let Err(e) = run().await {
        eprintln!("{}", e);
        std::process::exit(e.exit_code());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DateRange, Field, Holdings, LabelOrder, PanelBuilder, SortOrder, WidePanel};
    use crate::reporting::ExportLayout;
    use async_trait::async_trait;
    use chrono::{FixedOffset, NaiveDate, TimeZone};

    enum FakeSource {
        Panel(WidePanel),
        Failing,
    }

    #[async_trait]
    impl PanelSource for FakeSource {
        async fn fetch_panel(
            &self,
            _tickers: &[String],
            _range: &DateRange,
        ) -> anyhow::Result<WidePanel> {
            match self {
                FakeSource::Panel(panel) => Ok(panel.clone()),
                FakeSource::Failing => Err(anyhow::anyhow!("connection reset")),
            }
        }
    }

    fn test_config(dir: &std::path::Path) -> DownloaderConfig {
        DownloaderConfig {
            holdings: "BHP.AX:100,AMP.AX:200".parse().unwrap(),
            range: DateRange::new(
                NaiveDate::from_ymd_opt(2025, 10, 23).unwrap(),
                NaiveDate::from_ymd_opt(2025, 10, 24).unwrap(),
            )
            .unwrap(),
            output_dir: dir.join("out"),
            output_csv: "DailyData.csv".to_string(),
            sort: SortOrder::DateTicker,
            layout: ExportLayout::Holdings,
            ingestion: Default::default(),
        }
    }

    fn panel(tickers: &[&str]) -> WidePanel {
        let sydney = FixedOffset::east_opt(11 * 3600).unwrap();
        let mut builder = PanelBuilder::new(LabelOrder::TickerOuter);
        for ticker in tickers {
            for field in [Field::Open, Field::Close, Field::Volume] {
                builder.add_column(
                    ticker,
                    field,
                    (23..=24).map(|d| {
                        (sydney.with_ymd_and_hms(2025, 10, d, 10, 0, 0).unwrap(), Some(2.0))
                    }),
                );
            }
        }
        builder.build()
    }

    #[tokio::test]
    async fn test_download_writes_sorted_csv() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let source = FakeSource::Panel(panel(&["BHP.AX", "AMP.AX"]));

        let outcome = download(&config, &source).await.unwrap();

        assert_eq!(outcome.table.len(), 4);
        assert_eq!(outcome.summary.len(), 2);
        let csv = std::fs::read_to_string(&outcome.path).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Date,Ticker,Shares,Open,High,Low,Close,Volume,Value");
        assert_eq!(lines[1], "2025-10-23,AMP.AX,200,2.000,,,2.000,2,400.00");
        assert_eq!(lines[2], "2025-10-23,BHP.AX,100,2.000,,,2.000,2,200.00");
        assert_eq!(lines.len(), 5);
    }

    #[tokio::test]
    async fn test_download_failure_classes() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        let failing = download(&config, &FakeSource::Failing).await;
        assert!(matches!(failing, Err(AppError::Download(_))));

        let empty = download(&config, &FakeSource::Panel(PanelBuilder::new(LabelOrder::TickerOuter).build())).await;
        assert!(matches!(empty, Err(AppError::NoData)));

        let unrelated = download(&config, &FakeSource::Panel(panel(&["CBA.AX"]))).await;
        assert!(matches!(unrelated, Err(AppError::NoValidData)));

        let odd = WidePanel::nested(
            vec![FixedOffset::east_opt(0).unwrap().with_ymd_and_hms(2025, 10, 23, 0, 0, 0).unwrap()],
            vec![(("BHP.AX".to_string(), "Bid".to_string()), vec![Some(1.0)])],
        )
        .unwrap();
        let shape = download(&config, &FakeSource::Panel(odd)).await;
        assert!(matches!(shape, Err(AppError::Shape(_))));
    }

    #[tokio::test]
    async fn test_default_holdings_feed_the_prices_layout() {
        let dir = tempfile::tempdir().unwrap();
        let config = DownloaderConfig {
            holdings: Holdings::default(),
            layout: ExportLayout::Prices,
            sort: SortOrder::TickerDate,
            ..test_config(dir.path())
        };
        let source = FakeSource::Panel(panel(&["WDS.AX", "ALK.AX"]));

        let outcome = download(&config, &source).await.unwrap();
        assert_eq!(outcome.table.tickers(), vec!["ALK.AX", "WDS.AX"]);
        let csv = std::fs::read_to_string(&outcome.path).unwrap();
        assert!(csv.starts_with("Date,Ticker,Open,High,Low,Close,Adj Close,Volume\n"));
    }
}
