use crate::data::{Field, Holdings, LongRow, LongTable};
use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

/// Column layout of the consolidated CSV.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportLayout {
    /// `Date, Ticker, Open, High, Low, Close, Adj Close, Volume`
    Prices,
    /// `Date, Ticker, Shares, Open, High, Low, Close, Volume, Value`
    /// where `Value = Shares × Close`.
    Holdings,
}

impl ExportLayout {
    /// Price/volume fields written by this layout, in canonical order.
    pub fn fields(self) -> Vec<Field> {
        match self {
            ExportLayout::Prices => Field::canonical_order(Field::ALL),
            ExportLayout::Holdings => {
                Field::canonical_order(Field::ALL.into_iter().filter(|f| *f != Field::AdjClose))
            }
        }
    }

    pub fn header(self) -> Vec<&'static str> {
        let mut header = vec!["Date", "Ticker"];
        if self == ExportLayout::Holdings {
            header.push("Shares");
        }
        header.extend(self.fields().into_iter().map(Field::label));
        if self == ExportLayout::Holdings {
            header.push("Value");
        }
        header
    }

    fn record(self, row: &LongRow, holdings: &Holdings) -> Vec<String> {
        let mut record = vec![row.date.format("%Y-%m-%d").to_string(), row.ticker.clone()];
        if self == ExportLayout::Holdings {
            record.push(
                holdings
                    .shares(&row.ticker)
                    .map(|s| s.to_string())
                    .unwrap_or_default(),
            );
        }
        for field in self.fields() {
            let value = row.get(field);
            record.push(match field {
                Field::Volume => format_volume(value),
                _ => format_price(value),
            });
        }
        if self == ExportLayout::Holdings {
            record.push(format_money(holdings.value(row)));
        }
        record
    }
}

impl FromStr for ExportLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prices" | "price" => Ok(ExportLayout::Prices),
            "holdings" | "value" => Ok(ExportLayout::Holdings),
            other => Err(format!("unknown layout '{other}', expected 'prices' or 'holdings'")),
        }
    }
}

/// Prices are written to 3 decimal places, zero padded.
pub fn format_price(value: Option<f64>) -> String {
    value.map(|v| format!("{:.3}", v)).unwrap_or_default()
}

/// Monetary values are written to 2 decimal places, zero padded.
pub fn format_money(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_default()
}

pub fn format_volume(value: Option<f64>) -> String {
    value
        .map(|v| format!("{}", v.round() as i64))
        .unwrap_or_default()
}

/// Writes the table in the given layout. Missing values become empty cells.
///
/// # Arguments
/// * `writer` - Destination, e.g. a file or an in-memory buffer
/// * `table` - Rows to write, in their current order
/// * `layout` - Column layout; `Holdings` adds the Shares and Value columns
/// * `holdings` - Share counts used by the `Holdings` layout
///
/// # Errors
/// Returns an error if a record cannot be written or flushed.
pub fn write_csv<W: io::Write>(
    writer: W,
    table: &LongTable,
    layout: ExportLayout,
    holdings: &Holdings,
) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(layout.header())?;
    for row in table.rows() {
        csv.write_record(layout.record(row, holdings))?;
    }
    csv.flush()?;
    Ok(())
}

/// Writes `dir/file_name`, creating `dir` when needed.
///
/// # Returns
/// The path of the written file.
///
/// # Errors
/// Returns an error naming the path if the directory or file cannot be
/// created or written.
pub fn write_csv_file(
    dir: &Path,
    file_name: &str,
    table: &LongTable,
    layout: ExportLayout,
    holdings: &Holdings,
) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(file_name);
    let file = fs::File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    write_csv(io::BufWriter::new(file), table, layout, holdings)
        .with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), rows = table.len(), "wrote consolidated CSV");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{normalize, LabelOrder, PanelBuilder, SortOrder};
    use chrono::{FixedOffset, TimeZone};

    fn table() -> LongTable {
        let utc = FixedOffset::east_opt(0).unwrap();
        let day = |d| utc.with_ymd_and_hms(2025, 10, d, 0, 0, 0).unwrap();
        let mut builder = PanelBuilder::new(LabelOrder::TickerOuter);
        builder
            .add_column("BHP.AX", Field::Open, [(day(23), Some(40.1)), (day(24), Some(40.25))])
            .add_column("BHP.AX", Field::Close, [(day(23), Some(40.5)), (day(24), None)])
            .add_column("BHP.AX", Field::Volume, [(day(23), Some(8123456.0)), (day(24), Some(7000000.0))])
            .add_column("WDS.AX", Field::Close, [(day(23), Some(23.456))]);
        normalize(&builder.build(), &["WDS.AX", "BHP.AX"])
            .unwrap()
            .sorted(SortOrder::DateTicker)
    }

    fn render(layout: ExportLayout, holdings: &Holdings) -> String {
        let mut out = Vec::new();
        write_csv(&mut out, &table(), layout, holdings).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_prices_layout() {
        let csv = render(ExportLayout::Prices, &Holdings::default());
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], "Date,Ticker,Open,High,Low,Close,Adj Close,Volume");
        assert_eq!(lines[1], "2025-10-23,BHP.AX,40.100,,,40.500,,8123456");
        assert_eq!(lines[2], "2025-10-23,WDS.AX,,,,23.456,,");
        assert_eq!(lines[3], "2025-10-24,BHP.AX,40.250,,,,,7000000");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_holdings_layout_adds_shares_and_value() {
        let holdings: Holdings = "WDS.AX:1288,BHP.AX:100".parse().unwrap();
        let csv = render(ExportLayout::Holdings, &holdings);
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], "Date,Ticker,Shares,Open,High,Low,Close,Volume,Value");
        assert_eq!(lines[1], "2025-10-23,BHP.AX,100,40.100,,,40.500,8123456,4050.00");
        assert_eq!(lines[2], "2025-10-23,WDS.AX,1288,,,,23.456,,30211.33");
        assert_eq!(lines[3], "2025-10-24,BHP.AX,100,40.250,,,,7000000,");
    }

    #[test]
    fn test_empty_table_still_writes_header() {
        let mut out = Vec::new();
        write_csv(&mut out, &LongTable::empty(), ExportLayout::Prices, &Holdings::default())
            .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Date,Ticker,Open,High,Low,Close,Adj Close,Volume\n"
        );
    }

    #[test]
    fn test_write_csv_file_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("asx_eod_output");

        let path = write_csv_file(
            &out_dir,
            "DailyData.csv",
            &table(),
            ExportLayout::Prices,
            &Holdings::default(),
        )
        .unwrap();

        assert_eq!(path, out_dir.join("DailyData.csv"));
        let written = std::fs::read_to_string(path).unwrap();
        assert_eq!(written.lines().count(), 4);
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_price(Some(1.5)), "1.500");
        assert_eq!(format_price(None), "");
        assert_eq!(format_money(Some(5145.6)), "5145.60");
        assert_eq!(format_volume(Some(1200.0)), "1200");
    }

    #[test]
    fn test_layout_parsing() {
        assert_eq!("holdings".parse::<ExportLayout>(), Ok(ExportLayout::Holdings));
        assert_eq!("Prices".parse::<ExportLayout>(), Ok(ExportLayout::Prices));
        assert!("xlsx".parse::<ExportLayout>().is_err());
    }
}
