use crate::data::{DateRange, LongRow, LongTable};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt;

/// Fewer rows than this for a ticker usually means the range was cut short.
pub const MIN_EXPECTED_ROWS: usize = 4;

/// First and last date and row count of one ticker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickerSummary {
    pub ticker: String,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub rows: usize,
}

/// Per-ticker coverage, sorted by ticker.
///
/// # Returns
/// One entry per ticker in `table` with its first and last date and row
/// count. An empty table yields an empty list.
pub fn summarize(table: &LongTable) -> Vec<TickerSummary> {
    let mut by_ticker: BTreeMap<&str, TickerSummary> = BTreeMap::new();

    for row in table.rows() {
        by_ticker
            .entry(row.ticker.as_str())
            .and_modify(|s| {
                s.first_date = s.first_date.min(row.date);
                s.last_date = s.last_date.max(row.date);
                s.rows += 1;
            })
            .or_insert_with(|| TickerSummary {
                ticker: row.ticker.clone(),
                first_date: row.date,
                last_date: row.date,
                rows: 1,
            });
    }

    by_ticker.into_values().collect()
}

/// The first `head` and last `tail` rows of each ticker, date ordered.
/// Tickers keep their order of first appearance in the table.
pub fn sample(table: &LongTable, head: usize, tail: usize) -> Vec<&LongRow> {
    let mut out = Vec::new();
    for ticker in table.tickers() {
        let mut rows: Vec<&LongRow> = table.rows().iter().filter(|r| r.ticker == ticker).collect();
        rows.sort_by_key(|r| r.date);

        if rows.len() <= head + tail {
            out.extend(rows);
        } else {
            out.extend(&rows[..head]);
            out.extend(&rows[rows.len() - tail..]);
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverageIssue {
    FewRows {
        ticker: String,
        rows: usize,
    },
    StartsAfterRange {
        ticker: String,
        first_date: NaiveDate,
        start: NaiveDate,
    },
    EndsAfterRange {
        ticker: String,
        last_date: NaiveDate,
        end: NaiveDate,
    },
}

impl fmt::Display for CoverageIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoverageIssue::FewRows { ticker, rows } => {
                write!(f, "{ticker}: only {rows} rows, check the requested range")
            }
            CoverageIssue::StartsAfterRange {
                ticker,
                first_date,
                start,
            } => write!(f, "{ticker}: first row {first_date} is after requested start {start}"),
            CoverageIssue::EndsAfterRange {
                ticker,
                last_date,
                end,
            } => write!(f, "{ticker}: last row {last_date} is beyond requested end {end}"),
        }
    }
}

/// Sanity checks of downloaded coverage against the requested range.
pub fn coverage_issues(summary: &[TickerSummary], range: &DateRange) -> Vec<CoverageIssue> {
    let mut issues = Vec::new();
    for s in summary {
        if s.rows < MIN_EXPECTED_ROWS {
            issues.push(CoverageIssue::FewRows {
                ticker: s.ticker.clone(),
                rows: s.rows,
            });
        }
        if s.first_date > range.start() {
            issues.push(CoverageIssue::StartsAfterRange {
                ticker: s.ticker.clone(),
                first_date: s.first_date,
                start: range.start(),
            });
        }
        if s.last_date > range.end() {
            issues.push(CoverageIssue::EndsAfterRange {
                ticker: s.ticker.clone(),
                last_date: s.last_date,
                end: range.end(),
            });
        }
    }
    issues
}

/// Renders the summary as an aligned text table.
pub fn render_summary(summary: &[TickerSummary]) -> String {
    let header = ["Ticker", "min", "max", "count"];
    let body: Vec<[String; 4]> = summary
        .iter()
        .map(|s| {
            [
                s.ticker.clone(),
                s.first_date.to_string(),
                s.last_date.to_string(),
                s.rows.to_string(),
            ]
        })
        .collect();

    let mut widths = header.map(str::len);
    for cells in &body {
        for (w, cell) in widths.iter_mut().zip(cells) {
            *w = (*w).max(cell.len());
        }
    }

    let mut out = String::new();
    let header_cells = header.map(String::from);
    for cells in std::iter::once(&header_cells).chain(&body) {
        let line: Vec<String> = cells
            .iter()
            .zip(widths)
            .map(|(cell, w)| format!("{:>w$}", cell, w = w))
            .collect();
        out.push_str(&line.join(" "));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{normalize, Field, LabelOrder, PanelBuilder};
    use chrono::{FixedOffset, TimeZone};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, day).unwrap()
    }

    fn table() -> LongTable {
        let utc = FixedOffset::east_opt(0).unwrap();
        let mut builder = PanelBuilder::new(LabelOrder::TickerOuter);
        builder.add_column(
            "BHP.AX",
            Field::Close,
            (1..=6).map(|day| (utc.with_ymd_and_hms(2025, 10, day, 0, 0, 0).unwrap(), Some(40.0))),
        );
        builder.add_column(
            "AMP.AX",
            Field::Close,
            (3..=4).map(|day| (utc.with_ymd_and_hms(2025, 10, day, 0, 0, 0).unwrap(), Some(1.5))),
        );
        normalize(&builder.build(), &["BHP.AX", "AMP.AX"]).unwrap()
    }

    #[test]
    fn test_summarize_per_ticker() {
        let summary = summarize(&table());
        assert_eq!(
            summary,
            vec![
                TickerSummary {
                    ticker: "AMP.AX".to_string(),
                    first_date: d(3),
                    last_date: d(4),
                    rows: 2,
                },
                TickerSummary {
                    ticker: "BHP.AX".to_string(),
                    first_date: d(1),
                    last_date: d(6),
                    rows: 6,
                },
            ]
        );
    }

    #[test]
    fn test_summarize_empty_table() {
        assert!(summarize(&LongTable::empty()).is_empty());
    }

    #[test]
    fn test_sample_takes_head_and_tail() {
        let table = table();
        let rows = sample(&table, 2, 2);
        let keys: Vec<(&str, NaiveDate)> = rows.iter().map(|r| (r.ticker.as_str(), r.date)).collect();
        assert_eq!(
            keys,
            vec![
                ("BHP.AX", d(1)),
                ("BHP.AX", d(2)),
                ("BHP.AX", d(5)),
                ("BHP.AX", d(6)),
                ("AMP.AX", d(3)),
                ("AMP.AX", d(4)),
            ]
        );
    }

    #[test]
    fn test_coverage_issues() {
        let summary = summarize(&table());
        let range = DateRange::new(d(1), d(5)).unwrap();
        let issues = coverage_issues(&summary, &range);

        assert_eq!(
            issues,
            vec![
                CoverageIssue::FewRows {
                    ticker: "AMP.AX".to_string(),
                    rows: 2,
                },
                CoverageIssue::StartsAfterRange {
                    ticker: "AMP.AX".to_string(),
                    first_date: d(3),
                    start: d(1),
                },
                CoverageIssue::EndsAfterRange {
                    ticker: "BHP.AX".to_string(),
                    last_date: d(6),
                    end: d(5),
                },
            ]
        );
        assert_eq!(
            issues[0].to_string(),
            "AMP.AX: only 2 rows, check the requested range"
        );
    }

    #[test]
    fn test_render_summary_aligns_columns() {
        let rendered = render_summary(&summarize(&table()));
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "Ticker        min        max count");
        assert_eq!(lines[1], "AMP.AX 2025-10-03 2025-10-04     2");
        assert_eq!(lines[2], "BHP.AX 2025-10-01 2025-10-06     6");
    }
}
