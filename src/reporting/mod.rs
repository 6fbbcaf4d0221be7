pub mod export;
pub mod summary;

pub use export::{write_csv_file, ExportLayout};
pub use summary::{coverage_issues, render_summary, sample, summarize, TickerSummary};
