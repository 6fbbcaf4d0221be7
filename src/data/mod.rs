pub mod dates;
pub mod holdings;
pub mod ingestion;
pub mod normalizer;
pub mod panel;

pub use dates::DateRange;
pub use holdings::Holdings;
pub use ingestion::{DataIngestion, IngestionConfig, PanelSource};
pub use normalizer::{normalize, LongRow, LongTable, NormalizeError, SortOrder};
pub use panel::{Field, LabelOrder, PanelBuilder, WidePanel};
