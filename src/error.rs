use crate::config::ConfigError;
use crate::data::NormalizeError;
use thiserror::Error;

/// Failure classes of a downloader run, each with its own exit status.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("download failed: {0:#}")]
    Download(anyhow::Error),
    #[error("no data returned, check tickers or date range")]
    NoData,
    #[error("no valid data found for selected tickers")]
    NoValidData,
    #[error(transparent)]
    Shape(#[from] NormalizeError),
    #[error("failed to write output: {0:#}")]
    Output(anyhow::Error),
}

impl AppError {
    /// Process exit status for this failure class.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) => 2,
            AppError::Download(_) => 3,
            AppError::NoData => 4,
            AppError::NoValidData => 5,
            AppError::Shape(_) => 6,
            AppError::Output(_) => 7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dates::DateRangeError;
    use std::collections::HashSet;

    #[test]
    fn test_exit_codes_are_distinct() {
        let errors = [
            AppError::Config(ConfigError::Dates(DateRangeError::Unparseable("x".into()))),
            AppError::Download(anyhow::anyhow!("timeout")),
            AppError::NoData,
            AppError::NoValidData,
            AppError::Shape(NormalizeError::ShapeMismatch {
                outer: vec![],
                inner: vec![],
            }),
            AppError::Output(anyhow::anyhow!("disk full")),
        ];

        let codes: HashSet<i32> = errors.iter().map(AppError::exit_code).collect();
        assert_eq!(codes.len(), errors.len());
        assert!(!codes.contains(&0) && !codes.contains(&1));
    }

    #[test]
    fn test_download_error_shows_cause_chain() {
        let err = AppError::Download(anyhow::anyhow!("connection refused").context("BHP.AX"));
        assert_eq!(err.to_string(), "download failed: BHP.AX: connection refused");
    }
}
