//! Series loader for local CSV / Parquet files.
//!
//! Expected columns:
//! - `date` (`YYYY-MM-DD` string or date type)
//! - `close` (index close)
//! - `volatility_index` (VIX-like level)
//! - `instrument` (optional, leveraged instrument close; nulls allowed)
//!
//! Rows must already be date-aligned; the loader only validates, it never
//! resamples or forward-fills.

use std::path::Path;

use chrono::NaiveDate;
use polars::prelude::*;
use thiserror::Error;
use tracing::info;

use super::types::{SeriesError, SeriesWindow};

/// Required columns.
pub const EXPECTED_COLUMNS: &[&str] = &["date", "close", "volatility_index"];

/// Optional leveraged instrument column.
pub const INSTRUMENT_COLUMN: &str = "instrument";

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported file extension: {0}")]
    UnsupportedFormat(String),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Invalid series: {0}")]
    Series(#[from] SeriesError),
}

/// Loads a daily series file into a validated [`SeriesWindow`].
pub struct SeriesLoader;

impl SeriesLoader {
    /// Load a `.csv` or `.parquet` file.
    pub fn load(path: &Path) -> Result<SeriesWindow, LoaderError> {
        if !path.exists() {
            return Err(LoaderError::FileNotFound(path.display().to_string()));
        }

        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let lf = match ext.as_str() {
            "csv" => LazyCsvReader::new(path).with_has_header(true).finish()?,
            "parquet" => LazyFrame::scan_parquet(path, ScanArgsParquet::default())?,
            other => return Err(LoaderError::UnsupportedFormat(other.to_string())),
        };

        let df = lf.collect()?;
        let series = Self::from_dataframe(&df)?;

        info!(
            path = %path.display(),
            rows = series.len(),
            "Loaded series"
        );

        Ok(series)
    }

    /// Convert an in-memory DataFrame.
    pub fn from_dataframe(df: &DataFrame) -> Result<SeriesWindow, LoaderError> {
        let names: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        for required in EXPECTED_COLUMNS {
            if !names.iter().any(|n| n == required) {
                return Err(LoaderError::InvalidData(format!(
                    "Missing column: {}",
                    required
                )));
            }
        }

        let dates = Self::dates(df)?;
        let closes = Self::required_f64(df, "close")?;
        let volatility = Self::required_f64(df, "volatility_index")?;

        let instrument = if names.iter().any(|n| n == INSTRUMENT_COLUMN) {
            let col = df
                .column(INSTRUMENT_COLUMN)?
                .cast(&DataType::Float64)?;
            Some(col.f64()?.into_iter().collect::<Vec<Option<f64>>>())
        } else {
            None
        };

        Ok(SeriesWindow::from_columns(dates, closes, volatility, instrument)?)
    }

    fn dates(df: &DataFrame) -> Result<Vec<NaiveDate>, LoaderError> {
        let col = df.column("date")?;

        // Handle both string and date column types
        if let Ok(str_col) = col.str() {
            str_col
                .into_iter()
                .enumerate()
                .map(|(i, s)| {
                    s.and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
                        .ok_or_else(|| {
                            LoaderError::InvalidData(format!("Unparseable date at row {}", i))
                        })
                })
                .collect()
        } else if let Ok(date_col) = col.date() {
            date_col
                .into_iter()
                .enumerate()
                .map(|(i, d)| {
                    d.and_then(date_from_days).ok_or_else(|| {
                        LoaderError::InvalidData(format!("Null date at row {}", i))
                    })
                })
                .collect()
        } else {
            Err(LoaderError::InvalidData(
                "date column has unexpected type".to_string(),
            ))
        }
    }

    fn required_f64(df: &DataFrame, name: &str) -> Result<Vec<f64>, LoaderError> {
        let col = df.column(name)?.cast(&DataType::Float64)?;
        col.f64()?
            .into_iter()
            .enumerate()
            .map(|(i, v)| {
                v.ok_or_else(|| LoaderError::InvalidData(format!("Null {} at row {}", name, i)))
            })
            .collect()
    }
}

/// Convert days since Unix epoch to NaiveDate.
fn date_from_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + 719_163)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_dataframe_with_instrument() {
        let df = df!(
            "date" => ["2024-01-02", "2024-01-03", "2024-01-04"],
            "close" => [4700.0, 4650.0, 4680.0],
            "volatility_index" => [13.2, 14.1, 13.8],
            "instrument" => [Some(10.0), None, Some(9.8)],
        )
        .unwrap();

        let series = SeriesLoader::from_dataframe(&df).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.observations()[1].instrument, None);
        assert_eq!(series.observations()[2].instrument, Some(9.8));
    }

    #[test]
    fn test_missing_column() {
        let df = df!(
            "date" => ["2024-01-02"],
            "close" => [4700.0],
        )
        .unwrap();

        let err = SeriesLoader::from_dataframe(&df).unwrap_err();
        assert!(matches!(err, LoaderError::InvalidData(_)));
    }

    #[test]
    fn test_misaligned_dates_fail_fast() {
        let df = df!(
            "date" => ["2024-01-03", "2024-01-02"],
            "close" => [4700.0, 4650.0],
            "volatility_index" => [13.2, 14.1],
        )
        .unwrap();

        let err = SeriesLoader::from_dataframe(&df).unwrap_err();
        assert!(matches!(
            err,
            LoaderError::Series(SeriesError::NonMonotonicDates { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = SeriesLoader::load(Path::new("does/not/exist.csv")).unwrap_err();
        assert!(matches!(err, LoaderError::FileNotFound(_)));
    }
}
