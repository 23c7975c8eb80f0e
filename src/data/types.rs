//! Core data types for daily index series.
//!
//! A [`SeriesWindow`] is the unit of input to every indicator: an aligned,
//! strictly date-ordered run of daily closes and volatility index levels,
//! with the daily return derived on construction.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Precondition violations on caller-supplied series.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SeriesError {
    #[error("Series is empty")]
    Empty,

    #[error("Column length mismatch: {column} has {actual} values, expected {expected}")]
    LengthMismatch {
        column: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Dates not strictly increasing at index {index}: {previous} then {current}")]
    NonMonotonicDates {
        index: usize,
        previous: NaiveDate,
        current: NaiveDate,
    },

    #[error("Invalid close {value} on {date}: must be positive and finite")]
    InvalidClose { date: NaiveDate, value: f64 },

    #[error("Invalid volatility index {value} on {date}: must be finite")]
    InvalidVolatility { date: NaiveDate, value: f64 },

    #[error("Invalid instrument price {value} on {date}: must be positive and finite")]
    InvalidInstrument { date: NaiveDate, value: f64 },

    #[error("Window [{start}, {end}) out of bounds for series of length {len}")]
    OutOfBounds { start: usize, end: usize, len: usize },
}

/// One trading day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    /// Index close used for signals and as the benchmark.
    pub close: f64,
    /// Volatility index level (VIX-like).
    pub volatility_index: f64,
    /// `close[t] / close[t-1] - 1`; absent on the first observation.
    pub ret: Option<f64>,
    /// Close of the leveraged instrument, when the caller has one for this date.
    pub instrument: Option<f64>,
}

/// An aligned, strictly date-ordered daily series.
///
/// Owned windows are built (and validated) once; sub-windows borrow via
/// [`SeriesWindow::view`].
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesWindow {
    observations: Vec<Observation>,
}

impl SeriesWindow {
    /// Build from parallel, already-aligned columns.
    pub fn from_columns(
        dates: Vec<NaiveDate>,
        closes: Vec<f64>,
        volatility: Vec<f64>,
        instrument: Option<Vec<Option<f64>>>,
    ) -> Result<Self, SeriesError> {
        let n = dates.len();
        if closes.len() != n {
            return Err(SeriesError::LengthMismatch {
                column: "close",
                expected: n,
                actual: closes.len(),
            });
        }
        if volatility.len() != n {
            return Err(SeriesError::LengthMismatch {
                column: "volatility_index",
                expected: n,
                actual: volatility.len(),
            });
        }
        let instrument = match instrument {
            Some(col) if col.len() != n => {
                return Err(SeriesError::LengthMismatch {
                    column: "instrument",
                    expected: n,
                    actual: col.len(),
                })
            }
            Some(col) => col,
            None => vec![None; n],
        };

        let rows = dates
            .into_iter()
            .zip(closes)
            .zip(volatility)
            .zip(instrument)
            .map(|(((date, close), vix), inst)| (date, close, vix, inst));

        Self::from_rows(rows)
    }

    /// Build from `(date, close, volatility_index, instrument)` rows.
    pub fn from_rows<I>(rows: I) -> Result<Self, SeriesError>
    where
        I: IntoIterator<Item = (NaiveDate, f64, f64, Option<f64>)>,
    {
        let mut observations: Vec<Observation> = Vec::new();

        for (date, close, volatility_index, instrument) in rows {
            if !close.is_finite() || close <= 0.0 {
                return Err(SeriesError::InvalidClose { date, value: close });
            }
            if !volatility_index.is_finite() {
                return Err(SeriesError::InvalidVolatility {
                    date,
                    value: volatility_index,
                });
            }
            if let Some(p) = instrument {
                if !p.is_finite() || p <= 0.0 {
                    return Err(SeriesError::InvalidInstrument { date, value: p });
                }
            }

            let ret = match observations.last() {
                Some(prev) => {
                    if date <= prev.date {
                        return Err(SeriesError::NonMonotonicDates {
                            index: observations.len(),
                            previous: prev.date,
                            current: date,
                        });
                    }
                    Some(close / prev.close - 1.0)
                }
                None => None,
            };

            observations.push(Observation {
                date,
                close,
                volatility_index,
                ret,
                instrument,
            });
        }

        if observations.is_empty() {
            return Err(SeriesError::Empty);
        }

        Ok(Self { observations })
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn get(&self, index: usize) -> Option<&Observation> {
        self.observations.get(index)
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.observations.first().map(|o| o.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.observations.last().map(|o| o.date)
    }

    /// Borrow the `len` observations ending at (and including) `end_index`.
    pub fn view(&self, end_index: usize, len: usize) -> Result<SeriesView<'_>, SeriesError> {
        let end = end_index + 1;
        if end > self.observations.len() || len > end {
            return Err(SeriesError::OutOfBounds {
                start: end.saturating_sub(len),
                end,
                len: self.observations.len(),
            });
        }
        Ok(SeriesView {
            observations: &self.observations[end - len..end],
        })
    }

    /// Borrow the whole series.
    pub fn as_view(&self) -> SeriesView<'_> {
        SeriesView {
            observations: &self.observations,
        }
    }
}

/// Read-only slice of a validated series.
#[derive(Debug, Clone, Copy)]
pub struct SeriesView<'a> {
    observations: &'a [Observation],
}

impl<'a> SeriesView<'a> {
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn observations(&self) -> &'a [Observation] {
        self.observations
    }

    pub fn last(&self) -> Option<&'a Observation> {
        self.observations.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.close).collect()
    }

    pub fn volatility(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.volatility_index).collect()
    }

    /// Daily returns aligned with the observations (`None` where undefined).
    ///
    /// The first observation of a sub-window keeps the return it had in the
    /// parent series, so sub-windows never lose a day of return history.
    pub fn returns(&self) -> Vec<Option<f64>> {
        self.observations.iter().map(|o| o.ret).collect()
    }

    /// Trailing `len` closes.
    pub fn tail_closes(&self, len: usize) -> Vec<f64> {
        let start = self.observations.len().saturating_sub(len);
        self.observations[start..].iter().map(|o| o.close).collect()
    }
}
