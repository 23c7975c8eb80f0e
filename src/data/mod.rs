//! Daily series input: validated windows and file loading.

pub mod loader;
pub mod types;

pub use loader::{LoaderError, SeriesLoader, EXPECTED_COLUMNS};
pub use types::{Observation, SeriesError, SeriesView, SeriesWindow};
