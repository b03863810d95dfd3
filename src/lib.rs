//! Table cleaning, descriptive statistics, hypothesis tests, clustering,
//! seasonal decomposition, stationarity testing and ARIMA forecasting over
//! small in-memory tables.

pub mod cluster;
pub mod decompose;
pub mod error;
pub mod forecast;
pub mod hypothesis;
mod linalg;
pub mod missing;
pub mod outliers;
pub mod source;
mod special;
pub mod stationarity;
pub mod stats;
pub mod synth;
pub mod table;
pub mod transform;

pub use error::{Error, Result};
pub use table::{Column, ColumnData, Index, Kind, Table};
