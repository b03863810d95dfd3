//! Seeded sample datasets for trying the pipeline end to end.

use crate::error::{Error, Result};
use crate::table::{Column, Frequency, Index, Table, parse_timestamp};
use clap::ValueEnum;
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rand_distr::{LogNormal, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    /// Ages and incomes of 100 people with one extreme income.
    Income,
    /// Twelve years of monthly airline passengers.
    Passengers,
    /// Five cars with holes in every column.
    Cars,
}

pub const INCOME_ROWS: usize = 100;
pub const PASSENGER_MONTHS: usize = 144;

pub fn generate(dataset: Dataset, seed: u64) -> Result<Table> {
    let mut rng = ChaCha12Rng::seed_from_u64(seed);
    match dataset {
        Dataset::Income => income(&mut rng),
        Dataset::Passengers => passengers(&mut rng),
        Dataset::Cars => cars(),
    }
}

fn income(rng: &mut ChaCha12Rng) -> Result<Table> {
    let income_dist = Normal::<f64>::new(50_000.0, 10_000.0).map_err(distribution_error)?;
    let age = (0..INCOME_ROWS)
        .map(|_| Some(f64::from(rng.random_range(20_u32..60))))
        .collect();
    let mut income: Vec<Option<f64>> = (0..INCOME_ROWS)
        .map(|_| Some(income_dist.sample(rng).round()))
        .collect();
    income[0] = Some(150_000.0);
    Table::from_columns(vec![
        Column::numeric("Age", age),
        Column::numeric("Income", income),
    ])
}

fn passengers(rng: &mut ChaCha12Rng) -> Result<Table> {
    let noise_dist = LogNormal::<f64>::new(0.0, 0.04).map_err(distribution_error)?;
    let start = parse_timestamp("1949-01").ok_or_else(|| {
        Error::InvalidArgument("failed to build the first month".to_string())
    })?;
    let stamps = (0..PASSENGER_MONTHS)
        .map(|i_month| {
            let steps = u32::try_from(i_month)
                .map_err(|_| Error::InvalidArgument(format!("month {i_month} out of range")))?;
            Frequency::Monthly.advance(start, steps).ok_or_else(|| {
                Error::InvalidArgument(format!("month {i_month} out of range"))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let counts = (0..PASSENGER_MONTHS)
        .map(|i_month| {
            let trend = 110.0 + 2.6 * i_month as f64;
            let season = 1.0 + 0.18 * (2.0 * PI * (i_month % 12) as f64 / 12.0 - 2.0).sin();
            Some((trend * season * noise_dist.sample(rng)).round())
        })
        .collect();
    Table::new(
        Index::Timestamp(stamps),
        vec![Column::numeric("Passengers", counts)],
    )
}

fn cars() -> Result<Table> {
    let text = |vals: [Option<&str>; 5]| vals.map(|val| val.map(str::to_string)).to_vec();
    Table::from_columns(vec![
        Column::categorical(
            "Car",
            text([Some("Toyota"), Some("Honda"), Some("Ford"), None, Some("Nissan")]),
        ),
        Column::numeric(
            "Price",
            vec![Some(25_000.0), Some(30_000.0), None, Some(22_000.0), Some(28_000.0)],
        ),
        Column::numeric(
            "Mileage",
            vec![None, Some(40_000.0), Some(60_000.0), Some(35_000.0), Some(50_000.0)],
        ),
        Column::categorical(
            "Color",
            text([Some("Red"), Some("Blue"), Some("Black"), Some("White"), None]),
        ),
    ])
}

fn distribution_error<E: std::fmt::Display>(err: E) -> Error {
    Error::InvalidArgument(format!("invalid sampling distribution: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outliers::{self, ZScoreRule};

    #[test]
    fn same_seed_same_table() {
        let a = generate(Dataset::Passengers, 7).unwrap();
        let b = generate(Dataset::Passengers, 7).unwrap();
        let c = generate(Dataset::Passengers, 8).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn passengers_are_monthly_and_positive() {
        let table = generate(Dataset::Passengers, 0).unwrap();
        assert_eq!(table.n_rows(), PASSENGER_MONTHS);
        assert_eq!(table.index().frequency(), Some(Frequency::Monthly));
        assert_eq!(table.index().label(PASSENGER_MONTHS - 1), "1960-12-01");
        let vals = table.column("Passengers").unwrap().complete_values().unwrap();
        assert!(vals.iter().all(|&val| val > 0.0));
    }

    #[test]
    fn income_spike_is_the_only_outlier() {
        let table = generate(Dataset::Income, 42).unwrap();
        let income = table.column("Income").unwrap().as_numeric().unwrap();
        let rule = ZScoreRule {
            threshold: 4.0,
            ddof: 0,
        };
        assert_eq!(outliers::detect(income, &rule).unwrap(), vec![0]);
        let ages = table.column("Age").unwrap().present_values().unwrap();
        assert!(ages.iter().all(|&age| (20.0..60.0).contains(&age)));
    }

    #[test]
    fn cars_have_one_hole_per_column() {
        let table = generate(Dataset::Cars, 0).unwrap();
        assert!(table.missing_counts().iter().all(|(_, count)| *count == 1));
    }
}
