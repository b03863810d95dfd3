//! Labelled column store shared by every stage of the pipeline.
//!
//! A [`Table`] owns an [`Index`] and a list of named [`Column`]s. Every
//! column holds optional values of a single [`Kind`]; `None` marks a missing
//! entry. Lengths and name uniqueness are checked whenever the shape of the
//! table changes.

use crate::error::{Error, Result};
use chrono::{Months, NaiveDate, NaiveDateTime, TimeDelta, Timelike};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt};

/// Semantic type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Numeric,
    Categorical,
    Datetime,
}

impl Kind {
    pub fn name(self) -> &'static str {
        match self {
            Kind::Numeric => "numeric",
            Kind::Categorical => "categorical",
            Kind::Datetime => "datetime",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Values of a column, tagged by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Categorical(Vec<Option<String>>),
    Datetime(Vec<Option<NaiveDateTime>>),
}

impl ColumnData {
    pub fn kind(&self) -> Kind {
        match self {
            ColumnData::Numeric(_) => Kind::Numeric,
            ColumnData::Categorical(_) => Kind::Categorical,
            ColumnData::Datetime(_) => Kind::Datetime,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(vals) => vals.len(),
            ColumnData::Categorical(vals) => vals.len(),
            ColumnData::Datetime(vals) => vals.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_missing(&self, row: usize) -> bool {
        match self {
            ColumnData::Numeric(vals) => vals[row].is_none(),
            ColumnData::Categorical(vals) => vals[row].is_none(),
            ColumnData::Datetime(vals) => vals[row].is_none(),
        }
    }

    /// Boolean mask, true where the value is absent.
    pub fn missing_mask(&self) -> Vec<bool> {
        (0..self.len()).map(|row| self.is_missing(row)).collect()
    }

    pub fn missing_count(&self) -> usize {
        (0..self.len()).filter(|&row| self.is_missing(row)).count()
    }

    fn take(&self, rows: &[usize]) -> Self {
        match self {
            ColumnData::Numeric(vals) => ColumnData::Numeric(take(vals, rows)),
            ColumnData::Categorical(vals) => ColumnData::Categorical(take(vals, rows)),
            ColumnData::Datetime(vals) => ColumnData::Datetime(take(vals, rows)),
        }
    }

    fn cell_key(&self, row: usize) -> CellKey<'_> {
        match self {
            ColumnData::Numeric(vals) => match vals[row] {
                // -0.0 and 0.0 compare equal, so they must hash equal too.
                Some(val) if val == 0.0 => CellKey::Number(0.0f64.to_bits()),
                Some(val) => CellKey::Number(val.to_bits()),
                None => CellKey::Missing,
            },
            ColumnData::Categorical(vals) => match &vals[row] {
                Some(val) => CellKey::Text(val),
                None => CellKey::Missing,
            },
            ColumnData::Datetime(vals) => match vals[row] {
                Some(val) => CellKey::Timestamp(val),
                None => CellKey::Missing,
            },
        }
    }
}

fn take<T: Clone>(vals: &[Option<T>], rows: &[usize]) -> Vec<Option<T>> {
    rows.iter().map(|&row| vals[row].clone()).collect()
}

#[derive(Hash, PartialEq, Eq)]
enum CellKey<'a> {
    Missing,
    Number(u64),
    Text(&'a str),
    Timestamp(NaiveDateTime),
}

/// Named, homogeneous sequence of values.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    data: ColumnData,
}

impl Column {
    pub fn new<S: Into<String>>(name: S, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn numeric<S: Into<String>>(name: S, vals: Vec<Option<f64>>) -> Self {
        Self::new(name, ColumnData::Numeric(vals))
    }

    pub fn categorical<S: Into<String>>(name: S, vals: Vec<Option<String>>) -> Self {
        Self::new(name, ColumnData::Categorical(vals))
    }

    pub fn datetime<S: Into<String>>(name: S, vals: Vec<Option<NaiveDateTime>>) -> Self {
        Self::new(name, ColumnData::Datetime(vals))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    /// Mutable access to the values; callers must not change the length.
    pub(crate) fn data_mut(&mut self) -> &mut ColumnData {
        &mut self.data
    }

    pub fn kind(&self) -> Kind {
        self.data.kind()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn missing_mask(&self) -> Vec<bool> {
        self.data.missing_mask()
    }

    pub fn as_numeric(&self) -> Result<&[Option<f64>]> {
        match &self.data {
            ColumnData::Numeric(vals) => Ok(vals),
            other => Err(self.type_mismatch(Kind::Numeric, other.kind())),
        }
    }

    pub fn as_numeric_mut(&mut self) -> Result<&mut [Option<f64>]> {
        let found = self.kind();
        match &mut self.data {
            ColumnData::Numeric(vals) => Ok(vals),
            _ => Err(Error::TypeMismatch {
                column: self.name.clone(),
                expected: Kind::Numeric.name(),
                found: found.name(),
            }),
        }
    }

    pub fn as_categorical(&self) -> Result<&[Option<String>]> {
        match &self.data {
            ColumnData::Categorical(vals) => Ok(vals),
            other => Err(self.type_mismatch(Kind::Categorical, other.kind())),
        }
    }

    /// Non-missing numeric values in row order.
    pub fn present_values(&self) -> Result<Vec<f64>> {
        Ok(self.as_numeric()?.iter().flatten().copied().collect())
    }

    /// Numeric values, failing if any entry is missing.
    pub fn complete_values(&self) -> Result<Vec<f64>> {
        let vals = self.as_numeric()?;
        let count = vals.iter().filter(|val| val.is_none()).count();
        if count > 0 {
            return Err(Error::MissingValues {
                column: self.name.clone(),
                count,
            });
        }
        Ok(vals.iter().flatten().copied().collect())
    }

    fn type_mismatch(&self, expected: Kind, found: Kind) -> Error {
        Error::TypeMismatch {
            column: self.name.clone(),
            expected: expected.name(),
            found: found.name(),
        }
    }
}

/// Spacing between consecutive timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl Frequency {
    /// Infer the frequency of an ordered timestamp sequence.
    ///
    /// Every consecutive gap must fall in the same class, otherwise `None`.
    pub fn infer(stamps: &[NaiveDateTime]) -> Option<Self> {
        let mut freq = None;
        for pair in stamps.windows(2) {
            let class = Self::classify(pair[1] - pair[0])?;
            match freq {
                None => freq = Some(class),
                Some(prev) if prev != class => return None,
                Some(_) => {}
            }
        }
        freq
    }

    fn classify(delta: TimeDelta) -> Option<Self> {
        if delta == TimeDelta::hours(1) {
            return Some(Frequency::Hourly);
        }
        if delta.num_seconds() % 86_400 != 0 {
            return None;
        }
        match delta.num_days() {
            1 => Some(Frequency::Daily),
            7 => Some(Frequency::Weekly),
            28..=31 => Some(Frequency::Monthly),
            89..=92 => Some(Frequency::Quarterly),
            365 | 366 => Some(Frequency::Yearly),
            _ => None,
        }
    }

    /// Number of observations in one seasonal cycle.
    pub fn seasonal_period(self) -> Option<usize> {
        match self {
            Frequency::Hourly => Some(24),
            Frequency::Daily => Some(7),
            Frequency::Weekly => Some(52),
            Frequency::Monthly => Some(12),
            Frequency::Quarterly => Some(4),
            Frequency::Yearly => None,
        }
    }

    pub fn advance(self, stamp: NaiveDateTime, steps: u32) -> Option<NaiveDateTime> {
        let steps_i64 = i64::from(steps);
        match self {
            Frequency::Hourly => stamp.checked_add_signed(TimeDelta::hours(steps_i64)),
            Frequency::Daily => stamp.checked_add_signed(TimeDelta::days(steps_i64)),
            Frequency::Weekly => stamp.checked_add_signed(TimeDelta::weeks(steps_i64)),
            Frequency::Monthly => stamp.checked_add_months(Months::new(steps)),
            Frequency::Quarterly => stamp.checked_add_months(Months::new(3 * steps)),
            Frequency::Yearly => stamp.checked_add_months(Months::new(12 * steps)),
        }
    }
}

/// Row labels shared by all columns of a table.
#[derive(Debug, Clone, PartialEq)]
pub enum Index {
    Position(Vec<usize>),
    Timestamp(Vec<NaiveDateTime>),
}

impl Index {
    pub fn range(n_rows: usize) -> Self {
        Index::Position((0..n_rows).collect())
    }

    pub fn len(&self) -> usize {
        match self {
            Index::Position(labels) => labels.len(),
            Index::Timestamp(stamps) => stamps.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn label(&self, row: usize) -> String {
        match self {
            Index::Position(labels) => labels[row].to_string(),
            Index::Timestamp(stamps) => format_timestamp(stamps[row]),
        }
    }

    pub fn frequency(&self) -> Option<Frequency> {
        match self {
            Index::Position(_) => None,
            Index::Timestamp(stamps) => Frequency::infer(stamps),
        }
    }

    /// Labels for `horizon` rows following the last one.
    ///
    /// Timestamp indexes continue at their inferred frequency; anything else
    /// continues with positional labels.
    pub fn future(&self, horizon: usize) -> Index {
        if let (Index::Timestamp(stamps), Some(freq)) = (self, self.frequency()) {
            if let Some(&last) = stamps.last() {
                let next: Option<Vec<_>> = (1..=horizon)
                    .map(|step| {
                        u32::try_from(step)
                            .ok()
                            .and_then(|step| freq.advance(last, step))
                    })
                    .collect();
                if let Some(next) = next {
                    return Index::Timestamp(next);
                }
            }
        }
        let start = match self {
            Index::Position(labels) => labels.last().map_or(0, |&last| last + 1),
            Index::Timestamp(stamps) => stamps.len(),
        };
        Index::Position((start..start + horizon).collect())
    }

    fn take(&self, rows: &[usize]) -> Self {
        match self {
            Index::Position(labels) => {
                Index::Position(rows.iter().map(|&row| labels[row]).collect())
            }
            Index::Timestamp(stamps) => {
                Index::Timestamp(rows.iter().map(|&row| stamps[row]).collect())
            }
        }
    }
}

/// Letter case applied by [`Table::normalize_case`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Case {
    Lower,
    Upper,
    Title,
}

impl Case {
    pub fn apply(self, text: &str) -> String {
        match self {
            Case::Lower => text.to_lowercase(),
            Case::Upper => text.to_uppercase(),
            Case::Title => {
                let mut out = String::with_capacity(text.len());
                let mut prev_alpha = false;
                for ch in text.chars() {
                    if prev_alpha {
                        out.extend(ch.to_lowercase());
                    } else {
                        out.extend(ch.to_uppercase());
                    }
                    prev_alpha = ch.is_alphabetic();
                }
                out
            }
        }
    }
}

/// Ordered collection of equally long, uniquely named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    index: Index,
    columns: Vec<Column>,
}

impl Table {
    pub fn new(index: Index, columns: Vec<Column>) -> Result<Self> {
        let mut table = Self {
            index,
            columns: Vec::with_capacity(columns.len()),
        };
        for column in columns {
            table.insert_column(column)?;
        }
        Ok(table)
    }

    /// Build a table with a positional index sized after the first column.
    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        let n_rows = columns.first().map_or(0, Column::len);
        Self::new(Index::range(n_rows), columns)
    }

    pub fn n_rows(&self) -> usize {
        self.index.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        self.columns
            .iter()
            .find(|column| column.name == name)
            .ok_or_else(|| Error::ColumnNotFound(name.to_string()))
    }

    pub fn column_mut(&mut self, name: &str) -> Result<&mut Column> {
        self.columns
            .iter_mut()
            .find(|column| column.name == name)
            .ok_or_else(|| Error::ColumnNotFound(name.to_string()))
    }

    pub fn insert_column(&mut self, column: Column) -> Result<()> {
        if column.len() != self.n_rows() {
            return Err(Error::LengthMismatch {
                expected: self.n_rows(),
                found: column.len(),
            });
        }
        if self.columns.iter().any(|other| other.name == column.name) {
            return Err(Error::DuplicateColumn(column.name));
        }
        self.columns.push(column);
        Ok(())
    }

    /// Swap in a column with the same name and length, keeping its position.
    pub fn replace_column(&mut self, column: Column) -> Result<Column> {
        if column.len() != self.n_rows() {
            return Err(Error::LengthMismatch {
                expected: self.n_rows(),
                found: column.len(),
            });
        }
        let name = column.name.clone();
        let slot = self.column_mut(&name)?;
        Ok(std::mem::replace(slot, column))
    }

    pub fn drop_column(&mut self, name: &str) -> Result<Column> {
        let pos = self
            .columns
            .iter()
            .position(|column| column.name == name)
            .ok_or_else(|| Error::ColumnNotFound(name.to_string()))?;
        Ok(self.columns.remove(pos))
    }

    /// New table holding the given rows, in the given order.
    pub fn take_rows(&self, rows: &[usize]) -> Table {
        Table {
            index: self.index.take(rows),
            columns: self
                .columns
                .iter()
                .map(|column| Column::new(column.name.clone(), column.data.take(rows)))
                .collect(),
        }
    }

    /// New table holding the rows where `keep` is true.
    pub fn filter(&self, keep: &[bool]) -> Result<Table> {
        if keep.len() != self.n_rows() {
            return Err(Error::LengthMismatch {
                expected: self.n_rows(),
                found: keep.len(),
            });
        }
        let rows: Vec<usize> = (0..keep.len()).filter(|&row| keep[row]).collect();
        Ok(self.take_rows(&rows))
    }

    pub fn missing_counts(&self) -> Vec<(String, usize)> {
        self.columns
            .iter()
            .map(|column| (column.name.clone(), column.data.missing_count()))
            .collect()
    }

    /// Mark every row equal (across all columns) to an earlier row.
    pub fn duplicated(&self) -> Vec<bool> {
        let mut seen = HashSet::with_capacity(self.n_rows());
        (0..self.n_rows())
            .map(|row| {
                let key: Vec<CellKey> = self
                    .columns
                    .iter()
                    .map(|column| column.data.cell_key(row))
                    .collect();
                !seen.insert(key)
            })
            .collect()
    }

    /// Remove repeated rows, keeping the first occurrence.
    ///
    /// Returns the deduplicated table and the number of rows removed.
    pub fn drop_duplicates(&self) -> (Table, usize) {
        let dup = self.duplicated();
        let rows: Vec<usize> = (0..dup.len()).filter(|&row| !dup[row]).collect();
        let n_removed = dup.len() - rows.len();
        (self.take_rows(&rows), n_removed)
    }

    pub fn normalize_case(&mut self, name: &str, case: Case) -> Result<()> {
        let column = self.column_mut(name)?;
        let found = column.kind();
        match column.data_mut() {
            ColumnData::Categorical(vals) => {
                for val in vals.iter_mut().flatten() {
                    *val = case.apply(val);
                }
                Ok(())
            }
            _ => Err(Error::TypeMismatch {
                column: name.to_string(),
                expected: Kind::Categorical.name(),
                found: found.name(),
            }),
        }
    }
}

const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Parse a date or date-time in one of the accepted ISO-like layouts.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    for fmt in TIMESTAMP_FORMATS {
        if let Ok(stamp) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(stamp);
        }
    }
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{text}-01"), "%Y-%m-%d"))
        .ok()?;
    date.and_hms_opt(0, 0, 0)
}

/// Inverse of [`parse_timestamp`]; midnight stamps print as plain dates.
pub fn format_timestamp(stamp: NaiveDateTime) -> String {
    if stamp.num_seconds_from_midnight() == 0 {
        stamp.format("%Y-%m-%d").to_string()
    } else {
        stamp.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp(text: &str) -> NaiveDateTime {
        parse_timestamp(text).unwrap()
    }

    fn sample() -> Table {
        Table::from_columns(vec![
            Column::categorical(
                "name",
                vec![Some("a".into()), Some("b".into()), Some("a".into()), None],
            ),
            Column::numeric("x", vec![Some(1.0), Some(2.0), Some(1.0), None]),
        ])
        .unwrap()
    }

    #[test]
    fn rejects_unequal_lengths_and_duplicate_names() {
        let err = Table::from_columns(vec![
            Column::numeric("a", vec![Some(1.0), Some(2.0)]),
            Column::numeric("b", vec![Some(1.0)]),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::LengthMismatch { expected: 2, found: 1 }));

        let err = Table::from_columns(vec![
            Column::numeric("a", vec![Some(1.0)]),
            Column::numeric("a", vec![Some(2.0)]),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::DuplicateColumn(name) if name == "a"));
    }

    #[test]
    fn missing_mask_and_counts() {
        let table = sample();
        assert_eq!(
            table.column("x").unwrap().missing_mask(),
            vec![false, false, false, true]
        );
        assert_eq!(
            table.missing_counts(),
            vec![("name".to_string(), 1), ("x".to_string(), 1)]
        );
    }

    #[test]
    fn duplicates_keep_first_occurrence() {
        let table = sample();
        assert_eq!(table.duplicated(), vec![false, false, true, false]);
        let (dedup, n_removed) = table.drop_duplicates();
        assert_eq!(n_removed, 1);
        assert_eq!(dedup.index(), &Index::Position(vec![0, 1, 3]));
    }

    #[test]
    fn numeric_access_checks_kind() {
        let table = sample();
        let err = table.column("name").unwrap().as_numeric().unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { expected: "numeric", .. }));
        let err = table.column("x").unwrap().complete_values().unwrap_err();
        assert!(matches!(err, Error::MissingValues { count: 1, .. }));
    }

    #[test]
    fn title_case_follows_word_boundaries() {
        assert_eq!(Case::Title.apply("braund, mr. owen HARRIS"), "Braund, Mr. Owen Harris");
        let mut table = sample();
        table.normalize_case("name", Case::Upper).unwrap();
        assert_eq!(
            table.column("name").unwrap().as_categorical().unwrap()[0],
            Some("A".to_string())
        );
        assert!(table.normalize_case("x", Case::Lower).is_err());
    }

    #[test]
    fn parses_month_and_day_layouts() {
        assert_eq!(stamp("1949-03"), stamp("1949-03-01"));
        assert_eq!(stamp("2024-01-02T03:04:05"), stamp("2024-01-02 03:04:05"));
        assert!(parse_timestamp("not a date").is_none());
        assert_eq!(format_timestamp(stamp("1949-03")), "1949-03-01");
    }

    #[test]
    fn infers_monthly_frequency_and_extends_index() {
        let index = Index::Timestamp(vec![
            stamp("1960-10-01"),
            stamp("1960-11-01"),
            stamp("1960-12-01"),
        ]);
        assert_eq!(index.frequency(), Some(Frequency::Monthly));
        assert_eq!(
            index.future(2),
            Index::Timestamp(vec![stamp("1961-01-01"), stamp("1961-02-01")])
        );
        assert_eq!(Index::Position(vec![3, 7]).future(2), Index::Position(vec![8, 9]));
    }

    #[test]
    fn irregular_spacing_has_no_frequency() {
        let stamps = [stamp("2024-01-01"), stamp("2024-01-02"), stamp("2024-01-09")];
        assert_eq!(Frequency::infer(&stamps), None);
    }
}
