//! Delimited text input and output for [`Table`].

use crate::error::{Error, Result};
use crate::table::{Column, ColumnData, Index, Table, format_timestamp, parse_timestamp};
use csv::{ReaderBuilder, Trim, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

/// Cell contents read as missing values.
///
/// Numeric cells that parse to NaN under any other spelling are missing too.
pub const MISSING_TOKENS: [&str; 13] = [
    "", "NA", "N/A", "n/a", "<NA>", "#N/A", "NaN", "nan", "-nan", "-NaN", "null", "NULL", "None",
];

/// Header label of the index column in written files.
pub const INDEX_LABEL: &str = "index";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceOptions {
    pub delimiter: char,
    pub has_header: bool,
    /// Column promoted to the row index.
    pub index_column: Option<String>,
    /// Try to read non-numeric columns as timestamps.
    pub parse_dates: bool,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            delimiter: ',',
            has_header: true,
            index_column: None,
            parse_dates: false,
        }
    }
}

pub fn read_csv(path: &Path, opts: &SourceOptions) -> Result<Table> {
    if !path.exists() {
        return Err(Error::SourceNotFound {
            path: path.to_path_buf(),
        });
    }
    let delimiter = u8::try_from(opts.delimiter).map_err(|_| {
        Error::InvalidArgument(format!("delimiter {:?} is not ASCII", opts.delimiter))
    })?;
    let file = File::open(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parse_error = |err: csv::Error| Error::ParseError {
        path: path.to_path_buf(),
        line: err.position().map_or(0, csv::Position::line),
        msg: err.to_string(),
    };

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(opts.has_header)
        .trim(Trim::All)
        .from_reader(file);

    let mut names: Vec<String> = if opts.has_header {
        reader
            .headers()
            .map_err(parse_error)?
            .iter()
            .map(str::to_string)
            .collect()
    } else {
        Vec::new()
    };

    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); names.len()];
    let mut lines = Vec::new();
    for record in reader.records() {
        let record = record.map_err(parse_error)?;
        lines.push(record.position().map_or(0, csv::Position::line));
        if names.is_empty() {
            names = (0..record.len()).map(|i| format!("column_{i}")).collect();
            cells = vec![Vec::new(); names.len()];
        }
        for (col_cells, cell) in cells.iter_mut().zip(record.iter()) {
            col_cells.push((!MISSING_TOKENS.contains(&cell)).then(|| cell.to_string()));
        }
    }
    let n_rows = cells.first().map_or(0, Vec::len);

    let mut index = None;
    let mut columns = Vec::with_capacity(names.len());
    for (name, col_cells) in names.into_iter().zip(cells) {
        if opts.index_column.as_deref() == Some(name.as_str()) {
            index = Some(parse_index(&col_cells).ok_or_else(|| Error::ParseError {
                path: path.to_path_buf(),
                line: 1,
                msg: format!("index column {name:?} holds neither timestamps nor row positions"),
            })?);
        } else {
            let data = infer_data(col_cells, opts.parse_dates).map_err(|(row, text)| {
                Error::ParseError {
                    path: path.to_path_buf(),
                    line: lines.get(row).copied().unwrap_or(0),
                    msg: format!("column {name:?} holds the non-finite number {text:?}"),
                }
            })?;
            columns.push(Column::new(name, data));
        }
    }
    let index = match (index, &opts.index_column) {
        (Some(index), _) => index,
        (None, Some(name)) => return Err(Error::ColumnNotFound(name.clone())),
        (None, None) => Index::range(n_rows),
    };

    let table = Table::new(index, columns)?;
    log::debug!(
        "read {} rows and {} columns from {path:?}",
        table.n_rows(),
        table.n_columns()
    );
    Ok(table)
}

/// Write `table` with its timestamp index, if any, under [`INDEX_LABEL`].
pub fn write_csv(table: &Table, path: &Path) -> Result<()> {
    write_csv_labeled(table, path, INDEX_LABEL)
}

pub fn write_csv_labeled(table: &Table, path: &Path, index_label: &str) -> Result<()> {
    let io_error = |source: std::io::Error| Error::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .map_err(|err| io_error(err.into()))?;

    let with_index = matches!(table.index(), Index::Timestamp(_));
    let mut header: Vec<&str> = Vec::with_capacity(table.n_columns() + 1);
    if with_index {
        header.push(index_label);
    }
    header.extend(table.column_names());
    writer
        .write_record(&header)
        .map_err(|err| io_error(err.into()))?;

    for row in 0..table.n_rows() {
        let mut record: Vec<String> = Vec::with_capacity(header.len());
        if with_index {
            record.push(table.index().label(row));
        }
        record.extend(table.columns().iter().map(|column| format_cell(column.data(), row)));
        writer
            .write_record(&record)
            .map_err(|err| io_error(err.into()))?;
    }
    writer.flush().map_err(io_error)?;
    Ok(())
}

/// Infer the column kind.
///
/// Numbers parsing to NaN read as missing. An infinite number fails with its
/// row and text.
fn infer_data(
    cells: Vec<Option<String>>,
    parse_dates: bool,
) -> std::result::Result<ColumnData, (usize, String)> {
    let numbers: Option<Vec<Option<f64>>> = cells
        .iter()
        .map(|cell| match cell {
            Some(text) => text
                .parse::<f64>()
                .ok()
                .map(|val| (!val.is_nan()).then_some(val)),
            None => Some(None),
        })
        .collect();
    if let Some(numbers) = numbers {
        if let Some(row) = numbers.iter().position(|val| val.is_some_and(f64::is_infinite)) {
            return Err((row, cells[row].clone().unwrap_or_default()));
        }
        return Ok(ColumnData::Numeric(numbers));
    }
    if parse_dates {
        if let Some(stamps) = parse_stamps(&cells) {
            return Ok(ColumnData::Datetime(stamps));
        }
    }
    Ok(ColumnData::Categorical(cells))
}

fn parse_stamps(cells: &[Option<String>]) -> Option<Vec<Option<chrono::NaiveDateTime>>> {
    cells
        .iter()
        .map(|cell| match cell {
            Some(text) => parse_timestamp(text).map(Some),
            None => Some(None),
        })
        .collect()
}

/// Row positions if every cell is a non-negative integer, else timestamps.
fn parse_index(cells: &[Option<String>]) -> Option<Index> {
    let texts: Vec<&str> = cells.iter().map(Option::as_deref).collect::<Option<_>>()?;
    if let Some(positions) = texts
        .iter()
        .map(|text| text.parse::<usize>().ok())
        .collect::<Option<Vec<_>>>()
    {
        return Some(Index::Position(positions));
    }
    let stamps: Option<Vec<_>> = texts.iter().map(|text| parse_timestamp(text)).collect();
    stamps.map(Index::Timestamp)
}

fn format_cell(data: &ColumnData, row: usize) -> String {
    match data {
        ColumnData::Numeric(vals) => vals[row].map_or_else(String::new, |val| val.to_string()),
        ColumnData::Categorical(vals) => vals[row].clone().unwrap_or_default(),
        ColumnData::Datetime(vals) => vals[row].map_or_else(String::new, format_timestamp),
    }
}
