//! CSV ingest of daily cumulative counts.
//!
//! Columns are looked up by (normalized) header name through a [`ColumnMap`],
//! so regional files or renamed exports only need a different map. Parsing is
//! strict: a missing required column is a configuration error (exit code 2),
//! an unparseable date or number is a data error (exit code 3). Empty numeric
//! cells count as zero, which is how the early days of the national file are
//! published.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use csv::StringRecord;
use tracing::debug;

use crate::domain::DailyRecord;
use crate::error::AppError;

/// Header names of the four required columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub date: String,
    pub cases: String,
    pub dead: String,
    pub recovered: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            date: "data".to_string(),
            cases: "totale_casi".to_string(),
            dead: "deceduti".to_string(),
            recovered: "dimessi_guariti".to_string(),
        }
    }
}

struct Columns {
    date: usize,
    cases: usize,
    dead: usize,
    recovered: usize,
}

/// Load records from a CSV file on disk.
pub fn load_records(path: &Path, columns: &ColumnMap) -> Result<Vec<DailyRecord>, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display())))?;
    parse_records(file, columns)
}

/// Parse records from any CSV source.
pub fn parse_records<R: Read>(source: R, columns: &ColumnMap) -> Result<Vec<DailyRecord>, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(source);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone();
    let idx = resolve_columns(&build_header_map(&headers), columns)?;

    let mut records = Vec::new();
    for (i, result) in reader.records().enumerate() {
        // Header is line 1.
        let line = i + 2;
        let row = result.map_err(|e| AppError::new(3, format!("CSV parse error on line {line}: {e}")))?;
        records.push(parse_row(&row, &idx, line)?);
    }

    debug!(rows = records.len(), "parsed CSV records");
    Ok(records)
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Strip a UTF-8 BOM glued to the first header.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn resolve_columns(
    header_map: &HashMap<String, usize>,
    columns: &ColumnMap,
) -> Result<Columns, AppError> {
    let find = |name: &str| header_map.get(&normalize_header_name(name)).copied();

    let wanted = [
        &columns.date,
        &columns.cases,
        &columns.dead,
        &columns.recovered,
    ];
    let missing: Vec<&str> = wanted
        .iter()
        .filter(|name| find(name).is_none())
        .map(|name| name.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(AppError::new(
            2,
            format!("CSV is missing required column(s): {}.", missing.join(", ")),
        ));
    }

    let get = |name: &str| {
        find(name).ok_or_else(|| AppError::new(2, format!("CSV is missing column '{name}'.")))
    };
    Ok(Columns {
        date: get(&columns.date)?,
        cases: get(&columns.cases)?,
        dead: get(&columns.dead)?,
        recovered: get(&columns.recovered)?,
    })
}

fn parse_row(row: &StringRecord, idx: &Columns, line: usize) -> Result<DailyRecord, AppError> {
    let field = |i: usize| row.get(i).unwrap_or("").trim();
    Ok(DailyRecord {
        date: parse_date(field(idx.date), line)?,
        cases: parse_count(field(idx.cases), line)?,
        dead: parse_count(field(idx.dead), line)?,
        recovered: parse_count(field(idx.recovered), line)?,
    })
}

/// Accepts `YYYY-MM-DD` optionally followed by a time part (`T18:00:00`, ` 17:00:00`).
fn parse_date(raw: &str, line: usize) -> Result<NaiveDate, AppError> {
    let day = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|e| AppError::new(3, format!("Invalid date '{raw}' on line {line}: {e}")))
}

fn parse_count(raw: &str, line: usize) -> Result<f64, AppError> {
    if raw.is_empty() {
        return Ok(0.0);
    }
    let v: f64 = raw
        .parse()
        .map_err(|e| AppError::new(3, format!("Invalid count '{raw}' on line {line}: {e}")))?;
    if !v.is_finite() {
        return Err(AppError::new(3, format!("Non-finite count '{raw}' on line {line}.")));
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NATIONAL: &str = "\u{feff}data,stato,ricoverati_con_sintomi,dimessi_guariti,deceduti,totale_casi,note\n\
2020-02-24T18:00:00,ITA,101,1,7,229,\n\
2020-02-25T18:00:00,ITA,114,1,10,322,\n\
2020-02-26T18:00:00,ITA,128,3,12,400,\"pan, nota\"\n";

    #[test]
    fn parses_the_national_layout() {
        let records = parse_records(NATIONAL.as_bytes(), &ColumnMap::default()).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].date, NaiveDate::from_ymd_opt(2020, 2, 24).unwrap());
        assert_eq!(records[0].cases, 229.0);
        assert_eq!(records[0].dead, 7.0);
        assert_eq!(records[0].recovered, 1.0);
        assert_eq!(records[2].recovered, 3.0);
    }

    #[test]
    fn empty_cells_count_as_zero() {
        let csv = "data,dimessi_guariti,deceduti,totale_casi\n2020-03-01 17:00:00,,,5\n";
        let records = parse_records(csv.as_bytes(), &ColumnMap::default()).unwrap();
        assert_eq!(records[0].recovered, 0.0);
        assert_eq!(records[0].dead, 0.0);
        assert_eq!(records[0].cases, 5.0);
    }

    #[test]
    fn missing_columns_are_listed() {
        let csv = "data,totale_casi\n2020-03-01,5\n";
        let err = parse_records(csv.as_bytes(), &ColumnMap::default()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.message().contains("deceduti"));
        assert!(err.message().contains("dimessi_guariti"));
    }

    #[test]
    fn custom_column_map_is_case_insensitive() {
        let csv = "Date,Cases,Deaths,Recovered\n2020-04-01,10,1,2\n";
        let columns = ColumnMap {
            date: "date".into(),
            cases: "cases".into(),
            dead: "deaths".into(),
            recovered: "recovered".into(),
        };
        let records = parse_records(csv.as_bytes(), &columns).unwrap();
        assert_eq!(records[0].cases, 10.0);
        assert_eq!(records[0].dead, 1.0);
    }

    #[test]
    fn bad_values_are_data_errors() {
        let csv = "data,dimessi_guariti,deceduti,totale_casi\nyesterday,0,0,1\n";
        assert_eq!(
            parse_records(csv.as_bytes(), &ColumnMap::default()).unwrap_err().exit_code(),
            3
        );
        let csv = "data,dimessi_guariti,deceduti,totale_casi\n2020-03-01,0,x,1\n";
        let err = parse_records(csv.as_bytes(), &ColumnMap::default()).unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(err.message().contains("line 2"));
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("national.csv");
        std::fs::write(&path, NATIONAL).unwrap();
        assert_eq!(load_records(&path, &ColumnMap::default()).unwrap().len(), 3);
        assert_eq!(
            load_records(&dir.path().join("nope.csv"), &ColumnMap::default())
                .unwrap_err()
                .exit_code(),
            2
        );
    }
}
