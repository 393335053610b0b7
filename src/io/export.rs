//! CSV exports for spreadsheets and downstream scripts.
//!
//! Missing observed values (forecast days) are written as empty cells.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::domain::ObservedSeries;
use crate::error::AppError;
use crate::forecast::Forecast;

pub const TOTALS_FILE: &str = "generated-total.csv";
pub const DEAD_PCT_FILE: &str = "generated-deadpct.csv";
pub const SIR_FILE: &str = "generated-sir.csv";
pub const CASES_FILE: &str = "generated-cases.csv";

/// Write every export into `dir` (created if missing); returns the written paths.
pub fn write_all(
    dir: &Path,
    observed: &ObservedSeries,
    forecast: &Forecast,
) -> Result<Vec<PathBuf>, AppError> {
    fs::create_dir_all(dir).map_err(|e| {
        AppError::new(
            2,
            format!("Failed to create export directory '{}': {e}", dir.display()),
        )
    })?;

    let paths = [
        dir.join(TOTALS_FILE),
        dir.join(DEAD_PCT_FILE),
        dir.join(SIR_FILE),
        dir.join(CASES_FILE),
    ];
    write_totals_csv(&paths[0], observed)?;
    write_dead_pct_csv(&paths[1], observed)?;
    write_sir_csv(&paths[2], forecast)?;
    write_cases_csv(&paths[3], forecast)?;
    Ok(paths.to_vec())
}

/// Raw observed totals: `date,cases,dead,recovered`.
pub fn write_totals_csv(path: &Path, observed: &ObservedSeries) -> Result<(), AppError> {
    let mut out = create(path)?;
    line(&mut out, format_args!("date,cases,dead,recovered"))?;
    for r in observed.records() {
        line(
            &mut out,
            format_args!("{},{},{},{}", r.date, r.cases, r.dead, r.recovered),
        )?;
    }
    finish(out)
}

/// Death percentage `100 * dead / cases`: `date,dead_pct`.
pub fn write_dead_pct_csv(path: &Path, observed: &ObservedSeries) -> Result<(), AppError> {
    let mut out = create(path)?;
    line(&mut out, format_args!("date,dead_pct"))?;
    for (r, pct) in observed.records().iter().zip(observed.death_percentage()) {
        line(&mut out, format_args!("{},{}", r.date, opt(pct, 6)))?;
    }
    finish(out)
}

/// Simulated and observed-derived compartments over the full forecast range.
pub fn write_sir_csv(path: &Path, forecast: &Forecast) -> Result<(), AppError> {
    let mut out = create(path)?;
    line(
        &mut out,
        format_args!("date,S,I,R,susceptible,infected,recovered,cases,forecast"),
    )?;
    for row in &forecast.rows {
        line(
            &mut out,
            format_args!(
                "{},{:.4},{:.4},{:.4},{},{},{},{},{:.4}",
                row.date,
                row.susceptible,
                row.infected,
                row.removed,
                opt(row.observed_susceptible, 4),
                opt(row.observed_infected, 4),
                opt(row.observed_removed, 4),
                opt(row.cases, 4),
                row.forecast,
            ),
        )?;
    }
    finish(out)
}

/// Modeled vs observed cumulative cases: `date,forecast,cases`.
pub fn write_cases_csv(path: &Path, forecast: &Forecast) -> Result<(), AppError> {
    let mut out = create(path)?;
    line(&mut out, format_args!("date,forecast,cases"))?;
    for row in &forecast.rows {
        line(
            &mut out,
            format_args!("{},{:.4},{}", row.date, row.forecast, opt(row.cases, 4)),
        )?;
    }
    finish(out)
}

fn create(path: &Path) -> Result<BufWriter<File>, AppError> {
    File::create(path).map(BufWriter::new).map_err(|e| {
        AppError::new(
            2,
            format!("Failed to create export CSV '{}': {e}", path.display()),
        )
    })
}

fn line(out: &mut BufWriter<File>, args: std::fmt::Arguments<'_>) -> Result<(), AppError> {
    writeln!(out, "{args}")
        .map_err(|e| AppError::new(2, format!("Failed to write export CSV row: {e}")))
}

fn finish(mut out: BufWriter<File>) -> Result<(), AppError> {
    out.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush export CSV: {e}")))
}

fn opt(v: Option<f64>, decimals: usize) -> String {
    v.map(|v| format!("{v:.decimals$}")).unwrap_or_default()
}
