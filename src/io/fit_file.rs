//! Read/write fit JSON files.
//!
//! A fit file is the portable record of one run:
//! - the winning delay, parameters and loss
//! - run metadata (variant, initial condition, lockdown window)
//! - the per-delay candidate losses
//! - the forecast table, so `plot` can redraw without refitting
//!
//! JSON has no infinity, so non-finite candidate losses are stored as `null`.

use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{DelayFit, InitialCondition, InitialState, LockdownWindow, ModelVariant, SirParams};
use crate::error::AppError;
use crate::forecast::Forecast;

pub const FIT_FILE_TOOL: &str = "sirfit";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitFile {
    pub tool: String,
    pub variant: ModelVariant,
    pub initial_condition: InitialCondition,
    pub initial_state: InitialState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lockdown: Option<LockdownWindow>,
    pub delay: usize,
    pub params: SirParams,
    pub r0: f64,
    pub loss: f64,
    pub candidates: Vec<CandidateRecord>,
    pub forecast: Forecast,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub delay: usize,
    pub loss: Option<f64>,
    pub converged: bool,
    pub iterations: usize,
}

impl From<&DelayFit> for CandidateRecord {
    fn from(fit: &DelayFit) -> Self {
        Self {
            delay: fit.delay,
            loss: fit.loss.is_finite().then_some(fit.loss),
            converged: fit.converged,
            iterations: fit.iterations,
        }
    }
}

impl FitFile {
    pub fn new(
        variant: ModelVariant,
        initial_condition: InitialCondition,
        initial_state: InitialState,
        lockdown: Option<LockdownWindow>,
        best: &DelayFit,
        candidates: &[DelayFit],
        forecast: Forecast,
    ) -> Self {
        Self {
            tool: FIT_FILE_TOOL.to_string(),
            variant,
            initial_condition,
            initial_state,
            lockdown,
            delay: best.delay,
            params: best.params,
            r0: best.params.r0(),
            loss: best.loss,
            candidates: candidates.iter().map(CandidateRecord::from).collect(),
            forecast,
        }
    }
}

/// Write a fit JSON file.
pub fn write_fit_json(path: &Path, fit: &FitFile) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create fit JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, fit)
        .map_err(|e| AppError::new(2, format!("Failed to write fit JSON: {e}")))?;
    Ok(())
}

/// Read a fit JSON file.
pub fn read_fit_json(path: &Path) -> Result<FitFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open fit JSON '{}': {e}", path.display())))?;
    let fit: FitFile =
        serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid fit JSON: {e}")))?;
    if fit.forecast.rows.is_empty() {
        return Err(AppError::new(2, "Fit JSON contains an empty forecast."));
    }
    Ok(fit)
}
