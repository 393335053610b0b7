//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the fitting code stays clean and testable
//! - output changes are localized

use crate::domain::{DelayFit, FitConfig, InitialState, ObservedSeries, SirParams};
use crate::fit::DelaySearchOutcome;
use crate::forecast::{Forecast, ForecastRow};
use crate::io::FitFile;

/// Dataset, configuration and chosen parameters.
pub fn format_run_summary(
    source: &str,
    observed: &ObservedSeries,
    config: &FitConfig,
    initial: InitialState,
    outcome: &DelaySearchOutcome,
) -> String {
    let mut out = String::new();

    out.push_str("=== sirfit - SIR calibration and forecast ===\n");
    out.push_str(&format!("Source: {source}\n"));
    out.push_str(&format!(
        "Observed: {} days | {} .. {}\n",
        observed.len(),
        observed.start_date(),
        observed.end_date()
    ));
    out.push_str(&format!("Model: {}\n", config.model.display_name()));
    if let Some(window) = config.lockdown {
        out.push_str(&format!(
            "Lockdown: observed days {}..={}\n",
            window.start(),
            window.end()
        ));
    }
    out.push_str(&format!(
        "Initial state: I0={:.0} R0={:.0}\n",
        initial.infected, initial.removed
    ));
    out.push_str(&format!(
        "Guess: {} | delays: {} | susceptible term: {}\n",
        fmt_vec(&config.initial_guess),
        config.delays,
        if config.include_susceptible { "on" } else { "off" }
    ));

    out.push_str("\nDelay candidates:\n");
    out.push_str(&format_delay_table(&outcome.candidates, outcome.best.delay));

    out.push_str("\nChosen fit:\n");
    out.push_str(&format_params(&outcome.best.params));
    out.push_str(&format!("- delay : {} days\n", outcome.best.delay));
    out.push_str(&format!("- loss  : {:.6e}\n", outcome.best.loss));
    out
}

/// One line per delay candidate; the selected one is starred.
pub fn format_delay_table(candidates: &[DelayFit], best_delay: usize) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "  {:>5} {:>14} {:>10} {:>10} {:>6} {:>8}\n",
            "delay", "loss", "beta", "gamma", "R0", "iters"
        )
        .as_str(),
    );
    for c in candidates {
        let chosen = if c.delay == best_delay { "*" } else { " " };
        let loss = if c.loss.is_finite() {
            format!("{:.6e}", c.loss)
        } else {
            "inf".to_string()
        };
        let status = if !c.is_viable() {
            " (rejected)"
        } else if !c.converged {
            " (not converged)"
        } else {
            ""
        };
        out.push_str(&format!(
            "{chosen} {:>5} {:>14} {:>10.5} {:>10.5} {:>6.2} {:>8}{status}\n",
            c.delay,
            loss,
            c.params.beta,
            c.params.gamma,
            c.params.r0(),
            c.iterations,
        ));
    }
    out
}

pub fn format_params(params: &SirParams) -> String {
    let mut out = String::new();
    out.push_str(&format!("- N     : {:.1}\n", params.population));
    out.push_str(&format!("- beta  : {:.6}\n", params.beta));
    out.push_str(&format!("- gamma : {:.6}\n", params.gamma));
    if let Some(delta) = params.delta {
        out.push_str(&format!("- delta : {delta:.6}\n"));
    }
    out.push_str(&format!("- R0    : {:.3}\n", params.r0()));
    out
}

/// The last `rows` observed days followed by the first `rows` forecast days.
pub fn format_forecast_tail(forecast: &Forecast, rows: usize) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Forecast: {} + {} days (to {})\n",
        forecast.observed_days,
        forecast.horizon_days,
        forecast.end_date()
    ));
    if let Some(peak) = forecast.peak_infected() {
        out.push_str(&format!(
            "Peak infected: {:.0} on {}\n",
            peak.infected, peak.date
        ));
    }
    out.push_str(
        format!(
            "{:<10} {:>12} {:>12} {:>12}",
            "date", "cases", "forecast", "infected"
        )
        .trim_end(),
    );
    out.push('\n');

    let observed = forecast.observed_rows();
    let future = forecast.future_rows();
    let from = observed.len().saturating_sub(rows);
    for row in observed[from..].iter().chain(future.iter().take(rows)) {
        out.push_str(format_row(row).trim_end());
        out.push('\n');
    }
    out
}

/// Short summary of a fit file loaded for plotting.
pub fn format_fit_file_summary(fit: &FitFile) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{} fit | delay {} | loss {:.6e}\n",
        fit.variant.display_name(),
        fit.delay,
        fit.loss
    ));
    out.push_str(&format_params(&fit.params));
    out
}

fn format_row(row: &ForecastRow) -> String {
    let cases = row.cases.map(|c| format!("{c:.0}")).unwrap_or_else(|| "-".to_string());
    format!(
        "{:<10} {:>12} {:>12.0} {:>12.0}",
        row.date.to_string(),
        cases,
        row.forecast,
        row.infected
    )
}

fn fmt_vec(v: &[f64]) -> String {
    let parts: Vec<String> = v.iter().map(|x| format!("{x}")).collect();
    format!("[{}]", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DerivedSeries;
    use crate::forecast::forecast;
    use crate::math::OdeOptions;
    use crate::models::Simulator;
    use chrono::NaiveDate;

    fn candidate(delay: usize, loss: f64) -> DelayFit {
        DelayFit {
            delay,
            params: SirParams::plain(1000.0, 0.3, 0.1),
            loss,
            iterations: 12,
            evaluations: 30,
            converged: true,
        }
    }

    #[test]
    fn delay_table_marks_choice_and_rejections() {
        let table = format_delay_table(&[candidate(0, 2.0), candidate(1, f64::INFINITY), candidate(2, 1.0)], 2);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[2].contains("inf") && lines[2].ends_with("(rejected)"));
        assert!(lines[3].starts_with('*'));
        assert!(lines[1].starts_with(' '));
    }

    #[test]
    fn params_include_r0_and_optional_delta() {
        let plain = format_params(&SirParams::plain(1000.0, 0.3, 0.1));
        assert!(plain.contains("R0    : 3.000"));
        assert!(!plain.contains("delta"));
        let locked = format_params(&SirParams::with_lockdown(1000.0, 0.3, 0.1, 0.5));
        assert!(locked.contains("delta : 0.500000"));
    }

    #[test]
    fn forecast_tail_straddles_the_last_observed_day() {
        let sim = Simulator::new(InitialState::SEED, OdeOptions::default());
        let params = SirParams::plain(10_000.0, 0.5, 0.1);
        let traj = sim.simulate(&params, 10).unwrap();
        let start = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
        let observed = DerivedSeries::from_compartments(start, traj.infected, traj.removed).unwrap();
        let table = forecast(&sim, &candidate_with(params), None, &observed, 20).unwrap();

        let text = format_forecast_tail(&table, 3);
        let body: Vec<&str> = text.lines().skip(3).collect();
        assert_eq!(body.len(), 6);
        assert!(body[2].starts_with("2020-03-10"));
        assert!(body[3].starts_with("2020-03-11"));
        assert!(body[3].contains(" - "));
    }

    fn candidate_with(params: SirParams) -> DelayFit {
        DelayFit {
            params,
            ..candidate(0, 0.0)
        }
    }
}
