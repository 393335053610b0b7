//! Synthetic calibration scenarios run through the public API.

use chrono::NaiveDate;
use sir_forecast::app::pipeline::{FitSettings, run_fit_with_series};
use sir_forecast::domain::{
    DailyRecord, DelayList, DerivedSeries, InitialState, ModelVariant, ObservedSeries, SirParams,
};
use sir_forecast::fit::{LossEvaluator, search_delays};
use sir_forecast::forecast::forecast;
use sir_forecast::io::{read_fit_json, write_all, write_fit_json};
use sir_forecast::math::{NelderMead, OdeOptions};
use sir_forecast::models::Simulator;

const N: f64 = 100_000.0;
const BETA: f64 = 0.6;
const GAMMA: f64 = 0.1;

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 2, 24).unwrap()
}

fn relative_error(got: f64, want: f64) -> f64 {
    ((got - want) / want).abs()
}

#[test]
fn recovers_parameters_and_zero_delay_then_forecasts_ninety_days() {
    let sim = Simulator::new(InitialState::SEED, OdeOptions::default());
    let truth = SirParams::plain(N, BETA, GAMMA);
    let traj = sim.simulate(&truth, 30).unwrap();
    let observed = DerivedSeries::from_compartments(start(), traj.infected, traj.removed).unwrap();

    let evaluator = LossEvaluator::new(&sim, &observed, ModelVariant::Plain, None);
    let delays: DelayList = "0,1,2".parse().unwrap();
    let outcome = search_delays(
        &evaluator,
        &NelderMead::default(),
        &[95_000.0, 0.55, 0.11],
        &delays,
    )
    .unwrap();

    assert_eq!(outcome.candidates.len(), 3);
    assert_eq!(outcome.best.delay, 0);
    let p = outcome.best.params;
    assert!(relative_error(p.beta, BETA) < 0.01, "beta = {}", p.beta);
    assert!(relative_error(p.gamma, GAMMA) < 0.01, "gamma = {}", p.gamma);

    let table = forecast(&sim, &outcome.best, None, &observed, 60).unwrap();
    assert_eq!(table.len(), 90);
    for (row, (&i, &r)) in table.rows.iter().zip(observed.infected.iter().zip(&observed.removed)) {
        assert_eq!(row.observed_infected, Some(i));
        assert_eq!(row.observed_removed, Some(r));
    }
    assert!(table.rows[30..].iter().all(|row| {
        row.observed_susceptible.is_none()
            && row.observed_infected.is_none()
            && row.observed_removed.is_none()
            && row.cases.is_none()
    }));
}

#[test]
fn pipeline_exports_and_reloads_the_fit() {
    let sim = Simulator::new(InitialState::SEED, OdeOptions::default());
    let traj = sim.simulate(&SirParams::plain(N, BETA, GAMMA), 30).unwrap();
    let records: Vec<DailyRecord> = traj
        .infected
        .iter()
        .zip(&traj.removed)
        .enumerate()
        .map(|(k, (&i, &r))| DailyRecord {
            date: start() + chrono::Duration::days(k as i64),
            cases: i + r,
            dead: 0.0,
            recovered: r,
        })
        .collect();
    let observed = ObservedSeries::new(records, false).unwrap();

    let settings = FitSettings {
        delays: Some(DelayList::new(vec![0, 1, 2]).unwrap()),
        initial_guess: Some(vec![95_000.0, 0.55, 0.11]),
        ..FitSettings::default()
    };
    let run = run_fit_with_series("synthetic".to_string(), observed, &settings).unwrap();
    assert_eq!(run.search.best.delay, 0);
    assert_eq!(run.forecast.len(), 90);

    let dir = tempfile::tempdir().unwrap();
    let written = write_all(dir.path(), &run.observed, &run.forecast).unwrap();
    assert_eq!(written.len(), 4);
    assert!(written.iter().all(|p| p.exists()));

    let path = dir.path().join("fit.json");
    write_fit_json(&path, &run.fit_file()).unwrap();
    let back = read_fit_json(&path).unwrap();
    assert_eq!(back.delay, 0);
    assert_eq!(back.variant, ModelVariant::Plain);
    assert_eq!(back.candidates.len(), 3);
    assert_eq!(back.forecast.len(), 90);
    assert!(relative_error(back.params.beta, BETA) < 0.01);
}
