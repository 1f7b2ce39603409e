//! Integration tests for the forecasting pipeline.
//!
//! These tests fit small models end to end on synthetic series.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use neuralprophet::prelude::*;

fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2022, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
}

/// Linear trend with a weekly cycle and a little noise.
fn create_synthetic_series(n: usize, seed: u64) -> TimeSeriesFrame {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let ds = (0..n).map(|i| start() + Duration::days(i as i64)).collect();
    let y = (0..n)
        .map(|i| {
            let weekly = (2.0 * std::f64::consts::PI * i as f64 / 7.0).sin();
            10.0 + 0.05 * i as f64 + weekly + rng.gen::<f64>() * 0.1
        })
        .collect();
    TimeSeriesFrame::from_series(ds, y).unwrap()
}

fn quick_config() -> NeuralProphetConfig {
    NeuralProphetConfig::default()
        .with_epochs(10)
        .with_learning_rate(0.1)
        .with_batch_size(32)
        .with_seed(42)
}

fn single(frames: Frames) -> TimeSeriesFrame {
    frames.into_single().unwrap()
}

#[test]
fn test_fit_and_predict_future() {
    let df = create_synthetic_series(120, 0);
    let mut m = NeuralProphet::new(quick_config()).unwrap();
    let metrics = m
        .fit(df.clone().into(), None, None, Progress::None, false)
        .unwrap()
        .expect("metrics are collected by default");

    assert!(m.is_fitted());
    assert_eq!(m.data_freq(), Some(Frequency::DAILY));
    assert_eq!(metrics.len(), 10);
    assert_eq!(metrics.columns()[0], "SmoothL1Loss");
    assert!(metrics.columns().iter().any(|c| c == "MAE"));
    assert!(metrics.columns().iter().any(|c| c == "RegLoss"));
    for v in metrics.column("SmoothL1Loss").unwrap() {
        assert!(v.is_finite(), "loss is not finite: {v}");
    }

    let future = m
        .make_future_dataframe(df.into(), None, None, Some(14), HistoricPredictions::All)
        .unwrap();
    let forecast = single(m.predict(future, true, false).unwrap());
    assert_eq!(forecast.len(), 134);
    for column in ["y", "yhat1", "residual1", "trend", "season_weekly"] {
        assert!(forecast.has_column(column), "missing column {column}");
    }
    assert!(forecast.column("yhat1").unwrap().iter().all(|v| v.is_finite()));
    // no observations in the future
    assert!(forecast.column("residual1").unwrap()[120..].iter().all(|v| v.is_nan()));

    let chart = m.plot(&forecast).unwrap();
    assert!(chart.contains("Forecast"));
    let components = m.plot_components(&forecast).unwrap();
    assert!(components.contains("trend"));
    assert!(components.contains("season_weekly"));
}

#[test]
fn test_learning_rate_range_test_sets_rate() {
    let df = create_synthetic_series(90, 1);
    let config = NeuralProphetConfig::default().with_epochs(3).with_seed(7);
    let mut m = NeuralProphet::new(config).unwrap();
    assert!(m.learning_rate().is_none());
    m.fit(df.into(), None, None, Progress::None, true).unwrap();
    let lr = m.learning_rate().unwrap();
    assert!(lr > 0.0 && lr <= 10.0, "lr {lr} outside the sweep");
}

fn seeded_forecast(config: NeuralProphetConfig, df: &TimeSeriesFrame) -> (Option<f64>, Vec<u64>) {
    let mut m = NeuralProphet::new(config).unwrap();
    m.fit(df.clone().into(), None, None, Progress::None, true).unwrap();
    let forecast = single(m.predict(df.clone().into(), false, false).unwrap());
    let yhat = forecast.column("yhat1").unwrap().iter().map(|v| v.to_bits()).collect();
    (m.learning_rate(), yhat)
}

#[test]
fn test_same_seed_reproduces_forecast() {
    let df = create_synthetic_series(80, 12);
    let base = NeuralProphetConfig::default()
        .with_n_lags(3)
        .with_n_forecasts(2)
        .with_epochs(4)
        .with_seed(11);

    // Learning rate picked by the range test.
    let (lr_a, yhat_a) = seeded_forecast(base.clone(), &df);
    let (lr_b, yhat_b) = seeded_forecast(base.clone(), &df);
    assert!(lr_a.is_some());
    assert_eq!(lr_a, lr_b);
    assert_eq!(yhat_a, yhat_b);

    let fixed = base.with_learning_rate(0.05);
    let (_, yhat_a) = seeded_forecast(fixed.clone(), &df);
    let (_, yhat_b) = seeded_forecast(fixed, &df);
    assert_eq!(yhat_a, yhat_b);
}

#[test]
fn test_minimal_fit_returns_no_metrics() {
    let df = create_synthetic_series(60, 2);
    let mut m = NeuralProphet::new(quick_config()).unwrap();
    let valid = df.tail(10);
    let metrics = m
        .fit(df.into(), None, Some(valid.into()), Progress::None, true)
        .unwrap();
    assert!(metrics.is_none());
}

#[test]
fn test_autoregression_forecast_steps() {
    let df = create_synthetic_series(100, 3);
    let config = quick_config().with_n_lags(7).with_n_forecasts(3);
    let mut m = NeuralProphet::new(config).unwrap();
    m.fit(df.clone().into(), None, None, Progress::None, false).unwrap();

    // Predicting on the history extends it internally and trims again.
    let forecast = single(m.predict(df.clone().into(), false, false).unwrap());
    assert_eq!(forecast.len(), 100);
    let yhat1 = forecast.column("yhat1").unwrap();
    assert!(yhat1[..7].iter().all(|v| v.is_nan()));
    assert!(yhat1[7..].iter().all(|v| v.is_finite()));
    let yhat3 = forecast.column("yhat3").unwrap();
    assert!(yhat3[..9].iter().all(|v| v.is_nan()));
    assert!(yhat3[9].is_finite());

    let future = single(
        m.make_future_dataframe(df.clone().into(), None, None, None, HistoricPredictions::None)
            .unwrap(),
    );
    assert_eq!(future.len(), 10);
    let forecast = single(m.predict(future.into(), true, false).unwrap());
    assert_eq!(forecast.len(), 10);
    assert!(forecast.column("yhat1").unwrap()[7].is_finite());
    assert!(forecast.column("yhat2").unwrap()[8].is_finite());
    assert!(forecast.column("yhat3").unwrap()[9].is_finite());
    assert!(forecast.has_column("ar1"));
    assert!(forecast.has_column("ar3"));

    let raw = single(m.predict(df.into(), true, true).unwrap());
    assert!(raw.has_column("step0"));
    assert!(raw.has_column("step2"));
    assert!(!raw.has_column("step3"));

    let last = m.plot_last_forecast(&forecast, 0, None).unwrap();
    assert!(last.contains("latest"));
    let params = m.plot_parameters().unwrap();
    assert!(params.contains("AR weights"));
}

#[test]
fn test_lagged_regressor_and_true_ar_evaluation() {
    let mut df = create_synthetic_series(80, 4);
    let temp: Vec<f64> = (0..80).map(|i| (i as f64 * 0.2).cos()).collect();
    df.set_column("temp", temp).unwrap();

    let config = quick_config().with_n_lags(3);
    let mut m = NeuralProphet::new(config).unwrap();
    m.add_lagged_regressor(&["temp"], None, NormalizeMode::Auto, false)
        .unwrap();
    m.fit(df.clone().into(), None, None, Progress::None, false).unwrap();

    m.set_true_ar_for_eval(vec![0.5, 0.2, 0.1]);
    let metrics = m.test(df.clone().into()).unwrap();
    assert_eq!(metrics.len(), 1);
    let stpe = metrics.get(0, "sTPE").unwrap();
    assert!(stpe.is_finite() && stpe >= 0.0);

    let forecast = single(m.predict(df.into(), true, false).unwrap());
    assert!(forecast.has_column("lagged_regressor_temp1"));
}

#[test]
fn test_events_and_future_regressors() {
    let df = create_synthetic_series(100, 5);
    let promo_dates: Vec<NaiveDateTime> = (0..100).step_by(10).map(|i| start() + Duration::days(i)).collect();
    let events = EventsFrame::new().with_event("promo", &promo_dates);

    let mut m = NeuralProphet::new(quick_config()).unwrap();
    m.add_events(&["promo"], 0, 1, None, ComponentMode::Additive).unwrap();
    m.add_future_regressor("price", None, NormalizeMode::Auto, ComponentMode::Additive)
        .unwrap();

    let history = single(m.create_df_with_events(df.into(), &events).unwrap());
    assert_eq!(history.column("promo").unwrap().iter().sum::<f64>(), 10.0);
    let price: Vec<f64> = (0..100).map(|i| 5.0 + (i % 3) as f64).collect();
    let history = history.with_column("price", price).unwrap();

    m.fit(history.clone().into(), None, None, Progress::None, false)
        .unwrap();

    let future_price = TimeSeriesFrame::new(Vec::new())
        .with_column("price", vec![6.0; 7])
        .unwrap();
    assert!(m
        .make_future_dataframe(history.clone().into(), Some(&events), None, Some(7), HistoricPredictions::None)
        .is_err());
    let future = m
        .make_future_dataframe(
            history.into(),
            Some(&events),
            Some(&future_price.into()),
            Some(7),
            HistoricPredictions::None,
        )
        .unwrap();
    let forecast = single(m.predict(future, true, false).unwrap());
    assert_eq!(forecast.len(), 7);
    assert!(forecast.has_column("events_additive"));
    assert!(forecast.has_column("event_promo"));
    assert!(forecast.has_column("future_regressor_price"));
    assert!(forecast.column("yhat1").unwrap().iter().all(|v| v.is_finite()));
}

#[test]
fn test_global_model_on_named_series() {
    let mut frames = BTreeMap::new();
    frames.insert("a".to_string(), create_synthetic_series(70, 6));
    frames.insert("b".to_string(), create_synthetic_series(50, 7));
    let df = Frames::from(frames);

    let mut m = NeuralProphet::new(quick_config()).unwrap();
    m.fit(df.clone(), None, None, Progress::None, false).unwrap();

    let future = m
        .make_future_dataframe(df, None, None, Some(5), HistoricPredictions::None)
        .unwrap();
    let forecast = m.predict(future, false, false).unwrap();
    assert_eq!(forecast.len(), 2);
    assert_eq!(forecast.get("a").unwrap().len(), 5);
    assert_eq!(forecast.get("b").unwrap().len(), 5);
}

#[test]
fn test_split_and_crossvalidation() {
    let df = create_synthetic_series(100, 8);
    let m = NeuralProphet::new(NeuralProphetConfig::default().with_n_lags(5).with_n_forecasts(2)).unwrap();

    let (train, valid) = m.split_df(df.clone().into(), None, 0.2, false).unwrap();
    let (train, valid) = (single(train), single(valid));
    // validation inputs reuse the last n_lags training rows
    assert_eq!(train.len() + valid.len(), 100 + 5);
    assert!(valid.len() > 5);

    let folds = m.crossvalidation_split_df(df.clone(), None, 3, 0.1, 0.0).unwrap();
    assert_eq!(folds.len(), 3);
    for pair in folds.windows(2) {
        assert!(pair[0].0.len() < pair[1].0.len());
    }

    let (valid_folds, test_folds) = m.double_crossvalidation_split_df(df, None, 2, 0.1, 0.1).unwrap();
    assert_eq!(valid_folds.len(), 2);
    assert_eq!(test_folds.len(), 2);
}

#[test]
fn test_trend_and_seasonal_components() {
    let df = create_synthetic_series(100, 9);
    let mut m = NeuralProphet::new(quick_config()).unwrap();
    m.fit(df.clone().into(), None, None, Progress::None, false).unwrap();

    let trend = single(m.predict_trend(df.clone().into()).unwrap());
    assert_eq!(trend.len(), 100);
    assert!(trend.column("trend").unwrap().iter().all(|v| v.is_finite()));

    let seasonal = single(m.predict_seasonal_components(df.into()).unwrap());
    assert_eq!(seasonal.len(), 100);
    let weekly = seasonal.column("weekly").unwrap();
    assert!(weekly.iter().all(|v| v.is_finite()));
}

#[test]
fn test_save_and_load_preserve_predictions() {
    let df = create_synthetic_series(60, 10);
    let mut m = NeuralProphet::new(quick_config().with_n_lags(2)).unwrap();
    m.fit(df.clone().into(), None, None, Progress::None, false).unwrap();
    let before = single(m.predict(df.clone().into(), false, false).unwrap());

    let dir = tempfile::tempdir().unwrap();
    m.save(dir.path()).unwrap();
    let loaded = NeuralProphet::load(dir.path()).unwrap();
    assert!(loaded.is_fitted());
    assert_eq!(loaded.n_lags(), 2);
    let after = single(loaded.predict(df.into(), false, false).unwrap());

    let (a, b) = (before.column("yhat1").unwrap(), after.column("yhat1").unwrap());
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b) {
        assert!((x.is_nan() && y.is_nan()) || (x - y).abs() < 1e-4, "{x} != {y}");
    }
}

#[test]
fn test_predict_rejects_normalized_input() {
    let df = create_synthetic_series(40, 11);
    let mut m = NeuralProphet::new(quick_config()).unwrap();
    m.fit(df.clone().into(), None, None, Progress::None, false).unwrap();
    let normalized = df.with_column("t", vec![0.0; 40]).unwrap();
    assert!(m.predict(normalized.into(), false, false).is_err());
}
