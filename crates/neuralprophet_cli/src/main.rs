//! neuralprophet CLI for fitting, forecasting and evaluating models on CSV series.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use neuralprophet::prelude::*;

#[derive(Parser)]
#[command(name = "neuralprophet")]
#[command(author, version)]
#[command(about = "Interpretable neural forecasting of time series stored as CSV")]
#[command(long_about = "neuralprophet: decomposable neural forecasting of a `ds`/`y` series.

EXAMPLES:
  # Forecast 30 days ahead and print the chart
  neuralprophet forecast --input air.csv --periods 30 --output forecast.csv

  # Fit with auto-regression and save the model
  neuralprophet train --input air.csv --model-dir ./model --n-lags 14 --n-forecasts 7

  # Predict with a saved model
  neuralprophet predict --model-dir ./model --input air.csv --output forecast.csv

  # Holdout evaluation
  neuralprophet evaluate --input air.csv --valid-p 0.2")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Model flags; they override values from `--config`.
#[derive(Args, Debug, Clone, Default)]
struct ModelArgs {
    /// JSON file with a NeuralProphetConfig
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of lagged values for auto-regression
    #[arg(long, value_name = "N")]
    n_lags: Option<usize>,

    /// Forecast steps per sample
    #[arg(long, value_name = "N")]
    n_forecasts: Option<usize>,

    /// Number of training epochs
    #[arg(long, value_name = "N")]
    epochs: Option<usize>,

    /// Maximum learning rate (found by a range test when omitted)
    #[arg(long, value_name = "LR")]
    lr: Option<f64>,

    /// Batch size for training
    #[arg(long, value_name = "SIZE")]
    batch_size: Option<usize>,

    /// Seasonality mode: additive or multiplicative
    #[arg(long, value_name = "MODE")]
    seasonality_mode: Option<ComponentMode>,

    /// Random seed for reproducibility
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,

    /// Training progress: bar, print, plot, plot-all, none
    #[arg(long, default_value = "bar", value_name = "KIND")]
    progress: Progress,
}

impl ModelArgs {
    fn build_config(&self) -> Result<NeuralProphetConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                serde_json::from_str(&json).with_context(|| format!("Failed to parse config {}", path.display()))?
            }
            None => NeuralProphetConfig::default(),
        };
        if let Some(n) = self.n_lags {
            config.n_lags = n;
        }
        if let Some(n) = self.n_forecasts {
            config.n_forecasts = n;
        }
        if let Some(n) = self.epochs {
            config.epochs = Some(n);
        }
        if let Some(lr) = self.lr {
            config.learning_rate = Some(lr);
        }
        if let Some(n) = self.batch_size {
            config.batch_size = Some(n);
        }
        if let Some(mode) = self.seasonality_mode {
            config.seasonality_mode = mode;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        Ok(config)
    }

    fn build_model(&self) -> Result<NeuralProphet> {
        NeuralProphet::new(self.build_config()?).context("Invalid model configuration")
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Fit a model and forecast past the end of the series
    Forecast {
        /// Input CSV with `ds` and `y` columns
        #[arg(long, value_name = "FILE")]
        input: PathBuf,

        /// Number of future periods
        #[arg(long, default_value = "30", value_name = "N")]
        periods: usize,

        /// Output CSV for the forecast
        #[arg(long, value_name = "FILE")]
        output: PathBuf,

        /// Events CSV with `event` and `ds` columns
        #[arg(long, value_name = "FILE")]
        events: Option<PathBuf>,

        /// Also predict the history
        #[arg(long)]
        history: bool,

        /// Skip the terminal charts
        #[arg(long)]
        no_plot: bool,

        #[command(flatten)]
        model: ModelArgs,
    },
    /// Split a series into training and validation CSVs
    Split {
        /// Input CSV
        #[arg(long, value_name = "FILE")]
        input: PathBuf,

        /// Validation share (0..1) or sample count (>= 1)
        #[arg(long, default_value = "0.2", value_name = "P")]
        valid_p: f64,

        /// Output CSV for training rows
        #[arg(long, value_name = "FILE")]
        train_out: PathBuf,

        /// Output CSV for validation rows
        #[arg(long, value_name = "FILE")]
        valid_out: PathBuf,

        /// Number of lags, validation reuses that many training rows
        #[arg(long, default_value = "0", value_name = "N")]
        n_lags: usize,

        /// Forecast steps per sample
        #[arg(long, default_value = "1", value_name = "N")]
        n_forecasts: usize,
    },
    /// Fit a model and save it
    Train {
        /// Input CSV
        #[arg(long, value_name = "FILE")]
        input: PathBuf,

        /// Directory for the saved model and metrics
        #[arg(long, value_name = "DIR")]
        model_dir: PathBuf,

        /// Validation CSV evaluated after every epoch
        #[arg(long, value_name = "FILE")]
        validation: Option<PathBuf>,

        #[command(flatten)]
        model: ModelArgs,
    },
    /// Predict with a saved model
    Predict {
        /// Directory of a model saved by `train`
        #[arg(long, value_name = "DIR")]
        model_dir: PathBuf,

        /// Input CSV
        #[arg(long, value_name = "FILE")]
        input: PathBuf,

        /// Output CSV for the forecast
        #[arg(long, value_name = "FILE")]
        output: PathBuf,

        /// Extend the series by this many periods first
        #[arg(long, value_name = "N")]
        periods: Option<usize>,

        /// One row per forecast origin with `step<i>` columns
        #[arg(long)]
        raw: bool,
    },
    /// Fit on the start of a series and report metrics on the rest
    Evaluate {
        /// Input CSV
        #[arg(long, value_name = "FILE")]
        input: PathBuf,

        /// Validation share (0..1) or sample count (>= 1)
        #[arg(long, default_value = "0.2", value_name = "P")]
        valid_p: f64,

        #[command(flatten)]
        model: ModelArgs,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::filter::LevelFilter::from_level(log_level))
        .init();

    match cli.command {
        Commands::Forecast {
            input,
            periods,
            output,
            events,
            history,
            no_plot,
            model,
        } => handle_forecast(&input, periods, &output, events.as_deref(), history, no_plot, &model),
        Commands::Split {
            input,
            valid_p,
            train_out,
            valid_out,
            n_lags,
            n_forecasts,
        } => handle_split(&input, valid_p, &train_out, &valid_out, n_lags, n_forecasts),
        Commands::Train {
            input,
            model_dir,
            validation,
            model,
        } => handle_train(&input, &model_dir, validation.as_deref(), &model),
        Commands::Predict {
            model_dir,
            input,
            output,
            periods,
            raw,
        } => handle_predict(&model_dir, &input, &output, periods, raw),
        Commands::Evaluate { input, valid_p, model } => handle_evaluate(&input, valid_p, &model),
    }
}

fn load_series(path: &Path) -> Result<TimeSeriesFrame> {
    let frame = read_csv(path).with_context(|| format!("Failed to load series from {}", path.display()))?;
    println!("Loaded {} rows from {}", frame.len(), path.display());
    Ok(frame)
}

fn save_series(frame: &TimeSeriesFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    write_csv(frame, path).with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote {} rows to {}", frame.len(), path.display());
    Ok(())
}

fn print_metrics(metrics: &MetricsFrame) {
    if let Some(last) = metrics.last() {
        println!("Final metrics:");
        for (name, value) in last {
            println!("  {name}: {value:.4}");
        }
    }
}

fn handle_forecast(
    input: &Path,
    periods: usize,
    output: &Path,
    events: Option<&Path>,
    history: bool,
    no_plot: bool,
    args: &ModelArgs,
) -> Result<()> {
    println!("=== neuralprophet Forecast ===\n");
    let mut df = load_series(input)?;
    let mut m = args.build_model()?;

    let events = match events {
        Some(path) => {
            let events = read_events_csv(path).with_context(|| format!("Failed to load events {}", path.display()))?;
            let names: Vec<&str> = events.names().into_iter().collect();
            println!("Events: {}", names.join(", "));
            m.add_events(&names, 0, 0, None, ComponentMode::Additive)?;
            df = m.create_df_with_events(df.into(), &events)?.into_single()?;
            Some(events)
        }
        None => None,
    };

    let metrics = m.fit(df.clone().into(), None, None, args.progress, false)?;
    if let Some(metrics) = &metrics {
        print_metrics(metrics);
    }

    let n_historic = if history {
        HistoricPredictions::All
    } else {
        HistoricPredictions::None
    };
    let future = m.make_future_dataframe(df.into(), events.as_ref(), None, Some(periods), n_historic)?;
    let forecast = m.predict(future, true, false)?.into_single()?;
    save_series(&forecast, output)?;

    if !no_plot {
        println!("\n{}", m.plot(&forecast)?);
        println!("{}", m.plot_components(&forecast)?);
    }
    Ok(())
}

fn handle_split(
    input: &Path,
    valid_p: f64,
    train_out: &Path,
    valid_out: &Path,
    n_lags: usize,
    n_forecasts: usize,
) -> Result<()> {
    let df = load_series(input)?;
    let config = NeuralProphetConfig::default()
        .with_n_lags(n_lags)
        .with_n_forecasts(n_forecasts);
    let m = NeuralProphet::new(config)?;
    let (train, valid) = m.split_df(df.into(), None, valid_p, false)?;
    save_series(&train.into_single()?, train_out)?;
    save_series(&valid.into_single()?, valid_out)?;
    Ok(())
}

fn handle_train(input: &Path, model_dir: &Path, validation: Option<&Path>, args: &ModelArgs) -> Result<()> {
    println!("=== neuralprophet Training ===\n");
    let df = load_series(input)?;
    let validation = validation.map(load_series).transpose()?;
    let mut m = args.build_model()?;

    let metrics = m.fit(df.into(), None, validation.map(Frames::from), args.progress, false)?;
    std::fs::create_dir_all(model_dir)?;
    m.save(model_dir)
        .with_context(|| format!("Failed to save model to {}", model_dir.display()))?;
    println!("Model saved to {}", model_dir.display());

    if let Some(metrics) = metrics {
        print_metrics(&metrics);
        let path = model_dir.join("metrics.csv");
        std::fs::write(&path, metrics.to_csv_string())?;
        println!("Metrics written to {}", path.display());
    }
    Ok(())
}

fn handle_predict(model_dir: &Path, input: &Path, output: &Path, periods: Option<usize>, raw: bool) -> Result<()> {
    let m = NeuralProphet::load(model_dir)
        .with_context(|| format!("Failed to load model from {}", model_dir.display()))?;
    if !m.is_fitted() {
        bail!("Model in {} was saved before fitting", model_dir.display());
    }
    let df = load_series(input)?;
    let df: Frames = match periods {
        Some(periods) => m.make_future_dataframe(df.into(), None, None, Some(periods), HistoricPredictions::All)?,
        None => df.into(),
    };
    let forecast = m.predict(df, true, raw)?.into_single()?;
    save_series(&forecast, output)
}

fn handle_evaluate(input: &Path, valid_p: f64, args: &ModelArgs) -> Result<()> {
    println!("=== neuralprophet Evaluation ===\n");
    let df = load_series(input)?;
    let mut m = args.build_model()?;
    let (train, valid) = m.split_df(df.into(), None, valid_p, false)?;
    println!(
        "Train rows: {}, validation rows: {}",
        train.as_single().map_or(0, TimeSeriesFrame::len),
        valid.as_single().map_or(0, TimeSeriesFrame::len)
    );

    let train_metrics = m.fit(train, None, None, args.progress, false)?;
    if let Some(metrics) = &train_metrics {
        print_metrics(metrics);
    }

    let test_metrics = m.test(valid)?;
    println!("\nValidation metrics:");
    print!("{test_metrics}");
    Ok(())
}
