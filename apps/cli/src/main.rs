mod commands;

use std::{path::PathBuf, process::ExitCode, time::Duration};

use clap::{Parser, Subcommand, ValueEnum};
use mi_core::{CoreEngine, CoreOptions, ExportFormat};
use serde::Serialize;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "media-indexer", about = "Inspect a geotagged media export (.msgpack)")]
struct Cli {
  /// Path to the .msgpack export
  file: PathBuf,

  /// Only include items from this year (defaults to the most recent year in the file)
  #[arg(long)]
  year: Option<i32>,

  /// Include every year instead of the most recent one
  #[arg(long, conflicts_with = "year")]
  all_years: bool,

  /// Only include items from this month (1-12)
  #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
  month: Option<u32>,

  /// Pin the map viewport to the global view
  #[arg(long)]
  global: bool,

  /// Read chunk size in bytes
  #[arg(long, default_value_t = mi_core::chunks::DEFAULT_CHUNK_SIZE)]
  chunk_size: usize,

  /// Number of cities in the ranking
  #[arg(long, default_value_t = 10)]
  top: usize,

  /// Give up if the file has not loaded after this many seconds
  #[arg(long, default_value_t = 600)]
  timeout_secs: u64,

  /// Print JSON instead of text
  #[arg(long)]
  json: bool,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Item, media and map counts for the selection (default)
  Summary,
  /// Top cities for the selection
  Cities,
  /// Photo/video counts per year over the whole file
  Yearly,
  /// Write the selection's map points to a file
  Points {
    #[arg(long)]
    out: PathBuf,
    #[arg(long, value_enum, default_value_t = PointsFormat::Jsonl)]
    format: PointsFormat,
  },
}

#[derive(Clone, Copy, ValueEnum)]
enum PointsFormat {
  Json,
  Jsonl,
}

impl From<PointsFormat> for ExportFormat {
  fn from(f: PointsFormat) -> Self {
    match f {
      PointsFormat::Json => ExportFormat::Json,
      PointsFormat::Jsonl => ExportFormat::Jsonl,
    }
  }
}

fn main() -> ExitCode {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  match run(cli) {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      error!("{e}");
      ExitCode::FAILURE
    }
  }
}

fn run(cli: Cli) -> Result<(), String> {
  let engine = CoreEngine::new(CoreOptions {
    chunk_size: cli.chunk_size,
    top_cities_limit: cli.top,
    ..CoreOptions::default()
  });

  commands::load(&engine, &cli.file, Duration::from_secs(cli.timeout_secs))?;

  if cli.all_years {
    engine.set_year(None);
  } else if let Some(year) = cli.year {
    engine.set_year(Some(year));
  }
  if let Some(month) = cli.month {
    engine.set_month(Some(month - 1));
  }
  engine.set_global_mode(cli.global);

  match cli.command.unwrap_or(Command::Summary) {
    Command::Summary => {
      let s = commands::summary(&engine);
      emit(cli.json, &s, commands::print_summary)
    }
    Command::Cities => {
      let c = commands::cities(&engine);
      emit(cli.json, &c, commands::print_cities)
    }
    Command::Yearly => {
      let y = commands::yearly(&engine);
      emit(cli.json, &y, commands::print_yearly)
    }
    Command::Points { out, format } => {
      let r = commands::export_points(&engine, format.into(), &out)?;
      emit(cli.json, &r, |r| {
        println!("Wrote {} points to {}", r.records_written, r.output_path)
      })
    }
  }
}

fn emit<T: Serialize>(json: bool, value: &T, print_text: impl Fn(&T)) -> Result<(), String> {
  if json {
    let s = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{s}");
  } else {
    print_text(value);
  }
  Ok(())
}
