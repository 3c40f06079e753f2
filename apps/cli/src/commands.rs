use std::{
  path::Path,
  time::{Duration, Instant},
};

use mi_core::{
  navigation, CityCount, CoreEngine, CoreError, ExportFormat, ExportResult, LoadInfo, LoadOutcome,
  MapViewport, MediaKindCounts, Selection, YearlyMediaCounts,
};
use serde::{Deserialize, Serialize};
use tracing::info;

const PROGRESS_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadResponse {
  pub load: LoadInfo,
  pub outcome: LoadOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryResponse {
  pub selection: Selection,
  pub year_label: String,
  pub month_label: String,
  pub total_items: usize,
  pub filtered_items: usize,
  pub media: MediaKindCounts,
  pub map_points: usize,
  pub viewport: MapViewport,
  pub years: Vec<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitiesResponse {
  pub selection: Selection,
  pub cities: Vec<CityCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YearlyResponse {
  pub yearly: Vec<YearlyMediaCounts>,
}

/// Load `path` and block until it finishes, logging progress as it goes.
pub fn load(engine: &CoreEngine, path: &Path, timeout: Duration) -> Result<LoadResponse, String> {
  let load = engine.start_load(path).map_err(|e| e.to_string())?;
  let started = Instant::now();
  let mut last_pct: u8 = 255;

  let outcome = loop {
    match engine.wait_for_load(&load.id, PROGRESS_POLL) {
      Ok(outcome) => break outcome,
      Err(CoreError::Timeout(_)) => {
        if started.elapsed() >= timeout {
          let _ = engine.cancel_load(&load.id);
          return Err(format!("load did not finish within {timeout:?}"));
        }
        if let Ok(status) = engine.load_status(&load.id) {
          // throttle by pct step
          if status.progress_0_100 != last_pct {
            last_pct = status.progress_0_100;
            info!(
              processed = status.processed_bytes,
              total = status.total_bytes,
              "loading {}%",
              status.progress_0_100
            );
          }
        }
      }
      Err(e) => return Err(e.to_string()),
    }
  };

  match &outcome {
    LoadOutcome::Loaded { .. } => Ok(LoadResponse { load, outcome }),
    LoadOutcome::Failed { error, .. } => Err(format!("failed to load {}: {error}", path.display())),
  }
}

pub fn summary(engine: &CoreEngine) -> SummaryResponse {
  let views = engine.views();
  let selection = engine.selection();
  SummaryResponse {
    selection,
    year_label: navigation::year_label(selection.year),
    month_label: navigation::month_label(selection.month),
    total_items: views.dataset.items.len(),
    filtered_items: views.filtered.len(),
    media: views.media_counts,
    map_points: views.map_points.len(),
    viewport: engine.map_viewport(),
    years: engine.available_years(),
  }
}

pub fn cities(engine: &CoreEngine) -> CitiesResponse {
  CitiesResponse {
    selection: engine.selection(),
    cities: engine.top_cities(),
  }
}

pub fn yearly(engine: &CoreEngine) -> YearlyResponse {
  YearlyResponse {
    yearly: engine.yearly_counts(),
  }
}

pub fn export_points(
  engine: &CoreEngine,
  format: ExportFormat,
  output_path: &Path,
) -> Result<ExportResult, String> {
  engine
    .export_map_points(format, output_path)
    .map_err(|e| e.to_string())
}

pub fn print_summary(s: &SummaryResponse) {
  println!("Year: {}, {}", s.year_label, s.month_label);
  println!("Items: {} of {}", s.filtered_items, s.total_items);
  println!("Photos Indexed: {}", s.media.photos);
  println!("Videos Indexed: {}", s.media.videos);
  println!("Map points: {}", s.map_points);
  let years = s
    .years
    .iter()
    .map(|y| y.to_string())
    .collect::<Vec<_>>()
    .join(", ");
  println!("Years: {}", if years.is_empty() { "-".to_string() } else { years });
}

pub fn print_cities(c: &CitiesResponse) {
  if c.cities.is_empty() {
    println!("No city data available.");
    return;
  }
  for (i, city) in c.cities.iter().enumerate() {
    println!("{:>2}. {:<30} {}", i + 1, city.city, city.count);
  }
}

pub fn print_yearly(y: &YearlyResponse) {
  if y.yearly.is_empty() {
    println!("No valid date data available.");
    return;
  }
  println!("{:<6} {:>8} {:>8}", "year", "photos", "videos");
  for row in &y.yearly {
    println!("{:<6} {:>8} {:>8}", row.year, row.photos, row.videos);
  }
}
