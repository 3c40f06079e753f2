use std::{path::PathBuf, time::Duration};

use mi_core::{CoreEngine, CoreOptions, LoadOutcome};

fn main() -> Result<(), String> {
  let path = std::env::args()
    .nth(1)
    .ok_or_else(|| "usage: cargo run -p mi_core --example smoke_load -- <path-to-msgpack>".to_string())?;
  let path = PathBuf::from(path);

  let eng = CoreEngine::new(CoreOptions::default());
  let load = eng.start_load(&path).map_err(|e| e.to_string())?;
  let outcome = eng
    .wait_for_load(&load.id, Duration::from_secs(300))
    .map_err(|e| e.to_string())?;
  if let LoadOutcome::Failed { error, .. } = outcome {
    return Err(error);
  }

  let sel = eng.selection();
  println!("bytes={}", load.total_bytes);
  println!("selected_year={:?}", sel.year);
  println!("years={:?}", eng.available_years());
  println!("filtered={}", eng.views().filtered.len());
  println!("media={:?}", eng.media_kind_counts());
  for c in eng.top_cities() {
    println!("city {} {}", c.city, c.count);
  }
  println!("points={}", eng.map_points().len());
  Ok(())
}
