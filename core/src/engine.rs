use std::{
  path::Path,
  sync::Arc,
  time::{Duration, Instant},
};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{error, info};

use crate::{
  aggregate::DEFAULT_TOP_CITIES,
  chunks::DEFAULT_CHUNK_SIZE,
  export as export_impl,
  loads::{Dispatched, LoadManager, LoadManagerOptions},
  models::{
    CityCount, ExportFormat, ExportResult, LoadInfo, LoadOutcome, LoadStatus, MapPoint,
    MapViewport, MediaItem, MediaKindCounts, RawDataset, Selection, YearlyMediaCounts,
  },
  navigation::{self, PlaybackTick},
  store::DatasetStore,
  viewport,
  views::{DerivedViews, ViewCache},
};

const WAIT_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum CoreError {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
  #[error("read error: {0}")]
  Read(String),
  #[error("decode error: {0}")]
  Decode(String),
  #[error("encode error: {0}")]
  Encode(String),
  #[error("unknown load: {0}")]
  UnknownLoad(String),
  #[error("invalid argument: {0}")]
  InvalidArg(String),
  #[error("worker error: {0}")]
  Worker(String),
  #[error("timed out: {0}")]
  Timeout(String),
}

#[derive(Debug, Clone)]
pub struct CoreOptions {
  pub chunk_size: usize,
  pub top_cities_limit: usize,
  /// Bytes between worker progress events; 0 disables them.
  pub progress_interval_bytes: u64,
  /// Chunks allowed in flight between reader and worker.
  pub chunk_queue_depth: usize,
}

impl Default for CoreOptions {
  fn default() -> Self {
    Self {
      chunk_size: DEFAULT_CHUNK_SIZE,
      top_cities_limit: DEFAULT_TOP_CITIES,
      progress_interval_bytes: DEFAULT_CHUNK_SIZE as u64,
      chunk_queue_depth: 4,
    }
  }
}

/// Entry point for consumers: loads files, holds the dataset and selection, and
/// serves the derived views.
#[derive(Clone)]
pub struct CoreEngine {
  options: CoreOptions,
  store: Arc<Mutex<DatasetStore>>,
  views: Arc<Mutex<ViewCache>>,
  loads: LoadManager,
}

impl CoreEngine {
  pub fn new(options: CoreOptions) -> Self {
    let loads = LoadManager::new(LoadManagerOptions {
      chunk_size: options.chunk_size,
      progress_interval_bytes: options.progress_interval_bytes,
      chunk_queue_depth: options.chunk_queue_depth,
    });
    Self {
      options,
      store: Arc::new(Mutex::new(DatasetStore::new())),
      views: Arc::new(Mutex::new(ViewCache::new())),
      loads,
    }
  }

  pub fn options(&self) -> &CoreOptions {
    &self.options
  }

  /// Start loading a file in the background and return immediately.
  ///
  /// A load that is still running is terminated; only the newest load can
  /// replace the dataset.
  pub fn start_load(&self, path: impl AsRef<Path>) -> Result<LoadInfo, CoreError> {
    self.loads.start(path.as_ref().to_path_buf())
  }

  pub fn cancel_load(&self, load_id: &str) -> Result<(), CoreError> {
    self.loads.cancel(load_id)
  }

  pub fn load_status(&self, load_id: &str) -> Result<LoadStatus, CoreError> {
    self.loads.status(load_id)
  }

  /// Loads still held for status queries: at most the newest finished one plus
  /// the one in flight.
  pub fn tracked_loads(&self) -> usize {
    self.loads.tracked()
  }

  /// Apply every worker event received so far without blocking.
  pub fn poll(&self) -> Vec<LoadOutcome> {
    let mut outcomes = Vec::new();
    while let Some(ev) = self.loads.try_next_event() {
      if let Some(outcome) = self.loads.dispatch(ev).map(|d| self.apply(d)) {
        outcomes.push(outcome);
      }
    }
    outcomes
  }

  /// Block until `load_id` reaches a terminal state, applying other events on the way.
  pub fn wait_for_load(&self, load_id: &str, timeout: Duration) -> Result<LoadOutcome, CoreError> {
    let deadline = Instant::now() + timeout;
    loop {
      if let Some(outcome) = self.loads.outcome(load_id)? {
        return Ok(outcome);
      }
      let remaining = deadline.saturating_duration_since(Instant::now());
      if remaining.is_zero() {
        return Err(CoreError::Timeout(format!("load {load_id} still running")));
      }
      // Outcomes applied by a concurrent `poll` are only seen between slices.
      let Some(ev) = self.loads.next_event_timeout(remaining.min(WAIT_SLICE))? else {
        continue;
      };
      if let Some(outcome) = self.loads.dispatch(ev).map(|d| self.apply(d)) {
        if outcome.id() == load_id {
          return Ok(outcome);
        }
      }
    }
  }

  fn apply(&self, dispatched: Dispatched) -> LoadOutcome {
    let outcome = match dispatched {
      Dispatched::Completed { id, dataset } => {
        let items = dataset.items.len();
        let locations = dataset.locations.len();
        let version = self.store.lock().replace_dataset(dataset);
        info!(load_id = %id, version, items, locations, "dataset loaded");
        LoadOutcome::Loaded {
          id,
          version,
          items,
          locations,
        }
      }
      Dispatched::Failed { id, error } => {
        error!(load_id = %id, %error, "load failed, keeping previous dataset");
        LoadOutcome::Failed { id, error }
      }
    };
    self.loads.record_outcome(&outcome);
    outcome
  }

  pub fn dataset(&self) -> Option<Arc<RawDataset>> {
    self.store.lock().dataset()
  }

  pub fn dataset_version(&self) -> u64 {
    self.store.lock().version()
  }

  pub fn selection(&self) -> Selection {
    self.store.lock().selection()
  }

  pub fn set_year(&self, year: Option<i32>) {
    self.store.lock().set_year(year);
  }

  /// 0-based month.
  pub fn set_month(&self, month: Option<u32>) {
    self.store.lock().set_month(month);
  }

  pub fn set_global_mode(&self, global_mode: bool) {
    self.store.lock().set_global_mode(global_mode);
  }

  /// Selection-dependent views, computed once per view key.
  pub fn views(&self) -> Arc<DerivedViews> {
    let store = self.store.lock();
    self
      .views
      .lock()
      .get_or_compute(&store, self.options.top_cities_limit)
  }

  /// Number of view computations so far; stays put while the cache is hit.
  pub fn view_computations(&self) -> u64 {
    self.views.lock().computations()
  }

  pub fn filtered_items(&self) -> Vec<MediaItem> {
    self.views().filtered_items().cloned().collect()
  }

  pub fn top_cities(&self) -> Vec<CityCount> {
    self.views().top_cities.clone()
  }

  pub fn media_kind_counts(&self) -> MediaKindCounts {
    self.views().media_counts
  }

  pub fn map_points(&self) -> Vec<MapPoint> {
    self.views().map_points.clone()
  }

  /// Counts over the whole dataset, ignoring the selection.
  pub fn yearly_counts(&self) -> Vec<YearlyMediaCounts> {
    let store = self.store.lock();
    self.views.lock().dataset_views(&store).yearly.clone()
  }

  pub fn available_years(&self) -> Vec<i32> {
    let store = self.store.lock();
    self.views.lock().dataset_views(&store).years.clone()
  }

  pub fn map_viewport(&self) -> MapViewport {
    let global_mode = self.selection().global_mode;
    viewport::map_viewport(&self.views().map_points, global_mode)
  }

  pub fn next_year(&self) -> Option<i32> {
    let years = self.available_years();
    let mut store = self.store.lock();
    let year = navigation::next_year(&years, store.selection().year)?;
    store.set_year(Some(year));
    Some(year)
  }

  pub fn prev_year(&self) -> Option<i32> {
    let years = self.available_years();
    let mut store = self.store.lock();
    let year = navigation::prev_year(&years, store.selection().year)?;
    store.set_year(Some(year));
    Some(year)
  }

  pub fn next_month(&self) -> Option<u32> {
    let mut store = self.store.lock();
    let month = navigation::next_month(&store.selection())?;
    store.set_month(Some(month));
    Some(month)
  }

  pub fn prev_month(&self) -> Option<u32> {
    let mut store = self.store.lock();
    let month = navigation::prev_month(&store.selection())?;
    store.set_month(Some(month));
    Some(month)
  }

  /// One beat of the external playback timer.
  pub fn playback_tick(&self) -> PlaybackTick {
    let mut store = self.store.lock();
    let tick = navigation::playback_tick(&store.selection());
    match tick {
      PlaybackTick::Advance(m) => store.set_month(Some(m)),
      PlaybackTick::Finished => store.set_month(None),
      PlaybackTick::Idle => {}
    }
    tick
  }

  /// Write the current map points to `output_path`.
  pub fn export_map_points(
    &self,
    format: ExportFormat,
    output_path: impl AsRef<Path>,
  ) -> Result<ExportResult, CoreError> {
    let views = self.views();
    export_impl::export_map_points(&views.map_points, format, output_path.as_ref())
  }
}
