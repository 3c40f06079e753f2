use std::sync::Arc;

use tracing::debug;

use crate::{
  aggregate,
  models::{RawDataset, Selection},
};

/// The current dataset plus the active selection.
///
/// The dataset is swapped as a whole; it is never merged or patched.
#[derive(Debug, Default)]
pub struct DatasetStore {
  dataset: Option<Arc<RawDataset>>,
  version: u64,
  selection: Selection,
}

impl DatasetStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_empty(&self) -> bool {
    self.dataset.is_none()
  }

  pub fn dataset(&self) -> Option<Arc<RawDataset>> {
    self.dataset.clone()
  }

  /// Bumped on every replace; 0 while nothing has been loaded.
  pub fn version(&self) -> u64 {
    self.version
  }

  pub fn selection(&self) -> Selection {
    self.selection
  }

  /// Install a freshly decoded dataset and return its version.
  ///
  /// Also selects the most recent year present in the data. This runs once per
  /// load; later selection changes are left alone.
  pub fn replace_dataset(&mut self, dataset: RawDataset) -> u64 {
    let latest_year = aggregate::available_years(&dataset.items).last().copied();
    self.dataset = Some(Arc::new(dataset));
    self.version += 1;
    if let Some(year) = latest_year {
      self.selection.year = Some(year);
    }
    debug!(version = self.version, ?latest_year, "dataset replaced");
    self.version
  }

  pub fn set_year(&mut self, year: Option<i32>) {
    self.selection.year = year;
  }

  pub fn set_month(&mut self, month: Option<u32>) {
    self.selection.month = month;
  }

  pub fn set_global_mode(&mut self, global_mode: bool) {
    self.selection.global_mode = global_mode;
  }
}
