use std::sync::Arc;

use crate::{
  aggregate,
  models::{CityCount, MapPoint, MediaItem, MediaKindCounts, RawDataset, YearlyMediaCounts},
  store::DatasetStore,
};

/// Everything the selection-dependent views are recomputed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewKey {
  pub dataset_version: u64,
  pub year: Option<i32>,
  pub month: Option<u32>,
  pub top_cities_limit: usize,
}

/// Selection-dependent views for one `ViewKey`.
#[derive(Debug)]
pub struct DerivedViews {
  pub key: ViewKey,
  pub dataset: Arc<RawDataset>,
  /// Positions into `dataset.items`.
  pub filtered: Vec<usize>,
  pub top_cities: Vec<CityCount>,
  pub media_counts: MediaKindCounts,
  pub map_points: Vec<MapPoint>,
}

impl DerivedViews {
  fn compute(key: ViewKey, dataset: Arc<RawDataset>) -> Self {
    let filtered = aggregate::filter_indices(&dataset.items, key.year, key.month);
    let (indices, all) = (&filtered, &dataset.items);
    let items = move || indices.iter().map(move |&i| &all[i]);
    let top_cities = aggregate::top_cities(items(), &dataset.locations, key.top_cities_limit);
    let media_counts = aggregate::media_kind_counts(items());
    let map_points = aggregate::map_points(items(), &dataset.locations);
    Self {
      key,
      dataset,
      filtered,
      top_cities,
      media_counts,
      map_points,
    }
  }

  pub fn filtered_items(&self) -> impl Iterator<Item = &MediaItem> + '_ {
    self.filtered.iter().map(move |&i| &self.dataset.items[i])
  }
}

/// Views that only depend on the dataset, not on the selection.
#[derive(Debug)]
pub struct DatasetViews {
  pub dataset_version: u64,
  pub yearly: Vec<YearlyMediaCounts>,
  pub years: Vec<i32>,
}

/// Memoizes derived views on `(dataset_version, year, month, top_cities_limit)`.
#[derive(Debug, Default)]
pub struct ViewCache {
  selection_views: Option<Arc<DerivedViews>>,
  dataset_views: Option<Arc<DatasetViews>>,
  computations: u64,
}

impl ViewCache {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of times a view set has actually been computed.
  pub fn computations(&self) -> u64 {
    self.computations
  }

  pub fn get_or_compute(&mut self, store: &DatasetStore, top_cities_limit: usize) -> Arc<DerivedViews> {
    let selection = store.selection();
    let key = ViewKey {
      dataset_version: store.version(),
      year: selection.year,
      month: selection.month,
      top_cities_limit,
    };
    if let Some(cached) = &self.selection_views {
      if cached.key == key {
        return cached.clone();
      }
    }
    let dataset = store.dataset().unwrap_or_default();
    let views = Arc::new(DerivedViews::compute(key, dataset));
    self.computations += 1;
    self.selection_views = Some(views.clone());
    views
  }

  pub fn dataset_views(&mut self, store: &DatasetStore) -> Arc<DatasetViews> {
    let version = store.version();
    if let Some(cached) = &self.dataset_views {
      if cached.dataset_version == version {
        return cached.clone();
      }
    }
    let dataset = store.dataset().unwrap_or_default();
    let views = Arc::new(DatasetViews {
      dataset_version: version,
      yearly: aggregate::yearly_media_kind_counts(&dataset.items),
      years: aggregate::available_years(&dataset.items),
    });
    self.computations += 1;
    self.dataset_views = Some(views.clone());
    views
  }
}
