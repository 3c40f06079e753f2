pub mod aggregate;
pub mod chunks;
mod codec;
mod engine;
mod export;
mod loads;
mod models;
pub mod navigation;
mod store;
pub mod viewport;
mod views;
pub mod worker;

pub use crate::codec::{decode_dataset, encode_dataset};
pub use crate::engine::{CoreEngine, CoreOptions};
pub use crate::models::{
  CityCount, ExportFormat, ExportResult, FileFormat, GeoBounds, LoadInfo, LoadOutcome, LoadStatus,
  Location, MapPoint, MapViewport, MediaItem, MediaKind, MediaKindCounts, RawDataset, Selection,
  YearlyMediaCounts,
};
pub use crate::navigation::PlaybackTick;
pub use crate::store::DatasetStore;
pub use crate::views::{DatasetViews, DerivedViews, ViewCache, ViewKey};

pub use crate::engine::CoreError;
