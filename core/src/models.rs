use std::fmt;

use serde::{
  de::{self, Visitor},
  Deserialize, Deserializer, Serialize,
};

/// One row of the location table. Items point at it by position.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Location {
  #[serde(default)]
  pub city: Option<String>,
  #[serde(default)]
  pub state: Option<String>,
  #[serde(default)]
  pub country: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MediaItem {
  #[serde(default, deserialize_with = "nullable_string")]
  pub filename: String,
  #[serde(default, deserialize_with = "nullable_string")]
  pub mediatype: String,
  /// ISO-like timestamp; may be empty or unparseable.
  #[serde(default, deserialize_with = "nullable_string")]
  pub datetime_utc: String,
  #[serde(default)]
  pub latitude: Option<f64>,
  #[serde(default)]
  pub longitude: Option<f64>,
  #[serde(default, deserialize_with = "lenient_index")]
  pub location_id: Option<i64>,
}

/// The `locations`/`items` pair produced by one successful decode.
///
/// `location_id` values are only meaningful against the `locations` of the same
/// dataset, so the two tables are always replaced together.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawDataset {
  #[serde(default)]
  pub locations: Vec<Location>,
  #[serde(default)]
  pub items: Vec<MediaItem>,
}

impl RawDataset {
  /// Absent, negative or out-of-range ids resolve to `None`.
  pub fn resolve_location(&self, location_id: Option<i64>) -> Option<&Location> {
    resolve_location(&self.locations, location_id)
  }
}

pub(crate) fn resolve_location(locations: &[Location], location_id: Option<i64>) -> Option<&Location> {
  let idx = usize::try_from(location_id?).ok()?;
  locations.get(idx)
}

/// User-controlled parameters of every derived view. `month` is 0-based.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Selection {
  pub year: Option<i32>,
  pub month: Option<u32>,
  pub global_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CityCount {
  pub city: String,
  pub count: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
  Photo,
  Video,
  Other,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaKindCounts {
  pub photos: u64,
  pub videos: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct YearlyMediaCounts {
  pub year: i32,
  pub photos: u64,
  pub videos: u64,
}

/// An item with coordinates, flattened with its resolved location for display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MapPoint {
  pub filename: String,
  pub mediatype: String,
  pub datetime_utc: String,
  pub latitude: f64,
  pub longitude: f64,
  pub location_id: Option<i64>,
  pub city: String,
  pub state: String,
  pub country: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoBounds {
  pub min_lat: f64,
  pub min_lon: f64,
  pub max_lat: f64,
  pub max_lon: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum MapViewport {
  /// Whole-world view.
  Global { center: (f64, f64), zoom: u8 },
  /// Fit the map to the given bounds without zooming in past `max_zoom`.
  FitBounds { bounds: GeoBounds, max_zoom: u8 },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
  MsgPack,
  Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadInfo {
  pub id: String,
  pub path: String,
  pub format: FileFormat,
  pub total_bytes: u64,
  pub started_at_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadStatus {
  pub id: String,
  pub processed_bytes: u64,
  pub total_bytes: u64,
  pub progress_0_100: u8,
  pub finished: bool,
  pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum LoadOutcome {
  Loaded {
    id: String,
    version: u64,
    items: usize,
    locations: usize,
  },
  Failed {
    id: String,
    error: String,
  },
}

impl LoadOutcome {
  pub fn id(&self) -> &str {
    match self {
      LoadOutcome::Loaded { id, .. } | LoadOutcome::Failed { id, .. } => id,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
  Json,
  Jsonl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResult {
  pub output_path: String,
  pub records_written: u64,
}

fn nullable_string<'de, D>(d: D) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

/// Accepts integers, integral floats and nil. Anything else that is numeric but not an
/// index (NaN, fractions) becomes `None` instead of failing the whole decode.
fn lenient_index<'de, D>(d: D) -> Result<Option<i64>, D::Error>
where
  D: Deserializer<'de>,
{
  struct IndexVisitor;

  impl<'de> Visitor<'de> for IndexVisitor {
    type Value = Option<i64>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
      f.write_str("an integer location index or nil")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
      Ok(Some(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
      Ok(i64::try_from(v).ok())
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
      if v.is_finite() && v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64 {
        Ok(Some(v as i64))
      } else {
        Ok(None)
      }
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
      Ok(None)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
      Ok(None)
    }

    fn visit_some<D2: Deserializer<'de>>(self, d: D2) -> Result<Self::Value, D2::Error> {
      d.deserialize_any(IndexVisitor)
    }
  }

  d.deserialize_any(IndexVisitor)
}
