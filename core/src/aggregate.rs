//! Pure filter and aggregation functions over a dataset and a selection.
//!
//! Nothing here fails: unparseable timestamps and unresolvable locations only
//! exclude the affected item from the buckets that need them.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::models::{
  resolve_location, CityCount, Location, MapPoint, MediaItem, MediaKind, MediaKindCounts,
  RawDataset, YearlyMediaCounts,
};

pub const DEFAULT_TOP_CITIES: usize = 10;

const PHOTO_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".heic"];
const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".mov", ".m4v"];

const NAIVE_FORMATS: &[&str] = &[
  "%Y-%m-%dT%H:%M:%S%.f",
  "%Y-%m-%d %H:%M:%S%.f",
  "%Y-%m-%dT%H:%M",
  "%Y-%m-%d %H:%M",
];

/// Parse an ISO-like timestamp the way a browser `Date` would read it.
///
/// Accepts `YYYY`, `YYYY-MM`, `YYYY-MM-DD` and date-times with minute, second or
/// fractional precision followed by `Z`, `±HH:MM`, `±HHMM`, `±HH` or nothing.
/// Values without an offset are taken as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
  let t = s.trim();
  if t.is_empty() {
    return None;
  }
  if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
    return Some(dt.with_timezone(&Utc));
  }
  if let Some(date) = parse_date_only(t) {
    return date.and_hms_opt(0, 0, 0).map(|ndt| ndt.and_utc());
  }

  let (local, offset) = split_offset(t)?;
  let ndt = NAIVE_FORMATS
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(local, fmt).ok())?;
  offset
    .from_local_datetime(&ndt)
    .single()
    .map(|dt| dt.with_timezone(&Utc))
}

fn parse_date_only(t: &str) -> Option<NaiveDate> {
  match t.len() {
    4 if t.bytes().all(|b| b.is_ascii_digit()) => NaiveDate::from_ymd_opt(t.parse().ok()?, 1, 1),
    7 => NaiveDate::parse_from_str(&format!("{t}-01"), "%Y-%m-%d").ok(),
    10 => NaiveDate::parse_from_str(t, "%Y-%m-%d").ok(),
    _ => None,
  }
}

/// Split a date-time into its local part and UTC offset.
fn split_offset(t: &str) -> Option<(&str, FixedOffset)> {
  let utc = FixedOffset::east_opt(0)?;
  if let Some(local) = t.strip_suffix(['Z', 'z']) {
    return Some((local, utc));
  }
  let time_start = t.find(['T', ' '])?;
  match t[time_start..].rfind(['+', '-']) {
    None => Some((t, utc)),
    Some(i) => {
      let at = time_start + i;
      let offset = FixedOffset::east_opt(offset_seconds(&t[at..])?)?;
      Some((&t[..at], offset))
    }
  }
}

fn offset_seconds(s: &str) -> Option<i32> {
  let sign = match s.chars().next()? {
    '+' => 1,
    '-' => -1,
    _ => return None,
  };
  let digits: String = s[1..].chars().filter(|c| *c != ':').collect();
  if !matches!(digits.len(), 2 | 4) || !digits.bytes().all(|b| b.is_ascii_digit()) {
    return None;
  }
  let hours: i32 = digits[..2].parse().ok()?;
  let minutes: i32 = if digits.len() == 4 { digits[2..].parse().ok()? } else { 0 };
  if hours > 23 || minutes > 59 {
    return None;
  }
  Some(sign * (hours * 3600 + minutes * 60))
}

/// `(year, month)` with a 0-based month, or `None` if the timestamp does not parse.
pub fn item_year_month(item: &MediaItem) -> Option<(i32, u32)> {
  parse_timestamp(&item.datetime_utc).map(|dt| (dt.year(), dt.month0()))
}

fn in_period(item: &MediaItem, year: Option<i32>, month: Option<u32>) -> bool {
  if year.is_none() && month.is_none() {
    return true;
  }
  let Some((y, m)) = item_year_month(item) else {
    return false;
  };
  year.map_or(true, |want| want == y) && month.map_or(true, |want| want == m)
}

/// Positions of the items matching the year/month filter, in dataset order.
///
/// Year and month compose independently, so a month without a year matches that
/// month in every year.
pub fn filter_indices(items: &[MediaItem], year: Option<i32>, month: Option<u32>) -> Vec<usize> {
  items
    .iter()
    .enumerate()
    .filter(|(_, item)| in_period(item, year, month))
    .map(|(i, _)| i)
    .collect()
}

pub fn filter_items(dataset: &RawDataset, year: Option<i32>, month: Option<u32>) -> Vec<&MediaItem> {
  filter_iter(&dataset.items, year, month)
}

pub fn filter_iter<'a, I>(items: I, year: Option<i32>, month: Option<u32>) -> Vec<&'a MediaItem>
where
  I: IntoIterator<Item = &'a MediaItem>,
{
  items
    .into_iter()
    .filter(|item| in_period(item, year, month))
    .collect()
}

/// Count items per resolved, non-empty city. Ties keep first-seen order.
pub fn top_cities<'a, I>(items: I, locations: &[Location], limit: usize) -> Vec<CityCount>
where
  I: IntoIterator<Item = &'a MediaItem>,
{
  let mut order: HashMap<&str, usize> = HashMap::new();
  let mut counts: Vec<CityCount> = Vec::new();
  for item in items {
    let Some(city) = resolve_location(locations, item.location_id)
      .and_then(|loc| loc.city.as_deref())
      .filter(|c| !c.is_empty())
    else {
      continue;
    };
    match order.get(city) {
      Some(&idx) => counts[idx].count += 1,
      None => {
        order.insert(city, counts.len());
        counts.push(CityCount {
          city: city.to_string(),
          count: 1,
        });
      }
    }
  }
  // `sort_by` is stable, which is what keeps the tie order.
  counts.sort_by(|a, b| b.count.cmp(&a.count));
  counts.truncate(limit);
  counts
}

pub fn classify(item: &MediaItem) -> MediaKind {
  let mt = item.mediatype.to_lowercase();
  if mt.contains("image") || mt.contains("photo") {
    return MediaKind::Photo;
  }
  if mt.contains("video") {
    return MediaKind::Video;
  }

  let name = item.filename.to_lowercase();
  if PHOTO_EXTENSIONS.iter().any(|ext| name.ends_with(ext)) {
    MediaKind::Photo
  } else if VIDEO_EXTENSIONS.iter().any(|ext| name.ends_with(ext)) {
    MediaKind::Video
  } else {
    MediaKind::Other
  }
}

pub fn media_kind_counts<'a, I>(items: I) -> MediaKindCounts
where
  I: IntoIterator<Item = &'a MediaItem>,
{
  let mut counts = MediaKindCounts::default();
  for item in items {
    match classify(item) {
      MediaKind::Photo => counts.photos += 1,
      MediaKind::Video => counts.videos += 1,
      MediaKind::Other => {}
    }
  }
  counts
}

/// Photo/video counts per year over every item passed in, ascending by year.
///
/// Callers pass the whole dataset, not the filtered subset.
pub fn yearly_media_kind_counts<'a, I>(items: I) -> Vec<YearlyMediaCounts>
where
  I: IntoIterator<Item = &'a MediaItem>,
{
  let mut by_year: BTreeMap<i32, MediaKindCounts> = BTreeMap::new();
  for item in items {
    let Some((year, _)) = item_year_month(item) else {
      continue;
    };
    let entry = by_year.entry(year).or_default();
    match classify(item) {
      MediaKind::Photo => entry.photos += 1,
      MediaKind::Video => entry.videos += 1,
      MediaKind::Other => {}
    }
  }
  by_year
    .into_iter()
    .map(|(year, c)| YearlyMediaCounts {
      year,
      photos: c.photos,
      videos: c.videos,
    })
    .collect()
}

fn has_coordinate(v: Option<f64>) -> Option<f64> {
  v.filter(|x| !x.is_nan() && *x != 0.0)
}

/// Items with usable coordinates, flattened with their resolved location.
///
/// Zero and NaN coordinates count as missing; infinities are kept.
pub fn map_points<'a, I>(items: I, locations: &[Location]) -> Vec<MapPoint>
where
  I: IntoIterator<Item = &'a MediaItem>,
{
  items
    .into_iter()
    .filter_map(|item| {
      let latitude = has_coordinate(item.latitude)?;
      let longitude = has_coordinate(item.longitude)?;
      let (city, state, country) = match resolve_location(locations, item.location_id) {
        Some(loc) => (
          loc.city.clone().unwrap_or_default(),
          loc.state.clone().unwrap_or_default(),
          loc.country.clone().unwrap_or_default(),
        ),
        None => Default::default(),
      };
      Some(MapPoint {
        filename: item.filename.clone(),
        mediatype: item.mediatype.clone(),
        datetime_utc: item.datetime_utc.clone(),
        latitude,
        longitude,
        location_id: item.location_id,
        city,
        state,
        country,
      })
    })
    .collect()
}

/// Distinct years with at least one parseable timestamp, ascending.
pub fn available_years<'a, I>(items: I) -> Vec<i32>
where
  I: IntoIterator<Item = &'a MediaItem>,
{
  items
    .into_iter()
    .filter_map(|item| item_year_month(item).map(|(y, _)| y))
    .collect::<BTreeSet<_>>()
    .into_iter()
    .collect()
}
