use crate::models::{GeoBounds, MapPoint, MapViewport};

pub const GLOBAL_CENTER: (f64, f64) = (20.0, 0.0);
pub const GLOBAL_ZOOM: u8 = 2;
pub const FIT_MAX_ZOOM: u8 = 5;

pub fn bounds(points: &[MapPoint]) -> Option<GeoBounds> {
  let first = points.first()?;
  let init = GeoBounds {
    min_lat: first.latitude,
    min_lon: first.longitude,
    max_lat: first.latitude,
    max_lon: first.longitude,
  };
  Some(points.iter().skip(1).fold(init, |b, p| GeoBounds {
    min_lat: b.min_lat.min(p.latitude),
    min_lon: b.min_lon.min(p.longitude),
    max_lat: b.max_lat.max(p.latitude),
    max_lon: b.max_lon.max(p.longitude),
  }))
}

/// Pinned global view, or fit to the points when there are any.
pub fn map_viewport(points: &[MapPoint], global_mode: bool) -> MapViewport {
  let global = MapViewport::Global {
    center: GLOBAL_CENTER,
    zoom: GLOBAL_ZOOM,
  };
  if global_mode {
    return global;
  }
  match bounds(points) {
    Some(bounds) => MapViewport::FitBounds {
      bounds,
      max_zoom: FIT_MAX_ZOOM,
    },
    None => global,
  }
}
