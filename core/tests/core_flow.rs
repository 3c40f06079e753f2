use std::{path::Path, sync::Arc, thread, time::Duration};

use mi_core::{
  encode_dataset, CoreEngine, CoreError, CoreOptions, ExportFormat, LoadOutcome, Location,
  MapViewport, MediaItem, PlaybackTick, RawDataset,
};

const WAIT: Duration = Duration::from_secs(10);

fn engine_with_chunk_size(chunk_size: usize) -> CoreEngine {
  CoreEngine::new(CoreOptions {
    chunk_size,
    top_cities_limit: 10,
    progress_interval_bytes: 16,
    chunk_queue_depth: 2,
  })
}

fn item(filename: &str, datetime_utc: &str, location_id: Option<i64>) -> MediaItem {
  MediaItem {
    filename: filename.into(),
    mediatype: String::new(),
    datetime_utc: datetime_utc.into(),
    latitude: Some(48.85),
    longitude: Some(2.35),
    location_id,
  }
}

fn city(name: &str) -> Location {
  Location {
    city: Some(name.into()),
    state: None,
    country: Some("FR".into()),
  }
}

fn sample_dataset() -> RawDataset {
  RawDataset {
    locations: vec![city("Paris"), city("Lyon")],
    items: vec![
      item("a.jpg", "2019-06-01T10:00:00Z", Some(0)),
      item("b.mov", "2021-02-03T08:30:00Z", Some(1)),
      item("c.heic", "2020-12-31T23:59:59Z", Some(0)),
      item("d.png", "2021-07-14T12:00:00Z", Some(0)),
    ],
  }
}

fn write_dataset(path: &Path, ds: &RawDataset) {
  std::fs::write(path, encode_dataset(ds).unwrap()).unwrap();
}

fn load(eng: &CoreEngine, path: &Path) -> LoadOutcome {
  let info = eng.start_load(path).unwrap();
  eng.wait_for_load(&info.id, WAIT).unwrap()
}

#[test]
fn load_decodes_file_and_selects_latest_year() {
  let dir = tempfile::tempdir().unwrap();
  let file = dir.path().join("media.msgpack");
  write_dataset(&file, &sample_dataset());

  let eng = engine_with_chunk_size(1024 * 1024);
  assert!(eng.dataset().is_none());
  assert_eq!(eng.selection().year, None);

  match load(&eng, &file) {
    LoadOutcome::Loaded {
      version,
      items,
      locations,
      ..
    } => {
      assert_eq!(version, 1);
      assert_eq!(items, 4);
      assert_eq!(locations, 2);
    }
    other => panic!("unexpected outcome: {other:?}"),
  }

  assert_eq!(*eng.dataset().unwrap(), sample_dataset());
  assert_eq!(eng.selection().year, Some(2021));
  assert_eq!(eng.selection().month, None);
  assert_eq!(eng.available_years(), vec![2019, 2020, 2021]);

  let names: Vec<String> = eng.filtered_items().into_iter().map(|i| i.filename).collect();
  assert_eq!(names, vec!["b.mov", "d.png"]);
}

#[test]
fn tiny_chunks_decode_to_the_same_dataset() {
  let dir = tempfile::tempdir().unwrap();
  let file = dir.path().join("media.msgpack");
  let mut ds = sample_dataset();
  for i in 0..200 {
    ds.items.push(item(&format!("img_{i:04}.jpg"), "2018-01-01T00:00:00Z", Some(i % 2)));
  }
  write_dataset(&file, &ds);

  let one_chunk = engine_with_chunk_size(1024 * 1024);
  let many_chunks = engine_with_chunk_size(7);
  load(&one_chunk, &file);
  load(&many_chunks, &file);

  assert_eq!(*one_chunk.dataset().unwrap(), ds);
  assert_eq!(*many_chunks.dataset().unwrap(), ds);
}

#[test]
fn load_status_reports_completion() {
  let dir = tempfile::tempdir().unwrap();
  let file = dir.path().join("media.msgpack");
  write_dataset(&file, &sample_dataset());

  let eng = engine_with_chunk_size(8);
  let info = eng.start_load(&file).unwrap();
  assert!(info.total_bytes > 0);
  eng.wait_for_load(&info.id, WAIT).unwrap();

  let status = eng.load_status(&info.id).unwrap();
  assert!(status.finished);
  assert_eq!(status.progress_0_100, 100);
  assert_eq!(status.processed_bytes, info.total_bytes);
  assert!(status.error.is_none());
}

#[test]
fn malformed_payload_keeps_previous_dataset() {
  let dir = tempfile::tempdir().unwrap();
  let good = dir.path().join("good.msgpack");
  let bad = dir.path().join("bad.msgpack");
  write_dataset(&good, &sample_dataset());
  std::fs::write(&bad, b"this is not a msgpack export").unwrap();

  let eng = engine_with_chunk_size(4);
  load(&eng, &good);
  eng.set_year(Some(2019));
  let before = eng.dataset().unwrap();

  let info = eng.start_load(&bad).unwrap();
  match eng.wait_for_load(&info.id, WAIT).unwrap() {
    LoadOutcome::Failed { error, .. } => assert!(error.starts_with("decode error"), "{error}"),
    other => panic!("unexpected outcome: {other:?}"),
  }

  let after = eng.dataset().unwrap();
  assert!(Arc::ptr_eq(&before, &after));
  assert_eq!(eng.dataset_version(), 1);
  assert_eq!(eng.selection().year, Some(2019));
  let status = eng.load_status(&info.id).unwrap();
  assert!(status.finished);
  assert!(status.error.unwrap().starts_with("decode error"));
}

#[test]
fn truncated_payload_fails() {
  let dir = tempfile::tempdir().unwrap();
  let file = dir.path().join("cut.msgpack");
  let bytes = encode_dataset(&sample_dataset()).unwrap();
  std::fs::write(&file, &bytes[..bytes.len() / 2]).unwrap();

  let eng = engine_with_chunk_size(16);
  assert!(matches!(load(&eng, &file), LoadOutcome::Failed { .. }));
  assert!(eng.dataset().is_none());
}

#[test]
fn empty_file_fails_without_touching_store() {
  let dir = tempfile::tempdir().unwrap();
  let file = dir.path().join("empty.msgpack");
  std::fs::write(&file, b"").unwrap();

  let eng = engine_with_chunk_size(16);
  assert!(matches!(load(&eng, &file), LoadOutcome::Failed { .. }));
  assert_eq!(eng.dataset_version(), 0);
}

#[test]
fn missing_file_is_an_io_error() {
  let dir = tempfile::tempdir().unwrap();
  let eng = engine_with_chunk_size(16);
  let err = eng.start_load(dir.path().join("nope.msgpack")).unwrap_err();
  assert!(matches!(err, CoreError::Io(_)));
}

#[test]
fn unknown_extension_is_still_decoded() {
  let dir = tempfile::tempdir().unwrap();
  let file = dir.path().join("export.bin");
  write_dataset(&file, &sample_dataset());

  let eng = engine_with_chunk_size(1024);
  assert!(matches!(load(&eng, &file), LoadOutcome::Loaded { .. }));
}

#[test]
fn no_parseable_dates_leaves_year_unselected() {
  let dir = tempfile::tempdir().unwrap();
  let file = dir.path().join("media.msgpack");
  let ds = RawDataset {
    locations: vec![],
    items: vec![item("a.jpg", "not a date", None), item("b.jpg", "", None)],
  };
  write_dataset(&file, &ds);

  let eng = engine_with_chunk_size(1024);
  load(&eng, &file);
  assert_eq!(eng.selection().year, None);
  // No date restriction: undated items are still listed.
  assert_eq!(eng.filtered_items().len(), 2);
}

#[test]
fn default_year_is_applied_once_per_load() {
  let dir = tempfile::tempdir().unwrap();
  let file = dir.path().join("media.msgpack");
  write_dataset(&file, &sample_dataset());

  let eng = engine_with_chunk_size(1024);
  load(&eng, &file);
  eng.set_year(Some(2019));
  thread::sleep(Duration::from_millis(20));
  assert!(eng.poll().is_empty());
  assert_eq!(eng.selection().year, Some(2019));

  load(&eng, &file);
  assert_eq!(eng.selection().year, Some(2021));
  assert_eq!(eng.dataset_version(), 2);
}

#[test]
fn new_load_supersedes_pending_one() {
  let dir = tempfile::tempdir().unwrap();
  let first = dir.path().join("first.msgpack");
  let second = dir.path().join("second.msgpack");
  let mut big = sample_dataset();
  for i in 0..5_000 {
    big.items.push(item(&format!("old_{i}.jpg"), "2010-01-01T00:00:00Z", None));
  }
  write_dataset(&first, &big);
  write_dataset(&second, &sample_dataset());

  let eng = engine_with_chunk_size(64);
  let a = eng.start_load(&first).unwrap();
  let b = eng.start_load(&second).unwrap();
  assert_ne!(a.id, b.id);

  assert!(matches!(eng.load_status(&a.id), Err(CoreError::UnknownLoad(_))));
  assert!(matches!(eng.wait_for_load(&b.id, WAIT).unwrap(), LoadOutcome::Loaded { .. }));

  thread::sleep(Duration::from_millis(50));
  assert!(eng.poll().is_empty());
  assert_eq!(*eng.dataset().unwrap(), sample_dataset());
  assert_eq!(eng.dataset_version(), 1);
}

#[test]
fn cancelled_load_reports_nothing() {
  let dir = tempfile::tempdir().unwrap();
  let file = dir.path().join("media.msgpack");
  write_dataset(&file, &sample_dataset());

  let eng = engine_with_chunk_size(8);
  let info = eng.start_load(&file).unwrap();
  eng.cancel_load(&info.id).unwrap();

  thread::sleep(Duration::from_millis(50));
  assert!(eng.poll().is_empty());
  assert!(eng.dataset().is_none());
  assert!(matches!(eng.load_status(&info.id), Err(CoreError::UnknownLoad(_))));
  assert!(matches!(eng.cancel_load(&info.id), Err(CoreError::UnknownLoad(_))));
}

#[test]
fn views_are_memoized_per_selection_key() {
  let dir = tempfile::tempdir().unwrap();
  let file = dir.path().join("media.msgpack");
  write_dataset(&file, &sample_dataset());

  let eng = engine_with_chunk_size(1024);
  load(&eng, &file);

  let v1 = eng.views();
  let computed = eng.view_computations();
  let v2 = eng.views();
  assert!(Arc::ptr_eq(&v1, &v2));
  assert_eq!(eng.view_computations(), computed);

  // Global mode only moves the viewport; the views stay cached.
  eng.set_global_mode(true);
  assert!(Arc::ptr_eq(&v1, &eng.views()));
  assert_eq!(eng.view_computations(), computed);

  eng.set_month(Some(6));
  let v3 = eng.views();
  assert!(!Arc::ptr_eq(&v1, &v3));
  assert_eq!(v3.key.month, Some(6));
  assert_eq!(eng.view_computations(), computed + 1);
  let names: Vec<&str> = v3.filtered_items().map(|i| i.filename.as_str()).collect();
  assert_eq!(names, vec!["d.png"]);
}

#[test]
fn selection_drives_aggregates() {
  let dir = tempfile::tempdir().unwrap();
  let file = dir.path().join("media.msgpack");
  write_dataset(&file, &sample_dataset());

  let eng = engine_with_chunk_size(1024);
  load(&eng, &file);

  // 2021: b.mov (Lyon), d.png (Paris)
  let counts = eng.media_kind_counts();
  assert_eq!((counts.photos, counts.videos), (1, 1));
  let cities: Vec<(String, u64)> = eng.top_cities().into_iter().map(|c| (c.city, c.count)).collect();
  assert_eq!(cities, vec![("Lyon".to_string(), 1), ("Paris".to_string(), 1)]);

  eng.set_year(None);
  let cities: Vec<(String, u64)> = eng.top_cities().into_iter().map(|c| (c.city, c.count)).collect();
  assert_eq!(cities, vec![("Paris".to_string(), 3), ("Lyon".to_string(), 1)]);
  assert_eq!(eng.map_points().len(), 4);

  // Yearly counts ignore the selection.
  eng.set_year(Some(2019));
  let yearly: Vec<(i32, u64, u64)> = eng
    .yearly_counts()
    .into_iter()
    .map(|y| (y.year, y.photos, y.videos))
    .collect();
  assert_eq!(yearly, vec![(2019, 1, 0), (2020, 1, 0), (2021, 1, 1)]);
}

#[test]
fn viewport_follows_global_mode() {
  let dir = tempfile::tempdir().unwrap();
  let file = dir.path().join("media.msgpack");
  write_dataset(&file, &sample_dataset());

  let eng = engine_with_chunk_size(1024);
  assert!(matches!(eng.map_viewport(), MapViewport::Global { zoom: 2, .. }));

  load(&eng, &file);
  match eng.map_viewport() {
    MapViewport::FitBounds { bounds, max_zoom } => {
      assert_eq!(max_zoom, 5);
      assert_eq!(bounds.min_lat, 48.85);
      assert_eq!(bounds.max_lon, 2.35);
    }
    other => panic!("unexpected viewport: {other:?}"),
  }

  eng.set_global_mode(true);
  assert!(matches!(eng.map_viewport(), MapViewport::Global { .. }));
}

#[test]
fn navigation_steps_years_and_months() {
  let dir = tempfile::tempdir().unwrap();
  let file = dir.path().join("media.msgpack");
  write_dataset(&file, &sample_dataset());

  let eng = engine_with_chunk_size(1024);
  // Nothing loaded: no year selected, months do not move.
  assert_eq!(eng.next_month(), None);
  assert_eq!(eng.playback_tick(), PlaybackTick::Idle);

  load(&eng, &file);
  assert_eq!(eng.next_year(), None);
  assert_eq!(eng.prev_year(), Some(2020));
  assert_eq!(eng.prev_year(), Some(2019));
  assert_eq!(eng.prev_year(), None);
  assert_eq!(eng.next_year(), Some(2020));

  assert_eq!(eng.prev_month(), Some(11));
  assert_eq!(eng.next_month(), None);
  eng.set_month(None);
  assert_eq!(eng.next_month(), Some(0));
  assert_eq!(eng.prev_month(), None);

  eng.set_month(Some(10));
  assert_eq!(eng.playback_tick(), PlaybackTick::Advance(11));
  assert_eq!(eng.selection().month, Some(11));
  assert_eq!(eng.playback_tick(), PlaybackTick::Finished);
  assert_eq!(eng.selection().month, None);
}

#[test]
fn export_map_points_jsonl_and_json() {
  let dir = tempfile::tempdir().unwrap();
  let file = dir.path().join("media.msgpack");
  write_dataset(&file, &sample_dataset());

  let eng = engine_with_chunk_size(1024);
  load(&eng, &file);

  let out1 = dir.path().join("out/points.jsonl");
  let ex1 = eng.export_map_points(ExportFormat::Jsonl, &out1).unwrap();
  assert_eq!(ex1.records_written, 2);
  let s1 = std::fs::read_to_string(&out1).unwrap();
  assert_eq!(s1.lines().count(), 2);
  assert!(s1.contains(r#""city":"Lyon""#));

  eng.set_year(Some(1999));
  let out2 = dir.path().join("empty.json");
  let ex2 = eng.export_map_points(ExportFormat::Json, &out2).unwrap();
  assert_eq!(ex2.records_written, 0);
  assert_eq!(std::fs::read_to_string(out2).unwrap(), "[]");
}

#[test]
fn finished_loads_do_not_pile_up() {
  let dir = tempfile::tempdir().unwrap();
  let file = dir.path().join("media.msgpack");
  write_dataset(&file, &sample_dataset());

  let eng = engine_with_chunk_size(1024);
  let mut ids = Vec::new();
  for _ in 0..5 {
    let info = eng.start_load(&file).unwrap();
    assert!(matches!(eng.wait_for_load(&info.id, WAIT).unwrap(), LoadOutcome::Loaded { .. }));
    assert!(eng.tracked_loads() <= 2);
    ids.push(info.id);
  }
  assert_eq!(eng.tracked_loads(), 2);
  assert_eq!(eng.dataset_version(), 5);

  // The newest finished load stays queryable; older ones are forgotten.
  assert!(eng.load_status(&ids[4]).unwrap().finished);
  assert!(matches!(eng.wait_for_load(&ids[4], WAIT).unwrap(), LoadOutcome::Loaded { version: 5, .. }));
  assert!(eng.load_status(&ids[3]).is_ok());
  assert!(matches!(eng.load_status(&ids[2]), Err(CoreError::UnknownLoad(_))));
  assert!(matches!(eng.load_status(&ids[0]), Err(CoreError::UnknownLoad(_))));
}
