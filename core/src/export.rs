use std::{
  fs::File,
  io::{BufWriter, Write},
  path::Path,
};

use serde::Serialize;

use crate::{
  engine::CoreError,
  models::{ExportFormat, ExportResult, MapPoint},
};

pub(crate) fn export_map_points(
  points: &[MapPoint],
  format: ExportFormat,
  output_path: &Path,
) -> Result<ExportResult, CoreError> {
  if let Some(parent) = output_path.parent() {
    std::fs::create_dir_all(parent)?;
  }
  let out_file = File::create(output_path)?;
  let mut writer = BufWriter::new(out_file);

  let written = match format {
    ExportFormat::Jsonl => write_jsonl(points, &mut writer)?,
    ExportFormat::Json => write_json_array(points, &mut writer)?,
  };

  writer.flush()?;
  Ok(ExportResult {
    output_path: output_path.to_string_lossy().to_string(),
    records_written: written,
  })
}

fn write_jsonl<T: Serialize>(records: &[T], writer: &mut BufWriter<File>) -> Result<u64, CoreError> {
  for r in records {
    serde_json::to_writer(&mut *writer, r).map_err(|e| CoreError::Encode(e.to_string()))?;
    writer.write_all(b"\n")?;
  }
  Ok(records.len() as u64)
}

fn write_json_array<T: Serialize>(
  records: &[T],
  writer: &mut BufWriter<File>,
) -> Result<u64, CoreError> {
  writer.write_all(b"[")?;
  for (i, r) in records.iter().enumerate() {
    if i == 0 {
      writer.write_all(b"\n")?;
    } else {
      writer.write_all(b",\n")?;
    }
    serde_json::to_writer(&mut *writer, r).map_err(|e| CoreError::Encode(e.to_string()))?;
  }
  if records.is_empty() {
    writer.write_all(b"]")?;
  } else {
    writer.write_all(b"\n]")?;
  }
  Ok(records.len() as u64)
}
