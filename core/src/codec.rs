use std::path::Path;

use serde::Deserialize;

use crate::{
  engine::CoreError,
  models::{FileFormat, RawDataset},
};

pub(crate) fn detect_format(path: &Path) -> FileFormat {
  let ext = path
    .extension()
    .and_then(|s| s.to_str())
    .unwrap_or("")
    .to_ascii_lowercase();
  match ext.as_str() {
    "msgpack" | "mpk" => FileFormat::MsgPack,
    _ => FileFormat::Unknown,
  }
}

/// Deserialize a whole MessagePack buffer into a dataset.
///
/// There is no header or magic check: a buffer that does not decode into
/// `{ locations, items }` is the only way a bad file is detected. Bytes left
/// over after that one value are a decode error too.
pub fn decode_dataset(bytes: &[u8]) -> Result<RawDataset, CoreError> {
  let mut de = rmp_serde::Deserializer::new(bytes);
  let dataset = RawDataset::deserialize(&mut de).map_err(|e| CoreError::Decode(e.to_string()))?;
  let trailing = de.get_ref().len();
  if trailing > 0 {
    return Err(CoreError::Decode(format!(
      "{trailing} trailing byte(s) after the dataset"
    )));
  }
  Ok(dataset)
}

/// Encode with named map keys, the layout exporters write.
pub fn encode_dataset(dataset: &RawDataset) -> Result<Vec<u8>, CoreError> {
  rmp_serde::to_vec_named(dataset).map_err(|e| CoreError::Encode(e.to_string()))
}
