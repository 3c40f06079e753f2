use std::{
  fs::File,
  io::{self, ErrorKind, Read},
  path::Path,
};

/// 1 MiB, the slice size the exporter's consumers read with.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Sequential fixed-size reader over a byte source of known length.
///
/// Each call reads one buffer and hands ownership to the caller, so at most one
/// chunk is held on the reading side at a time. A zero-length read before
/// `total_len` is reached ends the stream instead of failing it.
pub struct ChunkReader<R> {
  inner: R,
  total_len: u64,
  chunk_size: usize,
  offset: u64,
  finished: bool,
}

impl ChunkReader<File> {
  pub fn open(path: impl AsRef<Path>, chunk_size: usize) -> io::Result<Self> {
    let file = File::open(path)?;
    let total_len = file.metadata()?.len();
    Ok(Self::new(file, total_len, chunk_size))
  }
}

impl<R: Read> ChunkReader<R> {
  pub fn new(inner: R, total_len: u64, chunk_size: usize) -> Self {
    Self {
      inner,
      total_len,
      chunk_size: chunk_size.max(1),
      offset: 0,
      finished: false,
    }
  }

  pub fn total_len(&self) -> u64 {
    self.total_len
  }

  pub fn bytes_read(&self) -> u64 {
    self.offset
  }

  pub fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
    if self.finished || self.offset >= self.total_len {
      self.finished = true;
      return Ok(None);
    }

    let remaining = self.total_len - self.offset;
    let want = usize::try_from(remaining).map_or(self.chunk_size, |r| r.min(self.chunk_size));
    let mut buf = vec![0u8; want];
    let mut filled = 0usize;
    while filled < want {
      match self.inner.read(&mut buf[filled..]) {
        Ok(0) => break,
        Ok(n) => filled += n,
        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
        Err(e) => return Err(e),
      }
    }

    if filled == 0 {
      // Source ended early; whatever was delivered so far is the whole input.
      self.finished = true;
      return Ok(None);
    }
    if filled < want {
      buf.truncate(filled);
      self.finished = true;
    }
    self.offset += filled as u64;
    Ok(Some(buf))
  }
}

impl<R: Read> Iterator for ChunkReader<R> {
  type Item = io::Result<Vec<u8>>;

  fn next(&mut self) -> Option<Self::Item> {
    match self.next_chunk() {
      Ok(Some(chunk)) => Some(Ok(chunk)),
      Ok(None) => None,
      Err(e) => {
        self.finished = true;
        Some(Err(e))
      }
    }
  }
}

/// Split an in-memory buffer the same way `ChunkReader` would.
pub fn split_chunks(bytes: &[u8], chunk_size: usize) -> Vec<Vec<u8>> {
  bytes.chunks(chunk_size.max(1)).map(<[u8]>::to_vec).collect()
}

pub fn concat_chunks<C: AsRef<[u8]>>(chunks: &[C]) -> Vec<u8> {
  let total = chunks.iter().map(|c| c.as_ref().len()).sum();
  let mut out = Vec::with_capacity(total);
  for c in chunks {
    out.extend_from_slice(c.as_ref());
  }
  out
}
