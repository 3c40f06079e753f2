use std::{sync::Arc, thread};

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{codec, engine::CoreError, models::RawDataset};

/// Caller → worker messages: any number of chunks in file order, then one `Done`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum WorkerRequest {
  Chunk { chunk: Vec<u8> },
  Done,
}

/// Worker → caller messages: zero or more `Progress`, then exactly one of `Done`/`Error`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum WorkerEvent {
  Progress {
    processed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    total: Option<u64>,
  },
  /// Always a single dataset, wrapped so the shape stays stable.
  Done { data: Vec<RawDataset> },
  Error { error: String },
}

impl WorkerEvent {
  pub fn is_terminal(&self) -> bool {
    !matches!(self, WorkerEvent::Progress { .. })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  Accumulating,
  Decoding,
  Completed,
  Failed,
}

/// The decode state machine, independent of any thread or channel.
#[derive(Debug)]
pub struct DecodeWorker {
  state: WorkerState,
  chunks: Vec<Vec<u8>>,
  total_bytes: u64,
  expected_total: Option<u64>,
  progress_interval_bytes: u64,
  last_progress_at: u64,
}

impl DecodeWorker {
  /// `progress_interval_bytes == 0` disables progress events.
  pub fn new(expected_total: Option<u64>, progress_interval_bytes: u64) -> Self {
    Self {
      state: WorkerState::Accumulating,
      chunks: Vec::new(),
      total_bytes: 0,
      expected_total,
      progress_interval_bytes,
      last_progress_at: 0,
    }
  }

  pub fn state(&self) -> WorkerState {
    self.state
  }

  pub fn buffered_bytes(&self) -> u64 {
    self.total_bytes
  }

  pub fn handle(&mut self, request: WorkerRequest) -> Option<WorkerEvent> {
    match (self.state, request) {
      (WorkerState::Accumulating, WorkerRequest::Chunk { chunk }) => {
        self.total_bytes += chunk.len() as u64;
        self.chunks.push(chunk);
        self.progress()
      }
      (WorkerState::Accumulating, WorkerRequest::Done) => Some(self.decode_all()),
      (state, _) => {
        warn!(?state, "decode worker received a message after end of input");
        None
      }
    }
  }

  fn progress(&mut self) -> Option<WorkerEvent> {
    if self.progress_interval_bytes == 0 {
      return None;
    }
    if self.total_bytes - self.last_progress_at < self.progress_interval_bytes {
      return None;
    }
    self.last_progress_at = self.total_bytes;
    Some(WorkerEvent::Progress {
      processed: self.total_bytes,
      total: self.expected_total,
    })
  }

  fn decode_all(&mut self) -> WorkerEvent {
    self.state = WorkerState::Decoding;
    let chunks = std::mem::take(&mut self.chunks);
    let total = usize::try_from(self.total_bytes).unwrap_or(usize::MAX);
    debug!(chunks = chunks.len(), bytes = self.total_bytes, "assembling buffer");
    let buf = assemble_chunks(chunks, total);

    match codec::decode_dataset(&buf) {
      Ok(dataset) => {
        self.state = WorkerState::Completed;
        WorkerEvent::Done {
          data: vec![dataset],
        }
      }
      Err(e) => {
        self.state = WorkerState::Failed;
        WorkerEvent::Error {
          error: e.to_string(),
        }
      }
    }
  }
}

/// Copy chunks, in order, into one buffer of `total_len` bytes.
///
/// Chunks are consumed one by one so each is freed right after its copy.
pub fn assemble_chunks(chunks: Vec<Vec<u8>>, total_len: usize) -> Vec<u8> {
  let mut buf = vec![0u8; total_len];
  let mut offset = 0usize;
  for chunk in chunks {
    let end = offset + chunk.len();
    if end > buf.len() {
      buf.resize(end, 0);
    }
    buf[offset..end].copy_from_slice(&chunk);
    offset = end;
  }
  buf.truncate(offset);
  buf
}

/// A worker event tagged with the load it belongs to.
#[derive(Debug, Clone)]
pub struct LoadEvent {
  pub load_id: String,
  pub event: WorkerEvent,
}

#[derive(Debug, Clone)]
pub struct WorkerOptions {
  pub expected_total: Option<u64>,
  pub progress_interval_bytes: u64,
  /// Chunks allowed in flight between reader and worker.
  pub queue_depth: usize,
}

/// Owner-side handle to a `DecodeWorker` running on its own thread.
///
/// Events go to a shared channel tagged with the load id. Sending an event and
/// terminating take the same lock, so once `terminate` returns the worker can no
/// longer emit anything.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
  load_id: String,
  input: Sender<WorkerRequest>,
  events: Sender<LoadEvent>,
  alive: Arc<Mutex<bool>>,
}

impl WorkerHandle {
  pub fn spawn(
    load_id: String,
    options: WorkerOptions,
    events: Sender<LoadEvent>,
  ) -> Result<Self, CoreError> {
    let (input, rx) = bounded(options.queue_depth.max(1));
    let alive = Arc::new(Mutex::new(true));

    let worker_id = load_id.clone();
    let worker_alive = alive.clone();
    let worker_events = events.clone();
    thread::Builder::new()
      .name(format!("decode-{}", short_id(&load_id)))
      .spawn(move || run_worker(worker_id, rx, worker_alive, worker_events, options))
      .map_err(|e| CoreError::Worker(e.to_string()))?;

    Ok(Self {
      load_id,
      input,
      events,
      alive,
    })
  }

  pub fn load_id(&self) -> &str {
    &self.load_id
  }

  pub fn is_alive(&self) -> bool {
    *self.alive.lock()
  }

  pub fn send_chunk(&self, chunk: Vec<u8>) -> Result<(), CoreError> {
    self.send(WorkerRequest::Chunk { chunk })
  }

  /// Signal end-of-input.
  pub fn finish(&self) -> Result<(), CoreError> {
    self.send(WorkerRequest::Done)
  }

  /// Stop the worker immediately. No further events are emitted for this load.
  pub fn terminate(&self) {
    *self.alive.lock() = false;
  }

  /// Terminate and emit one owner-side `Error` as the load's terminal event.
  ///
  /// Returns `false` if the worker was already terminated.
  pub fn fail(&self, error: String) -> bool {
    let mut alive = self.alive.lock();
    if !*alive {
      return false;
    }
    *alive = false;
    let _ = self.events.send(LoadEvent {
      load_id: self.load_id.clone(),
      event: WorkerEvent::Error { error },
    });
    true
  }

  fn send(&self, request: WorkerRequest) -> Result<(), CoreError> {
    if !self.is_alive() {
      return Err(CoreError::Worker(format!("worker {} terminated", self.load_id)));
    }
    self
      .input
      .send(request)
      .map_err(|_| CoreError::Worker(format!("worker {} is gone", self.load_id)))
  }
}

fn run_worker(
  load_id: String,
  rx: Receiver<WorkerRequest>,
  alive: Arc<Mutex<bool>>,
  events: Sender<LoadEvent>,
  options: WorkerOptions,
) {
  let mut worker = DecodeWorker::new(options.expected_total, options.progress_interval_bytes);
  for request in rx.iter() {
    if !*alive.lock() {
      debug!(load_id = %load_id, "worker terminated, dropping buffered chunks");
      return;
    }
    let Some(event) = worker.handle(request) else {
      continue;
    };
    let terminal = event.is_terminal();
    {
      let alive = alive.lock();
      if !*alive {
        return;
      }
      if events
        .send(LoadEvent {
          load_id: load_id.clone(),
          event,
        })
        .is_err()
      {
        return;
      }
    }
    if terminal {
      return;
    }
  }
  debug!(load_id = %load_id, state = ?worker.state(), "worker input closed");
}

fn short_id(id: &str) -> &str {
  id.get(..8).unwrap_or(id)
}
