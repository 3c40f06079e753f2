use std::{
  collections::HashMap,
  fs::File,
  io::Read,
  path::PathBuf,
  sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
  },
  thread,
  time::{Duration, SystemTime, UNIX_EPOCH},
};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  chunks::ChunkReader,
  codec::detect_format,
  engine::CoreError,
  models::{FileFormat, LoadInfo, LoadOutcome, LoadStatus, RawDataset},
  worker::{LoadEvent, WorkerEvent, WorkerHandle, WorkerOptions},
};

#[derive(Debug, Clone)]
pub struct LoadManagerOptions {
  pub chunk_size: usize,
  pub progress_interval_bytes: u64,
  pub chunk_queue_depth: usize,
}

/// Owns every in-flight load and the one event channel all workers report on.
#[derive(Clone)]
pub struct LoadManager {
  opts: LoadManagerOptions,
  loads: Arc<Mutex<HashMap<String, Arc<LoadState>>>>,
  next_seq: Arc<AtomicU64>,
  events_tx: Sender<LoadEvent>,
  events_rx: Receiver<LoadEvent>,
}

#[derive(Debug)]
struct LoadState {
  info: LoadInfo,
  /// Start order; the newest finished load is the one kept around.
  seq: u64,
  worker: Mutex<Option<WorkerHandle>>,
  processed: AtomicU64,
  finished: AtomicBool,
  error: Mutex<Option<String>>,
  outcome: Mutex<Option<LoadOutcome>>,
}

impl LoadState {
  fn finish(&self, error: Option<String>) {
    *self.error.lock() = error;
    self.finished.store(true, Ordering::SeqCst);
    // Dropping the handle closes the worker's input.
    self.worker.lock().take();
  }
}

/// A terminal event routed to its load, ready to be applied to the store.
pub(crate) enum Dispatched {
  Completed { id: String, dataset: RawDataset },
  Failed { id: String, error: String },
}

impl LoadManager {
  pub fn new(opts: LoadManagerOptions) -> Self {
    let (events_tx, events_rx) = unbounded();
    Self {
      opts,
      loads: Arc::new(Mutex::new(HashMap::new())),
      next_seq: Arc::new(AtomicU64::new(0)),
      events_tx,
      events_rx,
    }
  }

  /// Start loading `path`. Any load still in flight is terminated first.
  pub(crate) fn start(&self, path: PathBuf) -> Result<LoadInfo, CoreError> {
    let format = detect_format(&path);
    if format == FileFormat::Unknown {
      warn!(path = %path.display(), "not a .msgpack file, decoding anyway");
    }

    let file = File::open(&path)?;
    let total_bytes = file.metadata()?.len();

    let superseded = self.terminate_pending();
    if superseded > 0 {
      info!(superseded, "terminated previous load");
    }
    let pruned = self.prune_finished();
    if pruned > 0 {
      debug!(pruned, "dropped finished loads");
    }

    let id = Uuid::new_v4().to_string();
    let worker = WorkerHandle::spawn(
      id.clone(),
      WorkerOptions {
        expected_total: Some(total_bytes),
        progress_interval_bytes: self.opts.progress_interval_bytes,
        queue_depth: self.opts.chunk_queue_depth,
      },
      self.events_tx.clone(),
    )?;

    let info = LoadInfo {
      id: id.clone(),
      path: path.to_string_lossy().to_string(),
      format,
      total_bytes,
      started_at_ms: now_ms(),
    };
    let state = Arc::new(LoadState {
      info: info.clone(),
      seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
      worker: Mutex::new(Some(worker.clone())),
      processed: AtomicU64::new(0),
      finished: AtomicBool::new(false),
      error: Mutex::new(None),
      outcome: Mutex::new(None),
    });
    self.loads.lock().insert(id.clone(), state);

    let reader = ChunkReader::new(file, total_bytes, self.opts.chunk_size);
    let reader_worker = worker.clone();
    let spawned = thread::Builder::new()
      .name("chunk-reader".into())
      .spawn(move || pump_chunks(reader, reader_worker));
    if let Err(e) = spawned {
      worker.terminate();
      self.loads.lock().remove(&id);
      return Err(CoreError::Worker(e.to_string()));
    }

    info!(load_id = %id, path = %info.path, total_bytes, "load started");
    Ok(info)
  }

  /// Terminate a load immediately. It will not report anything afterwards.
  pub fn cancel(&self, load_id: &str) -> Result<(), CoreError> {
    let mut loads = self.loads.lock();
    let state = loads
      .get(load_id)
      .cloned()
      .ok_or_else(|| CoreError::UnknownLoad(load_id.to_string()))?;
    if state.finished.load(Ordering::SeqCst) {
      return Err(CoreError::InvalidArg(format!("load {load_id} already finished")));
    }
    if let Some(worker) = state.worker.lock().take() {
      worker.terminate();
    }
    loads.remove(load_id);
    debug!(load_id, "load cancelled");
    Ok(())
  }

  fn terminate_pending(&self) -> usize {
    let mut loads = self.loads.lock();
    let pending: Vec<String> = loads
      .iter()
      .filter(|(_, s)| !s.finished.load(Ordering::SeqCst))
      .map(|(id, _)| id.clone())
      .collect();
    for id in &pending {
      if let Some(state) = loads.remove(id) {
        if let Some(worker) = state.worker.lock().take() {
          worker.terminate();
        }
      }
    }
    pending.len()
  }

  /// Forget finished loads except the most recently started one, so its
  /// status and outcome stay readable while the next load runs.
  fn prune_finished(&self) -> usize {
    let mut loads = self.loads.lock();
    let newest = loads
      .values()
      .filter(|s| s.finished.load(Ordering::SeqCst))
      .map(|s| s.seq)
      .max();
    let before = loads.len();
    loads.retain(|_, s| !s.finished.load(Ordering::SeqCst) || Some(s.seq) == newest);
    before - loads.len()
  }

  /// Loads whose status can still be queried.
  pub fn tracked(&self) -> usize {
    self.loads.lock().len()
  }

  pub fn status(&self, load_id: &str) -> Result<LoadStatus, CoreError> {
    let state = self
      .loads
      .lock()
      .get(load_id)
      .cloned()
      .ok_or_else(|| CoreError::UnknownLoad(load_id.to_string()))?;
    let finished = state.finished.load(Ordering::SeqCst);
    let processed = state.processed.load(Ordering::SeqCst);
    let total = state.info.total_bytes;
    let progress_0_100 = if finished {
      100
    } else if total == 0 {
      0
    } else {
      ((processed.saturating_mul(100)) / total).min(99) as u8
    };
    let error = state.error.lock().clone();
    Ok(LoadStatus {
      id: state.info.id.clone(),
      processed_bytes: processed,
      total_bytes: total,
      progress_0_100,
      finished,
      error,
    })
  }

  pub(crate) fn outcome(&self, load_id: &str) -> Result<Option<LoadOutcome>, CoreError> {
    let loads = self.loads.lock();
    let state = loads
      .get(load_id)
      .ok_or_else(|| CoreError::UnknownLoad(load_id.to_string()))?;
    let outcome = state.outcome.lock().clone();
    Ok(outcome)
  }

  pub(crate) fn record_outcome(&self, outcome: &LoadOutcome) {
    if let Some(state) = self.loads.lock().get(outcome.id()) {
      *state.outcome.lock() = Some(outcome.clone());
    }
  }

  pub(crate) fn try_next_event(&self) -> Option<LoadEvent> {
    self.events_rx.try_recv().ok()
  }

  /// `Ok(None)` on timeout.
  pub(crate) fn next_event_timeout(&self, timeout: Duration) -> Result<Option<LoadEvent>, CoreError> {
    match self.events_rx.recv_timeout(timeout) {
      Ok(ev) => Ok(Some(ev)),
      Err(RecvTimeoutError::Timeout) => Ok(None),
      // The manager holds a sender itself, so this cannot normally happen.
      Err(RecvTimeoutError::Disconnected) => Err(CoreError::Worker("event channel closed".into())),
    }
  }

  /// Route one worker event to its load.
  ///
  /// Events for loads that were cancelled, superseded or already finished are
  /// dropped here.
  pub(crate) fn dispatch(&self, ev: LoadEvent) -> Option<Dispatched> {
    let state = self.loads.lock().get(&ev.load_id).cloned();
    let state = match state {
      Some(s) if !s.finished.load(Ordering::SeqCst) => s,
      _ => {
        debug!(load_id = %ev.load_id, "dropping event for inactive load");
        return None;
      }
    };

    match ev.event {
      WorkerEvent::Progress { processed, .. } => {
        state.processed.store(processed, Ordering::SeqCst);
        None
      }
      WorkerEvent::Done { data } => {
        state.processed.store(state.info.total_bytes, Ordering::SeqCst);
        match data.into_iter().next() {
          Some(dataset) => {
            state.finish(None);
            Some(Dispatched::Completed {
              id: ev.load_id,
              dataset,
            })
          }
          None => {
            let error = "worker finished without a dataset".to_string();
            state.finish(Some(error.clone()));
            Some(Dispatched::Failed {
              id: ev.load_id,
              error,
            })
          }
        }
      }
      WorkerEvent::Error { error } => {
        state.finish(Some(error.clone()));
        Some(Dispatched::Failed {
          id: ev.load_id,
          error,
        })
      }
    }
  }
}

/// Read chunks one at a time and hand each to the worker before reading the next.
fn pump_chunks<R: Read>(mut reader: ChunkReader<R>, worker: WorkerHandle) {
  let mut chunks = 0usize;
  loop {
    if !worker.is_alive() {
      debug!(load_id = worker.load_id(), "worker terminated, reader stopping");
      return;
    }
    match reader.next_chunk() {
      Ok(Some(chunk)) => {
        chunks += 1;
        if worker.send_chunk(chunk).is_err() {
          return;
        }
      }
      Ok(None) => {
        debug!(
          load_id = worker.load_id(),
          chunks,
          bytes = reader.bytes_read(),
          "end of input"
        );
        let _ = worker.finish();
        return;
      }
      Err(e) => {
        worker.fail(CoreError::Read(e.to_string()).to_string());
        return;
      }
    }
  }
}

fn now_ms() -> i64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_millis() as i64
}
