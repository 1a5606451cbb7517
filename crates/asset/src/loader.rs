//! Background mesh loading and the worker -> render-thread handoff.
//!
//! One [`LoadCoordinator`] owns the currently displayed mesh and at most one
//! in-flight background load. Each load runs on its own worker thread and
//! publishes through an [`ImportSlot`]:
//!
//! `Empty -> Pending -> { Ready | Failed } -> (consumed) -> Empty`
//!
//! The worker is the only writer of slot contents; the render thread is the
//! only reader, and it reads nothing until it has observed `ready` with
//! Acquire ordering. Parse errors never cross the thread boundary as panics;
//! they travel exclusively through the `failed` flag.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use crate::mesh::MeshBuffers;
use crate::obj;

/// Handoff object for exactly one in-flight load, shared between the worker
/// (writer) and the polling render thread (reader).
pub struct ImportSlot {
    /// Filled once by the worker before publication; moved out once by the
    /// poller afterwards. Never contended: `ready` serializes the two sides.
    buffers: Mutex<Option<MeshBuffers>>,
    /// Publication gate. The Release store here is the only happens-before
    /// edge the buffer contents rely on.
    ready: AtomicBool,
    /// Outcome flag; meaningful only once `ready` is observed true.
    failed: AtomicBool,
    /// f32 bit pattern in [0,1]; coarse, Relaxed on both sides.
    progress: AtomicU32,
}

impl ImportSlot {
    fn new() -> Self {
        Self {
            buffers: Mutex::new(None),
            ready: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            progress: AtomicU32::new(0f32.to_bits()),
        }
    }

    pub fn progress(&self) -> f32 {
        f32::from_bits(self.progress.load(Ordering::Relaxed))
    }

    fn set_progress(&self, fraction: f32) {
        self.progress
            .store(fraction.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// Worker side, success: store the finished buffers, then publish.
    fn publish(&self, buffers: MeshBuffers) {
        *self.buffers.lock() = Some(buffers);
        self.ready.store(true, Ordering::Release);
    }

    /// Worker side, failure: mark the outcome, then publish.
    fn publish_failure(&self) {
        self.failed.store(true, Ordering::Relaxed);
        self.ready.store(true, Ordering::Release);
    }
}

/// Outcome of one per-frame poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadPoll {
    /// No load in flight; nothing changed.
    Idle,
    /// A load is in flight; keep drawing the previous model.
    Pending,
    /// A new mesh was moved into `current`. The one and only signal that
    /// should trigger a GPU-side rebuild.
    Ready,
    /// The load failed; the previous model remains displayed.
    Failed,
}

/// Owns the active mesh and serializes background loads: at most one in
/// flight, results consumed by a non-blocking per-frame poll on the render
/// thread.
pub struct LoadCoordinator {
    current: MeshBuffers,
    slot: Option<Arc<ImportSlot>>,
    busy: AtomicBool,
    worker: Option<JoinHandle<()>>,
}

impl LoadCoordinator {
    pub fn new() -> Self {
        Self {
            current: MeshBuffers::default(),
            slot: None,
            busy: AtomicBool::new(false),
            worker: None,
        }
    }

    /// Begin the startup load unconditionally. There is no previous resource
    /// to protect, so no busy check applies.
    pub fn start_initial_load(&mut self, path: impl AsRef<Path>) {
        self.begin_load(path.as_ref());
    }

    /// Request a background import. Dropped (not queued) while a load is
    /// already in flight; returns whether the request was accepted.
    pub fn request_import(&mut self, path: impl AsRef<Path>) -> bool {
        if self.is_busy() {
            log::warn!(
                "import of {} ignored: a load is already in flight",
                path.as_ref().display()
            );
            return false;
        }
        self.begin_load(path.as_ref());
        true
    }

    fn begin_load(&mut self, path: &Path) {
        self.busy.store(true, Ordering::Release);
        let slot = Arc::new(ImportSlot::new());
        self.slot = Some(slot.clone());

        let path = path.to_path_buf();
        log::info!("loading mesh from {}", path.display());
        self.worker = Some(thread::spawn(move || {
            let sink = |fraction: f32| slot.set_progress(fraction);
            match obj::load_obj_from_path(&path, Some(&sink)) {
                Ok(buffers) => {
                    log::info!(
                        "parsed {}: {} vertices, {} triangles",
                        path.display(),
                        buffers.vertex_count(),
                        buffers.triangle_count()
                    );
                    slot.publish(buffers);
                }
                Err(err) => {
                    log::error!("failed to parse {}: {err}", path.display());
                    slot.publish_failure();
                }
            }
        }));
    }

    /// Non-blocking; called once per frame on the render thread. Consumes a
    /// finished slot, moving its buffers into `current` on success.
    pub fn poll_completion(&mut self) -> LoadPoll {
        if self.slot.is_none() {
            return LoadPoll::Idle;
        }
        let Some(slot) = self
            .slot
            .take_if(|slot| slot.ready.load(Ordering::Acquire))
        else {
            return LoadPoll::Pending;
        };
        let outcome = if slot.failed.load(Ordering::Relaxed) {
            LoadPoll::Failed
        } else {
            match slot.buffers.lock().take() {
                Some(buffers) => {
                    self.current = buffers;
                    LoadPoll::Ready
                }
                // Published without content: treat like a failure rather
                // than tearing down the current model.
                None => LoadPoll::Failed,
            }
        };

        // The worker published before we got here, so the join is immediate.
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        self.busy.store(false, Ordering::Release);
        outcome
    }

    #[inline]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Approximate progress of the in-flight load, 0 when idle.
    pub fn progress(&self) -> f32 {
        self.slot.as_ref().map_or(0.0, |slot| slot.progress())
    }

    #[inline]
    pub fn current(&self) -> &MeshBuffers {
        &self.current
    }
}

impl Default for LoadCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LoadCoordinator {
    /// Shutdown waits for an in-flight worker: the slot it writes into must
    /// outlive the write.
    fn drop(&mut self) {
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    const QUAD_OBJ: &str = "\
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vn 0 0 1
f 1//1 2//1 3//1
f 1//1 3//1 4//1
";

    static FILE_SEQ: AtomicUsize = AtomicUsize::new(0);

    fn write_temp_obj(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "veles3d-loader-test-{}-{}.obj",
            std::process::id(),
            FILE_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::write(&path, contents).expect("write temp obj");
        path
    }

    fn poll_until_settled(coordinator: &mut LoadCoordinator) -> LoadPoll {
        let start = Instant::now();
        loop {
            match coordinator.poll_completion() {
                LoadPoll::Pending => {
                    assert!(start.elapsed() < Duration::from_secs(10), "load timed out");
                    thread::sleep(Duration::from_millis(2));
                }
                settled => return settled,
            }
        }
    }

    #[test]
    fn initial_load_becomes_current() {
        let path = write_temp_obj(QUAD_OBJ);
        let mut coordinator = LoadCoordinator::new();
        assert!(coordinator.current().is_empty());

        coordinator.start_initial_load(&path);
        assert!(coordinator.is_busy());

        assert_eq!(poll_until_settled(&mut coordinator), LoadPoll::Ready);
        assert!(!coordinator.is_busy());
        assert_eq!(coordinator.current().vertex_count(), 4);
        assert_eq!(coordinator.current().triangle_count(), 2);
        assert!(coordinator.current().is_valid());

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn second_request_while_busy_is_dropped() {
        let first = write_temp_obj(QUAD_OBJ);
        let second = write_temp_obj(QUAD_OBJ);
        let mut coordinator = LoadCoordinator::new();

        assert!(coordinator.request_import(&first));
        // Busy until the first result is consumed by a poll, so the second
        // request must be rejected without touching the slot.
        assert!(!coordinator.request_import(&second));
        assert!(coordinator.is_busy());

        assert_eq!(poll_until_settled(&mut coordinator), LoadPoll::Ready);
        // Only one slot was ever created: nothing further to consume.
        assert_eq!(coordinator.poll_completion(), LoadPoll::Idle);

        let _ = std::fs::remove_file(first);
        let _ = std::fs::remove_file(second);
    }

    #[test]
    fn failed_import_preserves_current_mesh() {
        let good = write_temp_obj(QUAD_OBJ);
        let mut coordinator = LoadCoordinator::new();
        coordinator.start_initial_load(&good);
        assert_eq!(poll_until_settled(&mut coordinator), LoadPoll::Ready);
        let before = coordinator.current().clone();

        let missing = std::env::temp_dir().join("veles3d-no-such-model.obj");
        assert!(coordinator.request_import(&missing));
        assert_eq!(poll_until_settled(&mut coordinator), LoadPoll::Failed);

        assert!(!coordinator.is_busy());
        assert_eq!(coordinator.current(), &before);
        // The coordinator is usable again after a failure.
        assert!(coordinator.request_import(&good));
        assert_eq!(poll_until_settled(&mut coordinator), LoadPoll::Ready);

        let _ = std::fs::remove_file(good);
    }

    #[test]
    fn unparseable_content_fails_without_panicking() {
        let junk = write_temp_obj("not an obj file at all\n");
        let mut coordinator = LoadCoordinator::new();
        coordinator.start_initial_load(&junk);
        assert_eq!(poll_until_settled(&mut coordinator), LoadPoll::Failed);
        assert!(coordinator.current().is_empty());
        assert!(!coordinator.is_busy());

        let _ = std::fs::remove_file(junk);
    }

    #[test]
    fn poll_without_load_reports_idle() {
        let mut coordinator = LoadCoordinator::new();
        assert_eq!(coordinator.poll_completion(), LoadPoll::Idle);
        assert!(!coordinator.is_busy());
        assert_eq!(coordinator.progress(), 0.0);
    }

    #[test]
    fn progress_reaches_one_on_success() {
        // Large enough to see intermediate progress from the worker.
        let mut src = String::new();
        for i in 0..5000 {
            src.push_str(&format!("v {} 0 0\n", i));
        }
        src.push_str("f 1 2 3\n");
        let path = write_temp_obj(&src);

        let mut coordinator = LoadCoordinator::new();
        coordinator.start_initial_load(&path);
        let mut last = 0.0f32;
        loop {
            let p = coordinator.progress();
            assert!(p >= last, "progress went backwards: {last} -> {p}");
            last = p;
            match coordinator.poll_completion() {
                LoadPoll::Pending => thread::sleep(Duration::from_millis(1)),
                LoadPoll::Ready => break,
                other => panic!("unexpected poll outcome {other:?}"),
            }
        }

        let _ = std::fs::remove_file(path);
    }
}
