//! Worker thread wrapper
//!
//! One worker owns at most one OS thread at a time. The caller can observe
//! whether the thread is still running and wait for it to terminate. Joining
//! from the worker thread itself is detected and skipped, so a node may stop
//! itself from inside its own loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::Mutex;

pub struct Worker {
    handle: Mutex<Option<JoinHandle<()>>>,
    thread_id: Mutex<Option<ThreadId>>,
    running: Arc<AtomicBool>,
}

impl Worker {
    pub fn new() -> Worker {
        Worker {
            handle: Mutex::new(None),
            thread_id: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawn `body` on a new named thread. Returns false if a thread is
    /// already running or the OS refuses to spawn one.
    pub fn start<F>(&self, name: &str, body: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_running() {
            return false;
        }
        // The previous thread may still be finishing; make sure it is joined
        // before its handle is replaced.
        self.join();

        // Cleared by a guard so the flag goes down even if `body` unwinds.
        struct RunningGuard(Arc<AtomicBool>);
        impl Drop for RunningGuard {
            fn drop(&mut self) {
                self.0.store(false, Ordering::SeqCst);
            }
        }

        let running = Arc::clone(&self.running);
        running.store(true, Ordering::SeqCst);
        let wrapped = move || {
            let _guard = RunningGuard(running);
            body();
        };

        match thread::Builder::new().name(name.to_string()).spawn(wrapped) {
            Ok(handle) => {
                *self.thread_id.lock() = Some(handle.thread().id());
                *self.handle.lock() = Some(handle);
                true
            }
            Err(err) => {
                self.running.store(false, Ordering::SeqCst);
                tracing::error!("[worker {}] failed to spawn thread: {}", name, err);
                false
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// True when called from the thread this worker spawned.
    pub fn is_worker_thread(&self) -> bool {
        *self.thread_id.lock() == Some(thread::current().id())
    }

    /// Wait for the thread to terminate. A no-op when no thread was started
    /// or when called from the worker thread itself.
    pub fn join(&self) {
        if self.is_worker_thread() {
            return;
        }
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(payload) = handle.join() {
                // The body is expected to catch its own panics; this is the
                // last line of defense.
                tracing::error!("[worker] thread terminated by panic: {:?}", payload);
            }
        }
    }
}

impl Default for Worker {
    fn default() -> Worker {
        Worker::new()
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.join();
    }
}
