use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use log::{debug, error};
use parking_lot::Mutex;

use crate::models::config::CaptureConfiguration;
use crate::models::error::CaptureError;
use crate::models::fill_result::{CaptureStats, FillOutcome, SessionInfo};
use crate::models::state::CaptureState;
use crate::source::file::FileSource;
use crate::traits::capture_delegate::CaptureDelegate;

use super::capture::{admit, CaptureSession, SessionState};

type Reply = Box<dyn FnOnce(FillOutcome) + Send + 'static>;

enum Job {
    Fill { buffer: Vec<u8>, reply: Reply },
    Close(Sender<()>),
}

/// Runs a [`CaptureSession`] on a dedicated background thread.
///
/// ```text
/// caller ── fill_buffer(buf) ──[admit: idle → filling]──→ job queue
///                                                             ↓
///                                          worker thread: session.fill
///                                                             ↓
/// caller ←── FillTicket / callback ←── FillOutcome { buf, report }
/// ```
///
/// At most one fill is in flight per worker; a second request is refused
/// with `FillInProgress` instead of being queued. The caller's buffer moves
/// into the job and is handed back with the outcome, so nothing else can
/// touch it while the fill runs.
pub struct CaptureWorker {
    shared: Arc<Mutex<SessionState>>,
    info: SessionInfo,
    jobs: Sender<Job>,
    handle: Option<thread::JoinHandle<()>>,
    thread_id: ThreadId,
}

impl CaptureWorker {
    /// Move `session` onto a new thread named `name`.
    pub fn spawn(session: CaptureSession, name: &str) -> Result<Self, CaptureError> {
        let shared = session.shared();
        let info = session.info().clone();
        let (jobs, rx) = mpsc::channel();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(session, rx))
            .map_err(|e| {
                CaptureError::ConfigurationFailed(format!("failed to spawn worker thread: {e}"))
            })?;

        debug!("Capture worker {} started for session {}", name, info.id);
        Ok(Self {
            shared,
            info,
            jobs,
            thread_id: handle.thread().id(),
            handle: Some(handle),
        })
    }

    pub fn set_delegate(&self, delegate: Arc<dyn CaptureDelegate>) {
        self.shared.lock().delegate = Some(delegate);
    }

    pub fn state(&self) -> CaptureState {
        self.shared.lock().state
    }

    pub fn stats(&self) -> CaptureStats {
        self.shared.lock().stats
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    /// Start filling `buffer` in the background.
    ///
    /// Fails immediately with `FillInProgress` if another fill is running and
    /// with `SessionClosed` after `close`. The outcome, including the buffer,
    /// is collected through the returned ticket.
    pub fn fill_buffer(&self, buffer: Vec<u8>) -> Result<FillTicket, CaptureError> {
        let (tx, rx) = mpsc::sync_channel(1);
        self.fill_buffer_with(buffer, move |outcome| {
            let _ = tx.send(outcome);
        })?;
        Ok(FillTicket { rx })
    }

    /// Start filling `buffer` and call `on_complete` on the worker thread
    /// when done.
    pub fn fill_buffer_with<F>(&self, buffer: Vec<u8>, on_complete: F) -> Result<(), CaptureError>
    where
        F: FnOnce(FillOutcome) + Send + 'static,
    {
        admit(&self.shared)?;
        let job = Job::Fill {
            buffer,
            reply: Box::new(on_complete),
        };
        if self.jobs.send(job).is_err() {
            error!("Capture worker for session {} is gone", self.info.id);
            if let Some(d) = mark_closed(&self.shared) {
                d.on_state_changed(&CaptureState::Closed);
            }
            return Err(CaptureError::SessionClosed);
        }
        Ok(())
    }

    /// Close the session.
    ///
    /// On an idle worker the source is released before this returns. While a
    /// fill is running the close is applied once that fill completes, and its
    /// outcome is still delivered. Called from a completion callback or a
    /// delegate, the close is queued and applied once the callback returns.
    /// Idempotent.
    pub fn close(&self) {
        let idle = {
            let mut s = self.shared.lock();
            if s.close_requested || s.state.is_closed() {
                return;
            }
            s.close_requested = true;
            s.state.is_idle()
        };

        let (ack_tx, ack_rx) = mpsc::channel();
        if self.jobs.send(Job::Close(ack_tx)).is_err() {
            return;
        }
        if idle && !self.on_worker_thread() {
            let _ = ack_rx.recv();
        }
    }

    fn on_worker_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        self.close();
        let Some(handle) = self.handle.take() else {
            return;
        };
        if self.on_worker_thread() {
            debug!(
                "Capture worker for session {} dropped from its own thread",
                self.info.id
            );
        } else if self.state().is_closed() {
            let _ = handle.join();
        } else {
            // A fill is still blocked on the source; it finishes and closes on
            // its own.
            debug!(
                "Detaching capture worker for session {} with a fill in flight",
                self.info.id
            );
        }
    }
}

/// Forces the session to `Closed` if the worker thread unwinds, so callers
/// get `SessionClosed` instead of a fill that never finishes.
struct CloseOnUnwind(Arc<Mutex<SessionState>>);

impl Drop for CloseOnUnwind {
    fn drop(&mut self) {
        if thread::panicking() {
            error!("Capture worker thread panicked; session is closed");
            mark_closed(&self.0);
        }
    }
}

fn mark_closed(shared: &Mutex<SessionState>) -> Option<Arc<dyn CaptureDelegate>> {
    let mut s = shared.lock();
    s.state = CaptureState::Closed;
    s.delegate.clone()
}

fn run(mut session: CaptureSession, rx: Receiver<Job>) {
    let shared = session.shared();
    let _guard = CloseOnUnwind(Arc::clone(&shared));
    while let Ok(job) = rx.recv() {
        match job {
            Job::Fill { mut buffer, reply } => {
                let report = session.fill_admitted(&mut buffer);
                let delegate = shared.lock().delegate.clone();
                if let Some(d) = delegate {
                    d.on_fill_complete(&report);
                    if let Some(e) = &report.error {
                        d.on_error(e);
                    }
                }
                if let Some(e) = &report.error {
                    error!("Fill on session {} failed: {}", session.info().id, e);
                }
                reply(FillOutcome { buffer, report });
            }
            Job::Close(ack) => {
                session.close();
                let _ = ack.send(());
                break;
            }
        }
    }
    session.close();
}

/// Handle to a fill running on a [`CaptureWorker`].
pub struct FillTicket {
    rx: Receiver<FillOutcome>,
}

impl FillTicket {
    /// Block until the fill completes.
    pub fn wait(self) -> Result<FillOutcome, CaptureError> {
        self.rx.recv().map_err(|_| CaptureError::SessionClosed)
    }

    /// Block for at most `timeout`. Returns `Ok(None)` if the fill is still
    /// running.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Option<FillOutcome>, CaptureError> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => Ok(Some(outcome)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(CaptureError::SessionClosed),
        }
    }

    /// Take the outcome if the fill has already completed.
    pub fn try_take(&self) -> Option<FillOutcome> {
        self.rx.try_recv().ok()
    }
}

/// Open a capture file and start a worker for it.
pub fn open_file(
    path: impl AsRef<Path>,
    config: &CaptureConfiguration,
) -> Result<CaptureWorker, CaptureError> {
    let source = FileSource::open(path, config)?;
    let session = CaptureSession::new(Box::new(source));
    CaptureWorker::spawn(session, &config.worker_name)
}
