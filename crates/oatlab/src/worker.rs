//! Background worker that owns the analysis session so solves never block
//! the caller.

use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use oatlab_core::analysis::{MatrixRequest, Statistic, percent_deviation};
use oatlab_core::{
    AnalysisSession, ControlHandle, ControllerState, ModelBackend, QuantityRef, SessionEvent,
    SessionSnapshot, ValueMatrix,
};

/// Request sent to the background worker
#[derive(Debug)]
pub enum AnalysisRequest {
    /// Start the sequence, or resume it when paused, and run until it
    /// settles. With `pause_after: Some(n)` the sequence pauses once `n` runs
    /// are recorded.
    Run { pause_after: Option<usize> },
    /// Stop a paused sequence (a running one is stopped through the handle)
    Stop,
    /// Empty the ledger and return to idle
    Clear,
    /// Build a value matrix from the current ledger
    Matrix {
        statistic: Statistic,
        relative: bool,
        excluded_parameters: Vec<QuantityRef>,
        excluded_outcomes: Vec<QuantityRef>,
    },
    /// Serializable view of the session
    Snapshot,
    /// Graceful shutdown
    Shutdown,
}

/// Response from the background worker
#[derive(Debug)]
pub enum AnalysisResponse {
    /// Forwarded session event
    Event(SessionEvent),
    /// The sequence left `Running`
    Settled {
        state: ControllerState,
        progress: String,
    },
    Matrix(Box<ValueMatrix>),
    Snapshot(Box<SessionSnapshot>),
    /// Request was rejected
    Error(String),
}

/// Background worker that runs an analysis session on a separate thread
pub struct AnalysisWorker {
    request_tx: Sender<AnalysisRequest>,
    response_rx: Receiver<AnalysisResponse>,
    handle: ControlHandle,
    thread: Option<JoinHandle<()>>,
}

impl AnalysisWorker {
    /// Move `session` and `model` onto a new worker thread
    pub fn spawn<M>(mut session: AnalysisSession, model: M) -> Self
    where
        M: ModelBackend + Send + 'static,
    {
        let (request_tx, request_rx) = channel();
        let (response_tx, response_rx) = channel();
        let handle = session.handle();

        let events = response_tx.clone();
        session.subscribe(move |event: &SessionEvent| {
            let _ = events.send(AnalysisResponse::Event(event.clone()));
        });

        let ctx = WorkerContext {
            session,
            model,
            response_tx,
        };
        let thread = thread::spawn(move || {
            ctx.run(request_rx);
        });

        Self {
            request_tx,
            response_rx,
            handle,
            thread: Some(thread),
        }
    }

    /// Send a request to the worker
    pub fn send(&self, request: AnalysisRequest) -> bool {
        self.request_tx.send(request).is_ok()
    }

    /// Try to receive a response (non-blocking)
    pub fn try_recv(&self) -> Option<AnalysisResponse> {
        self.response_rx.try_recv().ok()
    }

    /// Block until the next response. `None` once the worker has gone away.
    pub fn recv(&self) -> Option<AnalysisResponse> {
        self.response_rx.recv().ok()
    }

    /// Wait up to `timeout` for a response. `None` on timeout or when the
    /// worker has gone away.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<AnalysisResponse> {
        match self.response_rx.recv_timeout(timeout) {
            Ok(response) => Some(response),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Ask the running sequence to pause after the current run
    pub fn pause(&self) {
        self.handle.request_pause();
    }

    /// Stop after the current run, or right away if paused
    pub fn stop(&self) {
        self.handle.request_stop();
        let _ = self.request_tx.send(AnalysisRequest::Stop);
    }

    /// Shutdown the worker thread
    pub fn shutdown(&self) {
        let _ = self.request_tx.send(AnalysisRequest::Shutdown);
    }
}

impl Drop for AnalysisWorker {
    fn drop(&mut self) {
        self.handle.request_stop();
        self.shutdown();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// State owned by the background worker thread
struct WorkerContext<M> {
    session: AnalysisSession,
    model: M,
    response_tx: Sender<AnalysisResponse>,
}

impl<M: ModelBackend> WorkerContext<M> {
    fn run(mut self, request_rx: Receiver<AnalysisRequest>) {
        while let Ok(request) = request_rx.recv() {
            let response = match request {
                AnalysisRequest::Shutdown => break,
                AnalysisRequest::Run { pause_after } => self.run_sequence(pause_after),
                AnalysisRequest::Stop => self.stop(),
                AnalysisRequest::Clear => self
                    .session
                    .clear_results()
                    .map(|()| self.settled())
                    .unwrap_or_else(|e| AnalysisResponse::Error(e.to_string())),
                AnalysisRequest::Matrix {
                    statistic,
                    relative,
                    excluded_parameters,
                    excluded_outcomes,
                } => {
                    let outcomes: Vec<QuantityRef> = self
                        .session
                        .perturbations()
                        .enabled_outcomes()
                        .filter(|o| !excluded_outcomes.contains(o))
                        .cloned()
                        .collect();
                    let mut excluded = excluded_parameters;
                    excluded.extend(self.session.perturbations().disabled_parameters().cloned());

                    let matrix = self.session.matrix_for(&MatrixRequest {
                        statistic,
                        outcomes: &outcomes,
                        excluded_parameters: &excluded,
                    });
                    let matrix = if relative {
                        percent_deviation(&matrix)
                    } else {
                        matrix
                    };
                    AnalysisResponse::Matrix(Box::new(matrix))
                }
                AnalysisRequest::Snapshot => {
                    AnalysisResponse::Snapshot(Box::new(self.session.snapshot()))
                }
            };
            if self.response_tx.send(response).is_err() {
                break;
            }
        }
        tracing::debug!("analysis worker shutting down");
    }

    fn run_sequence(&mut self, pause_after: Option<usize>) -> AnalysisResponse {
        if let Err(e) = self.session.start() {
            return AnalysisResponse::Error(e.to_string());
        }
        while self.session.state() == ControllerState::Running {
            let report = match self.session.step(&self.model) {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!(error = %e, "analysis sequence aborted");
                    return AnalysisResponse::Error(e.to_string());
                }
            };
            // Requested on this thread so the pause lands on the very next boundary
            if let (Some(n), Some(index)) = (pause_after, report.recorded)
                && index + 1 == n
                && report.state == ControllerState::Running
                && self.session.pause().is_ok()
            {
                tracing::info!(runs = n, "pausing as requested");
            }
        }
        self.settled()
    }

    fn stop(&mut self) -> AnalysisResponse {
        if self.session.state() == ControllerState::Paused
            && let Err(e) = self.session.stop()
        {
            return AnalysisResponse::Error(e.to_string());
        }
        self.settled()
    }

    fn settled(&self) -> AnalysisResponse {
        AnalysisResponse::Settled {
            state: self.session.state(),
            progress: self.session.progress(),
        }
    }
}
