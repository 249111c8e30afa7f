//! Single-flight request worker.
//!
//! `Idle --dispatch--> InFlight --Succeeded|Failed--> Idle`. The network call
//! runs on a spawned tokio task and reports back over an unbounded channel.
//! Events that do not belong to the request currently in flight are dropped,
//! which covers results that arrive after [`RequestWorker::cancel`].

use crate::events::{RequestId, WorkerEvent};
use chatdesk_core::{ContextEntry, Error, RemoteError, RequestParameters, Result};
use chatdesk_providers::ModelClient;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    InFlight(RequestId),
}

pub struct RequestWorker {
    client: ModelClient,
    state: WorkerState,
    last_request_id: RequestId,
    tx: mpsc::UnboundedSender<WorkerEvent>,
    rx: mpsc::UnboundedReceiver<WorkerEvent>,
    cancel: CancellationToken,
}

impl RequestWorker {
    pub fn new(client: ModelClient) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { client, state: WorkerState::Idle, last_request_id: 0, tx, rx, cancel: CancellationToken::new() }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.state, WorkerState::InFlight(_))
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Start a request for `prompt` after `context`.
    ///
    /// Fails with [`Error::RequestInFlight`] while another request is running.
    pub fn dispatch(
        &mut self, context: Vec<ContextEntry>, prompt: String, params: RequestParameters,
    ) -> Result<RequestId> {
        if self.cancel.is_cancelled() {
            return Err(Error::SessionClosed);
        }
        if self.is_busy() {
            return Err(Error::RequestInFlight);
        }

        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Other(format!("no async runtime available: {}", e)))?;

        self.last_request_id += 1;
        let request_id = self.last_request_id;
        self.state = WorkerState::InFlight(request_id);

        let client = self.client.clone();
        let tx = self.tx.clone();
        let cancel = self.cancel.clone();
        let span = tracing::info_span!("request", request_id, model = client.model());

        handle.spawn(
            async move {
                let _ = tx.send(WorkerEvent::Started { request_id });

                let result = tokio::select! {
                    _ = cancel.cancelled() => Err(RemoteError::cancelled()),
                    result = client.send(&context, &prompt, params) => result,
                };

                let event = match result {
                    Ok(completion) => {
                        tracing::info!(token_usage = completion.token_usage, "request succeeded");
                        WorkerEvent::Succeeded { request_id, completion }
                    }
                    Err(error) => {
                        tracing::info!(kind = %error.kind, "request failed");
                        WorkerEvent::Failed { request_id, error }
                    }
                };
                let _ = tx.send(event);
            }
            .instrument(span),
        );

        Ok(request_id)
    }

    /// Keep `event` only if it belongs to the request in flight
    fn accept(&mut self, event: WorkerEvent) -> Option<WorkerEvent> {
        let current = match self.state {
            WorkerState::InFlight(id) if !self.cancel.is_cancelled() => id,
            _ => {
                tracing::debug!(request_id = event.request_id(), "discarding event with no request in flight");
                return None;
            }
        };

        if event.request_id() != current {
            tracing::debug!(request_id = event.request_id(), current, "discarding stale event");
            return None;
        }

        if event.is_terminal() {
            self.state = WorkerState::Idle;
        }
        Some(event)
    }

    /// Next pending event without waiting
    pub fn try_next(&mut self) -> Option<WorkerEvent> {
        while let Ok(event) = self.rx.try_recv() {
            if let Some(event) = self.accept(event) {
                return Some(event);
            }
        }
        None
    }

    /// Wait for the next event of the request in flight; `None` when idle
    pub async fn next(&mut self) -> Option<WorkerEvent> {
        loop {
            if !self.is_busy() || self.cancel.is_cancelled() {
                return None;
            }
            let event = self.rx.recv().await?;
            if let Some(event) = self.accept(event) {
                return Some(event);
            }
        }
    }

    /// Stop the request in flight and refuse new ones
    pub fn cancel(&mut self) {
        if let WorkerState::InFlight(request_id) = self.state {
            tracing::debug!(request_id, "cancelling request in flight");
        }
        self.cancel.cancel();
        self.state = WorkerState::Idle;
    }
}

impl Drop for RequestWorker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
