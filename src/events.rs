//! Event bus relaying discovery and connection changes to the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::trace;

use crate::connection::ConnectionState;
use crate::device::Device;

/// Caller-facing connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ConnectionStatus {
    /// A connection attempt started.
    Connecting,
    /// The printer is ready for jobs.
    Connected,
    /// The link was closed, locally or remotely.
    Disconnected,
    /// The connection attempt failed.
    Error,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Events emitted by a [`PrinterManager`](crate::PrinterManager).
#[derive(Debug, Clone)]
pub enum PrinterEvent {
    /// A device was seen for the first time in the current scan session.
    DeviceFound(Device),
    /// The caller-facing connection status changed.
    ConnectionChanged {
        /// New status.
        status: ConnectionStatus,
        /// Device the status refers to.
        device_id: String,
        /// Error description for [`ConnectionStatus::Error`].
        error: Option<String>,
    },
    /// The internal state machine moved to a new state.
    StateChanged(ConnectionState),
}

/// Callback handle for unregistering callbacks.
pub struct CallbackHandle {
    id: u64,
    unregister_fn: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl CallbackHandle {
    /// Create a new callback handle.
    pub(crate) fn new(id: u64, unregister_fn: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            unregister_fn: Some(Box::new(unregister_fn)),
        }
    }

    /// Unregister this callback.
    pub fn unregister(mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }

    /// Get the callback ID.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }
}

/// Fan-out of [`PrinterEvent`]s to any number of subscribers.
pub struct EventBus {
    tx: broadcast::Sender<PrinterEvent>,
    callback_counter: AtomicU64,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per slow subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            callback_counter: AtomicU64::new(0),
        }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn emit(&self, event: PrinterEvent) {
        trace!("Emitting event: {:?}", event);
        let _ = self.tx.send(event);
    }

    /// Publish a [`PrinterEvent::ConnectionChanged`].
    pub fn emit_connection(&self, status: ConnectionStatus, device_id: &str, error: Option<String>) {
        self.emit(PrinterEvent::ConnectionChanged {
            status,
            device_id: device_id.to_string(),
            error,
        });
    }

    /// Subscribe to all events.
    pub fn subscribe(&self) -> broadcast::Receiver<PrinterEvent> {
        self.tx.subscribe()
    }

    /// Run `callback` for every event that `filter` maps to `Some`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn on<T, M, F>(&self, filter: M, callback: F) -> CallbackHandle
    where
        T: Send + 'static,
        M: Fn(PrinterEvent) -> Option<T> + Send + Sync + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let callback_id = self.callback_counter.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.tx.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if let Some(value) = filter(event) {
                            callback(value);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        trace!("Callback {} lagged by {} events", callback_id, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        CallbackHandle::new(callback_id, move || {
            handle.abort();
        })
    }
}
