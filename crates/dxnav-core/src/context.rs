use std::{fmt, sync::Arc};

use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

/// Owner side of a cancellation signal.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side handed to long-running operations.
#[derive(Clone, Debug)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// A token nobody can cancel.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested; pends forever if the handle
    /// is dropped first.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

pub trait ProgressSink: Send + Sync {
    /// `increment` is a percentage of the whole operation, when known.
    fn report(&self, message: &str, increment: Option<f64>);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn report(&self, _message: &str, _increment: Option<f64>) {}
}

#[derive(Clone, Debug)]
pub struct TracingProgress {
    label: String,
}

impl TracingProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl ProgressSink for TracingProgress {
    fn report(&self, message: &str, increment: Option<f64>) {
        match increment {
            Some(inc) => info!("{}: {message} (+{inc:.1}%)", self.label),
            None => info!("{}: {message}", self.label),
        }
    }
}

/// Everything a long-running operation needs from its caller.
#[derive(Clone)]
pub struct OpContext {
    pub op_id: String,
    pub cancel: CancelToken,
    pub progress: Arc<dyn ProgressSink>,
}

impl OpContext {
    pub fn new(cancel: CancelToken, progress: Arc<dyn ProgressSink>) -> Self {
        Self {
            op_id: Uuid::new_v4().to_string(),
            cancel,
            progress,
        }
    }

    /// Not cancellable, progress discarded.
    pub fn detached() -> Self {
        Self::new(CancelToken::never(), Arc::new(NullProgress))
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn report(&self, message: &str, increment: Option<f64>) {
        self.progress.report(message, increment);
    }
}

impl fmt::Debug for OpContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpContext")
            .field("op_id", &self.op_id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
