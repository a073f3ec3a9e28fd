//! One-shot rendezvous cells shared between actors of a single step.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BarrierError {
    #[error("Barrier '{label}' timed out after {timeout:?}")]
    TimedOut { label: String, timeout: Duration },

    #[error("Barrier '{0}' was abandoned")]
    Abandoned(String),
}

#[derive(Debug, Clone)]
enum Slot<T> {
    Pending,
    Done(T),
    Abandoned,
}

/// Single-assignment value cell with bounded waits.
///
/// Clones share the same cell. The first `complete` wins; later calls and
/// calls after `abandon` are no-ops. `wait` never blocks past its timeout.
#[derive(Debug)]
pub struct Barrier<T> {
    label: Arc<str>,
    tx: Arc<watch::Sender<Slot<T>>>,
}

impl<T> Clone for Barrier<T> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            tx: self.tx.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Barrier<T> {
    pub fn new(label: &str) -> Self {
        let (tx, _rx) = watch::channel(Slot::Pending);
        Self {
            label: Arc::from(label),
            tx: Arc::new(tx),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Store `value` unless the cell is already settled. Returns whether
    /// this call settled it.
    pub fn complete(&self, value: T) -> bool {
        let settled = self.tx.send_if_modified(|slot| {
            if matches!(slot, Slot::Pending) {
                *slot = Slot::Done(value);
                true
            } else {
                false
            }
        });
        if !settled {
            tracing::debug!("Barrier '{}' already settled, completion ignored", self.label);
        }
        settled
    }

    pub fn is_settled(&self) -> bool {
        !matches!(*self.tx.borrow(), Slot::Pending)
    }

    /// Completed value, if any, without waiting.
    pub fn peek(&self) -> Option<T> {
        match &*self.tx.borrow() {
            Slot::Done(value) => Some(value.clone()),
            _ => None,
        }
    }

    pub async fn wait(&self, timeout: Duration) -> Result<T, BarrierError> {
        let mut rx = self.tx.subscribe();
        let settled = tokio::time::timeout(
            timeout,
            rx.wait_for(|slot| !matches!(slot, Slot::Pending)),
        )
        .await;

        match settled {
            Err(_) => {
                tracing::debug!("Barrier '{}' timed out after {:?}", self.label, timeout);
                Err(BarrierError::TimedOut {
                    label: self.label.to_string(),
                    timeout,
                })
            }
            // The sender lives as long as `self`, a closed channel only
            // happens during teardown.
            Ok(Err(_)) => Err(BarrierError::Abandoned(self.label.to_string())),
            Ok(Ok(slot)) => match &*slot {
                Slot::Done(value) => Ok(value.clone()),
                _ => Err(BarrierError::Abandoned(self.label.to_string())),
            },
        }
    }
}

/// Type-erased handle used by the step context to release barriers at
/// step end.
pub(crate) trait Abandon: Send + Sync {
    /// Settle a pending cell as abandoned. Returns whether it was pending.
    fn abandon(&self) -> bool;
    fn label(&self) -> &str;
}

impl<T: Clone + Send + Sync + 'static> Abandon for Barrier<T> {
    fn abandon(&self) -> bool {
        self.tx.send_if_modified(|slot| {
            if matches!(slot, Slot::Pending) {
                *slot = Slot::Abandoned;
                true
            } else {
                false
            }
        })
    }

    fn label(&self) -> &str {
        &self.label
    }
}
