//! Local shutdown signal for blocking protocol loops.
//!
//! The protocol itself has no stop message. Participants are stopped from
//! the outside by firing a [`ShutdownTrigger`]; every loop holding a clone of
//! the matching [`ShutdownSignal`] unblocks.

use tokio::sync::watch;

/// Creates a linked trigger/signal pair.
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}

/// Fires the shutdown for every linked signal.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    /// Requests shutdown. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Returns a new signal linked to this trigger.
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Observes a [`ShutdownTrigger`].
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Returns true once shutdown has been requested.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Completes when shutdown is requested.
    ///
    /// If the trigger is dropped without firing, this never completes.
    pub async fn cancelled(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_wakes_all_signals() {
        let (trigger, signal) = shutdown_channel();
        let mut first = signal.clone();
        let mut second = trigger.signal();

        let waiter = tokio::spawn(async move {
            first.cancelled().await;
            second.cancelled().await;
        });

        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("signals should fire")
            .unwrap();
        assert!(signal.is_triggered());
    }

    #[tokio::test]
    async fn test_already_triggered_completes_immediately() {
        let (trigger, mut signal) = shutdown_channel();
        trigger.trigger();
        trigger.trigger();
        signal.cancelled().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_does_not_fire() {
        let mut signal = ShutdownSignal::never();
        let result = tokio::time::timeout(Duration::from_secs(60), signal.cancelled()).await;
        assert!(result.is_err());
        assert!(!signal.is_triggered());
    }
}
