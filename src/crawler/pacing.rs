//! Pacing and cooperative shutdown
//!
//! Every wait in a crawl (between pages, before a retry) goes through
//! [`Shutdown::sleep`], which returns early once an interrupt is requested.

use std::time::Duration;
use tokio::sync::watch;

/// Returned when a wait was cut short by an interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

/// Sending half; flips the shared flag
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

/// Receiving half held by the crawl
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: Option<watch::Receiver<bool>>,
}

/// Creates a connected trigger/listener pair
pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx: Some(rx) })
}

impl Shutdown {
    /// A listener that is never triggered
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_triggered(&self) -> bool {
        self.rx.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Sleeps for `duration` unless shutdown is requested first
    pub async fn sleep(&mut self, duration: Duration) -> Result<(), Interrupted> {
        let Some(rx) = self.rx.as_mut() else {
            tokio::time::sleep(duration).await;
            return Ok(());
        };

        if *rx.borrow() {
            return Err(Interrupted);
        }

        let sleep = tokio::time::sleep(duration);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return Ok(()),
                changed = rx.changed() => match changed {
                    Ok(()) => {
                        if *rx.borrow_and_update() {
                            return Err(Interrupted);
                        }
                    }
                    // Trigger dropped without firing
                    Err(_) => {
                        (&mut sleep).await;
                        return Ok(());
                    }
                },
            }
        }
    }
}
