//! Two-stage shutdown signal
//!
//! The first interrupt asks for a graceful stop; the second forces an
//! immediate one. State only moves forward.

use tokio::sync::watch;
use tracing::info;

/// Process-wide shutdown stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownState {
    Running,
    /// Stop admitting work; running sessions may finish
    Graceful,
    /// Exit now; in-flight sessions are abandoned
    Immediate,
}

/// Sending half, owned by whoever watches for signals
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: watch::Sender<ShutdownState>,
}

/// Receiving half, cloned into the dispatcher and every session runner
#[derive(Debug, Clone)]
pub struct ShutdownWatch {
    rx: watch::Receiver<ShutdownState>,
}

/// Create a linked trigger/watch pair in the `Running` state
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownWatch) {
    let (tx, rx) = watch::channel(ShutdownState::Running);
    (ShutdownTrigger { tx }, ShutdownWatch { rx })
}

impl ShutdownTrigger {
    /// Advance one stage and return the new state
    pub fn escalate(&self) -> ShutdownState {
        let mut next = ShutdownState::Running;
        self.tx.send_modify(|state| {
            *state = match *state {
                ShutdownState::Running => ShutdownState::Graceful,
                _ => ShutdownState::Immediate,
            };
            next = *state;
        });
        next
    }

    pub fn subscribe(&self) -> ShutdownWatch {
        ShutdownWatch {
            rx: self.tx.subscribe(),
        }
    }

    /// Forward Ctrl-C presses into the channel until the immediate stage
    pub async fn listen_for_ctrl_c(self) {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            match self.escalate() {
                ShutdownState::Graceful => {
                    info!("Shutdown signal received, stopping after current work. Press Ctrl-C again to quit now")
                }
                _ => {
                    info!("Second shutdown signal received, quitting now");
                    return;
                }
            }
        }
    }
}

impl ShutdownWatch {
    pub fn state(&self) -> ShutdownState {
        *self.rx.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ShutdownState::Running
    }

    pub fn is_immediate(&self) -> bool {
        self.state() == ShutdownState::Immediate
    }

    /// Wait until the state reaches at least `target`
    pub async fn reached(&mut self, target: ShutdownState) {
        // A dropped trigger can never escalate further
        let _ = self.rx.wait_for(|state| *state >= target).await;
    }

    /// Wait for the next state change; pending forever once the trigger is gone
    pub async fn changed(&mut self) -> ShutdownState {
        if self.rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
        self.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_escalation() {
        let (trigger, mut watch) = shutdown_channel();
        assert!(watch.is_running());

        assert_eq!(trigger.escalate(), ShutdownState::Graceful);
        assert_eq!(watch.changed().await, ShutdownState::Graceful);

        assert_eq!(trigger.escalate(), ShutdownState::Immediate);
        assert!(watch.is_immediate());
        assert_eq!(trigger.escalate(), ShutdownState::Immediate);
    }

    #[tokio::test]
    async fn test_reached() {
        let (trigger, watch) = shutdown_channel();
        let mut waiter = watch.clone();
        let task = tokio::spawn(async move {
            waiter.reached(ShutdownState::Immediate).await;
        });

        trigger.escalate();
        tokio::task::yield_now().await;
        assert!(!task.is_finished());

        trigger.escalate();
        task.await.unwrap();
        assert!(trigger.subscribe().is_immediate());
    }
}
