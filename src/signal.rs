use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

/// Cooperative stop request, observed between loop iterations.
///
/// Sleeping through [`Shutdown::wait`] ends early when a stop arrives, so
/// shutdown latency is bounded by the current iteration's I/O, not the poll
/// interval.
pub struct Shutdown {
    rx: Receiver<()>,
    requested: bool,
}

/// Sending half, handed to the signal handler (or a test).
#[derive(Clone)]
pub struct ShutdownTrigger(Sender<()>);

impl ShutdownTrigger {
    pub fn trigger(&self) {
        // receiver gone means we're already on the way out
        let _ = self.0.send(());
    }
}

impl Shutdown {
    pub fn channel() -> (ShutdownTrigger, Shutdown) {
        let (tx, rx) = mpsc::channel();
        (
            ShutdownTrigger(tx),
            Shutdown {
                rx,
                requested: false,
            },
        )
    }

    /// Hooks SIGINT, SIGTERM and SIGHUP.
    pub fn install() -> Result<Shutdown, ctrlc::Error> {
        let (trigger, shutdown) = Self::channel();
        ctrlc::set_handler(move || {
            log::info!("stopping...");
            trigger.trigger();
        })?;
        Ok(shutdown)
    }

    pub fn is_requested(&mut self) -> bool {
        if !self.requested {
            self.requested = self.rx.try_recv().is_ok();
        }
        self.requested
    }

    /// Sleeps up to `timeout`. Returns true if a stop was requested.
    pub fn wait(&mut self, timeout: Duration) -> bool {
        if self.requested {
            return true;
        }
        match self.rx.recv_timeout(timeout) {
            Ok(()) => self.requested = true,
            Err(RecvTimeoutError::Timeout) => {}
            // nobody left to trigger us, just sleep
            Err(RecvTimeoutError::Disconnected) => thread::sleep(timeout),
        }
        self.requested
    }
}
