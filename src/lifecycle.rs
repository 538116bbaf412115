//! Cooperative start/stop plumbing shared by the producer and consumer threads.

use anyhow::{anyhow, Result};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Stop request shared between an owner and its worker thread.
///
/// Unlike a bare flag, a pending `sleep` is cut short as soon as stop is requested.
#[derive(Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request stop. Idempotent.
    pub fn request(&self) {
        let (flag, cvar) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }

    pub fn is_requested(&self) -> bool {
        let (flag, _) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for `duration` unless stop is requested first.
    ///
    /// Returns `true` when the sleep ended because of a stop request.
    pub fn sleep(&self, duration: Duration) -> bool {
        let (flag, cvar) = &*self.inner;
        let deadline = Instant::now() + duration;
        let mut stopped = flag.lock().unwrap_or_else(PoisonError::into_inner);
        while !*stopped {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            stopped = cvar
                .wait_timeout(stopped, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

/// A named worker thread plus the signal used to stop it.
pub struct Worker {
    name: String,
    stop: StopSignal,
    join: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn<F>(name: &str, stop: StopSignal, body: F) -> Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let join = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(body)
            .map_err(|e| anyhow!("failed to spawn {} thread: {}", name, e))?;
        log::info!("{} thread started", name);
        Ok(Self {
            name: name.to_string(),
            stop,
            join: Some(join),
        })
    }

    /// True once the thread body has returned (or was already joined).
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, |join| join.is_finished())
    }

    /// Wait for the thread to exit without requesting stop. Idempotent.
    pub fn join(&mut self) -> Result<()> {
        let Some(join) = self.join.take() else {
            return Ok(());
        };
        join.join()
            .map_err(|_| anyhow!("{} thread panicked", self.name))?;
        log::info!("{} thread stopped", self.name);
        Ok(())
    }

    /// Request stop and wait for the thread to exit. Idempotent.
    ///
    /// There is no join timeout: a thread stuck inside a blocking external call
    /// holds shutdown until that call returns.
    pub fn stop(&mut self) -> Result<()> {
        self.stop.request();
        self.join()
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if self.join.is_some() {
            if let Err(e) = self.stop() {
                log::error!("{}", e);
            }
        }
    }
}
