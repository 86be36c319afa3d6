//! Render scheduler
//!
//! Runs [`Session::tick`] on a dedicated thread at half the session latency,
//! so the ring is topped up twice for every full drain of queued audio.
//!
//! ```text
//! sndgraph-render thread
//!   loop {
//!     select! {
//!       stop  -> exit
//!       timer -> lock session, tick
//!     }
//!   }
//! ```
//!
//! Stopping is a channel disconnect noticed at the wait point; a tick already
//! in progress always finishes first.

use crate::backend::AudioBackend;
use crate::error::{SndError, SndResult};
use crate::session::Session;
use crossbeam::channel::{bounded, select, tick, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

/// Shortest timer period the loop will use
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

fn lock<B: AudioBackend>(session: &Mutex<Session<B>>) -> MutexGuard<'_, Session<B>> {
    session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle to a running render thread
///
/// Dropping the handle stops the thread.
pub struct RenderLoop {
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
    period: Duration,
}

impl RenderLoop {
    /// Start ticking `session` at half its latency
    ///
    /// # Errors
    /// - `SndError::NoSource` if the session has nothing attached
    /// - `SndError::AlreadyRunning` if another loop drives this session
    /// - `SndError::Io` if the thread cannot be spawned
    pub fn start<B>(session: Arc<Mutex<Session<B>>>) -> SndResult<Self>
    where
        B: AudioBackend + 'static,
    {
        let period = {
            let mut s = lock(&session);
            if s.running {
                return Err(SndError::AlreadyRunning);
            }
            let latency = s.latency().ok_or(SndError::NoSource)?;
            s.running = true;
            (latency / 2).max(MIN_PERIOD)
        };

        let (stop_tx, stop_rx) = bounded::<()>(0);
        let worker = Arc::clone(&session);

        let spawned = thread::Builder::new()
            .name("sndgraph-render".to_string())
            .spawn(move || Self::run(worker, stop_rx, period));

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                lock(&session).running = false;
                return Err(SndError::Io(e));
            }
        };

        info!(?period, "render loop started");
        Ok(Self {
            stop_tx: Some(stop_tx),
            thread: Some(handle),
            period,
        })
    }

    fn run<B: AudioBackend>(
        session: Arc<Mutex<Session<B>>>,
        stop_rx: Receiver<()>,
        period: Duration,
    ) {
        let timer = tick(period);
        loop {
            select! {
                recv(stop_rx) -> _ => break,
                recv(timer) -> _ => {
                    if let Err(e) = lock(&session).tick() {
                        error!("tick failed: {}", e);
                    }
                }
            }
        }

        lock(&session).running = false;
        debug!("render loop exited");
    }

    /// Timer period between ticks
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Signal the thread and wait for it to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Disconnecting the channel wakes the select
        self.stop_tx.take();
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                error!("render thread panicked");
            }
        }
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}
