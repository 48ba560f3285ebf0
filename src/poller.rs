//! Per-Device Polling
//!
//! A [`Poller`] owns one device. Once started it queries the device immediately,
//! then once per interval, and hands every successful result to a callback.
//!
//! # Lifecycle
//!
//! ```text
//! Idle --start()--> Running --stop() / ctx cancelled--> Stopping --> Stopped
//!   \_____________________stop()___________________________________/
//! ```
//!
//! # Cancellation
//!
//! The polling task waits on a single child token of the caller's
//! [`CancellationToken`]. Cancelling the parent or calling [`Poller::stop`] cancels
//! it. The same token is passed to the query and the callback, so an in-flight
//! smartctl invocation is aborted too.
//!
//! `stop()` may be called any number of times, concurrently or not. Exactly one
//! caller signals the task; every caller returns only after the task has exited.

use crate::error::Result;
use crate::smartctl::Data;
use futures_util::future::BoxFuture;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Queries one device: `(ctx, device) -> Data`
pub type QueryDeviceFn =
    Arc<dyn Fn(CancellationToken, String) -> BoxFuture<'static, Result<Data>> + Send + Sync>;

/// Receives each successful query result
pub type OnNewDataFn =
    Arc<dyn Fn(CancellationToken, Data) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PollerState {
    Idle = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl PollerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => PollerState::Idle,
            1 => PollerState::Running,
            2 => PollerState::Stopping,
            _ => PollerState::Stopped,
        }
    }
}

pub struct Poller {
    device: String,
    query_device: QueryDeviceFn,
    on_new_data: OnNewDataFn,
    state: Arc<AtomicU8>,
    /// Child of the caller's token, set once by `start`
    cancel: OnceLock<CancellationToken>,
    /// Cancelled when the polling task has exited
    exited: CancellationToken,
}

impl Poller {
    pub fn new(
        query_device: QueryDeviceFn,
        on_new_data: OnNewDataFn,
        device: impl Into<String>,
    ) -> Self {
        Self {
            device: device.into(),
            query_device,
            on_new_data,
            state: Arc::new(AtomicU8::new(PollerState::Idle as u8)),
            cancel: OnceLock::new(),
            exited: CancellationToken::new(),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn state(&self) -> PollerState {
        PollerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn transition(&self, from: PollerState, to: PollerState) -> bool {
        transition(&self.state, from, to)
    }

    /// Spawn the polling task; the first poll runs without waiting for the interval
    ///
    /// Must be called from within a tokio runtime. Only the first call on an idle
    /// poller has any effect.
    pub fn start(&self, ctx: &CancellationToken, interval: Duration) {
        let token = ctx.child_token();
        if self.cancel.set(token.clone()).is_err()
            || !self.transition(PollerState::Idle, PollerState::Running)
        {
            warn!(
                device = %self.device,
                state = ?self.state(),
                "Poller already started or stopped, ignoring start"
            );
            return;
        }

        let task = PollTask {
            device: self.device.clone(),
            query_device: Arc::clone(&self.query_device),
            on_new_data: Arc::clone(&self.on_new_data),
        };
        let state = Arc::clone(&self.state);
        let exited = self.exited.clone();

        tokio::spawn(async move {
            // The loop only exits on cancellation, so the watcher always completes.
            let watch_cancel = async {
                token.cancelled().await;
                transition(&state, PollerState::Running, PollerState::Stopping);
            };
            tokio::join!(task.run(&token, interval), watch_cancel);
            state.store(PollerState::Stopped as u8, Ordering::SeqCst);
            exited.cancel();
        });
    }

    /// Signal the polling task to stop and wait until it has exited
    pub async fn stop(&self) {
        loop {
            match self.state() {
                PollerState::Idle => {
                    if self.transition(PollerState::Idle, PollerState::Stopped) {
                        self.exited.cancel();
                        break;
                    }
                }
                PollerState::Running => {
                    if self.transition(PollerState::Running, PollerState::Stopping) {
                        if let Some(token) = self.cancel.get() {
                            token.cancel();
                        }
                        break;
                    }
                }
                PollerState::Stopping | PollerState::Stopped => break,
            }
        }

        self.exited.cancelled().await;
        debug!(device = %self.device, "Poller stopped");
    }
}

fn transition(state: &AtomicU8, from: PollerState, to: PollerState) -> bool {
    state
        .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
}

struct PollTask {
    device: String,
    query_device: QueryDeviceFn,
    on_new_data: OnNewDataFn,
}

impl PollTask {
    async fn run(&self, token: &CancellationToken, period: Duration) {
        info!(device = %self.device, interval = ?period, "Starting SMART data periodic poller");

        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.poll_and_report(token).await;
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => self.poll_and_report(token).await,
            }
        }

        debug!(device = %self.device, "Polling loop exited");
    }

    async fn poll_and_report(&self, token: &CancellationToken) {
        // The query function does its own logging; a failed cycle is simply skipped.
        let Ok(data) = (self.query_device)(token.clone(), self.device.clone()).await else {
            return;
        };
        (self.on_new_data)(token.clone(), data).await;
    }
}
