//! Telemetry stream adapter.
//!
//! A [`Subscription`] is the controller's view of one live telemetry feed:
//! an ordered receiver of [`StreamEvent`]s plus a [`CloseHandle`] to request
//! shutdown. The transport behind it is irrelevant to the controller;
//! [`ws::connect`] provides the WebSocket implementation.
//!
//! Guarantees made by [`forward`], the loop every transport runs:
//!
//! - messages are parsed and delivered in receipt order
//! - malformed messages are logged and dropped, never fatal
//! - exactly one [`StreamEvent::Closed`] is delivered, whether the remote
//!   side ended the stream or a local close was requested

pub mod ws;

use std::fmt;
use std::pin::pin;

use futures::{Stream, StreamExt};
use sim_api::TelemetrySample;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Capacity of the per-subscription event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How a telemetry stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Close frame, end of stream, or a locally requested close.
    Graceful,
    /// The connection dropped; results fetched afterwards may be partial.
    Abnormal(String),
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Graceful => write!(f, "graceful"),
            Termination::Abnormal(reason) => write!(f, "abnormal ({reason})"),
        }
    }
}

/// One item delivered by a subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A parsed telemetry sample.
    Sample(TelemetrySample),
    /// The backend sent an `{"error": ...}` message instead of telemetry.
    ServerError(String),
    /// The stream is finished. Always the last event.
    Closed(Termination),
}

/// Failure to open a subscription.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The transport could not connect.
    #[error("failed to open telemetry stream at {url}: {reason}")]
    Connect {
        /// Address that was dialed.
        url: String,
        /// Transport-level reason.
        reason: String,
    },
}

/// Requests shutdown of a subscription.
///
/// Dropping the handle has the same effect as calling [`CloseHandle::close`].
#[derive(Debug)]
pub struct CloseHandle {
    tx: Option<oneshot::Sender<()>>,
}

impl CloseHandle {
    /// Creates a handle and the receiver a forwarding loop listens on.
    pub fn new() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Requests a graceful close. Returns `false` if already requested.
    pub fn close(&mut self) -> bool {
        match self.tx.take() {
            Some(tx) => {
                // The loop may already be gone; that is not an error.
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }
}

/// A live telemetry feed for one run.
#[derive(Debug)]
pub struct Subscription {
    events: mpsc::Receiver<StreamEvent>,
    close: CloseHandle,
}

impl Subscription {
    /// Assembles a subscription from its parts.
    pub fn new(events: mpsc::Receiver<StreamEvent>, close: CloseHandle) -> Self {
        Self { events, close }
    }

    /// Spawns [`forward`] over `frames` and returns the subscription fed by it.
    ///
    /// `on_local_close` runs after the loop ends because of a local close
    /// request (or because the subscription was dropped), giving the
    /// transport a chance to say goodbye to the remote side.
    pub fn spawn<S, E, F, Fut>(frames: S, on_local_close: F) -> Self
    where
        S: Stream<Item = Result<String, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (close, shutdown) = CloseHandle::new();
        tokio::spawn(async move {
            if forward(frames, events_tx, shutdown).await == Ending::Local {
                on_local_close().await;
            }
        });
        Self::new(events_rx, close)
    }

    /// Splits into the event receiver and the close handle.
    pub fn into_parts(self) -> (mpsc::Receiver<StreamEvent>, CloseHandle) {
        (self.events, self.close)
    }
}

/// Why [`forward`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ending {
    /// Close was requested locally or the consumer went away.
    Local,
    /// The remote side ended the stream, cleanly or not.
    Remote,
}

/// Pumps raw text frames into `events` until the stream ends or `shutdown`
/// fires, then delivers the single closing event.
///
/// A frame stream that ends is a graceful close; an `Err` item is an
/// abnormal one.
pub async fn forward<S, E>(
    frames: S,
    events: mpsc::Sender<StreamEvent>,
    mut shutdown: oneshot::Receiver<()>,
) -> Ending
where
    S: Stream<Item = Result<String, E>>,
    E: fmt::Display,
{
    let mut frames = pin!(frames);
    let mut delivered: u64 = 0;
    let mut dropped: u64 = 0;

    let (ending, termination) = loop {
        let frame = tokio::select! {
            biased;
            _ = &mut shutdown => break (Ending::Local, Termination::Graceful),
            frame = frames.next() => frame,
        };

        match frame {
            None => break (Ending::Remote, Termination::Graceful),
            Some(Err(e)) => break (Ending::Remote, Termination::Abnormal(e.to_string())),
            Some(Ok(text)) => match classify(&text) {
                Some(event) => {
                    if events.send(event).await.is_err() {
                        debug!("telemetry consumer dropped, stopping stream");
                        return Ending::Local;
                    }
                    delivered += 1;
                }
                None => dropped += 1,
            },
        }
    };

    debug!(delivered, dropped, termination = %termination, "telemetry stream ended");
    // The consumer may have gone away in the meantime.
    let _ = events.send(StreamEvent::Closed(termination)).await;
    ending
}

/// Turns one text frame into an event, or `None` if it is malformed.
fn classify(text: &str) -> Option<StreamEvent> {
    match TelemetrySample::parse(text) {
        Ok(sample) => Some(StreamEvent::Sample(sample)),
        Err(parse_error) => {
            if let Some(message) = server_error(text) {
                return Some(StreamEvent::ServerError(message));
            }
            warn!(error = %parse_error, "dropping malformed telemetry message");
            None
        }
    }
}

fn server_error(text: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    value.get("error")?.as_str().map(String::from)
}
