//! Common data types used across the data_capture subsystem.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Activity type recorded for throttled scroll/mouse signals.
pub const USER_INTERACTION: &str = "user_interaction";

/// Identity and page metadata of one page view.
///
/// Built once when the coordinator mounts and shared by reference with the
/// sync transport, which injects `session_id` and `page` into every event it
/// flattens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub session_id: String,
    pub page: String,
    /// Epoch milliseconds at mount.
    pub page_load_time: i64,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub base_url: String,
}

/// Event as buffered in the local store.
///
/// Events do not carry the session identity individually except for `Init`;
/// the transport re-attaches it from the [`SessionContext`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum RawEvent {
    Init {
        session_id: String,
        page: String,
        page_load_time: i64,
        viewport_width: u32,
        viewport_height: u32,
    },
    Click {
        x: f64,
        y: f64,
        timestamp: i64,
    },
    Activity {
        activity_type: String,
        timestamp: i64,
    },
}

impl RawEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            RawEvent::Init { .. } => "init",
            RawEvent::Click { .. } => "click",
            RawEvent::Activity { .. } => "activity",
        }
    }
}

/// A buffered event together with its sequence key.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    pub seq: i64,
    pub event: RawEvent,
}

/// Payload of the `Init` worker message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitData {
    pub session_id: String,
    pub current_path: String,
    pub page_load_time: i64,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub base_url: String,
}

impl From<&SessionContext> for InitData {
    fn from(context: &SessionContext) -> Self {
        Self {
            session_id: context.session_id.clone(),
            current_path: context.page.clone(),
            page_load_time: context.page_load_time,
            viewport_width: context.viewport_width,
            viewport_height: context.viewport_height,
            base_url: context.base_url.clone(),
        }
    }
}

/// Messages accepted by the capture worker, processed strictly in send order.
#[derive(Debug)]
pub enum WorkerMessage {
    Init(InitData),
    Click { x: f64, y: f64 },
    Activity { activity_type: String },
    /// A flush is about to happen. `ack` completes once every earlier
    /// message has been handled.
    SendAnalytics { ack: Option<oneshot::Sender<()>> },
}

/// Raw interaction signal coming from the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InteractionSignal {
    Click { x: f64, y: f64 },
    Scroll,
    MouseMove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalParseError(pub String);

impl fmt::Display for SignalParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid interaction signal: {}", self.0)
    }
}

impl std::error::Error for SignalParseError {}

/// Parses the line format used by the stdin host: `click <x> <y>`, `scroll`
/// or `mousemove`.
impl FromStr for InteractionSignal {
    type Err = SignalParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let signal = match parts.next() {
            Some("click") => {
                let mut coord = || -> Result<f64, SignalParseError> {
                    parts
                        .next()
                        .ok_or_else(|| SignalParseError(line.to_string()))?
                        .parse::<f64>()
                        .map_err(|_| SignalParseError(line.to_string()))
                };
                let x = coord()?;
                let y = coord()?;
                InteractionSignal::Click { x, y }
            }
            Some("scroll") => InteractionSignal::Scroll,
            Some("mousemove") => InteractionSignal::MouseMove,
            _ => return Err(SignalParseError(line.to_string())),
        };
        if parts.next().is_some() {
            return Err(SignalParseError(line.to_string()));
        }
        Ok(signal)
    }
}
