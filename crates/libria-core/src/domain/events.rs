//! Event names and payloads shared by every participant.
//!
//! Event names are process-wide constants.  A host and a UI process only
//! understand each other when both use the same string, so renaming one of
//! these is a breaking change for the pair.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Any serializable value carried by an event.  Void events carry `Null`.
pub type Payload = Value;

/// An error reported by application code (typically a failed catalog request).
pub const ERROR_EMIT: &str = "error:emit";

/// Request to show the application's about panel.
pub const APP_ABOUT: &str = "app:about";

/// Request to open the developer tools of the main window.
pub const APP_DEVTOOLS_MAIN: &str = "app:devtools:main";

/// Request to open the developer tools of the torrent window.
pub const APP_DEVTOOLS_TORRENT: &str = "app:devtools:torrent";

/// Every event name known to this crate.
pub const ALL: &[&str] = &[ERROR_EMIT, APP_ABOUT, APP_DEVTOOLS_MAIN, APP_DEVTOOLS_TORRENT];

/// Payload of [`ERROR_EMIT`].
///
/// ```json
/// {"message":"network timeout","detail":{"status":504}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Human-readable summary shown to the user.
    pub message: String,
    /// Optional structured detail (status codes, request ids, cause chain).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl ErrorReport {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Builds a report from an error and its `source()` chain.
    ///
    /// The top-level `Display` becomes the message; the sources are listed
    /// under `detail.causes`, outermost first.
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(Value::String(cause.to_string()));
            source = cause.source();
        }
        let report = Self::new(error.to_string());
        if causes.is_empty() {
            report
        } else {
            report.with_detail(json!({ "causes": causes }))
        }
    }

    pub fn to_payload(&self) -> Payload {
        // An ErrorReport contains only strings and JSON values, which always serialize.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn from_payload(payload: &Payload) -> Result<Self, serde_json::Error> {
        Self::deserialize(payload)
    }
}
