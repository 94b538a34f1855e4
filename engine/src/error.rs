use thiserror::Error;

/// Failure of a single round trip to the device.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: &'static str,
        status: u16,
        body: String,
    },

    #[error("could not encode request body: {0}")]
    Encode(#[from] serde_json::Error),
}

impl DeviceError {
    pub fn transport(endpoint: &'static str, source: reqwest::Error) -> Self {
        Self::Transport { endpoint, source }
    }

    pub fn status(endpoint: &'static str, status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            endpoint,
            status,
            body: body.into(),
        }
    }

    /// Text the device sent along with a non-success status, if any.
    pub fn device_text(&self) -> Option<&str> {
        match self {
            Self::Status { body, .. } if !body.trim().is_empty() => Some(body.as_str()),
            _ => None,
        }
    }
}

/// Everything a panel operation can report back to the operator.
///
/// `Rejected` is a local validation failure: nothing was sent to the device and
/// no state changed. `Device` means the round trip itself failed and the
/// affected state machine has already been rolled back.
#[derive(Debug, Error)]
pub enum PanelError {
    #[error("{0}")]
    Rejected(String),

    #[error(transparent)]
    Device(#[from] DeviceError),

    /// The task carrying a device round trip panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl PanelError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

pub type PanelResult<T> = Result<T, PanelError>;
