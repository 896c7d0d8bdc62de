// Error types
// -----------
// Every failure a run can hit is one of these variants. The library never
// recovers from them locally; they travel back to `main`, which logs one
// diagnostic and turns the variant into a process exit code.

use std::fmt;

/// Where in a run a transport error happened. `Setup` is building the
/// HTTP client, before any request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Setup,
    Login,
    Refill,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Setup => f.write_str("client setup"),
            Step::Login => f.write_str("login"),
            Step::Refill => f.write_str("refill request"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RefillError {
    /// Config file missing, unreadable, malformed or incomplete.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The portal did not accept the credentials, or dropped the session.
    #[error("authentication failed{}: {reason}", fmt_status(.status))]
    Authentication { status: Option<u16>, reason: String },

    /// The portal rejected the refill request after a good login.
    #[error("refill submission rejected{}: {message}", fmt_status(.status))]
    Submission { status: Option<u16>, message: String },

    /// Timeout, refused connection, DNS failure and friends.
    #[error("transport error during {step}: {source}")]
    Transport {
        step: Step,
        #[source]
        source: reqwest::Error,
    },

    /// Client operations called out of order.
    #[error("operation out of order: {0}")]
    Precondition(String),
}

fn fmt_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {})", code),
        None => String::new(),
    }
}

impl RefillError {
    /// Process exit code for this failure. Always non-zero.
    pub fn exit_code(&self) -> u8 {
        match self {
            RefillError::Precondition(_) => 1,
            RefillError::Configuration(_) => 2,
            RefillError::Authentication { .. } => 3,
            RefillError::Submission { .. } => 4,
            RefillError::Transport { .. } => 5,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RefillError::Transport { source, .. } if source.is_timeout())
    }

    /// HTTP status the portal answered with, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            RefillError::Authentication { status, .. } | RefillError::Submission { status, .. } => {
                *status
            }
            RefillError::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RefillError>;
