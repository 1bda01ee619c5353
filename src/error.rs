//! Error taxonomy for dispatch.
//!
//! Only a small set of failures crosses the component boundary to the
//! caller: [`DispatchError::InvalidRequest`],
//! [`DispatchError::NoInstanceAvailable`], and the terminal pair
//! [`DispatchError::RetryExhausted`] / [`DispatchError::Transport`].
//! Everything the retry loop recovers from is absorbed into the next
//! attempt; observer failures are logged and never surfaced.

use crate::executor::TransportError;
use crate::instance::ServiceName;
use crate::request::ServiceResponse;
use http::StatusCode;
use std::fmt;

/// The failure retained from the most recent attempt.
#[derive(Debug, Clone)]
pub enum AttemptFailure {
    /// The transport delivered a response whose status the policy classified
    /// as a retryable failure.
    Status(ServiceResponse),
    /// The transport failed outright.
    Transport(TransportError),
}

impl AttemptFailure {
    /// The status code, when the failure was a classified response.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status(response) => Some(response.status()),
            Self::Transport(_) => None,
        }
    }

    /// The classified response, headers and body intact, for diagnostics.
    pub fn response(&self) -> Option<&ServiceResponse> {
        match self {
            Self::Status(response) => Some(response),
            Self::Transport(_) => None,
        }
    }

    /// The transport error, when the failure was one.
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            Self::Status(_) => None,
            Self::Transport(error) => Some(error),
        }
    }
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(response) => write!(f, "retryable status {}", response.status()),
            Self::Transport(error) => write!(f, "{}", error),
        }
    }
}

/// Terminal errors crossing the dispatch boundary.
#[derive(Debug, Clone)]
pub enum DispatchError {
    /// The caller named no usable service; nothing was attempted.
    InvalidRequest { reason: String },
    /// The selector could not produce an endpoint for the service.
    NoInstanceAvailable { service: ServiceName },
    /// The retry budget was spent; wraps the last failure for diagnostics.
    RetryExhausted { attempts: usize, last: Box<AttemptFailure> },
    /// A transport failure the policy declined to retry.
    Transport(TransportError),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRequest { reason } => write!(f, "invalid request: {}", reason),
            Self::NoInstanceAvailable { service } => {
                write!(f, "no instance available for service `{}`", service)
            }
            Self::RetryExhausted { attempts, last } => {
                write!(
                    f,
                    "retry budget exhausted after {} attempts; last outcome: {}",
                    attempts, last
                )
            }
            Self::Transport(error) => write!(f, "{}", error),
        }
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(error) => Some(error),
            Self::RetryExhausted { last, .. } => match last.as_ref() {
                AttemptFailure::Transport(error) => Some(error),
                AttemptFailure::Status(_) => None,
            },
            _ => None,
        }
    }
}

impl DispatchError {
    pub fn is_invalid_request(&self) -> bool {
        matches!(self, Self::InvalidRequest { .. })
    }

    pub fn is_no_instance_available(&self) -> bool {
        matches!(self, Self::NoInstanceAvailable { .. })
    }

    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, Self::RetryExhausted { .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Attempt count, for `RetryExhausted`.
    pub fn attempts(&self) -> Option<usize> {
        match self {
            Self::RetryExhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    /// The wrapped last failure, for `RetryExhausted`.
    pub fn last_failure(&self) -> Option<&AttemptFailure> {
        match self {
            Self::RetryExhausted { last, .. } => Some(last.as_ref()),
            _ => None,
        }
    }
}
