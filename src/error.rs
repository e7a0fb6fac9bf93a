//! Error types for routing collaborators and partition runs.
//!
//! Conditions the algorithms recover from locally (no route under the
//! current barriers, a point with no reachable facility, a rebalancing loop
//! that stalls) are reported as values on the outcomes, not as errors.

use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum RoutingError {
    /// The collaborator cannot provide the capability a run needs.
    Unavailable(String),
    Http(reqwest::Error),
    InvalidResponse(String),
}

impl From<reqwest::Error> for RoutingError {
    fn from(err: reqwest::Error) -> Self {
        RoutingError::Http(err)
    }
}

impl fmt::Display for RoutingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingError::Unavailable(what) => write!(f, "routing capability unavailable: {what}"),
            RoutingError::Http(err) => write!(f, "routing request failed: {err}"),
            RoutingError::InvalidResponse(msg) => write!(f, "invalid routing response: {msg}"),
        }
    }
}

impl Error for RoutingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RoutingError::Http(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum PartitionError {
    /// Fatal: raised before any facility or point is mutated.
    CapabilityUnavailable(String),
    /// A collaborator call failed. Aborts the run without partial output.
    Routing {
        operation: &'static str,
        context: String,
        source: RoutingError,
    },
    InvalidInput(String),
}

impl PartitionError {
    pub(crate) fn routing(operation: &'static str, context: impl Into<String>, source: RoutingError) -> Self {
        match source {
            RoutingError::Unavailable(what) => PartitionError::CapabilityUnavailable(what),
            source => PartitionError::Routing {
                operation,
                context: context.into(),
                source,
            },
        }
    }
}

impl fmt::Display for PartitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionError::CapabilityUnavailable(what) => {
                write!(f, "required routing capability is not available: {what}")
            }
            PartitionError::Routing {
                operation,
                context,
                source,
            } => write!(f, "{operation} failed ({context}): {source}"),
            PartitionError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
        }
    }
}

impl Error for PartitionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PartitionError::Routing { source, .. } => Some(source),
            _ => None,
        }
    }
}
