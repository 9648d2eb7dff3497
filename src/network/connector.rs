// network/connector.rs - Bootstrap Peer Connector

//! Walks the bootstrap candidate list in priority order until one candidate
//! yields a live subscription.

use thiserror::Error;
use tracing::{info, warn};

use super::transport::{ContentFilter, Subscription, Transport, TransportError};
use crate::observability;

/// Connection errors
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("All {attempts} bootstrap candidates failed")]
    ExhaustedFailure { attempts: usize },
}

/// Per-candidate result
#[derive(Debug)]
pub enum ConnectionOutcome {
    Connected { candidate: String },
    Failed { candidate: String, reason: String },
}

impl ConnectionOutcome {
    pub fn candidate(&self) -> &str {
        match self {
            ConnectionOutcome::Connected { candidate } => candidate,
            ConnectionOutcome::Failed { candidate, .. } => candidate,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionOutcome::Connected { .. })
    }
}

/// Successful connection with the per-candidate history that led to it
#[derive(Debug)]
pub struct Connection {
    pub subscription: Subscription,
    pub outcomes: Vec<ConnectionOutcome>,
}

impl Connection {
    /// The candidate that produced the subscription
    pub fn connected_to(&self) -> Option<&str> {
        self.outcomes
            .iter()
            .find(|o| o.is_connected())
            .map(|o| o.candidate())
    }
}

async fn try_candidate<T: Transport>(
    candidate: &str,
    transport: &T,
    filter: &ContentFilter,
) -> Result<Subscription, TransportError> {
    let address = transport.parse_address(candidate)?;
    transport.add_peer(&address).await?;
    transport.subscribe(filter).await
}

/// Try each candidate in order.
///
/// Stops at the first candidate whose address parses, whose peer
/// registration succeeds and whose subscription opens. Later candidates are
/// never attempted.
pub async fn connect<T: Transport>(
    candidates: &[String],
    transport: &T,
    filter: &ContentFilter,
) -> Result<Connection, ConnectError> {
    let mut outcomes = Vec::with_capacity(candidates.len());

    for (index, candidate) in candidates.iter().enumerate() {
        info!(index, %candidate, "Trying bootstrap candidate");
        match try_candidate(candidate, transport, filter).await {
            Ok(subscription) => {
                info!(%candidate, "Subscribed via bootstrap candidate");
                observability::record_bootstrap_attempt(true);
                outcomes.push(ConnectionOutcome::Connected {
                    candidate: candidate.clone(),
                });
                return Ok(Connection {
                    subscription,
                    outcomes,
                });
            }
            Err(e) => {
                warn!(index, %candidate, error = %e, "Bootstrap candidate failed");
                observability::record_bootstrap_attempt(false);
                outcomes.push(ConnectionOutcome::Failed {
                    candidate: candidate.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    Err(ConnectError::ExhaustedFailure {
        attempts: outcomes.len(),
    })
}
