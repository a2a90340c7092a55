use thiserror::Error;

use crate::membership::MembershipError;

#[derive(Debug, Error)]
pub enum Error {
    /// The datagram could not be decoded into a message.
    #[error("malformed message: {0}")]
    MalformedMessage(#[source] serde_cbor::Error),

    /// A message could not be encoded, e.g. it carries an unregistered
    /// check type.
    #[error("message encoding failed: {0}")]
    Encode(#[source] serde_cbor::Error),

    /// An advertise or request message references a node that is no longer
    /// in the roster.
    #[error("peer {0} is no longer a cluster member")]
    PeerDisappeared(String),

    /// Every recipient of a send failed.
    #[error("sending message to all {0} recipients failed")]
    SendFailed(usize),

    #[error(transparent)]
    Membership(#[from] MembershipError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
