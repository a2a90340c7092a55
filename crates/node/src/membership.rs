//! The membership contract the node runtime builds on.
//!
//! The dissemination engine only needs a live roster of uniquely-named
//! members, reliable unicast to one of them, and a stream of inbound
//! datagrams. Anything that provides those (a SWIM library, the bundled
//! [`mesh`] implementation, an in-memory fake in tests) can carry the
//! gossip protocol.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod mesh;

pub use mesh::{Mesh, MeshConfig};

/// A member of the cluster, with its stable unique name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub name: String,
    pub addr: SocketAddr,
}

#[derive(Debug, Error)]
pub enum MembershipError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not reach any seed node")]
    JoinFailed,

    #[error("unexpected frame from peer")]
    Protocol,
}

/// Roster and transport provider.
///
/// Inbound datagrams are delivered through the channel handed out when the
/// implementation is created; senders see them only as opaque bytes.
#[async_trait]
pub trait Membership: Send + Sync + 'static {
    /// The local member.
    fn local(&self) -> Member;

    /// The current live roster, including the local member.
    fn members(&self) -> Vec<Member>;

    /// Deliver `bytes` to one member over the reliable transport.
    async fn send_reliable(&self, to: &Member, bytes: Bytes) -> Result<(), MembershipError>;

    /// Announce departure to the cluster, best effort within `deadline`.
    async fn leave(&self, deadline: Duration) -> Result<(), MembershipError>;

    /// Stop serving inbound traffic.
    async fn shutdown(&self);
}
