//! The wire unit of the gossip protocol and its CBOR codec.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use checkmesh_checks::ParamsGroup;

use crate::error::Error;

/// The kind of a gossip message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MsgKind {
    /// Run a batch of checks once, everywhere.
    #[default]
    RunChecks,
    /// Tells peers which messages the sender remembers. A small cluster or a
    /// small fan-out can leave gaps after the initial burst; advertising
    /// makes dissemination always eventually converge.
    AdvertiseMsgs,
    /// Sent in response to [`MsgKind::AdvertiseMsgs`] to request messages
    /// the receiver is missing.
    RequestMsgs,
    /// Install checks to run continually. Reserved, not implemented.
    InstallChecks,
    /// Remove installed checks. Reserved, not implemented.
    DeleteChecks,
    /// Feedback about a failed check. Reserved, not implemented.
    CheckFailed,
}

/// A message as transmitted between nodes. Exactly one of `params` and
/// `message_ids` is non-empty, depending on the kind.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub kind: MsgKind,
    /// Fresh random identifier assigned at origination, immutable afterwards.
    pub id: String,
    /// Node where the message originated, immutable afterwards.
    pub orig_node: String,
    /// Node that (re)sent this particular copy, rewritten at every hop.
    pub src_node: String,
    /// Checks carried by check-bearing kinds.
    #[serde(default, skip_serializing_if = "ParamsGroup::is_empty")]
    pub params: ParamsGroup,
    /// Ids carried by advertise and request kinds.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub message_ids: Vec<String>,
}

impl Message {
    /// Whether this message is a one-off that must not enter the history:
    /// it carries nothing worth retransmitting.
    pub fn is_one_off(&self) -> bool {
        matches!(self.kind, MsgKind::AdvertiseMsgs | MsgKind::RequestMsgs)
    }

    /// Encode into the self-describing wire form. Fails when a carried check
    /// type is not registered.
    pub fn encode(&self) -> Result<Bytes, Error> {
        serde_cbor::to_vec(self).map(Bytes::from).map_err(Error::Encode)
    }

    /// Decode from the wire form.
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        serde_cbor::from_slice(bytes).map_err(Error::MalformedMessage)
    }
}
