//! The node runtime: message processing, forwarding and the advertiser.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use checkmesh_checks::ParamsGroup;

use crate::config::Config;
use crate::error::Error;
use crate::history::History;
use crate::membership::{Member, Membership};
use crate::message::{Message, MsgKind};
use crate::selector::select_peers;
use crate::util::rand_str;

const MESSAGE_ID_LEN: usize = 16;

pub struct Node<M> {
    name: String,
    membership: M,
    history: History,
    gossip_fanout: usize,
    advertise_interval: Duration,
    done: watch::Sender<bool>,
}

impl<M: Membership> Node<M> {
    pub fn new(config: &Config, membership: M) -> Arc<Self> {
        let (done, _) = watch::channel(false);

        Arc::new(Node {
            name: membership.local().name,
            history: History::new(config.id_ring, config.message_ring),
            gossip_fanout: config.gossip_fanout,
            advertise_interval: config.advertise_interval,
            membership,
            done,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn membership(&self) -> &M {
        &self.membership
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Start the inbound dispatcher and the periodic advertiser.
    pub fn start(self: &Arc<Self>, inbound: mpsc::Receiver<Bytes>) {
        tokio::spawn(self.clone().inbound_loop(inbound));
        tokio::spawn(self.clone().advertise_loop());
    }

    /// Stop the advertiser, leave the cluster and shut the transport down.
    /// Outstanding check executions are left to finish on their own.
    pub async fn shutdown(&self) {
        let _ = self.done.send(true);

        if let Err(err) = self.membership.leave(Duration::from_secs(1)).await {
            warn!(error = %err, "failed to leave cleanly");
        }
        self.membership.shutdown().await;
    }

    /// Create a message originating at this node. The caller fills in the
    /// payload.
    pub fn new_message(&self, kind: MsgKind) -> Message {
        Message {
            kind,
            id: rand_str(MESSAGE_ID_LEN),
            orig_node: self.name.clone(),
            src_node: self.name.clone(),
            params: ParamsGroup::default(),
            message_ids: Vec::new(),
        }
    }

    /// Process one message, whether it arrived on the wire or originated
    /// locally.
    ///
    /// Returns the first fatal error; dissemination failures are recoverable
    /// through the advertise/request cycle and never stop the node.
    pub async fn process_message(&self, message: Message) -> Result<(), Error> {
        if !message.is_one_off() && self.history.observe(&message) {
            debug!(id = %message.id, "ignoring message seen before");
            return Ok(());
        }

        match message.kind {
            MsgKind::RunChecks => self.on_run_checks(message).await,
            MsgKind::AdvertiseMsgs => self.on_advertise(message).await,
            MsgKind::RequestMsgs => self.on_request(message).await,
            MsgKind::InstallChecks | MsgKind::DeleteChecks | MsgKind::CheckFailed => {
                // Reserved kinds: accepted and dropped, never originated.
                debug!(kind = ?message.kind, "dropping reserved message kind");
                Ok(())
            }
        }
    }

    /// Run the carried checks locally and forward the message to a few
    /// random peers, excluding whoever already had a copy.
    async fn on_run_checks(&self, mut message: Message) -> Result<(), Error> {
        info!(
            id = %message.id,
            orig = %message.orig_node,
            checks = message.params.len(),
            "received checks to run"
        );

        let params = message.params.clone();
        tokio::spawn(async move {
            for (name, err) in params.run().await {
                warn!(check = %name, error = %err, "check failed");
            }
        });

        let members = self.membership.members();
        let peers = select_peers(
            self.gossip_fanout,
            &members,
            &[
                message.src_node.as_str(),
                message.orig_node.as_str(),
                self.name.as_str(),
            ],
        );

        message.src_node = self.name.clone();
        self.send_message(&message, &peers).await
    }

    /// Ask the advertiser for whatever we have not seen yet.
    async fn on_advertise(&self, message: Message) -> Result<(), Error> {
        let missing = self.history.missing_ids(&message.message_ids);
        if missing.is_empty() {
            return Ok(());
        }

        debug!(
            count = missing.len(),
            advertiser = %message.orig_node,
            "requesting missing messages"
        );

        let advertiser = self
            .member_named(&message.orig_node)
            .ok_or_else(|| Error::PeerDisappeared(message.orig_node.clone()))?;

        let mut request = self.new_message(MsgKind::RequestMsgs);
        request.message_ids = missing;
        self.send_message(&request, std::slice::from_ref(&advertiser))
            .await
    }

    /// Retransmit the requested messages we still remember.
    async fn on_request(&self, message: Message) -> Result<(), Error> {
        let requester = self
            .member_named(&message.orig_node)
            .ok_or_else(|| Error::PeerDisappeared(message.orig_node.clone()))?;

        for mut stored in self.history.get_messages(&message.message_ids) {
            stored.src_node = self.name.clone();

            // A failure here likely means the network is unhealthy; stop and
            // let the next advertise cycle retry.
            self.send_message(&stored, std::slice::from_ref(&requester))
                .await?;
        }
        Ok(())
    }

    /// Encode once and transmit to every recipient. Succeeds when at least
    /// one recipient got the message; per-recipient failures are only logged.
    pub async fn send_message(
        &self,
        message: &Message,
        recipients: &[Member],
    ) -> Result<(), Error> {
        if recipients.is_empty() {
            return Ok(());
        }

        let bytes = message.encode()?;

        let mut failed = 0;
        for recipient in recipients {
            if let Err(err) = self.membership.send_reliable(recipient, bytes.clone()).await {
                warn!(peer = %recipient.name, error = %err, "failed to send message");
                failed += 1;
            }
        }

        if failed == recipients.len() {
            return Err(Error::SendFailed(failed));
        }
        Ok(())
    }

    async fn inbound_loop(self: Arc<Self>, mut inbound: mpsc::Receiver<Bytes>) {
        while let Some(bytes) = inbound.recv().await {
            let message = match Message::decode(&bytes) {
                Ok(message) => message,
                Err(err) => {
                    warn!(error = %err, "received a malformed message");
                    continue;
                }
            };

            let node = self.clone();
            tokio::spawn(async move {
                if let Err(err) = node.process_message(message).await {
                    warn!(error = %err, "failed to process message");
                }
            });
        }

        debug!("inbound channel closed");
    }

    async fn advertise_loop(self: Arc<Self>) {
        let mut done = self.done.subscribe();
        let mut ticker = interval_at(
            Instant::now() + self.advertise_interval,
            self.advertise_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.advertise_once().await {
                        warn!(error = %err, "advertising failed");
                    }
                }
                _ = done.changed() => {
                    debug!("advertiser stopping");
                    return;
                }
            }
        }
    }

    /// Gossip the ids of every remembered message to a few random peers.
    /// The advertised set is bounded by the message ring size.
    async fn advertise_once(&self) -> Result<(), Error> {
        let ids = self.history.message_ids();
        if ids.is_empty() {
            return Ok(());
        }

        let mut message = self.new_message(MsgKind::AdvertiseMsgs);
        message.message_ids = ids;

        let members = self.membership.members();
        let peers = select_peers(self.gossip_fanout, &members, &[self.name.as_str()]);
        self.send_message(&message, &peers).await
    }

    fn member_named(&self, name: &str) -> Option<Member> {
        self.membership
            .members()
            .into_iter()
            .find(|member| member.name == name)
    }
}
