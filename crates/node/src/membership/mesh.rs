//! A minimal TCP mesh implementing the [`Membership`] contract.
//!
//! Members hold a full roster exchanged at join time and dial a fresh
//! connection per datagram. There is no failure detection: this is a
//! stand-in for a SWIM-style layer, not one itself. The gossip protocol
//! above only requires the contract, so swapping in a real membership
//! library is a matter of implementing the trait.

use std::collections::BTreeMap;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::membership::{Member, Membership, MembershipError};
use crate::util::rand_str;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_FRAME_SIZE: usize = 4 * 1024 * 1024; // 4 MiB
const INBOUND_BUFFER: usize = 1024;

#[derive(Clone, Debug)]
pub struct MeshConfig {
    /// Address the listener binds to. Port 0 picks a free port.
    pub bind: SocketAddr,
    /// Address advertised to peers, when it differs from `bind`.
    pub advertise: Option<SocketAddr>,
    /// Human-readable prefix of the generated unique member name.
    pub moniker: String,
}

type Roster = Arc<RwLock<BTreeMap<String, SocketAddr>>>;

pub struct Mesh {
    local: Member,
    roster: Roster,
    acceptor: JoinHandle<()>,
}

impl Mesh {
    /// Bind the listener and start accepting framed connections. Returns the
    /// mesh handle and the channel on which inbound datagrams are delivered.
    pub async fn bind(config: MeshConfig) -> io::Result<(Mesh, mpsc::Receiver<Bytes>)> {
        let listener = TcpListener::bind(config.bind).await?;
        let addr = config.advertise.unwrap_or(listener.local_addr()?);
        if addr.ip().is_unspecified() {
            warn!(%addr, "advertised address is unspecified, peers cannot dial it; set an advertise address");
        }

        // A random suffix keeps names unique even when monikers collide.
        let name = format!("{}_{}", config.moniker, rand_str(8));
        let local = Member { name: name.clone(), addr };

        let roster: Roster = Arc::new(RwLock::new(BTreeMap::from([(name, addr)])));
        let (tx_inbound, rx_inbound) = mpsc::channel(INBOUND_BUFFER);

        let acceptor = tokio::spawn(accept_loop(listener, roster.clone(), tx_inbound));

        debug!(name = %local.name, %addr, "mesh listening");

        Ok((
            Mesh {
                local,
                roster,
                acceptor,
            },
            rx_inbound,
        ))
    }

    /// Dial each seed, announce ourselves and merge its roster into ours.
    /// Returns how many seeds responded; fails only when none did.
    pub async fn join(&self, seeds: &[SocketAddr]) -> Result<usize, MembershipError> {
        let mut joined = 0;

        for &seed in seeds {
            match self.join_seed(seed).await {
                Ok(members) => {
                    joined += 1;
                    debug!(%seed, members, "joined seed");
                }
                Err(err) => warn!(%seed, error = %err, "failed to join seed"),
            }
        }

        if !seeds.is_empty() && joined == 0 {
            return Err(MembershipError::JoinFailed);
        }
        Ok(joined)
    }

    async fn join_seed(&self, seed: SocketAddr) -> Result<usize, MembershipError> {
        let mut stream = connect(seed).await?;
        Frame::Join(self.local.clone()).write(&mut stream).await?;

        let frame = match timeout(CONNECT_TIMEOUT, Frame::read(&mut stream)).await {
            Ok(frame) => frame?,
            Err(_) => {
                return Err(MembershipError::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "seed did not answer in time",
                )))
            }
        };

        let Frame::Roster(members) = frame else {
            return Err(MembershipError::Protocol);
        };

        let count = members.len();
        let mut roster = self.roster.write().unwrap();
        for member in members {
            roster.insert(member.name, member.addr);
        }
        Ok(count)
    }
}

#[async_trait]
impl Membership for Mesh {
    fn local(&self) -> Member {
        self.local.clone()
    }

    fn members(&self) -> Vec<Member> {
        self.roster
            .read()
            .unwrap()
            .iter()
            .map(|(name, addr)| Member {
                name: name.clone(),
                addr: *addr,
            })
            .collect()
    }

    async fn send_reliable(&self, to: &Member, bytes: Bytes) -> Result<(), MembershipError> {
        let mut stream = connect(to.addr).await?;
        Frame::Data(bytes).write(&mut stream).await?;
        stream.shutdown().await?;
        Ok(())
    }

    async fn leave(&self, deadline: Duration) -> Result<(), MembershipError> {
        let local = self.local.clone();
        let others: Vec<Member> = self
            .members()
            .into_iter()
            .filter(|m| m.name != local.name)
            .collect();

        let notify = async {
            for member in others {
                if let Ok(mut stream) = connect(member.addr).await {
                    let _ = Frame::Leave(local.name.clone()).write(&mut stream).await;
                }
            }
        };

        match timeout(deadline, notify).await {
            Ok(()) => Ok(()),
            Err(_) => Err(MembershipError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "leave deadline exceeded",
            ))),
        }
    }

    async fn shutdown(&self) {
        self.acceptor.abort();
    }
}

async fn connect(addr: SocketAddr) -> io::Result<TcpStream> {
    match timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
        Ok(stream) => stream,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            "connect timed out",
        )),
    }
}

async fn accept_loop(listener: TcpListener, roster: Roster, inbound: mpsc::Sender<Bytes>) {
    loop {
        let (stream, _) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(error = %err, "failed to accept connection");
                continue;
            }
        };

        tokio::spawn(handle_conn(stream, roster.clone(), inbound.clone()));
    }
}

/// Every connection carries exactly one frame.
async fn handle_conn(mut stream: TcpStream, roster: Roster, inbound: mpsc::Sender<Bytes>) {
    match Frame::read(&mut stream).await {
        Ok(Frame::Join(member)) => {
            debug!(peer = %member.name, addr = %member.addr, "member joined");

            let members: Vec<Member> = {
                let mut roster = roster.write().unwrap();
                roster.insert(member.name, member.addr);
                roster
                    .iter()
                    .map(|(name, addr)| Member {
                        name: name.clone(),
                        addr: *addr,
                    })
                    .collect()
            };

            if let Err(err) = Frame::Roster(members).write(&mut stream).await {
                warn!(error = %err, "failed to answer join");
            }
        }
        Ok(Frame::Data(bytes)) => {
            let _ = inbound.send(bytes).await;
        }
        Ok(Frame::Leave(name)) => {
            debug!(peer = %name, "member left");
            roster.write().unwrap().remove(&name);
        }
        Ok(Frame::Roster(_)) => warn!("unexpected roster frame"),
        Err(err) => debug!(error = %err, "connection closed before a full frame"),
    }
}

enum Frame {
    Join(Member),
    Roster(Vec<Member>),
    Data(Bytes),
    Leave(String),
}

impl Frame {
    /// Write the frame: discriminant, payload length, payload.
    async fn write<W: AsyncWriteExt + Unpin>(&self, writer: &mut W) -> io::Result<()> {
        let (discriminant, payload) = match self {
            Frame::Join(member) => (0x40, serde_cbor::to_vec(member).map_err(invalid_data)?),
            Frame::Roster(members) => (0x41, serde_cbor::to_vec(members).map_err(invalid_data)?),
            Frame::Data(bytes) => (0x42, bytes.to_vec()),
            Frame::Leave(name) => (0x43, name.as_bytes().to_vec()),
        };

        writer.write_u8(discriminant).await?;
        writer.write_u32(payload.len() as u32).await?;
        writer.write_all(&payload).await?;
        writer.flush().await
    }

    async fn read<R: AsyncReadExt + Unpin>(reader: &mut R) -> io::Result<Self> {
        let discriminant = reader.read_u8().await?;
        let len = reader.read_u32().await? as usize;
        if len > MAX_FRAME_SIZE {
            return Err(invalid_data(format!("frame of {len} bytes is too large")));
        }

        let mut payload = vec![0; len];
        reader.read_exact(&mut payload).await?;

        match discriminant {
            0x40 => serde_cbor::from_slice(&payload)
                .map(Frame::Join)
                .map_err(invalid_data),
            0x41 => serde_cbor::from_slice(&payload)
                .map(Frame::Roster)
                .map_err(invalid_data),
            0x42 => Ok(Frame::Data(Bytes::from(payload))),
            0x43 => String::from_utf8(payload)
                .map(Frame::Leave)
                .map_err(invalid_data),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid frame discriminant: {other}"),
            )),
        }
    }
}

fn invalid_data<E>(err: E) -> io::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    io::Error::new(io::ErrorKind::InvalidData, err)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn bind(moniker: &str) -> (Mesh, mpsc::Receiver<Bytes>) {
        Mesh::bind(MeshConfig {
            bind: "127.0.0.1:0".parse().unwrap(),
            advertise: None,
            moniker: moniker.to_string(),
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn join_exchanges_rosters() {
        let (mesh1, _rx1) = bind("one").await;
        let (mesh2, _rx2) = bind("two").await;
        let (mesh3, _rx3) = bind("three").await;

        mesh2.join(&[mesh1.local().addr]).await.unwrap();
        mesh3
            .join(&[mesh1.local().addr, mesh2.local().addr])
            .await
            .unwrap();

        for mesh in [&mesh1, &mesh2, &mesh3] {
            assert_eq!(mesh.members().len(), 3, "{}", mesh.local().name);
        }
    }

    #[tokio::test]
    async fn join_fails_when_no_seed_answers() {
        let (mesh, _rx) = bind("lonely").await;

        // Grab a free port and release it again: nothing listens there.
        let dead_addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };

        let err = mesh.join(&[dead_addr]).await.unwrap_err();
        assert!(matches!(err, MembershipError::JoinFailed));
    }

    #[tokio::test]
    async fn data_frames_reach_the_inbound_channel() {
        let (mesh1, _rx1) = bind("sender").await;
        let (mesh2, mut rx2) = bind("receiver").await;

        mesh1.join(&[mesh2.local().addr]).await.unwrap();

        let payload = Bytes::from_static(b"hello mesh");
        mesh1
            .send_reliable(&mesh2.local(), payload.clone())
            .await
            .unwrap();

        let received = timeout(Duration::from_secs(5), rx2.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, payload);
    }

    #[tokio::test]
    async fn leave_removes_the_member_from_rosters() {
        let (mesh1, _rx1) = bind("stayer").await;
        let (mesh2, _rx2) = bind("leaver").await;

        mesh2.join(&[mesh1.local().addr]).await.unwrap();
        assert_eq!(mesh1.members().len(), 2);

        mesh2.leave(Duration::from_secs(1)).await.unwrap();

        // The leave frame is processed by an accepted connection task.
        for _ in 0..50 {
            if mesh1.members().len() == 1 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("leaver still in the roster");
    }
}
