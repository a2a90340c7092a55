//! Operator-facing API: newline-delimited JSON over a local TCP socket.
//!
//! `run_global` wraps the batch in a RunChecks message and hands it to the
//! local node, which disseminates it and runs it locally in parallel.
//! `run_local` runs the batch synchronously and reports the first failure,
//! which makes it useful for validating a batch before going global.

use std::net::SocketAddr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use checkmesh_checks::{registry, Params, ParamsGroup};

use crate::error::Error;
use crate::membership::Membership;
use crate::message::MsgKind;
use crate::node::Node;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Run a batch of checks on every node of the cluster.
    RunGlobal { checks: Vec<Params> },
    /// Run a batch of checks on this node only.
    RunLocal { checks: Vec<Params> },
    /// List the members of the cluster known to this node.
    ListMembers,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<MemberInfo>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemberInfo {
    pub name: String,
    pub addr: String,
}

impl Response {
    pub fn ok() -> Self {
        Response::default()
    }

    pub fn error(message: impl Into<String>) -> Self {
        Response {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Bind the API listener and serve requests until the task is aborted.
/// Returns the bound address along with the serving task.
pub async fn serve<M: Membership>(
    node: Arc<Node<M>>,
    bind: SocketAddr,
) -> Result<(SocketAddr, JoinHandle<()>), Error> {
    let listener = TcpListener::bind(bind).await?;
    let addr = listener.local_addr()?;

    let task = tokio::spawn(async move {
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!(error = %err, "failed to accept api connection");
                    continue;
                }
            };

            debug!(%peer, "api client connected");
            tokio::spawn(handle_client(node.clone(), stream));
        }
    });

    Ok((addr, task))
}

async fn handle_client<M: Membership>(node: Arc<Node<M>>, stream: TcpStream) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => handle_request(&node, request).await,
            Err(err) => Response::error(format!("invalid request: {err}")),
        };

        let mut encoded = match serde_json::to_vec(&response) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(error = %err, "failed to encode api response");
                return;
            }
        };
        encoded.push(b'\n');

        if writer.write_all(&encoded).await.is_err() {
            return;
        }
    }
}

async fn handle_request<M: Membership>(node: &Arc<Node<M>>, request: Request) -> Response {
    match request {
        Request::RunGlobal { checks } => {
            let mut message = node.new_message(MsgKind::RunChecks);
            message.params = ParamsGroup::from(checks);

            match node.process_message(message).await {
                Ok(()) => Response::ok(),
                Err(err) => Response::error(err.to_string()),
            }
        }

        Request::RunLocal { checks } => {
            for params in &checks {
                let Some(checker) = registry::lookup(&params.check_type) else {
                    return Response::error(format!(
                        "check does not exist: {}",
                        params.check_type
                    ));
                };

                if let Err(err) = checker.run(params).await {
                    return Response::error(format!("{}: {err}", params.name));
                }
            }
            Response::ok()
        }

        Request::ListMembers => Response {
            members: node
                .membership()
                .members()
                .into_iter()
                .map(|member| MemberInfo {
                    name: member.name,
                    addr: member.addr.to_string(),
                })
                .collect(),
            ..Default::default()
        },
    }
}
