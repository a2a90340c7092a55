use std::net::SocketAddr;

use eyre::{eyre, Result, WrapErr};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use checkmesh_node::api::{Request, Response};

/// Send one request to the daemon's operator API and read the answer.
pub async fn request(server: SocketAddr, request: &Request) -> Result<Response> {
    let mut stream = TcpStream::connect(server)
        .await
        .wrap_err_with(|| format!("connecting to the daemon api at {server}"))?;

    let mut line = serde_json::to_vec(request)?;
    line.push(b'\n');
    stream.write_all(&line).await?;

    let (reader, _writer) = stream.split();
    let mut lines = BufReader::new(reader).lines();

    let answer = lines
        .next_line()
        .await?
        .ok_or_else(|| eyre!("the daemon closed the connection"))?;

    serde_json::from_str(&answer).wrap_err("decoding the daemon's response")
}
