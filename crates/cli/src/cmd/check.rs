use std::net::SocketAddr;
use std::path::Path;

use eyre::{eyre, Result};

use checkmesh_node::api::Request;

use crate::checksfile;
use crate::client;

pub async fn run_global(server: SocketAddr, file: &Path) -> Result<()> {
    let checks = checksfile::load(file)?;
    let response = client::request(server, &Request::RunGlobal { checks }).await?;

    match response.error {
        Some(error) => Err(eyre!(error)),
        None => {
            println!("Checks submitted to the cluster.");
            Ok(())
        }
    }
}

pub async fn run_local(server: SocketAddr, file: &Path) -> Result<()> {
    let checks = checksfile::load(file)?;
    let response = client::request(server, &Request::RunLocal { checks }).await?;

    match response.error {
        Some(error) => Err(eyre!(error)),
        None => {
            println!("All checks passed.");
            Ok(())
        }
    }
}

pub async fn list_members(server: SocketAddr) -> Result<()> {
    let response = client::request(server, &Request::ListMembers).await?;

    if let Some(error) = response.error {
        return Err(eyre!(error));
    }

    for member in response.members {
        println!("{}\t{}", member.name, member.addr);
    }
    Ok(())
}
