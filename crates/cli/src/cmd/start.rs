use eyre::Result;
use tracing::info;

use checkmesh_node::api;
use checkmesh_node::membership::{Mesh, MeshConfig};
use checkmesh_node::Node;

use crate::args::StartArgs;

pub async fn run(args: &StartArgs) -> Result<()> {
    let config = args.to_config();

    let (mesh, inbound) = Mesh::bind(MeshConfig {
        bind: config.bind,
        advertise: config.advertise,
        moniker: config.moniker.clone(),
    })
    .await?;

    let seeds = config.seed_addrs()?;
    let joined = mesh.join(&seeds).await?;

    let node = Node::new(&config, mesh);
    info!(name = %node.name(), joined, "node started");

    node.start(inbound);

    let (api_addr, _api_task) = api::serve(node.clone(), config.api_bind).await?;
    info!(%api_addr, "operator api listening");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    node.shutdown().await;

    Ok(())
}
