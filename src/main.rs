use std::net::SocketAddr;

use futures::future::join_all;

mod api;
mod db;
mod engine;
mod util;

#[tokio::main]
async fn main() -> Result<(), api::server::RouteError> {
    util::tracing::init();

    tracing::info!("starting reviewer progression service");

    let (tx_server_ready, rx_server_ready) = tokio::sync::mpsc::unbounded_channel::<SocketAddr>();
    let handles = api::server::start_server(tx_server_ready, rx_server_ready).await?;

    _ = join_all(handles).await;

    Ok(())
}
