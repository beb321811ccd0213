//! Daemon entry point: loads config, brings up the line-protocol accept
//! loop and worker pool, then launches the HTTP gateway on the same
//! async runtime (spec §6: "one process, two front doors").

use citadel_core::config::CitadelConfig;
use citadel_core::context::ServerContext;
use citadel_core::http;
use citadel_core::pool::SessionPool;
use citadel_core::protocol::commands::InstantMessageQueues;
use citadel_core::server::{self, WorkerPool};
use std::sync::Arc;
use tracing::info;

#[rocket::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = CitadelConfig::from_env();
    std::fs::create_dir_all(&config.data_dir).expect("create data dir");

    let ctx = Arc::new(ServerContext::new(config.clone()));
    let im_queues = Arc::new(InstantMessageQueues::default());

    let worker_pool = Arc::new(WorkerPool::start(config.worker_threads, ctx.clone(), im_queues));

    let _tcp_acceptor = server::spawn_tcp_acceptor(
        (std::net::IpAddr::from([0, 0, 0, 0]), config.tcp_port),
        worker_pool.clone(),
    )
    .expect("bind line protocol TCP listener");

    let _uds_acceptor = server::spawn_uds_acceptor(config.socket_path(), worker_pool.clone())
        .expect("bind line protocol unix socket listener");

    info!(tcp_port = config.tcp_port, http_port = config.http_port, "citadel-core starting");

    let pool = SessionPool::new();
    let rocket = http::build_rocket(ctx, pool);
    if let Err(e) = rocket.launch().await {
        tracing::error!(error = %e, "rocket shut down with error");
    }
}
