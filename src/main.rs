use std::sync::Arc;

use scene_bridge_mcp::{
    config::Config, dispatch::DispatchSettings, domain::scene::Scene, host::HostLoop,
    http::server::TransportServer, logging, AppState,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;
    let bind_socket = config.bind_socket()?;

    let scene = Scene::shared();
    let state = AppState::for_scene(
        Arc::clone(&scene),
        DispatchSettings {
            timeout: config.dispatch_timeout,
            policy: config.timeout_policy,
        },
    )
    .with_sse_keepalive(config.sse_keepalive);
    let dispatcher = Arc::clone(&state.dispatcher);

    let host = HostLoop::spawn(Arc::clone(&dispatcher), config.host_tick, move || {
        scene.lock().advance_frame();
    })?;

    info!(
        bind_addr = %config.bind_addr,
        bind_port = config.bind_port,
        timeout_ms = config.dispatch_timeout.as_millis(),
        "server starting"
    );

    let mut server = TransportServer::start(state, bind_socket, config.shutdown_timeout).await?;

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    server.stop().await;
    dispatcher.close();
    host.stop();
    Ok(())
}
