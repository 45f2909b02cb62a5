use crate::settings::Globals;
use copylink_server::AppState;

pub fn run(globals: &Globals, port: Option<u16>) -> anyhow::Result<()> {
    let config = globals.valid_config()?;
    for w in config.validate() {
        tracing::warn!("config: {}", w.message);
    }
    let port = port.unwrap_or(config.server.port);
    let providers = super::http_providers(&config)?;
    let state = AppState::new(config, providers);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
        let actual_port = listener.local_addr()?.port();
        println!("copylink → http://localhost:{actual_port}  (PID {})", std::process::id());

        let shutdown = state.shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
            }
            shutdown.cancel();
        });

        copylink_server::serve_on(state, listener).await
    })
}
