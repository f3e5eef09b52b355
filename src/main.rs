// author: kodeholic (powered by Claude)

use clap::Parser;
use mini_pixelcanvas::{run_server, ServerArgs};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // 환경 변수 기반 로깅 초기화 (기본값: info)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = ServerArgs::parse();
    if let Err(e) = run_server(args).await {
        error!("[mini-pixelcanvas] server stopped: {}", e);
        std::process::exit(1);
    }
}
