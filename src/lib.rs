// author: kodeholic (powered by Claude)

pub mod config;
pub mod control;
pub mod coordinator;
pub mod core;
pub mod error;
pub mod http;
pub mod protocol;
pub mod relay;
pub mod store;
pub mod trace;
pub mod utils;

use axum::{routing::get, Router};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::control::AdminChannel;
use crate::coordinator::Coordinator;
use crate::core::{CanvasGateway, CooldownManager};
use crate::error::CanvasResult;
use crate::http::HttpState;
use crate::protocol::{ws_handler, AppState};
use crate::relay::BroadcastRelay;
use crate::store::{MemoryBackend, PubSub, RedisBackend, SharedStore};
use crate::trace::TraceHub;

/// CLI / 환경변수에서 주입되는 런타임 설정
/// - 한도 값은 config.rs 상수
/// - 비밀값(ADMIN_SECRET_KEY)은 환경변수로 별도 관리
#[derive(Parser, Debug, Clone)]
#[command(name = "pcserver", about = "Realtime collaborative pixel canvas server")]
pub struct ServerArgs {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = config::DEFAULT_PORT)]
    pub port: u16,

    /// 미지정 시 프로세스 내 메모리 백엔드 (단일 노드)
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    #[arg(long, env = "ADMIN_SECRET_KEY", default_value = config::DEFAULT_ADMIN_SECRET, hide_env_values = true)]
    pub admin_secret: String,
}

/// 컴포넌트 조립 + 백그라운드 태스크 기동 (coordinator, relay 구독)
pub async fn build_state(
    store:        Arc<dyn SharedStore>,
    pubsub:       Arc<dyn PubSub>,
    admin_secret: &str,
) -> CanvasResult<AppState> {
    let trace_hub   = TraceHub::new();
    let coordinator = Coordinator::spawn(Arc::clone(&trace_hub));

    // 공유 블랙리스트로 로컬 블랙리스트 시드
    match store.set_members(config::BLACKLIST_KEY).await {
        Ok(list) => coordinator.seed_blacklist(list).await,
        Err(e)   => warn!("[server] blacklist seed failed, starting empty: {}", e),
    }

    let canvas   = Arc::new(CanvasGateway::new(Arc::clone(&store)));
    let cooldown = Arc::new(CooldownManager::new(Arc::clone(&store)));
    let relay    = Arc::new(BroadcastRelay::new(pubsub));

    relay.start(coordinator.clone(), Arc::clone(&trace_hub)).await?;

    let control = Arc::new(AdminChannel::new(
        admin_secret,
        Arc::clone(&cooldown),
        Arc::clone(&relay),
        coordinator.clone(),
        Arc::clone(&trace_hub),
    )?);

    Ok(AppState { coordinator, canvas, cooldown, relay, control, store, trace_hub })
}

pub fn build_router(state: AppState) -> Router {
    let http_state = HttpState::new(
        state.coordinator.clone(),
        Arc::clone(&state.control),
        Arc::clone(&state.cooldown),
        Arc::clone(&state.trace_hub),
    );

    let admin_router = Router::new()
        .route("/api/admin/set-cooldown", get(http::set_cooldown))
        .route("/admin/status",           get(http::admin_status))
        .route("/admin/users",            get(http::admin_list_users))
        .route("/admin/blacklist",        get(http::admin_blacklist))
        .route("/trace",            get(http::trace_stream))
        .route("/trace/{identity}", get(http::trace_stream))
        .with_state(http_state);

    // CORS — 전체 허용 (캔버스 클라이언트는 별도 오리진에서 서빙)
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state)
        .merge(admin_router)
        .layer(cors)
}

/// 이미 바인딩된 리스너로 서빙 (테스트에서 임의 포트 사용)
pub async fn serve(listener: TcpListener, state: AppState) -> CanvasResult<()> {
    let app = build_router(state);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

pub async fn run_server(args: ServerArgs) -> CanvasResult<()> {
    if args.admin_secret == config::DEFAULT_ADMIN_SECRET {
        warn!("[server] ADMIN_SECRET_KEY not set, using the default secret");
    }

    let state = match args.redis_url.as_deref() {
        Some(url) => {
            let backend = Arc::new(RedisBackend::connect(url).await?);
            build_state(backend.clone(), backend, &args.admin_secret).await?
        }
        None => {
            warn!("[server] REDIS_URL not set, running single-node with in-memory store");
            let backend = Arc::new(MemoryBackend::new());
            build_state(backend.clone(), backend, &args.admin_secret).await?
        }
    };

    let addr     = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr).await?;

    info!("[mini-pixelcanvas] Canvas gateway on ws://{}/ws", addr);
    info!("[mini-pixelcanvas] Canvas {}x{}, palette {} colors", config::CANVAS_WIDTH, config::CANVAS_HEIGHT, config::COLOR_PALETTE.len());

    serve(listener, state).await
}
