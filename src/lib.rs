// author: kodeholic (powered by Claude)

pub mod config;
pub mod core;
pub mod error;
pub mod handoff;
pub mod http;
pub mod matching;
pub mod protocol;
pub mod store;
pub mod trace;
pub mod utils;

use axum::{routing::{delete, get, post}, Router};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::config::MatchConfig;
use crate::core::{EntryQueue, MatchingPool, SessionHub, StatusRegistry, UserHub};
use crate::error::MatchResult;
use crate::handoff::{HttpCatalog, QuestionCatalog, SessionManager, StaticCatalog};
use crate::http::HttpState;
use crate::matching::{
    DisconnectSweeper, MatchAnnouncer, MatchBus, MatchService, MatchingWorker, StoreBus, TtlHandler,
};
use crate::protocol::{ws_handler, AppState};
use crate::store::{MemoryStore, SharedStore, Store};
use crate::trace::TraceHub;

/// 공유 저장소 백엔드 선택
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StoreKind {
    Memory,
    Redis,
}

/// CLI에서 주입되는 런타임 설정
/// - 기본값은 config.rs 상수
/// - Redis URL 은 플래그 > 환경변수(PAIRMATCH_REDIS_URL) > 기본값 순
pub struct ServerArgs {
    pub port:                    u16,
    pub store:                   StoreKind,
    pub redis_url:               Option<String>,
    pub catalog_url:             Option<String>,
    pub match_timeout_secs:      Option<u64>,
    pub disconnect_threshold_ms: Option<u64>,
}

impl ServerArgs {
    fn match_config(&self) -> MatchConfig {
        let mut config = MatchConfig::default();
        if let Some(secs) = self.match_timeout_secs {
            config.match_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = self.disconnect_threshold_ms {
            config.disconnect_threshold = Duration::from_millis(ms);
        }
        config
    }
}

// ----------------------------------------------------------------------------
// [Services] 서비스 객체 묶음 - 전부 명시적으로 생성해서 주입
// ----------------------------------------------------------------------------

pub struct Services {
    pub config:    MatchConfig,
    pub store:     Store,
    pub registry:  StatusRegistry,
    pub queue:     EntryQueue,
    pub pool:      MatchingPool,
    pub bus:       Arc<dyn MatchBus>,
    pub trace_hub: Arc<TraceHub>,
    pub user_hub:  Arc<UserHub>,
    pub matching:  Arc<MatchService>,
    pub worker:    Arc<MatchingWorker>,
    pub ttl:       Arc<TtlHandler>,
    pub sweeper:   Arc<DisconnectSweeper>,
    pub sessions:  Arc<SessionManager>,
}

impl Services {
    pub fn new(store: Store, catalog: Arc<dyn QuestionCatalog>, config: MatchConfig) -> Self {
        let registry  = StatusRegistry::new(store.clone());
        let queue     = EntryQueue::new(store.clone());
        let pool      = MatchingPool::new(store.clone());
        let trace_hub = TraceHub::new();
        let user_hub  = Arc::new(UserHub::new());

        let bus: Arc<dyn MatchBus> = Arc::new(StoreBus::new(store.clone()));
        let announcer = Arc::new(MatchAnnouncer::new(Arc::clone(&bus)));

        let matching = Arc::new(MatchService::new(
            registry.clone(), queue.clone(), pool.clone(), Arc::clone(&trace_hub), config.clone(),
        ));
        let worker = Arc::new(MatchingWorker::new(
            registry.clone(), queue.clone(), pool.clone(), announcer, Arc::clone(&trace_hub), config.clone(),
        ));
        let ttl = Arc::new(TtlHandler::new(
            registry.clone(), queue.clone(), Arc::clone(&trace_hub), config.clone(),
        ));
        let sweeper = Arc::new(DisconnectSweeper::new(
            registry.clone(), queue.clone(), Arc::clone(&trace_hub), config.clone(),
        ));
        let sessions = Arc::new(SessionManager::new(
            Arc::new(SessionHub::new()), catalog, Arc::clone(&user_hub), Arc::clone(&trace_hub),
        ));

        Self {
            config, store, registry, queue, pool, bus, trace_hub, user_hub,
            matching, worker, ttl, sweeper, sessions,
        }
    }

    /// MemoryStore + StaticCatalog 구성. 만료 티커 구동용으로 MemoryStore 핸들도 돌려준다
    pub fn in_memory(config: MatchConfig) -> (Self, Arc<MemoryStore>) {
        let memory = Arc::new(MemoryStore::new());
        let store  = Store::new(Arc::clone(&memory) as Arc<dyn SharedStore>, config.store_call_timeout);
        (Self::new(store, Arc::new(StaticCatalog::new()), config), memory)
    }

    /// 상주 루프 기동: 매칭 워커 / TTL 리스너 / disconnect sweeper / 세션 소비자
    pub fn spawn_loops(&self, shutdown: &watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(matching::run_matching_worker(Arc::clone(&self.worker), shutdown.clone())),
            tokio::spawn(matching::run_ttl_listener(Arc::clone(&self.ttl), self.store.clone(), shutdown.clone())),
            tokio::spawn(matching::run_disconnect_sweeper(Arc::clone(&self.sweeper), shutdown.clone())),
            tokio::spawn(handoff::run_session_consumer(
                Arc::clone(&self.sessions),
                Arc::clone(&self.bus),
                self.config.bus_idle_poll,
                shutdown.clone(),
            )),
        ]
    }

    pub fn router(&self) -> Router {
        let app_state = AppState {
            user_hub: Arc::clone(&self.user_hub),
            sessions: Arc::clone(&self.sessions),
            matching: Arc::clone(&self.matching),
        };

        let http_state = HttpState::new(
            Arc::clone(&self.matching),
            Arc::clone(&self.sessions),
            self.registry.clone(),
            self.queue.clone(),
            self.pool.clone(),
            Arc::clone(&self.sweeper),
            Arc::clone(&self.user_hub),
            Arc::clone(&self.trace_hub),
        );

        let api_router = Router::new()
            .route("/match/request",   post(http::match_request))
            .route("/match/status",    get(http::match_status))
            .route("/match/cancel",    delete(http::match_cancel))
            .route("/match/heartbeat", post(http::match_heartbeat))
            .route("/session/by-user/{user_id}",      get(http::session_by_user))
            .route("/session/by-match/{matching_id}", get(http::session_by_match))
            .route("/session/{session_id}/ready",     post(http::session_ready))
            .route("/session/{session_id}/leave",     post(http::session_leave))
            .route("/session/{session_id}/end",       post(http::session_end))
            .route("/admin/status",                get(http::admin_status))
            .route("/admin/users",                 get(http::admin_list_users))
            .route("/admin/users/{user_id}",       get(http::admin_get_user))
            .route("/admin/pool",                  get(http::admin_pool))
            .route("/admin/sessions",              get(http::admin_list_sessions))
            .route("/admin/sessions/{session_id}", get(http::admin_get_session))
            .route("/admin/clear/{user_id}",       post(http::admin_clear_user))
            .route("/trace",           get(http::trace_stream))
            .route("/trace/{user_id}", get(http::trace_stream))
            .with_state(http_state);

        // CORS - 전체 허용 (운영 대시보드, 로컬 클라이언트)
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/ws", get(ws_handler))
            .with_state(app_state)
            .merge(api_router)
            .layer(cors)
    }
}

// ----------------------------------------------------------------------------
// [서버 기동]
// ----------------------------------------------------------------------------

async fn build_services(args: &ServerArgs, config: MatchConfig) -> MatchResult<(Services, Option<Arc<MemoryStore>>)> {
    let catalog: Arc<dyn QuestionCatalog> = match &args.catalog_url {
        Some(url) => Arc::new(HttpCatalog::new(url, Duration::from_millis(crate::config::CATALOG_TIMEOUT_MS))?),
        None      => Arc::new(StaticCatalog::new()),
    };

    match args.store {
        StoreKind::Memory => {
            let memory = Arc::new(MemoryStore::new());
            let store  = Store::new(Arc::clone(&memory) as Arc<dyn SharedStore>, config.store_call_timeout);
            Ok((Services::new(store, catalog, config), Some(memory)))
        }
        StoreKind::Redis => connect_redis(args, catalog, config).await,
    }
}

#[cfg(feature = "redis-store")]
async fn connect_redis(
    args:    &ServerArgs,
    catalog: Arc<dyn QuestionCatalog>,
    config:  MatchConfig,
) -> MatchResult<(Services, Option<Arc<MemoryStore>>)> {
    let url = args.redis_url.clone()
        .or_else(|| std::env::var(crate::config::REDIS_URL_ENV).ok())
        .unwrap_or_else(|| crate::config::DEFAULT_REDIS_URL.to_string());
    let redis = store::redis_store::RedisStore::connect(&url).await?;
    let store = Store::new(Arc::new(redis), config.store_call_timeout);
    Ok((Services::new(store, catalog, config), None))
}

#[cfg(not(feature = "redis-store"))]
async fn connect_redis(
    _args:    &ServerArgs,
    _catalog: Arc<dyn QuestionCatalog>,
    _config:  MatchConfig,
) -> MatchResult<(Services, Option<Arc<MemoryStore>>)> {
    Err(crate::error::MatchError::InvalidRequest("redis store requires the `redis-store` feature".into()))
}

pub async fn run_server(args: ServerArgs) {
    let config = args.match_config();
    let (services, memory) = match build_services(&args, config.clone()).await {
        Ok(s)  => s,
        Err(e) => {
            error!("[pair-match] Failed to build services: {}", e);
            return;
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    if let Some(memory) = memory {
        tokio::spawn(store::memory::run_expiry_ticker(memory, config.lease_tick, shutdown_rx.clone()));
    }
    let loops = services.spawn_loops(&shutdown_rx);

    let addr     = format!("0.0.0.0:{}", args.port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(l)  => l,
        Err(e) => {
            error!("[pair-match] Failed to bind {}: {}", addr, e);
            let _ = shutdown_tx.send(true);
            return;
        }
    };

    info!("[pair-match] HTTP API on http://{}", addr);
    info!("[pair-match] Gateway on ws://{}/ws", addr);
    info!("[pair-match] store={:?} match_timeout={:?} disconnect_threshold={:?}",
        args.store, config.match_timeout, config.disconnect_threshold);

    let signal_tx = shutdown_tx.clone();
    let serve = axum::serve(listener, services.router())
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("[pair-match] ctrl_c handler failed: {}", e);
            }
            info!("[pair-match] shutdown requested");
            let _ = signal_tx.send(true);
        });

    if let Err(e) = serve.await {
        error!("[pair-match] server error: {}", e);
    }

    let _ = shutdown_tx.send(true);
    for handle in loops {
        let _ = handle.await;
    }
    info!("[pair-match] stopped");
}
