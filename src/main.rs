// author: kodeholic (powered by Claude)

use clap::Parser;
use tracing_subscriber::EnvFilter;

use pair_match::{config, run_server, ServerArgs, StoreKind};

/// pair-match 매칭 서버
#[derive(Parser)]
#[command(name = "pmserver", about = "pair-match 매칭 + 세션 핸드오프 서버", version)]
struct Cli {
    /// HTTP API / 게이트웨이 포트
    #[arg(long, default_value_t = config::SERVER_PORT)]
    port: u16,

    /// 공유 저장소 백엔드
    #[arg(long, value_enum, default_value_t = StoreKind::Memory)]
    store: StoreKind,

    /// Redis URL (미지정 시 PAIRMATCH_REDIS_URL 환경변수)
    #[arg(long)]
    redis_url: Option<String>,

    /// 질문 카탈로그 서비스 base URL (미지정 시 내장 카탈로그)
    #[arg(long)]
    catalog_url: Option<String>,

    /// waiting 상태 최대 유지 시간 (초)
    #[arg(long)]
    match_timeout_secs: Option<u64>,

    /// heartbeat 끊김 판정 임계값 (밀리초)
    #[arg(long)]
    disconnect_threshold_ms: Option<u64>,
}

#[tokio::main]
async fn main() {
    // RUST_LOG 기반 로깅 초기화 (기본값: info)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    run_server(ServerArgs {
        port:                    cli.port,
        store:                   cli.store,
        redis_url:               cli.redis_url,
        catalog_url:             cli.catalog_url,
        match_timeout_secs:      cli.match_timeout_secs,
        disconnect_threshold_ms: cli.disconnect_threshold_ms,
    }).await;
}
