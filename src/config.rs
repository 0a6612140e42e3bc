// author: kodeholic (powered by Claude)
// 매직 넘버를 배제하고 매칭 시스템 전체의 타이밍과 한계를 제어하는 상수 모음입니다.

use std::time::Duration;

/// HTTP API + 협업 게이트웨이 TCP 포트
pub const SERVER_PORT: u16 = 8080;

// ----------------------------------------------------------------------------
// 매칭 lease (Status Registry와 분리된 만료 키)
// ----------------------------------------------------------------------------

/// waiting 상태 유지 한도 - 만료 시 timeout 전이 (30초)
pub const MATCH_TIMEOUT_SECS: u64 = 30;

/// matching 상태에서 lease 만료 시 재연장 폭 (5초)
pub const MATCHING_RENEW_SECS: u64 = 5;

/// timeout / cancelled / disconnected 이후 최종 삭제까지 유예 (10초)
pub const GRACE_LEASE_SECS: u64 = 10;

/// matched 이후 상태 조회(matchingId)를 허용하는 유예 (60초)
pub const MATCHED_LEASE_SECS: u64 = 60;

// ----------------------------------------------------------------------------
// 연결 끊김 감지 (Disconnect Sweeper)
// ----------------------------------------------------------------------------

/// waiting 유저의 lastSeen 이 이 시간보다 오래되면 disconnected 처리 (15초)
pub const DISCONNECT_THRESHOLD_MS: u64 = 15_000;

/// Sweeper 실행 주기 (5초)
pub const SWEEPER_INTERVAL_MS: u64 = 5_000;

// ----------------------------------------------------------------------------
// 저장소 / 워커
// ----------------------------------------------------------------------------

/// MemoryStore lease 만료 검사 주기 (200ms)
pub const LEASE_TICK_MS: u64 = 200;

/// Entry Queue 가 비었을 때 워커 폴링 간격 (50ms)
pub const WORKER_IDLE_POLL_MS: u64 = 50;

/// 저장소 호출 1회당 최대 허용 시간 - 초과 시 TransientStoreFailure (2초)
pub const STORE_CALL_TIMEOUT_MS: u64 = 2_000;

/// Session Manager 가 버스에서 이벤트가 없을 때 폴링하는 간격 (50ms)
pub const BUS_IDLE_POLL_MS: u64 = 50;

/// 질문 카탈로그 HTTP 호출 타임아웃 (3초)
pub const CATALOG_TIMEOUT_MS: u64 = 3_000;

// ----------------------------------------------------------------------------
// 협업 게이트웨이 (WebSocket)
// ----------------------------------------------------------------------------

/// 송신(Egress) 큐 사이즈 - 꽉 차면 해당 연결의 push 는 drop
pub const EGRESS_QUEUE_SIZE: usize = 256;

/// 클라이언트가 HEARTBEAT를 보내야 하는 주기 (밀리초)
pub const HEARTBEAT_INTERVAL_MS: u64 = 5_000;

/// 요청 1건당 허용되는 최대 topic 수
pub const MAX_TOPICS_PER_REQUEST: usize = 8;

/// Redis 접속 URL 환경변수 (CLI --redis-url 미지정 시)
pub const REDIS_URL_ENV: &str = "PAIRMATCH_REDIS_URL";

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

// ----------------------------------------------------------------------------
// [MatchConfig] 서비스 객체에 주입되는 런타임 설정 (기본값 = 위 상수)
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MatchConfig {
    pub match_timeout:        Duration,
    pub matching_renew:       Duration,
    pub grace_lease:          Duration,
    pub matched_lease:        Duration,
    pub disconnect_threshold: Duration,
    pub sweeper_interval:     Duration,
    pub lease_tick:           Duration,
    pub worker_idle_poll:     Duration,
    pub bus_idle_poll:        Duration,
    pub store_call_timeout:   Duration,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            match_timeout:        Duration::from_secs(MATCH_TIMEOUT_SECS),
            matching_renew:       Duration::from_secs(MATCHING_RENEW_SECS),
            grace_lease:          Duration::from_secs(GRACE_LEASE_SECS),
            matched_lease:        Duration::from_secs(MATCHED_LEASE_SECS),
            disconnect_threshold: Duration::from_millis(DISCONNECT_THRESHOLD_MS),
            sweeper_interval:     Duration::from_millis(SWEEPER_INTERVAL_MS),
            lease_tick:           Duration::from_millis(LEASE_TICK_MS),
            worker_idle_poll:     Duration::from_millis(WORKER_IDLE_POLL_MS),
            bus_idle_poll:        Duration::from_millis(BUS_IDLE_POLL_MS),
            store_call_timeout:   Duration::from_millis(STORE_CALL_TIMEOUT_MS),
        }
    }
}
