// author: kodeholic (powered by Claude)

/// Client → Server opcodes
pub mod client {
    /// 클라이언트가 살아있음을 알림 (매칭 대기 중이면 lastSeen 갱신)
    pub const HEARTBEAT:     u8 = 1;
    /// 연결 직후 신원 등록 (user_id - 인증 계층이 검증한 값)
    pub const IDENTIFY:      u8 = 3;

    // --- 협업 세션 ---
    /// 편집 트랜스포트 합류 (participant → ready)
    pub const SESSION_READY: u8 = 40;
    /// 세션 이탈 (participant → left)
    pub const SESSION_LEAVE: u8 = 41;
    /// 세션 종료 (participant → end, 세션 terminated)
    pub const SESSION_END:   u8 = 42;
}

/// Server → Client opcodes
pub mod server {
    /// 연결 직후 서버가 heartbeat 주기를 알려줌
    pub const HELLO:           u8 = 0;
    /// HEARTBEAT 수신 확인
    pub const HEARTBEAT_ACK:   u8 = 2;
    /// IDENTIFY 성공. 진행 중인 세션이 있으면 함께 전달
    pub const READY:           u8 = 4;

    // --- 협업 세션 ---
    /// 매칭 성사 후 세션 생성됨
    pub const SESSION_CREATED: u8 = 120;
    /// 참가자 상태 변경
    pub const SESSION_STATE:   u8 = 121;
    /// all_ready 가 처음 true - 편집 동기화 시작
    pub const SESSION_START:   u8 = 122;
    /// 세션 종료 (ended_by_user / all_left)
    pub const SESSION_ENDED:   u8 = 123;

    /// 요청 성공 응답
    pub const ACK:             u8 = 200;
    /// 에러 응답
    pub const ERROR:           u8 = 201;
}

pub fn name(op: u8) -> &'static str {
    match op {
        server::HELLO           => "HELLO",
        server::HEARTBEAT_ACK   => "HEARTBEAT_ACK",
        server::READY           => "READY",
        server::SESSION_CREATED => "SESSION_CREATED",
        server::SESSION_STATE   => "SESSION_STATE",
        server::SESSION_START   => "SESSION_START",
        server::SESSION_ENDED   => "SESSION_ENDED",
        server::ACK             => "ACK",
        server::ERROR           => "ERROR",
        _                       => "UNKNOWN",
    }
}
