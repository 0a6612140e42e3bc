// author: kodeholic (powered by Claude)
// UserHub - 게이트웨이 WS 연결 라우팅 테이블 (user_id → 송신 채널)

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::utils::current_timestamp;

/// 송신자 타입 (직렬화된 GatewayPacket JSON)
pub type BroadcastTx = mpsc::Sender<String>;

// ----------------------------------------------------------------------------
// [Connection] IDENTIFY 시 등록, WS 종료 시 제거
// ----------------------------------------------------------------------------

pub struct Connection {
    pub tx:           BroadcastTx,
    pub connected_at: u64,
    pub last_seen:    AtomicU64,
}

impl Connection {
    pub fn new(tx: BroadcastTx) -> Self {
        let now = current_timestamp();
        Self { tx, connected_at: now, last_seen: AtomicU64::new(now) }
    }

    pub fn touch(&self) {
        self.last_seen.store(current_timestamp(), Ordering::Relaxed);
    }
}

pub struct UserHub {
    users: RwLock<HashMap<String, Arc<Connection>>>,
}

impl UserHub {
    pub fn new() -> Self {
        trace!("Initializing UserHub");
        Self { users: RwLock::new(HashMap::new()) }
    }

    /// 같은 user_id 로 재접속하면 이전 연결을 대체한다
    pub fn register(&self, user_id: &str, tx: BroadcastTx) -> Arc<Connection> {
        let conn = Arc::new(Connection::new(tx));
        self.users.write().unwrap().insert(user_id.to_string(), Arc::clone(&conn));
        trace!("Connection registered: {}", user_id);
        conn
    }

    /// tx 가 현재 등록된 연결과 같을 때만 제거 (재접속한 새 연결은 유지)
    pub fn unregister(&self, user_id: &str, tx: &BroadcastTx) {
        let mut users = self.users.write().unwrap();
        if users.get(user_id).map_or(false, |c| c.tx.same_channel(tx)) {
            users.remove(user_id);
            trace!("Connection unregistered: {}", user_id);
        }
    }

    pub fn get(&self, user_id: &str) -> Option<Arc<Connection>> {
        self.users.read().unwrap().get(user_id).cloned()
    }

    pub fn is_connected(&self, user_id: &str) -> bool {
        self.users.read().unwrap().contains_key(user_id)
    }

    /// 접속 중인 대상에게만 전송. 전달된 수 반환
    pub async fn send_to(&self, user_ids: &[String], packet_json: &str) -> usize {
        let conns: Vec<Arc<Connection>> = {
            let users = self.users.read().unwrap();
            user_ids.iter().filter_map(|uid| users.get(uid).cloned()).collect()
        };

        let mut delivered = 0;
        for conn in conns {
            if conn.tx.send(packet_json.to_string()).await.is_err() {
                warn!("Push failed: rx closed");
            } else {
                delivered += 1;
            }
        }
        delivered
    }

    pub fn count(&self) -> usize {
        self.users.read().unwrap().len()
    }
}

impl Default for UserHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_tx() -> BroadcastTx {
        let (tx, _rx) = mpsc::channel(16);
        tx
    }

    #[test]
    fn register_and_get() {
        let hub = UserHub::new();
        hub.register("alice", make_tx());
        assert!(hub.get("alice").is_some());
        assert!(!hub.is_connected("bob"));
    }

    #[test]
    fn unregister_ignores_replaced_connection() {
        let hub = UserHub::new();
        let old_tx = make_tx();
        hub.register("alice", old_tx.clone());
        let new_tx = make_tx();
        hub.register("alice", new_tx.clone());

        hub.unregister("alice", &old_tx);
        assert!(hub.is_connected("alice"));
        hub.unregister("alice", &new_tx);
        assert_eq!(hub.count(), 0);
    }

    #[tokio::test]
    async fn send_to_skips_offline_users() {
        let hub = UserHub::new();
        let (tx, mut rx) = mpsc::channel(4);
        hub.register("alice", tx);

        let n = hub.send_to(&["alice".to_string(), "bob".to_string()], "{\"op\":120}").await;
        assert_eq!(n, 1);
        assert_eq!(rx.recv().await.as_deref(), Some("{\"op\":120}"));
    }

    #[test]
    fn touch_updates_last_seen() {
        let hub = UserHub::new();
        let conn = hub.register("alice", make_tx());
        let t1 = conn.last_seen.load(Ordering::Relaxed);
        std::thread::sleep(std::time::Duration::from_millis(5));
        conn.touch();
        assert!(conn.last_seen.load(Ordering::Relaxed) >= t1);
    }
}
