// author: kodeholic (powered by Claude)
// Coordinator — 프로세스 로컬 상태의 단독 소유자 (actor)
//
// 소유 상태:
//   PresenceRegistry  — 식별자별 접속/닉네임/픽셀 수
//   AbuseGuard        — 1초 윈도우 카운터 + 블랙리스트
//   connections       — 로컬 소켓 라우팅 테이블 (conn_id → identity, egress tx)
//
// 커넥션 핸들러는 상태에 직접 접근하지 않고 CoordinatorHandle 로 명령만 보낸다.
// 명령 처리는 전부 동기 — 송신은 try_send 이므로 느린 소켓이 루프를 막지 않는다.
//
// 주기 작업 (PRESENCE_TICK_MS):
//   1. egress 가 닫힌 커넥션 정리 (핸들러가 cleanup 없이 죽은 경우)
//   2. 만료된 rate window 정리
//   3. user-list 전체 갱신 브로드캐스트

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, trace, warn};

use crate::config;
use crate::core::{AbuseGuard, AbuseVerdict, PresenceRegistry, PresenceView};
use crate::error::{CanvasError, CanvasResult};
use crate::protocol::message::{ChatLine, ServerEvent};
use crate::trace::{TraceDir, TraceEvent, TraceHub};

pub type ConnId = u64;

/// 커넥션 송신 루프로 보내는 프레임
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text(String),
    /// Close 프레임 송신 후 커넥션 종료
    Close,
}

pub type EgressTx = mpsc::Sender<Outbound>;

struct LocalConn {
    identity: String,
    tx:       EgressTx,
}

/// GET /admin/status 용 요약
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorStatus {
    pub connection_count: usize,
    pub user_count:       usize,
    pub blacklist_count:  usize,
}

enum Command {
    Connect        { conn_id: ConnId, identity: String, tx: EgressTx, reply: oneshot::Sender<()> },
    Disconnect     { conn_id: ConnId },
    Attempt        { identity: String, reply: oneshot::Sender<AbuseVerdict> },
    RecordPlacement { identity: String },
    SetPseudonym   { identity: String, name: String, reply: oneshot::Sender<Option<String>> },
    Pseudonym      { identity: String, reply: oneshot::Sender<Option<String>> },
    Broadcast      { json: String },
    SendTo         { identity: String, json: String, reply: oneshot::Sender<usize> },
    Snapshot       { reply: oneshot::Sender<Vec<PresenceView>> },
    Blacklist      { reply: oneshot::Sender<Vec<String>> },
    SeedBlacklist  { identities: Vec<String> },
    Status         { reply: oneshot::Sender<CoordinatorStatus> },
}

// ----------------------------------------------------------------------------
// [CoordinatorHandle] — 커넥션 핸들러 / relay / admin 이 공유
// ----------------------------------------------------------------------------

#[derive(Clone)]
pub struct CoordinatorHandle {
    tx:      mpsc::Sender<Command>,
    next_id: Arc<AtomicU64>,
}

impl CoordinatorHandle {
    pub fn next_conn_id(&self) -> ConnId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn connect(&self, conn_id: ConnId, identity: &str, tx: EgressTx) -> CanvasResult<()> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Connect { conn_id, identity: identity.to_string(), tx, reply }, rx).await
    }

    pub async fn disconnect(&self, conn_id: ConnId) {
        self.notify(Command::Disconnect { conn_id }).await;
    }

    pub async fn attempt(&self, identity: &str) -> CanvasResult<AbuseVerdict> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Attempt { identity: identity.to_string(), reply }, rx).await
    }

    pub async fn record_placement(&self, identity: &str) {
        self.notify(Command::RecordPlacement { identity: identity.to_string() }).await;
    }

    pub async fn set_pseudonym(&self, identity: &str, name: &str) -> CanvasResult<Option<String>> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::SetPseudonym {
            identity: identity.to_string(),
            name:     name.to_string(),
            reply,
        }, rx).await
    }

    pub async fn pseudonym(&self, identity: &str) -> CanvasResult<Option<String>> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Pseudonym { identity: identity.to_string(), reply }, rx).await
    }

    /// 로컬 커넥션 전체에 전송
    pub async fn broadcast(&self, event: &ServerEvent) {
        self.notify(Command::Broadcast { json: event.to_json() }).await;
    }

    /// 식별자가 일치하는 로컬 소켓 전부에 전송. 전달한 소켓 수 반환
    pub async fn send_to(&self, identity: &str, event: &ServerEvent) -> CanvasResult<usize> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::SendTo {
            identity: identity.to_string(),
            json:     event.to_json(),
            reply,
        }, rx).await
    }

    pub async fn snapshot(&self) -> CanvasResult<Vec<PresenceView>> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Snapshot { reply }, rx).await
    }

    pub async fn blacklist(&self) -> CanvasResult<Vec<String>> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Blacklist { reply }, rx).await
    }

    pub async fn seed_blacklist(&self, identities: Vec<String>) {
        self.notify(Command::SeedBlacklist { identities }).await;
    }

    pub async fn status(&self) -> CanvasResult<CoordinatorStatus> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Status { reply }, rx).await
    }

    async fn request<T>(&self, cmd: Command, rx: oneshot::Receiver<T>) -> CanvasResult<T> {
        self.tx.send(cmd).await
            .map_err(|_| CanvasError::Internal("coordinator stopped".to_string()))?;
        rx.await.map_err(|_| CanvasError::Internal("coordinator dropped reply".to_string()))
    }

    async fn notify(&self, cmd: Command) {
        if self.tx.send(cmd).await.is_err() {
            warn!("[coordinator] stopped, command dropped");
        }
    }
}

// ----------------------------------------------------------------------------
// [Coordinator] — actor 본체
// ----------------------------------------------------------------------------

pub struct Coordinator {
    presence:    PresenceRegistry,
    guard:       AbuseGuard,
    connections: HashMap<ConnId, LocalConn>,
    trace_hub:   Arc<TraceHub>,
}

impl Coordinator {
    pub fn spawn(trace_hub: Arc<TraceHub>) -> CoordinatorHandle {
        Self::spawn_with_guard(AbuseGuard::new(), trace_hub)
    }

    pub fn spawn_with_guard(guard: AbuseGuard, trace_hub: Arc<TraceHub>) -> CoordinatorHandle {
        let (tx, rx) = mpsc::channel(config::COORDINATOR_QUEUE_SIZE);
        let actor = Self {
            presence: PresenceRegistry::new(),
            guard,
            connections: HashMap::new(),
            trace_hub,
        };
        tokio::spawn(actor.run(rx));
        CoordinatorHandle { tx, next_id: Arc::new(AtomicU64::new(1)) }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        let interval  = tokio::time::Duration::from_millis(config::PRESENCE_TICK_MS);
        let mut timer = tokio::time::interval(interval);
        timer.tick().await; // 첫 틱 skip

        info!("[coordinator] Started (tick={}ms)", config::PRESENCE_TICK_MS);

        loop {
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None      => break,
                },
                _ = timer.tick() => self.on_tick(),
            }
        }

        info!("[coordinator] Stopped");
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Connect { conn_id, identity, tx, reply } => {
                if self.presence.register(&identity) {
                    debug!("[coordinator] new identity {}", identity);
                }
                self.connections.insert(conn_id, LocalConn { identity, tx });
                let _ = reply.send(());
                self.broadcast_user_count();
            }
            Command::Disconnect { conn_id } => {
                if self.drop_connection(conn_id) {
                    self.broadcast_user_count();
                }
            }
            Command::Attempt { identity, reply } => {
                let verdict = self.guard.record_attempt(&identity, Instant::now());
                if verdict == AbuseVerdict::Escalated {
                    self.escalate(&identity);
                }
                let _ = reply.send(verdict);
            }
            Command::RecordPlacement { identity } => {
                self.presence.record_placement(&identity);
            }
            Command::SetPseudonym { identity, name, reply } => {
                let accepted = self.presence.set_pseudonym(&identity, &name);
                if let Some(ref name) = accepted {
                    self.broadcast_json(&ServerEvent::ChatMessage(
                        ChatLine::Notice(format!("{} joined the canvas", name)),
                    ).to_json());
                }
                let _ = reply.send(accepted);
            }
            Command::Pseudonym { identity, reply } => {
                let _ = reply.send(self.presence.get(&identity).map(|e| e.pseudonym.clone()));
            }
            Command::Broadcast { json } => {
                self.broadcast_json(&json);
            }
            Command::SendTo { identity, json, reply } => {
                let mut delivered = 0;
                for conn in self.connections.values().filter(|c| c.identity == identity) {
                    if push(conn, Outbound::Text(json.clone())) {
                        delivered += 1;
                    }
                }
                let _ = reply.send(delivered);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.presence.snapshot());
            }
            Command::Blacklist { reply } => {
                let _ = reply.send(self.guard.blacklist());
            }
            Command::SeedBlacklist { identities } => {
                if !identities.is_empty() {
                    info!("[coordinator] seeded {} blacklisted identities", identities.len());
                }
                self.guard.seed_blacklist(identities);
            }
            Command::Status { reply } => {
                let _ = reply.send(CoordinatorStatus {
                    connection_count: self.connections.len(),
                    user_count:       self.presence.count(),
                    blacklist_count:  self.guard.blacklist().len(),
                });
            }
        }
    }

    /// 블랙리스트 전이: 전체 공지 + 해당 식별자 소켓 전부 강제 종료
    fn escalate(&mut self, identity: &str) {
        warn!("[coordinator] blacklisting {} and closing its sockets", identity);
        self.broadcast_json(&ServerEvent::ChatMessage(
            ChatLine::Notice(format!("{} has been blacklisted for spamming", identity)),
        ).to_json());

        for conn in self.connections.values().filter(|c| c.identity == identity) {
            push(conn, Outbound::Close);
        }

        self.trace_hub.publish(TraceEvent::new(
            TraceDir::Sys, Some(identity), "blacklist", "rate window exceeded",
        ));
    }

    fn on_tick(&mut self) {
        let dead: Vec<ConnId> = self.connections.iter()
            .filter(|(_, c)| c.tx.is_closed())
            .map(|(id, _)| *id)
            .collect();
        let mut changed = false;
        for conn_id in dead {
            changed |= self.drop_connection(conn_id);
            debug!("[coordinator] swept closed conn={}", conn_id);
        }
        if changed {
            self.broadcast_user_count();
        }

        self.guard.sweep(Instant::now());

        if !self.connections.is_empty() {
            let json = ServerEvent::UserList(self.presence.snapshot()).to_json();
            self.broadcast_json(&json);
        }
    }

    /// 커넥션 제거 + presence 참조 해제. 제거했으면 true
    fn drop_connection(&mut self, conn_id: ConnId) -> bool {
        match self.connections.remove(&conn_id) {
            Some(conn) => {
                self.presence.unregister(&conn.identity);
                trace!("[coordinator] conn={} identity={} removed", conn_id, conn.identity);
                true
            }
            None => false,
        }
    }

    fn broadcast_user_count(&self) {
        let json = ServerEvent::UserCount(self.presence.count()).to_json();
        self.broadcast_json(&json);
    }

    fn broadcast_json(&self, json: &str) {
        for conn in self.connections.values() {
            push(conn, Outbound::Text(json.to_string()));
        }
    }
}

fn push(conn: &LocalConn, frame: Outbound) -> bool {
    match conn.tx.try_send(frame) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!("[coordinator] egress full, frame dropped for {}", conn.identity);
            false
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::time::Duration;

    fn spawn() -> CoordinatorHandle {
        Coordinator::spawn(TraceHub::new())
    }

    async fn attach(handle: &CoordinatorHandle, identity: &str) -> (ConnId, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(64);
        let id = handle.next_conn_id();
        handle.connect(id, identity, tx).await.unwrap();
        (id, rx)
    }

    /// 지정한 이벤트가 나올 때까지 프레임을 소비
    async fn next_event(rx: &mut mpsc::Receiver<Outbound>, event: &str) -> Value {
        loop {
            match rx.recv().await.expect("egress closed") {
                Outbound::Text(json) => {
                    let v: Value = serde_json::from_str(&json).unwrap();
                    if v["event"] == event {
                        return v;
                    }
                }
                Outbound::Close => panic!("unexpected close while waiting for {}", event),
            }
        }
    }

    #[tokio::test]
    async fn connect_broadcasts_user_count() {
        let hub = spawn();
        let (_, mut rx_a) = attach(&hub, "a").await;
        assert_eq!(next_event(&mut rx_a, "user-count").await["data"], 1);

        let (_, _rx_b) = attach(&hub, "b").await;
        assert_eq!(next_event(&mut rx_a, "user-count").await["data"], 2);
    }

    #[tokio::test]
    async fn same_identity_counts_once_until_last_socket_leaves() {
        let hub = spawn();
        let (c1, _rx1) = attach(&hub, "a").await;
        let (_c2, _rx2) = attach(&hub, "a").await;
        assert_eq!(hub.status().await.unwrap().user_count, 1);
        assert_eq!(hub.status().await.unwrap().connection_count, 2);

        hub.disconnect(c1).await;
        assert_eq!(hub.status().await.unwrap().user_count, 1);
        assert_eq!(hub.snapshot().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn escalation_notifies_everyone_and_closes_offender() {
        let guard = AbuseGuard::with_limits(Duration::from_millis(1_000), 2);
        let hub   = Coordinator::spawn_with_guard(guard, TraceHub::new());
        let (_, mut rx_bad)  = attach(&hub, "bad").await;
        let (_, mut rx_good) = attach(&hub, "good").await;

        assert_eq!(hub.attempt("bad").await.unwrap(), AbuseVerdict::Allowed);
        assert_eq!(hub.attempt("bad").await.unwrap(), AbuseVerdict::Allowed);
        assert_eq!(hub.attempt("bad").await.unwrap(), AbuseVerdict::Escalated);
        assert_eq!(hub.attempt("bad").await.unwrap(), AbuseVerdict::Blocked);

        let notice = next_event(&mut rx_good, "chat-message").await;
        assert!(notice["data"].as_str().unwrap().contains("bad"));

        let mut closed = false;
        while let Some(frame) = rx_bad.recv().await {
            if frame == Outbound::Close {
                closed = true;
                break;
            }
        }
        assert!(closed);
        assert_eq!(hub.blacklist().await.unwrap(), vec!["bad".to_string()]);
    }

    #[tokio::test]
    async fn send_to_targets_identity_only() {
        let hub = spawn();
        let (_, mut rx_a1) = attach(&hub, "a").await;
        let (_, mut rx_a2) = attach(&hub, "a").await;
        let (_, _rx_b)     = attach(&hub, "b").await;

        let mut payload = serde_json::Map::new();
        payload.insert("command".into(), "open-tab".into());
        let delivered = hub.send_to("a", &ServerEvent::AdminCommand(payload)).await.unwrap();
        assert_eq!(delivered, 2);

        assert_eq!(next_event(&mut rx_a1, "admin-command").await["data"]["command"], "open-tab");
        assert_eq!(next_event(&mut rx_a2, "admin-command").await["data"]["command"], "open-tab");
        assert_eq!(hub.send_to("nobody", &ServerEvent::UserCount(0)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn pseudonym_change_is_announced() {
        let hub = spawn();
        let (_, mut rx) = attach(&hub, "a").await;
        assert_eq!(hub.set_pseudonym("a", " neo ").await.unwrap(), Some("neo".to_string()));
        assert_eq!(hub.pseudonym("a").await.unwrap(), Some("neo".to_string()));
        let notice = next_event(&mut rx, "chat-message").await;
        assert!(notice["data"].as_str().unwrap().starts_with("neo"));
        assert_eq!(hub.set_pseudonym("a", "").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_emits_sorted_user_list() {
        let hub = spawn();
        let (_, mut rx) = attach(&hub, "a").await;
        let (_, _rx_b)  = attach(&hub, "b").await;
        hub.record_placement("b").await;

        let list = next_event(&mut rx, "user-list").await;
        assert_eq!(list["data"][0]["ip"], "b");
        assert_eq!(list["data"][0]["pixelCount"], 1);
        assert_eq!(list["data"][1]["ip"], "a");
    }

    #[tokio::test(start_paused = true)]
    async fn tick_sweeps_closed_connections() {
        let hub = spawn();
        let (_, rx) = attach(&hub, "a").await;
        drop(rx);
        tokio::time::sleep(Duration::from_millis(config::PRESENCE_TICK_MS + 10)).await;
        let status = hub.status().await.unwrap();
        assert_eq!(status.connection_count, 0);
        assert_eq!(status.user_count, 0);
    }
}
