// author: kodeholic (powered by Claude)

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::HeaderMap,
    response::Response,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::{debug, error, info, trace, warn};

use crate::config;
use crate::control::AdminChannel;
use crate::coordinator::{ConnId, CoordinatorHandle, EgressTx, Outbound};
use crate::core::{canvas::to_color_map, validate, AbuseVerdict, CanvasGateway, CooldownDecision, CooldownManager};
use crate::error::{CanvasError, CanvasResult};
use crate::protocol::message::{
    envelope_event, AdminCommandPayload, ChatLine, ClientEvent, CooldownPayload, ErrorPayload,
    PixelPayload, PlacePixelPayload, ServerEvent, PLACE_PIXEL_EVENT,
};
use crate::relay::{BroadcastRelay, RelayEvent};
use crate::store::SharedStore;
use crate::trace::{TraceDir, TraceEvent, TraceHub};
use crate::utils::client_identity;

// ----------------------------------------------------------------------------
// [공유 상태]
// ----------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub coordinator: CoordinatorHandle,
    pub canvas:      Arc<CanvasGateway>,
    pub cooldown:    Arc<CooldownManager>,
    pub relay:       Arc<BroadcastRelay>,
    pub control:     Arc<AdminChannel>,
    pub store:       Arc<dyn SharedStore>,
    pub trace_hub:   Arc<TraceHub>,
}

// ----------------------------------------------------------------------------
// [WS 진입점]
// ----------------------------------------------------------------------------

pub async fn ws_handler(
    ws:                WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers:           HeaderMap,
    State(state):      State<AppState>,
) -> Response {
    let identity = client_identity(&headers, &addr);
    ws.on_upgrade(move |socket| handle_socket(socket, identity, state))
}

// ----------------------------------------------------------------------------
// [세션 상태] — 개별 WS 연결마다 보유
// ----------------------------------------------------------------------------

struct Session {
    conn_id:  ConnId,
    identity: String,
    tx:       EgressTx,
}

impl Session {
    /// 요청자 한정 응답. 소켓이 이미 닫혔거나 큐가 가득 차면 버린다
    fn reply(&self, event: &ServerEvent) {
        if self.tx.try_send(Outbound::Text(event.to_json())).is_err() {
            debug!("[ws] reply dropped for conn={}", self.conn_id);
        }
    }

    fn reply_error(&self, reason: &str) {
        self.reply(&ServerEvent::Error(ErrorPayload { reason: reason.to_string() }));
    }
}

// ----------------------------------------------------------------------------
// [핵심] 개별 클라이언트 WS 생명주기
// ----------------------------------------------------------------------------

async fn handle_socket(socket: WebSocket, identity: String, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (egress_tx, mut egress_rx) = mpsc::channel::<Outbound>(config::EGRESS_QUEUE_SIZE);

    let session = Session {
        conn_id:  state.coordinator.next_conn_id(),
        identity,
        tx:       egress_tx,
    };

    info!("[ws] connected conn={} identity={}", session.conn_id, session.identity);

    // [rx_loop] egress → WS 송신. Close 지시를 받으면 Close 프레임 후 종료
    let mut rx_loop = tokio::spawn(async move {
        while let Some(frame) = egress_rx.recv().await {
            match frame {
                Outbound::Text(json) => {
                    if ws_tx.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    if let Err(e) = state.coordinator.connect(session.conn_id, &session.identity, session.tx.clone()).await {
        error!("[ws] coordinator unavailable: {}", e);
        rx_loop.abort();
        return;
    }

    send_snapshot(&session, &state).await;

    // [tx_loop] WS 수신 → 이벤트 dispatch. 송신 루프가 끝나면 (강제 종료) 같이 종료
    loop {
        let msg = tokio::select! {
            msg = ws_rx.next() => msg,
            _ = &mut rx_loop => {
                debug!("[ws] egress closed conn={}", session.conn_id);
                break;
            }
        };

        let text = match msg {
            Some(Ok(Message::Text(t)))  => t,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Err(e)) => { warn!("[ws] socket error conn={}: {}", session.conn_id, e); break; }
            Some(Ok(_))  => continue,
        };

        // 닫힌 이벤트 집합으로만 해석. 실패 = 조용히 폐기
        let event: ClientEvent = match serde_json::from_str(text.as_str()) {
            Ok(ev) => ev,
            Err(e) => {
                debug!("[ws] dropped undecodable frame from {}: {}", session.identity, e);
                // 좌표/색상 타입이 깨진 배치도 검증 실패와 같이 요청량에 포함
                if envelope_event(text.as_str()).as_deref() == Some(PLACE_PIXEL_EVENT) {
                    state.trace_hub.publish(TraceEvent::new(
                        TraceDir::In, Some(&session.identity), PLACE_PIXEL_EVENT, "malformed",
                    ));
                    if let Err(e) = admit_attempt(&session, &state).await {
                        error!("[ws] attempt count failed identity={}: {}", session.identity, e);
                    }
                }
                continue;
            }
        };

        let result = match event {
            ClientEvent::PlacePixel(p)   => handle_place_pixel(&session, &state, p).await,
            ClientEvent::SetPseudonym(n) => handle_set_pseudonym(&session, &state, n).await,
            ClientEvent::ChatMessage(m)  => handle_chat_message(&session, &state, m).await,
            ClientEvent::AdminCommand(p) => handle_admin_command(&session, &state, p).await,
        };

        if let Err(e) = result {
            error!("[ws] handler error identity={}: {}", session.identity, e);
        }
    }

    cleanup(&session, &state).await;
    rx_loop.abort();
}

/// 신규 접속 스냅샷 — 저장소 장애 시 backoff 재시도 후 실패 알림
async fn send_snapshot(session: &Session, state: &AppState) {
    let base = Duration::from_millis(config::SNAPSHOT_RETRY_BASE_MS);
    match state.canvas.read_all_with_retry(config::SNAPSHOT_RETRY_ATTEMPTS, base).await {
        Ok(cells) => {
            trace!("[ws] snapshot {} cells -> {}", cells.len(), session.identity);
            session.reply(&ServerEvent::CanvasState(to_color_map(cells)));
        }
        Err(e) => {
            error!("[ws] snapshot failed for {}: {}", session.identity, e);
            session.reply_error("canvas unavailable");
        }
    }
}

// ----------------------------------------------------------------------------
// [이벤트 핸들러들]
// ----------------------------------------------------------------------------

/// AbuseGuard → Validator → CooldownManager → write → relay
async fn handle_place_pixel(
    session: &Session,
    state:   &AppState,
    payload: PlacePixelPayload,
) -> CanvasResult<()> {
    let PlacePixelPayload { x, y, color } = payload;
    state.trace_hub.publish(TraceEvent::new(
        TraceDir::In, Some(&session.identity), "place-pixel", format!("{}:{} {}", x, y, color),
    ));

    // 1. 요청량 (검증 이전, 모든 시도가 카운트됨)
    if !admit_attempt(session, state).await? {
        return Ok(());
    }

    // 2. 좌표 / 팔레트
    let index = match validate(x, y, &color) {
        Ok(index) => index,
        Err(reason) => {
            debug!("[ws] placement rejected ({:?}) from {}", reason, session.identity);
            return Ok(());
        }
    };

    // 3. 쿨다운 락
    let duration_ms = match state.cooldown.try_acquire(&session.identity).await {
        Ok(CooldownDecision::Granted { duration_ms }) => duration_ms,
        Ok(CooldownDecision::Denied { remaining_ms, duration_ms }) => {
            state.trace_hub.publish(TraceEvent::new(
                TraceDir::Out, Some(&session.identity), "cooldown", format!("{}/{}ms", remaining_ms, duration_ms),
            ));
            session.reply(&ServerEvent::Cooldown(CooldownPayload { remaining: remaining_ms, total: duration_ms }));
            return Ok(());
        }
        Err(e) => {
            session.reply_error("placement failed");
            return Err(e);
        }
    };

    // 4. 정식 저장소 기록
    if let Err(e) = state.canvas.write(x, y, index).await {
        // 기록되지 않은 배치로 쿨다운을 물리지 않는다
        if duration_ms > 0 {
            if let Err(release_err) = state.cooldown.release(&session.identity).await {
                warn!("[ws] cooldown release failed for {}: {}", session.identity, release_err);
            }
        }
        session.reply_error("placement failed");
        return Err(e);
    }
    state.coordinator.record_placement(&session.identity).await;

    if duration_ms > 0 {
        session.reply(&ServerEvent::Cooldown(CooldownPayload { remaining: duration_ms, total: duration_ms }));
    }

    // 5. 팬아웃 — 발행 실패 시 최소한 로컬 소켓에는 전달
    let pixel = PixelPayload { x, y, color };
    if let Err(e) = state.relay.publish(&RelayEvent::Pixel(pixel.clone())).await {
        warn!("[ws] relay publish failed, local fanout only: {}", e);
        state.coordinator.broadcast(&ServerEvent::PixelPlaced(pixel)).await;
    }
    Ok(())
}

/// 배치 시도 1회 집계. 계속 처리해도 되면 true
async fn admit_attempt(session: &Session, state: &AppState) -> CanvasResult<bool> {
    match state.coordinator.attempt(&session.identity).await? {
        AbuseVerdict::Allowed   => Ok(true),
        AbuseVerdict::Escalated => {
            if let Err(e) = state.store.set_add(config::BLACKLIST_KEY, &session.identity).await {
                warn!("[ws] blacklist persist failed for {}: {}", session.identity, e);
            }
            Ok(false)
        }
        AbuseVerdict::Blocked => {
            trace!("[ws] blacklisted placement dropped: {}", session.identity);
            Ok(false)
        }
    }
}

async fn handle_set_pseudonym(session: &Session, state: &AppState, name: String) -> CanvasResult<()> {
    match state.coordinator.set_pseudonym(&session.identity, &name).await? {
        Some(accepted) => {
            state.trace_hub.publish(TraceEvent::new(
                TraceDir::In, Some(&session.identity), "set-pseudonym", accepted,
            ));
        }
        None => debug!("[ws] pseudonym rejected from {}", session.identity),
    }
    Ok(())
}

async fn handle_chat_message(session: &Session, state: &AppState, message: String) -> CanvasResult<()> {
    let message = message.trim();
    let len     = message.chars().count();
    if len == 0 || len >= config::MAX_CHAT_LEN {
        debug!("[ws] chat dropped from {} (len={})", session.identity, len);
        return Ok(());
    }

    let author = state.coordinator.pseudonym(&session.identity).await?
        .unwrap_or_else(|| session.identity.clone());

    state.trace_hub.publish(TraceEvent::new(
        TraceDir::In, Some(&session.identity), "chat-message", format!("{}: {}", author, message),
    ));
    state.coordinator.broadcast(&ServerEvent::ChatMessage(ChatLine::Authored {
        author,
        message: message.to_string(),
    })).await;
    Ok(())
}

async fn handle_admin_command(
    session: &Session,
    state:   &AppState,
    payload: AdminCommandPayload,
) -> CanvasResult<()> {
    let AdminCommandPayload { ip, command, admin_token, args } = payload;

    match state.control.route_command(&admin_token, &ip, &command, args).await {
        Ok(_) => Ok(()),
        Err(CanvasError::Unauthorized) => {
            warn!("[ws] admin-command with bad token from {}", session.identity);
            session.reply_error("unauthorized");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

// ----------------------------------------------------------------------------
// [정리]
// ----------------------------------------------------------------------------

async fn cleanup(session: &Session, state: &AppState) {
    trace!("[ws] cleanup conn={} identity={}", session.conn_id, session.identity);
    state.coordinator.disconnect(session.conn_id).await;
    info!("[ws] disconnected conn={} identity={}", session.conn_id, session.identity);
}
