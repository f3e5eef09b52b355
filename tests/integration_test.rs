// author: kodeholic (powered by Claude)

use futures_util::{SinkExt, StreamExt};
use mini_pixelcanvas::store::{MemoryBackend, SharedStore};
use mini_pixelcanvas::{build_state, serve};
use portpicker::pick_unused_port;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const SECRET: &str = "test-secret";

// ----------------------------------------------------------------------------
// [테스트 헬퍼]
// ----------------------------------------------------------------------------

/// 주어진 저장소를 쓰는 서버 프로세스 1개 기동. 같은 backend 를 넘기면 멀티 프로세스 구성
async fn spawn_test_server(backend: Arc<MemoryBackend>) -> String {
    let port = pick_unused_port().expect("사용 가능한 포트를 찾을 수 없습니다.");
    let addr = format!("127.0.0.1:{}", port);

    let state    = build_state(backend.clone(), backend, SECRET).await.expect("state 조립 실패");
    let listener = TcpListener::bind(&addr).await.unwrap();
    tokio::spawn(async move {
        serve(listener, state).await.unwrap();
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    addr
}

type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;
type WsTx = futures_util::stream::SplitSink<WsStream, Message>;
type WsRx = futures_util::stream::SplitStream<WsStream>;

/// x-forwarded-for 로 식별자를 지정해 접속 후 canvas-state 까지 소비
async fn connect_as(addr: &str, ip: &str) -> (WsTx, WsRx, Value) {
    let mut req = format!("ws://{}/ws", addr).into_client_request().unwrap();
    req.headers_mut().insert("x-forwarded-for", HeaderValue::from_str(ip).unwrap());
    let (ws, _) = connect_async(req).await.expect("WS 연결 실패");
    let (tx, mut rx) = ws.split();
    let snapshot = recv_event(&mut rx, "canvas-state").await;
    (tx, rx, snapshot)
}

async fn send(tx: &mut WsTx, payload: Value) {
    tx.send(Message::Text(payload.to_string().into())).await.expect("전송 실패");
}

async fn place(tx: &mut WsTx, x: i64, y: i64, color: &str) {
    send(tx, json!({ "event": "place-pixel", "data": { "x": x, "y": y, "color": color } })).await;
}

/// 지정한 이벤트가 올 때까지 나머지(user-count, user-list 등)는 건너뛴다
async fn recv_event(rx: &mut WsRx, event: &str) -> Value {
    timeout(Duration::from_secs(5), async {
        loop {
            match rx.next().await.expect("수신 실패").expect("메시지 에러") {
                Message::Text(t) => {
                    let v: Value = serde_json::from_str(&t).expect("JSON 파싱 실패");
                    if v["event"] == event {
                        return v["data"].clone();
                    }
                }
                _ => continue,
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{} 수신 타임아웃", event))
}

/// 제한 시간 안에 지정 이벤트가 오지 않아야 함
async fn expect_no_event(rx: &mut WsRx, event: &str, wait: Duration) {
    let got = timeout(wait, async {
        while let Some(Ok(msg)) = rx.next().await {
            if let Message::Text(t) = msg {
                let v: Value = serde_json::from_str(&t).unwrap();
                if v["event"] == event {
                    return v;
                }
            }
        }
        Value::Null
    }).await;
    if let Ok(v) = got {
        assert!(v.is_null(), "예상치 못한 {} 수신: {}", event, v);
    }
}

async fn set_cooldown_http(addr: &str, secret: &str, ms: &str) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .get(format!("http://{}/api/admin/set-cooldown", addr))
        .query(&[("secret", secret), ("ms", ms)])
        .send()
        .await
        .expect("HTTP 요청 실패");
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap_or(Value::Null))
}

// ----------------------------------------------------------------------------
// [테스트]
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_snapshot_on_connect() {
    let backend = Arc::new(MemoryBackend::new());
    backend.hash_set("canvas", "3:4", "1").await.unwrap();
    backend.hash_set("canvas", "bogus", "1").await.unwrap();
    let addr = spawn_test_server(backend).await;

    let (_tx, _rx, snapshot) = connect_as(&addr, "10.0.0.1").await;
    assert_eq!(snapshot, json!({ "3:4": "#000000" }));
}

#[tokio::test]
async fn test_place_pixel_fanout_and_cooldown() {
    let backend = Arc::new(MemoryBackend::new());
    let addr    = spawn_test_server(backend.clone()).await;

    let (mut tx_a, mut rx_a, _) = connect_as(&addr, "10.0.0.1").await;
    let (_tx_b, mut rx_b, _)    = connect_as(&addr, "10.0.0.2").await;

    place(&mut tx_a, 5, 5, "#000000").await;

    let cd = recv_event(&mut rx_a, "cooldown").await;
    assert_eq!(cd, json!({ "remaining": 5000, "total": 5000 }));
    assert_eq!(recv_event(&mut rx_a, "pixel-placed").await, json!({ "x": 5, "y": 5, "color": "#000000" }));
    assert_eq!(recv_event(&mut rx_b, "pixel-placed").await, json!({ "x": 5, "y": 5, "color": "#000000" }));
    assert_eq!(backend.hash_get_all("canvas").await.unwrap()["5:5"], "1");

    // 락 유지 중 재시도 → 거부, 저장소 그대로
    place(&mut tx_a, 6, 6, "#FF4500").await;
    let denied = recv_event(&mut rx_a, "cooldown").await;
    assert_eq!(denied["total"], 5000);
    assert!(denied["remaining"].as_u64().unwrap() <= 5000);
    assert!(!backend.hash_get_all("canvas").await.unwrap().contains_key("6:6"));
}

#[tokio::test]
async fn test_invalid_placements_are_dropped() {
    let backend = Arc::new(MemoryBackend::new());
    let addr    = spawn_test_server(backend.clone()).await;

    let (mut tx, mut rx, _) = connect_as(&addr, "10.0.0.1").await;

    place(&mut tx, -1, 5, "#000000").await;
    place(&mut tx, 1000, 5, "#000000").await;
    place(&mut tx, 5, 5, "#123456").await;
    send(&mut tx, json!({ "event": "place-pixel", "data": { "x": "5", "y": 5, "color": "#000000" } })).await;
    send(&mut tx, json!({ "event": "no-such-event", "data": {} })).await;
    tx.send(Message::Text("not json".into())).await.unwrap();

    // 이후 정상 요청은 처리됨 — 첫 pixel-placed 가 바로 이것
    place(&mut tx, 7, 7, "#FFFFFF").await;
    assert_eq!(recv_event(&mut rx, "pixel-placed").await, json!({ "x": 7, "y": 7, "color": "#FFFFFF" }));

    let canvas = backend.hash_get_all("canvas").await.unwrap();
    assert_eq!(canvas.len(), 1);
    assert_eq!(canvas["7:7"], "0");
}

#[tokio::test]
async fn test_set_cooldown_endpoint() {
    let backend = Arc::new(MemoryBackend::new());
    let addr    = spawn_test_server(backend.clone()).await;
    let (mut tx, mut rx, _) = connect_as(&addr, "10.0.0.1").await;

    let (status, _) = set_cooldown_http(&addr, "wrong", "100").await;
    assert_eq!(status, 401);

    let (status, _) = set_cooldown_http(&addr, SECRET, "60001").await;
    assert_eq!(status, 400);
    let (status, _) = set_cooldown_http(&addr, SECRET, "abc").await;
    assert_eq!(status, 400);

    let (status, body) = set_cooldown_http(&addr, SECRET, "0").await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({ "success": true, "newCooldown": 0 }));

    // 재접속 없이 변경 통지
    assert_eq!(recv_event(&mut rx, "cooldown-updated").await, json!({ "cooldown": 0 }));

    // 0 = 락 없음. 연속 배치 모두 반영
    place(&mut tx, 1, 1, "#000000").await;
    recv_event(&mut rx, "pixel-placed").await;
    place(&mut tx, 2, 2, "#000000").await;
    recv_event(&mut rx, "pixel-placed").await;
    assert_eq!(backend.hash_get_all("canvas").await.unwrap().len(), 2);
    assert_eq!(backend.get("cooldown:lock:10.0.0.1").await.unwrap(), None);
}

#[tokio::test]
async fn test_two_processes_share_fanout() {
    let backend = Arc::new(MemoryBackend::new());
    let p1 = spawn_test_server(backend.clone()).await;
    let p2 = spawn_test_server(backend.clone()).await;

    let (mut tx_1, _rx_1, _) = connect_as(&p1, "10.0.0.1").await;
    let (mut tx_2, mut rx_2, _) = connect_as(&p2, "10.0.0.2").await;

    // P1 에서 배치 → P2 의 클라이언트가 수신
    place(&mut tx_1, 9, 9, "#2450A4").await;
    assert_eq!(recv_event(&mut rx_2, "pixel-placed").await, json!({ "x": 9, "y": 9, "color": "#2450A4" }));

    // P1 에서 쿨다운 변경 → P2 의 클라이언트가 통지 받음
    let (status, _) = set_cooldown_http(&p1, SECRET, "1500").await;
    assert_eq!(status, 200);
    assert_eq!(recv_event(&mut rx_2, "cooldown-updated").await, json!({ "cooldown": 1500 }));

    // 새 값은 이후 획득하는 락부터 적용
    place(&mut tx_2, 8, 8, "#000000").await;
    assert_eq!(recv_event(&mut rx_2, "cooldown").await, json!({ "remaining": 1500, "total": 1500 }));

    // 새 접속 스냅샷은 두 프로세스 모두 같은 상태
    let (_, _, snap_1) = connect_as(&p1, "10.0.0.3").await;
    let (_, _, snap_2) = connect_as(&p2, "10.0.0.4").await;
    assert_eq!(snap_1, snap_2);
    assert_eq!(snap_1["9:9"], "#2450A4");

    drop(tx_1);
}

#[tokio::test]
async fn test_blacklist_disconnects_offender() {
    let backend = Arc::new(MemoryBackend::new());
    let addr    = spawn_test_server(backend.clone()).await;

    let (mut tx_bad, mut rx_bad, _) = connect_as(&addr, "6.6.6.6").await;
    let (_tx_ok, mut rx_ok, _)      = connect_as(&addr, "10.0.0.1").await;

    for i in 0..105 {
        if tx_bad.send(Message::Text(
            json!({ "event": "place-pixel", "data": { "x": i, "y": 0, "color": "#000000" } }).to_string().into(),
        )).await.is_err() {
            break;
        }
    }

    // 다른 사용자에게 식별자가 포함된 공지
    let notice = recv_event(&mut rx_ok, "chat-message").await;
    assert!(notice.as_str().unwrap().contains("6.6.6.6"));

    // 위반자 소켓은 닫힘
    let closed = timeout(Duration::from_secs(5), async {
        loop {
            match rx_bad.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return true,
                Some(Ok(_)) => continue,
            }
        }
    }).await.unwrap_or(false);
    assert!(closed);

    // 공유 블랙리스트에 기록 (소켓 종료와 비동기), 쿨다운 때문에 첫 배치만 반영
    let mut persisted = Vec::new();
    for _ in 0..50 {
        persisted = backend.set_members("blacklist").await.unwrap();
        if !persisted.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(persisted, vec!["6.6.6.6".to_string()]);
    assert_eq!(backend.hash_get_all("canvas").await.unwrap().len(), 1);

    // 재접속해도 배치는 차단
    let (mut tx_again, mut rx_again, _) = connect_as(&addr, "6.6.6.6").await;
    place(&mut tx_again, 500, 500, "#000000").await;
    expect_no_event(&mut rx_again, "pixel-placed", Duration::from_millis(300)).await;
}

#[tokio::test]
async fn test_invalid_placements_count_toward_blacklist() {
    let backend = Arc::new(MemoryBackend::new());
    let addr    = spawn_test_server(backend.clone()).await;

    let (mut tx_bad, mut rx_bad, _) = connect_as(&addr, "6.6.6.7").await;
    let (_tx_ok, mut rx_ok, _)      = connect_as(&addr, "10.0.0.2").await;

    // 타입 불일치 / 필드 누락 / 범위 밖 / 팔레트 밖 — 하나도 유효하지 않은 시도 105회
    let frames: Vec<Value> = (0..105)
        .map(|i| match i % 4 {
            0 => json!({ "event": "place-pixel", "data": { "x": 1.5, "y": 0, "color": "#000000" } }),
            1 => json!({ "event": "place-pixel", "data": { "x": "5", "y": 0 } }),
            2 => json!({ "event": "place-pixel", "data": { "x": 1000, "y": i, "color": "#000000" } }),
            _ => json!({ "event": "place-pixel", "data": { "x": 1, "y": 1, "color": "#123456" } }),
        })
        .collect();
    for frame in frames {
        if tx_bad.send(Message::Text(frame.to_string().into())).await.is_err() {
            break;
        }
    }

    let notice = recv_event(&mut rx_ok, "chat-message").await;
    assert!(notice.as_str().unwrap().contains("6.6.6.7"));

    let closed = timeout(Duration::from_secs(5), async {
        loop {
            match rx_bad.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return true,
                Some(Ok(_)) => continue,
            }
        }
    }).await.unwrap_or(false);
    assert!(closed);

    let mut persisted = Vec::new();
    for _ in 0..50 {
        persisted = backend.set_members("blacklist").await.unwrap();
        if !persisted.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(persisted, vec!["6.6.6.7".to_string()]);

    // 이후 유효한 배치도 반영되지 않음
    let (mut tx_again, mut rx_again, _) = connect_as(&addr, "6.6.6.7").await;
    place(&mut tx_again, 3, 3, "#000000").await;
    expect_no_event(&mut rx_again, "pixel-placed", Duration::from_millis(300)).await;
    assert!(backend.hash_get_all("canvas").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_pseudonym_and_chat() {
    let backend = Arc::new(MemoryBackend::new());
    let addr    = spawn_test_server(backend).await;

    let (mut tx_a, mut rx_a, _) = connect_as(&addr, "10.0.0.1").await;
    let (_tx_b, mut rx_b, _)    = connect_as(&addr, "10.0.0.2").await;

    send(&mut tx_a, json!({ "event": "set-pseudonym", "data": "  painter  " })).await;
    let notice = recv_event(&mut rx_b, "chat-message").await;
    assert!(notice.as_str().unwrap().contains("painter"));

    // 200자 이상은 폐기
    send(&mut tx_a, json!({ "event": "chat-message", "data": "x".repeat(200) })).await;
    send(&mut tx_a, json!({ "event": "chat-message", "data": "hello" })).await;
    assert_eq!(recv_event(&mut rx_b, "chat-message").await, json!({ "author": "painter", "message": "hello" }));

    // 1초 주기 user-list
    let list = recv_event(&mut rx_a, "user-list").await;
    assert_eq!(list.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_admin_command_routing() {
    let backend = Arc::new(MemoryBackend::new());
    let addr    = spawn_test_server(backend).await;

    let (mut tx_op, mut rx_op, _)   = connect_as(&addr, "10.0.0.9").await;
    let (_tx_t, mut rx_target, _)   = connect_as(&addr, "10.0.0.5").await;

    send(&mut tx_op, json!({
        "event": "admin-command",
        "data": { "ip": "10.0.0.5", "command": "open-tab", "adminToken": "wrong", "url": "https://x" }
    })).await;
    assert_eq!(recv_event(&mut rx_op, "error").await["reason"], "unauthorized");

    send(&mut tx_op, json!({
        "event": "admin-command",
        "data": { "ip": "10.0.0.5", "command": "open-tab", "adminToken": SECRET, "url": "https://x" }
    })).await;
    let cmd = recv_event(&mut rx_target, "admin-command").await;
    assert_eq!(cmd, json!({ "command": "open-tab", "url": "https://x" }));
}

#[tokio::test]
async fn test_store_failure_surfaces_error_to_requester() {
    let backend = Arc::new(MemoryBackend::new());
    let addr    = spawn_test_server(backend.clone()).await;

    let (mut tx, mut rx, _) = connect_as(&addr, "10.0.0.1").await;
    backend.set_unavailable(true);

    place(&mut tx, 1, 1, "#000000").await;
    assert_eq!(recv_event(&mut rx, "error").await, json!({ "reason": "placement failed" }));

    // 연결은 유지되고 복구 후 정상 처리
    backend.set_unavailable(false);
    place(&mut tx, 1, 1, "#000000").await;
    recv_event(&mut rx, "pixel-placed").await;
}
