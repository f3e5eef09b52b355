// author: kodeholic (powered by Claude)

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::PresenceView;

// ----------------------------------------------------------------------------
// [공통] 이벤트 봉투 (Envelope)
// ----------------------------------------------------------------------------
//
// 모든 WebSocket 텍스트 프레임:
//   { "event": "place-pixel", "data": { "x": 5, "y": 5, "color": "#000000" } }
//
// 수신은 닫힌 enum(ClientEvent)으로만 해석한다. 디코딩 실패 = 조용히 폐기
// 단, 페이로드만 깨진 place-pixel 은 폐기 전에 요청량으로 집계된다 (envelope_event)

// ----------------------------------------------------------------------------
// [C→S] 클라이언트 이벤트
// ----------------------------------------------------------------------------

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    PlacePixel(PlacePixelPayload),
    SetPseudonym(String),
    ChatMessage(String),
    AdminCommand(AdminCommandPayload),
}

pub const PLACE_PIXEL_EVENT: &str = "place-pixel";

/// 이벤트 이름만 읽는 느슨한 봉투
#[derive(Deserialize)]
struct EventName {
    event: String,
}

/// ClientEvent 디코딩에 실패한 프레임의 event 이름. JSON 객체가 아니면 None
pub fn envelope_event(text: &str) -> Option<String> {
    serde_json::from_str::<EventName>(text).ok().map(|e| e.event)
}

/// event: place-pixel
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct PlacePixelPayload {
    pub x:     i64,
    pub y:     i64,
    pub color: String,
}

/// event: admin-command
/// command/args 의미는 해석하지 않고 대상 소켓으로 그대로 전달
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct AdminCommandPayload {
    pub ip:          String,
    pub command:     String,
    #[serde(rename = "adminToken")]
    pub admin_token: String,
    #[serde(flatten)]
    pub args:        Map<String, Value>,
}

// ----------------------------------------------------------------------------
// [S→C] 서버 이벤트
// ----------------------------------------------------------------------------

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// 접속 직후 전체 스냅샷 ("x:y" → 색상)
    CanvasState(HashMap<String, String>),
    PixelPlaced(PixelPayload),
    Cooldown(CooldownPayload),
    CooldownUpdated(CooldownUpdatedPayload),
    UserCount(usize),
    UserList(Vec<PresenceView>),
    ChatMessage(ChatLine),
    /// { command, ...args }
    AdminCommand(Map<String, Value>),
    /// 저장소 장애 등 요청자 한정 일반 실패 알림
    Error(ErrorPayload),
}

impl ServerEvent {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// pixel-placed 페이로드. pub/sub `pixel` 채널 메시지 형식과 동일
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PixelPayload {
    pub x:     i64,
    pub y:     i64,
    pub color: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CooldownPayload {
    pub remaining: u64,
    pub total:     u64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CooldownUpdatedPayload {
    pub cooldown: u64,
}

/// chat-message: 시스템 공지는 문자열, 사용자 채팅은 {author, message}
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ChatLine {
    Notice(String),
    Authored { author: String, message: String },
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ErrorPayload {
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(v: Value) -> Result<ClientEvent, serde_json::Error> {
        serde_json::from_value(v)
    }

    #[test]
    fn decodes_place_pixel() {
        let ev = decode(json!({ "event": "place-pixel", "data": { "x": 5, "y": 6, "color": "#000000" } })).unwrap();
        assert_eq!(ev, ClientEvent::PlacePixel(PlacePixelPayload { x: 5, y: 6, color: "#000000".into() }));
    }

    #[test]
    fn rejects_wrong_types_and_unknown_events() {
        assert!(decode(json!({ "event": "place-pixel", "data": { "x": "5", "y": 6, "color": "#000000" } })).is_err());
        assert!(decode(json!({ "event": "place-pixel", "data": { "x": 1.5, "y": 6, "color": "#000000" } })).is_err());
        assert!(decode(json!({ "event": "place-pixel", "data": { "x": 1, "y": 6 } })).is_err());
        assert!(decode(json!({ "event": "set-pseudonym", "data": 42 })).is_err());
        assert!(decode(json!({ "event": "drop-tables", "data": null })).is_err());
    }

    #[test]
    fn envelope_event_survives_broken_payloads() {
        for frame in [
            r##"{"event":"place-pixel","data":{"x":1.5,"y":0,"color":"#000000"}}"##,
            r##"{"event":"place-pixel","data":{"x":"5","y":0,"color":"#000000"}}"##,
            r##"{"event":"place-pixel","data":{"x":1,"y":0}}"##,
            r##"{"event":"place-pixel"}"##,
        ] {
            assert!(serde_json::from_str::<ClientEvent>(frame).is_err());
            assert_eq!(envelope_event(frame).as_deref(), Some(PLACE_PIXEL_EVENT));
        }
        assert_eq!(envelope_event(r#"{"event":"drop-tables","data":1}"#).as_deref(), Some("drop-tables"));
        assert_eq!(envelope_event("not json"), None);
        assert_eq!(envelope_event(r#"{"data":1}"#), None);
    }

    #[test]
    fn admin_command_keeps_extra_args() {
        let ev = decode(json!({
            "event": "admin-command",
            "data": { "ip": "1.2.3.4", "command": "open-tab", "adminToken": "s", "url": "https://x" }
        })).unwrap();
        let ClientEvent::AdminCommand(p) = ev else { panic!("expected admin-command") };
        assert_eq!(p.ip, "1.2.3.4");
        assert_eq!(p.admin_token, "s");
        assert_eq!(p.args["url"], "https://x");
        assert!(!p.args.contains_key("command"));
    }

    #[test]
    fn server_events_use_kebab_envelope() {
        let v: Value = serde_json::from_str(&ServerEvent::Cooldown(CooldownPayload { remaining: 4000, total: 5000 }).to_json()).unwrap();
        assert_eq!(v, json!({ "event": "cooldown", "data": { "remaining": 4000, "total": 5000 } }));

        let v: Value = serde_json::from_str(&ServerEvent::UserCount(3).to_json()).unwrap();
        assert_eq!(v, json!({ "event": "user-count", "data": 3 }));

        let v: Value = serde_json::from_str(&ServerEvent::ChatMessage(ChatLine::Notice("hi".into())).to_json()).unwrap();
        assert_eq!(v, json!({ "event": "chat-message", "data": "hi" }));

        let v: Value = serde_json::from_str(&ServerEvent::ChatMessage(ChatLine::Authored {
            author: "bob".into(), message: "yo".into(),
        }).to_json()).unwrap();
        assert_eq!(v["data"], json!({ "author": "bob", "message": "yo" }));
    }
}
