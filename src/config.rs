// author: kodeholic (powered by Claude)
// 매직 넘버를 배제하고 시스템 전체의 성능과 한계를 제어하는 상수 모음입니다.

// ----------------------------------------------------------------------------
// 캔버스
// ----------------------------------------------------------------------------

/// 캔버스 가로 셀 수
pub const CANVAS_WIDTH: i64 = 1000;

/// 캔버스 세로 셀 수
pub const CANVAS_HEIGHT: i64 = 1000;

/// 고정 팔레트. 저장소에는 색상 문자열이 아니라 이 배열의 인덱스가 저장된다.
/// 순서를 바꾸면 기존 캔버스 데이터의 색이 전부 바뀌므로 뒤에만 추가할 것
pub const COLOR_PALETTE: &[&str] = &[
    "#FFFFFF",
    "#000000",
    "#FF4500",
    "#FFA800",
    "#FFD635",
    "#00A368",
    "#7EED56",
    "#2450A4",
    "#3690EA",
    "#51E9F4",
    "#811E9F",
    "#B44AC0",
    "#FF99AA",
    "#9C6926",
    "#6D482F",
];

// ----------------------------------------------------------------------------
// 쿨다운 / 어뷰징
// ----------------------------------------------------------------------------

/// 저장소에 전역 쿨다운 값이 없을 때 사용하는 기본값 (5초)
pub const DEFAULT_COOLDOWN_MS: u64 = 5_000;

/// 관리자가 설정할 수 있는 최대 쿨다운 (60초). 0이면 쿨다운 비활성
pub const MAX_COOLDOWN_MS: u64 = 60_000;

/// 어뷰징 감지 윈도우 (1초)
pub const RATE_WINDOW_MS: u64 = 1_000;

/// 윈도우 내 허용 시도 횟수. 초과하는 순간 블랙리스트
pub const RATE_MAX_ATTEMPTS: u32 = 100;

// ----------------------------------------------------------------------------
// 프레즌스 / 채팅
// ----------------------------------------------------------------------------

/// 닉네임 최대 길이 (문자 수, trim 후)
pub const MAX_PSEUDONYM_LEN: usize = 15;

/// 채팅 메시지 길이 상한 (문자 수, 미만만 허용)
pub const MAX_CHAT_LEN: usize = 200;

/// user-list 전체 갱신 주기 (1초)
pub const PRESENCE_TICK_MS: u64 = 1_000;

/// 기본 닉네임 접두어 (anon-XXXX)
pub const DEFAULT_PSEUDONYM_PREFIX: &str = "anon-";

// ----------------------------------------------------------------------------
// 커넥션 / 저장소
// ----------------------------------------------------------------------------

/// 송신(Egress) 큐 사이즈.
/// 꽉 차면 코디네이터 지연 방지를 위해 해당 커넥션의 프레임을 버립니다(Drop/Backpressure).
pub const EGRESS_QUEUE_SIZE: usize = 2048;

/// 코디네이터 명령 큐 사이즈
pub const COORDINATOR_QUEUE_SIZE: usize = 4096;

/// 신규 접속 스냅샷 조회 재시도 횟수
pub const SNAPSHOT_RETRY_ATTEMPTS: u32 = 3;

/// 스냅샷 재시도 초기 백오프 (매 시도마다 2배)
pub const SNAPSHOT_RETRY_BASE_MS: u64 = 200;

/// 캔버스 해시 키 ("x:y" → 팔레트 인덱스 문자열)
pub const CANVAS_KEY: &str = "canvas";

/// 블랙리스트 셋 키
pub const BLACKLIST_KEY: &str = "blacklist";

/// 전역 쿨다운 값 키
pub const COOLDOWN_DURATION_KEY: &str = "cooldown:duration";

/// 식별자별 쿨다운 락 키 접두어.
/// 식별자는 클라이언트가 보낸 헤더에서 오므로 COOLDOWN_DURATION_KEY 와 겹치지 않아야 한다
pub const COOLDOWN_LOCK_PREFIX: &str = "cooldown:lock:";

/// 픽셀 팬아웃 채널
pub const PIXEL_CHANNEL: &str = "pixel";

/// 쿨다운 변경 팬아웃 채널
pub const COOLDOWN_UPDATE_CHANNEL: &str = "cooldown:update";

// ----------------------------------------------------------------------------
// 서버 기본값
// ----------------------------------------------------------------------------

/// 웹소켓 + HTTP 공용 TCP 포트
pub const DEFAULT_PORT: u16 = 3000;

/// 관리자 시크릿 기본값
/// 운영 환경에서는 환경변수 ADMIN_SECRET_KEY 로 오버라이드 할 것
pub const DEFAULT_ADMIN_SECRET: &str = "changeme";

/// TraceHub 브로드캐스트 버퍼 크기
pub const TRACE_BUF: usize = 512;
