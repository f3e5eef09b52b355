// author: kodeholic (powered by Claude)
// 좌표 / 팔레트 검증 — 부수효과 없는 순수 함수

use crate::config::{CANVAS_HEIGHT, CANVAS_WIDTH, COLOR_PALETTE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    OutOfBounds,
    UnknownColor,
}

/// 배치 요청 1차 필터. 통과하면 팔레트 인덱스 반환
/// 색상은 팔레트 항목과 정확히 일치해야 한다 (대소문자 포함)
pub fn validate(x: i64, y: i64, color: &str) -> Result<u8, Rejection> {
    if !in_bounds(x, y) {
        return Err(Rejection::OutOfBounds);
    }
    palette_index(color).ok_or(Rejection::UnknownColor)
}

pub fn in_bounds(x: i64, y: i64) -> bool {
    (0..CANVAS_WIDTH).contains(&x) && (0..CANVAS_HEIGHT).contains(&y)
}

pub fn palette_index(color: &str) -> Option<u8> {
    COLOR_PALETTE.iter().position(|c| *c == color).map(|i| i as u8)
}

pub fn palette_color(index: u8) -> Option<&'static str> {
    COLOR_PALETTE.get(index as usize).copied()
}
