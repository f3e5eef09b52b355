// author: kodeholic (powered by Claude)
//
// pctrace — mini-pixelcanvas 실시간 게이트웨이 이벤트 관찰 CLI
//
// 사용법:
//   pctrace [--host HOST] [--port PORT] [--secret SECRET] [--filter EVENT] [IDENTITY]
//
// 예시:
//   pctrace                          # 전체 이벤트 스트림
//   pctrace 203.0.113.7              # 특정 식별자만
//   pctrace --filter place           # 배치 이벤트만
//   pctrace --filter blacklist       # 블랙리스트 전이만

use clap::Parser;
use colored::Colorize;
use reqwest::blocking::Client;
use std::io::{BufRead, BufReader};

use serde::Deserialize;

// ----------------------------------------------------------------------------
// [CLI 인자]
// ----------------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name    = "pctrace",
    about   = "mini-pixelcanvas 실시간 게이트웨이 이벤트 스트림 관찰",
    version,
)]
struct Cli {
    /// 서버 호스트
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// 서버 포트
    #[arg(long, default_value_t = 3000)]
    port: u16,

    /// 관리자 시크릿
    #[arg(long, env = "ADMIN_SECRET_KEY", default_value = "changeme", hide_env_values = true)]
    secret: String,

    /// 이벤트 이름 필터 (대소문자 무관, 부분 일치)
    #[arg(long, short = 'f')]
    filter: Option<String>,

    /// 관찰할 식별자 (생략 시 전체)
    identity: Option<String>,
}

// ----------------------------------------------------------------------------
// [TraceEvent 역직렬화] — src/trace.rs와 동일 구조
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TraceEvent {
    ts:       u64,
    dir:      String,        // "in" | "out" | "sys"
    identity: Option<String>,
    event:    String,
    summary:  String,
}

// ----------------------------------------------------------------------------
// [메인]
// ----------------------------------------------------------------------------

fn main() {
    let cli = Cli::parse();

    let url = match &cli.identity {
        Some(id) => format!("http://{}:{}/trace/{}", cli.host, cli.port, id),
        None     => format!("http://{}:{}/trace",   cli.host, cli.port),
    };

    let filter = cli.filter.as_ref().map(|s| s.to_lowercase());

    println!("{}", "─".repeat(90).dimmed());
    println!(
        "  {} {}  {}  {}",
        "pctrace".bold().cyan(),
        "▶".green(),
        url.dimmed(),
        filter.as_deref()
            .map(|f| format!("[filter: {}]", f).yellow().to_string())
            .unwrap_or_default(),
    );
    println!("{}", "─".repeat(90).dimmed());
    println!(
        "  {:<12} {:<6} {:<16} {:<18} {}",
        "TIME".dimmed(),
        "DIR".dimmed(),
        "EVENT".dimmed(),
        "IDENTITY".dimmed(),
        "SUMMARY".dimmed(),
    );
    println!("{}", "─".repeat(90).dimmed());

    // SSE 스트림 연결 (blocking, chunked read). 스트림이라 타임아웃 없음
    let client = match Client::builder().timeout(None).build() {
        Ok(c)  => c,
        Err(e) => {
            eprintln!("{} HTTP 클라이언트 생성 실패: {}", "✗".red(), e);
            std::process::exit(1);
        }
    };

    let resp = match client
        .get(&url)
        .query(&[("secret", cli.secret.as_str())])
        .header("Accept", "text/event-stream")
        .send()
    {
        Ok(r)  => r,
        Err(e) => {
            eprintln!("{} 서버 연결 실패: {}", "✗".red(), e);
            eprintln!("  서버가 실행 중인지 확인하세요: {}", url.dimmed());
            std::process::exit(1);
        }
    };

    if !resp.status().is_success() {
        eprintln!("{} HTTP {}", "✗".red(), resp.status());
        std::process::exit(1);
    }

    let reader = BufReader::new(resp);
    let mut event_count: u64 = 0;

    for line in reader.lines() {
        let line = match line {
            Ok(l)  => l,
            Err(e) => {
                eprintln!("{} 스트림 읽기 실패: {}", "✗".red(), e);
                break;
            }
        };

        // SSE 포맷: "data: {JSON}" 또는 ": keep-alive" 또는 빈 줄
        let Some(json_str) = line.strip_prefix("data: ") else {
            continue;
        };

        let event: TraceEvent = match serde_json::from_str(json_str) {
            Ok(e)  => e,
            Err(e) => {
                eprintln!("{} JSON 파싱 실패: {} ({})", "⚠".yellow(), e, json_str);
                continue;
            }
        };

        if let Some(ref f) = filter {
            if !event.event.to_lowercase().contains(f.as_str()) {
                continue;
            }
        }

        print_event(&event);
        event_count += 1;
    }

    println!("{}", "─".repeat(90).dimmed());
    println!("  스트림 종료 (총 {} 이벤트)", event_count);
}

// ----------------------------------------------------------------------------
// [이벤트 출력]
// ----------------------------------------------------------------------------

fn print_event(e: &TraceEvent) {
    let dir_str = match e.dir.as_str() {
        "in"  => "↓ C→S".bright_blue().to_string(),
        "out" => "↑ S→C".bright_green().to_string(),
        "sys" => "· SYS".bright_yellow().to_string(),
        other => other.dimmed().to_string(),
    };

    println!(
        "  {} {} {:<16} {} {}",
        format_ts(e.ts).dimmed(),
        dir_str,
        colorize_event(&e.event),
        truncate(e.identity.as_deref().unwrap_or("-"), 18).bright_white(),
        e.summary.dimmed(),
    );
}

fn colorize_event(name: &str) -> String {
    match name {
        "blacklist"                    => name.bright_red().bold().to_string(),
        "set-cooldown" | "cooldown:update" => name.bright_yellow().to_string(),
        "admin-command"                => name.bright_magenta().to_string(),
        "place-pixel" | "pixel"        => name.bright_green().to_string(),
        "chat-message" | "set-pseudonym" => name.bright_cyan().to_string(),
        _                              => name.normal().to_string(),
    }
}

/// Unix millis → 로컬 "HH:MM:SS.mmm"
fn format_ts(ts_ms: u64) -> String {
    chrono::DateTime::from_timestamp_millis(ts_ms as i64)
        .map(|t| t.with_timezone(&chrono::Local).format("%H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| "--:--:--.---".to_string())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        format!("{:<width$}", s, width = max)
    } else {
        let head: String = s.chars().take(max - 1).collect();
        format!("{}…", head)
    }
}
