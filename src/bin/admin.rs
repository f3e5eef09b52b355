// author: kodeholic (powered by Claude)
//
// pcadmin — mini-pixelcanvas 운영 관리 CLI
//
// 사용법:
//   pcadmin [--host HOST] [--port PORT] [--secret SECRET] <COMMAND>
//
// 조회 명령
//   pcadmin status              서버 상태 요약 (uptime, 연결 수, 블랙리스트, 쿨다운)
//   pcadmin users               접속 식별자 테이블 (픽셀 수 내림차순)
//   pcadmin blacklist           블랙리스트 식별자 목록
//
// 조작 명령
//   pcadmin set-cooldown <ms>   전역 쿨다운 변경 (0 = 비활성, 최대 60000)

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Deserialize;
use tabled::{Table, Tabled};

// ----------------------------------------------------------------------------
// [CLI 정의]
// ----------------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name    = "pcadmin",
    about   = "mini-pixelcanvas 운영 관리 CLI",
    version,
)]
struct Cli {
    /// 서버 호스트
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// 서버 포트 (WS/HTTP 공용)
    #[arg(long, default_value_t = 3000)]
    port: u16,

    /// 관리자 시크릿
    #[arg(long, env = "ADMIN_SECRET_KEY", default_value = "changeme", hide_env_values = true)]
    secret: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 서버 상태 요약
    Status,

    /// 접속 식별자 목록
    Users,

    /// 블랙리스트 목록
    Blacklist,

    /// 전역 쿨다운 변경
    SetCooldown {
        /// 밀리초 (0..=60000)
        ms: String,
    },
}

// ----------------------------------------------------------------------------
// [응답 타입] — http/dto.rs 와 대응
// ----------------------------------------------------------------------------

#[derive(Deserialize)]
struct ServerStatus {
    uptime_secs:      u64,
    connection_count: usize,
    user_count:       usize,
    blacklist_count:  usize,
    cooldown_ms:      u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserView {
    ip:           String,
    pseudonym:    String,
    connected_at: u64,
    pixel_count:  u64,
}

#[derive(Tabled)]
struct UserRow {
    #[tabled(rename = "IP")]
    ip:          String,
    #[tabled(rename = "PSEUDONYM")]
    pseudonym:   String,
    #[tabled(rename = "PIXELS")]
    pixel_count: u64,
    #[tabled(rename = "CONNECTED")]
    connected:   String,
}

#[derive(Deserialize)]
struct BlacklistResponse {
    count:      usize,
    identities: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetCooldownResponse {
    new_cooldown: u64,
}

// ----------------------------------------------------------------------------
// [main]
// ----------------------------------------------------------------------------

fn main() {
    let cli  = Cli::parse();
    let base = format!("http://{}:{}", cli.host, cli.port);

    let result = match &cli.command {
        Command::Status           => cmd_status(&base, &cli.secret),
        Command::Users            => cmd_users(&base, &cli.secret),
        Command::Blacklist        => cmd_blacklist(&base, &cli.secret),
        Command::SetCooldown { ms } => cmd_set_cooldown(&base, &cli.secret, ms),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "ERROR:".red().bold(), e);
        std::process::exit(1);
    }
}

// ----------------------------------------------------------------------------
// [커맨드 구현]
// ----------------------------------------------------------------------------

fn cmd_status(base: &str, secret: &str) -> Result<(), Box<dyn std::error::Error>> {
    let s: ServerStatus = get_json(&format!("{}/admin/status", base), &[("secret", secret)])?;

    let hours   = s.uptime_secs / 3600;
    let minutes = (s.uptime_secs % 3600) / 60;
    let secs    = s.uptime_secs % 60;

    println!();
    println!("{}", "  mini-pixelcanvas Server Status".bold().cyan());
    println!("  {}", "─".repeat(36).dimmed());
    println!("  {:16} {}",
        "Uptime:".bold(),
        format!("{}h {}m {}s", hours, minutes, secs).green()
    );
    println!("  {:16} {}", "Connections:".bold(), s.connection_count.to_string().yellow());
    println!("  {:16} {}", "Users:".bold(),       s.user_count.to_string().yellow());
    println!("  {:16} {}",
        "Blacklisted:".bold(),
        if s.blacklist_count > 0 {
            s.blacklist_count.to_string().red().bold().to_string()
        } else {
            s.blacklist_count.to_string().dimmed().to_string()
        }
    );
    println!("  {:16} {}",
        "Cooldown:".bold(),
        if s.cooldown_ms == 0 {
            "off".dimmed().to_string()
        } else {
            format!("{}ms", s.cooldown_ms).green().to_string()
        }
    );
    println!();
    Ok(())
}

fn cmd_users(base: &str, secret: &str) -> Result<(), Box<dyn std::error::Error>> {
    let users: Vec<UserView> = get_json(&format!("{}/admin/users", base), &[("secret", secret)])?;

    if users.is_empty() {
        println!("{}", "  접속 중인 사용자 없음".dimmed());
        return Ok(());
    }

    let rows: Vec<UserRow> = users.iter().map(|u| UserRow {
        ip:          u.ip.clone(),
        pseudonym:   u.pseudonym.clone(),
        pixel_count: u.pixel_count,
        connected:   format_ts(u.connected_at),
    }).collect();

    println!();
    println!("{}", Table::new(&rows));
    println!("  {} user(s)", rows.len());
    println!();
    Ok(())
}

fn cmd_blacklist(base: &str, secret: &str) -> Result<(), Box<dyn std::error::Error>> {
    let b: BlacklistResponse = get_json(&format!("{}/admin/blacklist", base), &[("secret", secret)])?;

    println!();
    if b.identities.is_empty() {
        println!("{}", "  블랙리스트 없음".dimmed());
    } else {
        for id in &b.identities {
            println!("  {} {}", "●".red(), id);
        }
        println!("  {} identit(ies)", b.count);
    }
    println!();
    Ok(())
}

fn cmd_set_cooldown(base: &str, secret: &str, ms: &str) -> Result<(), Box<dyn std::error::Error>> {
    let r: SetCooldownResponse = get_json(
        &format!("{}/api/admin/set-cooldown", base),
        &[("secret", secret), ("ms", ms)],
    )?;
    println!("{} global cooldown = {}ms", "OK".green().bold(), r.new_cooldown);
    Ok(())
}

// ----------------------------------------------------------------------------
// [유틸]
// ----------------------------------------------------------------------------

/// GET 요청 + JSON 역직렬화
fn get_json<T: for<'de> serde::Deserialize<'de>>(
    url:   &str,
    query: &[(&str, &str)],
) -> Result<T, Box<dyn std::error::Error>> {
    let resp   = reqwest::blocking::Client::new().get(url).query(query).send()?;
    let status = resp.status();
    if !status.is_success() {
        let body: serde_json::Value = resp.json().unwrap_or_default();
        let msg = body["error"].as_str().unwrap_or("unknown error");
        return Err(format!("[{}] {}", status, msg).into());
    }
    Ok(resp.json()?)
}

/// Unix millis → 로컬 시각 "YYYY-MM-DD HH:MM:SS"
fn format_ts(ms: u64) -> String {
    chrono::DateTime::from_timestamp_millis(ms as i64)
        .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}
