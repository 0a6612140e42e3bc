// author: kodeholic (powered by Claude)
//
// pmadmin - pair-match 운영 관리 CLI
//
// 사용법:
//   pmadmin [--host HOST] [--port PORT] <COMMAND>
//
// 조회 명령
//   pmadmin status                     서버 상태 요약 (상태별 유저 수, 큐 길이, 세션)
//   pmadmin users                      StatusEntry 전체 테이블
//   pmadmin users <user_id>            StatusEntry 상세 (lease, 순번, 세션)
//   pmadmin pool                       버킷별 대기 인원 + FCFS 순서
//   pmadmin sessions                   세션 전체 테이블
//   pmadmin sessions <session_id>      세션 상세 (참가자 상태)
//
// 조작 명령
//   pmadmin clear <user_id>            매칭 상태 강제 정리

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Deserialize;
use std::collections::BTreeMap;
use tabled::{Table, Tabled};

// ----------------------------------------------------------------------------
// [CLI 정의]
// ----------------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name    = "pmadmin",
    about   = "pair-match 운영 관리 CLI",
    version,
)]
struct Cli {
    /// 서버 호스트
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// 서버 포트 (HTTP/WS 공용)
    #[arg(long, default_value_t = 8080)]
    port: u16,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 서버 상태 요약
    Status,

    /// 매칭 유저 목록 또는 상세
    Users {
        /// user_id 지정 시 상세 보기
        user_id: Option<String>,
    },

    /// 매칭 풀 (버킷 + FCFS)
    Pool,

    /// 세션 목록 또는 상세
    Sessions {
        /// session_id 지정 시 상세 보기
        session_id: Option<String>,
    },

    /// 매칭 상태 강제 정리
    Clear {
        /// 대상 user_id
        user_id: String,
    },
}

// ----------------------------------------------------------------------------
// [응답 타입] - http/dto.rs 와 대응
// ----------------------------------------------------------------------------

#[derive(Deserialize)]
struct ServerStatus {
    uptime_secs:     u64,
    user_count:      usize,
    by_status:       BTreeMap<String, usize>,
    entry_queue_len: usize,
    fcfs_len:        usize,
    session_count:   usize,
    active_sessions: usize,
    ws_connections:  usize,
    sweeper_running: bool,
}

#[derive(Deserialize)]
struct AdminUserSummary {
    user_id:        String,
    status:         String,
    difficulty:     String,
    topics:         Vec<String>,
    session_key:    i64,
    idle_secs:      u64,
    lease_secs:     Option<u64>,
    queue_position: Option<usize>,
}

// 컬러 렌더링용 표시 타입
#[derive(Tabled)]
struct UserRow {
    #[tabled(rename = "USER ID")]
    user_id:     String,
    #[tabled(rename = "STATUS")]
    status:      String,
    #[tabled(rename = "DIFF")]
    difficulty:  String,
    #[tabled(rename = "TOPICS")]
    topics:      String,
    #[tabled(rename = "KEY")]
    session_key: i64,
    #[tabled(rename = "IDLE(s)")]
    idle_secs:   u64,
    #[tabled(rename = "LEASE(s)")]
    lease:       String,
    #[tabled(rename = "POS")]
    position:    String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryView {
    user_id:      String,
    status:       String,
    session_key:  i64,
    difficulty:   String,
    topics:       Vec<String>,
    last_seen:    u64,
    matching_id:  Option<String>,
    requested_at: u64,
}

#[derive(Deserialize)]
struct AdminUserDetail {
    entry:          EntryView,
    idle_secs:      u64,
    lease_secs:     Option<u64>,
    queue_position: Option<usize>,
    connected:      bool,
    session_id:     Option<String>,
}

#[derive(Deserialize, Tabled)]
struct BucketInfo {
    #[tabled(rename = "DIFFICULTY")]
    difficulty: String,
    #[tabled(rename = "TOPIC")]
    topic:      String,
    #[tabled(rename = "SIZE")]
    size:       usize,
}

#[derive(Deserialize, Tabled)]
struct FcfsEntry {
    #[tabled(rename = "#")]
    position:    usize,
    #[tabled(rename = "USER ID")]
    user_id:     String,
    #[tabled(rename = "KEY")]
    session_key: i64,
}

#[derive(Deserialize)]
struct AdminPool {
    buckets: Vec<BucketInfo>,
    fcfs:    Vec<FcfsEntry>,
}

#[derive(Deserialize, Tabled)]
struct AdminSessionSummary {
    #[tabled(rename = "SESSION ID")]
    id:                 String,
    #[tabled(rename = "QUESTION")]
    question_id:        String,
    #[tabled(rename = "DIFF")]
    difficulty:         String,
    #[tabled(rename = "TOPIC")]
    topic:              String,
    #[tabled(rename = "PARTICIPANTS", display_with = "join_list")]
    participants:       Vec<String>,
    #[tabled(rename = "READY")]
    all_ready:          bool,
    #[tabled(rename = "ENDED", display_with = "opt_or_dash")]
    termination_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionDetail {
    id:                 String,
    matching_id:        String,
    question_id:        String,
    difficulty:         String,
    topic:              String,
    participants:       Vec<ParticipantView>,
    created_at:         u64,
    started_at:         Option<u64>,
    ended_at:           Option<u64>,
    termination_reason: Option<String>,
    ended_by:           Option<String>,
}

#[derive(Deserialize, Tabled)]
#[serde(rename_all = "camelCase")]
struct ParticipantView {
    #[tabled(rename = "USER ID")]
    user_id:    String,
    #[tabled(rename = "STATE")]
    state:      String,
    #[tabled(rename = "UPDATED", display_with = "format_ts_ref")]
    updated_at: u64,
}

// ----------------------------------------------------------------------------
// [main]
// ----------------------------------------------------------------------------

fn main() {
    let cli = Cli::parse();
    let base = format!("http://{}:{}", cli.host, cli.port);

    let result = match &cli.command {
        Command::Status                          => cmd_status(&base),
        Command::Users { user_id: None }         => cmd_users(&base),
        Command::Users { user_id: Some(uid) }    => cmd_user_detail(&base, uid),
        Command::Pool                            => cmd_pool(&base),
        Command::Sessions { session_id: None }   => cmd_sessions(&base),
        Command::Sessions { session_id: Some(sid) } => cmd_session_detail(&base, sid),
        Command::Clear { user_id }               => cmd_clear(&base, user_id),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "ERROR:".red().bold(), e);
        std::process::exit(1);
    }
}

// ----------------------------------------------------------------------------
// [커맨드 구현]
// ----------------------------------------------------------------------------

fn cmd_status(base: &str) -> Result<(), Box<dyn std::error::Error>> {
    let s: ServerStatus = get_json(&format!("{}/admin/status", base))?;

    let hours   = s.uptime_secs / 3600;
    let minutes = (s.uptime_secs % 3600) / 60;
    let secs    = s.uptime_secs % 60;

    println!();
    println!("{}", "  pair-match Server Status".bold().cyan());
    println!("  {}", "─".repeat(36).dimmed());
    println!("  {:16} {}",
        "Uptime:".bold(),
        format!("{}h {}m {}s", hours, minutes, secs).green()
    );
    println!("  {:16} {}", "Users:".bold(), s.user_count.to_string().yellow());
    for (status, count) in &s.by_status {
        println!("    {:14} {}", format!("{}:", status).dimmed(), colorize_status(status, &count.to_string()));
    }
    println!("  {:16} {}", "Entry Queue:".bold(), s.entry_queue_len.to_string().yellow());
    println!("  {:16} {}", "FCFS:".bold(),        s.fcfs_len.to_string().yellow());
    println!("  {:16} {} ({} active)", "Sessions:".bold(),
        s.session_count.to_string().yellow(),
        s.active_sessions.to_string().green(),
    );
    println!("  {:16} {}", "Gateway WS:".bold(), s.ws_connections.to_string().yellow());
    println!("  {:16} {}",
        "Sweeper:".bold(),
        if s.sweeper_running { "● running".yellow().to_string() } else { "○ idle".dimmed().to_string() }
    );
    println!();
    Ok(())
}

fn cmd_users(base: &str) -> Result<(), Box<dyn std::error::Error>> {
    let users: Vec<AdminUserSummary> = get_json(&format!("{}/admin/users", base))?;

    if users.is_empty() {
        println!("{}", "  매칭 중인 유저 없음".dimmed());
        return Ok(());
    }

    let rows: Vec<UserRow> = users.iter().map(|u| UserRow {
        user_id:     if u.idle_secs > 15 { u.user_id.red().to_string() } else { u.user_id.clone() },
        status:      colorize_status(&u.status, &u.status),
        difficulty:  u.difficulty.clone(),
        topics:      u.topics.join(","),
        session_key: u.session_key,
        idle_secs:   u.idle_secs,
        lease:       u.lease_secs.map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
        position:    u.queue_position.map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
    }).collect();

    println!();
    println!("{}", Table::new(&rows));
    println!("  {} user(s)", users.len());
    println!();
    Ok(())
}

fn cmd_user_detail(base: &str, user_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let u: AdminUserDetail = get_json(&format!("{}/admin/users/{}", base, user_id))?;
    let e = &u.entry;

    println!();
    println!("{}", format!("  User: {}", e.user_id).bold().cyan());
    println!("  {}", "─".repeat(36).dimmed());
    println!("  {:16} {}", "Status:".bold(),      colorize_status(&e.status, &e.status));
    println!("  {:16} {}", "Session Key:".bold(), e.session_key);
    println!("  {:16} {}", "Difficulty:".bold(),  e.difficulty);
    println!("  {:16} {}", "Topics:".bold(),      e.topics.join(", ").yellow());
    println!("  {:16} {}", "Requested:".bold(),   format_ts(e.requested_at));
    println!("  {:16} {} ({}s idle)", "Last Seen:".bold(), format_ts(e.last_seen), u.idle_secs);
    println!("  {:16} {}", "Lease:".bold(),
        u.lease_secs.map(|s| format!("{}s", s)).unwrap_or_else(|| "(없음)".dimmed().to_string()));
    println!("  {:16} {}", "Queue Pos:".bold(),
        u.queue_position.map(|p| p.to_string()).unwrap_or_else(|| "-".into()));
    println!("  {:16} {}", "Matching ID:".bold(), e.matching_id.as_deref().unwrap_or("-"));
    println!("  {:16} {}", "Session:".bold(),     u.session_id.as_deref().unwrap_or("-"));
    println!("  {:16} {}",
        "Gateway:".bold(),
        if u.connected { "✓ connected".green().to_string() } else { "✗ offline".dimmed().to_string() }
    );
    println!();
    Ok(())
}

fn cmd_pool(base: &str) -> Result<(), Box<dyn std::error::Error>> {
    let pool: AdminPool = get_json(&format!("{}/admin/pool", base))?;

    println!();
    println!("{}", "  Buckets".bold());
    if pool.buckets.is_empty() {
        println!("    {}", "(없음)".dimmed());
    } else {
        println!("{}", indent(&Table::new(&pool.buckets).to_string()));
    }

    println!();
    println!("{} ({})", "  FCFS".bold(), pool.fcfs.len());
    if pool.fcfs.is_empty() {
        println!("    {}", "(없음)".dimmed());
    } else {
        println!("{}", indent(&Table::new(&pool.fcfs).to_string()));
    }
    println!();
    Ok(())
}

fn cmd_sessions(base: &str) -> Result<(), Box<dyn std::error::Error>> {
    let sessions: Vec<AdminSessionSummary> = get_json(&format!("{}/admin/sessions", base))?;

    if sessions.is_empty() {
        println!("{}", "  세션 없음".dimmed());
        return Ok(());
    }

    println!();
    println!("{}", Table::new(&sessions));
    println!("  {} session(s)", sessions.len());
    println!();
    Ok(())
}

fn cmd_session_detail(base: &str, session_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let s: SessionDetail = get_json(&format!("{}/admin/sessions/{}", base, session_id))?;

    println!();
    println!("{}", format!("  Session: {}", s.id).bold().cyan());
    println!("  {}", "─".repeat(48).dimmed());
    println!("  {:16} {}", "Matching ID:".bold(), s.matching_id);
    println!("  {:16} {}", "Question:".bold(),    s.question_id.yellow());
    println!("  {:16} {} / {}", "Bucket:".bold(), s.difficulty, s.topic);
    println!("  {:16} {}", "Created:".bold(),     format_ts(s.created_at));
    println!("  {:16} {}", "Started:".bold(),     s.started_at.map(format_ts).unwrap_or_else(|| "-".into()));

    let ended = match (s.ended_at, &s.termination_reason) {
        (Some(at), Some(reason)) => format!("{} ({}{})",
            format_ts(at),
            reason.red(),
            s.ended_by.as_deref().map(|u| format!(" by {}", u)).unwrap_or_default(),
        ),
        _ => "○ open".green().to_string(),
    };
    println!("  {:16} {}", "Ended:".bold(), ended);

    println!();
    println!("{}", "  Participants".bold());
    println!("{}", indent(&Table::new(&s.participants).to_string()));
    println!();
    Ok(())
}

fn cmd_clear(base: &str, user_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let client = reqwest::blocking::Client::new();
    let url    = format!("{}/admin/clear/{}", base, user_id);
    let resp   = client.post(&url).send()?;

    let status = resp.status();
    let body: serde_json::Value = resp.json()?;

    if !status.is_success() {
        let msg = body["error"].as_str().unwrap_or("unknown error");
        return Err(format!("[{}] {}", status, msg).into());
    }

    println!();
    println!("  {} user={} was={} key={}",
        "Clear OK".green().bold(),
        user_id.yellow(),
        body["was"].as_str().unwrap_or("-").cyan(),
        body["session_key"],
    );
    println!();
    Ok(())
}

// ----------------------------------------------------------------------------
// [공통 유틸]
// ----------------------------------------------------------------------------

/// GET 요청 + JSON 역직렬화
fn get_json<T: for<'de> serde::Deserialize<'de>>(url: &str) -> Result<T, Box<dyn std::error::Error>> {
    let resp = reqwest::blocking::get(url)?;
    let status = resp.status();
    if !status.is_success() {
        let body: serde_json::Value = resp.json().unwrap_or_default();
        let msg = body["error"].as_str().unwrap_or("unknown error");
        return Err(format!("[{}] {}", status, msg).into());
    }
    Ok(resp.json()?)
}

fn colorize_status(status: &str, text: &str) -> String {
    match status {
        "waiting"      => text.yellow().to_string(),
        "matching"     => text.bright_yellow().bold().to_string(),
        "matched"      => text.green().bold().to_string(),
        "timeout"
        | "disconnected" => text.red().to_string(),
        "cancelled"    => text.dimmed().to_string(),
        _              => text.normal().to_string(),
    }
}

fn indent(table: &str) -> String {
    table.lines().map(|l| format!("  {}", l)).collect::<Vec<_>>().join("\n")
}

fn join_list(items: &[String]) -> String {
    items.join(" ")
}

fn opt_or_dash(v: &Option<String>) -> String {
    v.clone().unwrap_or_else(|| "-".to_string())
}

fn format_ts_ref(ms: &u64) -> String {
    format_ts(*ms)
}

/// Unix millis → 로컬 시각 "YYYY-MM-DD HH:MM:SS"
fn format_ts(ms: u64) -> String {
    if ms == 0 { return "-".to_string(); }
    chrono::DateTime::from_timestamp_millis(ms as i64)
        .map(|dt| dt.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}
