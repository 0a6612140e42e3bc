// author: kodeholic (powered by Claude)
//
// pmtrace - pair-match 매칭 라이프사이클 실시간 관찰 CLI
//
// 사용법:
//   pmtrace [--host HOST] [--port PORT] [--filter KIND] [USER_ID]
//
// 예시:
//   pmtrace                          # 전체 이벤트 스트림
//   pmtrace alice                    # alice 관련 이벤트만
//   pmtrace --filter session         # session_* 이벤트만
//   pmtrace alice -f matched         # alice + matched 이벤트만

use clap::Parser;
use colored::Colorize;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::io::{BufRead, BufReader};

// ----------------------------------------------------------------------------
// [CLI 인자]
// ----------------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name    = "pmtrace",
    about   = "pair-match 매칭/세션 이벤트 스트림 관찰",
    version,
)]
struct Cli {
    /// 서버 호스트
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// 서버 포트
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// 이벤트 종류 필터 (예: matched, timeout, session). 대소문자 무관, 부분 일치
    #[arg(long, short = 'f')]
    filter: Option<String>,

    /// 관찰할 user_id (생략 시 전체)
    user_id: Option<String>,
}

// ----------------------------------------------------------------------------
// [TraceEvent 역직렬화] - src/trace.rs 와 같은 구조
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TraceEvent {
    ts:          u64,
    kind:        String,
    users:       Vec<String>,
    matching_id: Option<String>,
    session_id:  Option<String>,
    summary:     String,
}

// ----------------------------------------------------------------------------
// [메인]
// ----------------------------------------------------------------------------

fn main() {
    let cli = Cli::parse();

    let url = match &cli.user_id {
        Some(uid) => format!("http://{}:{}/trace/{}", cli.host, cli.port, uid),
        None      => format!("http://{}:{}/trace",   cli.host, cli.port),
    };

    let filter = cli.filter.as_ref().map(|s| s.to_lowercase());

    println!("{}", "─".repeat(96).dimmed());
    println!(
        "  {} {}  {}  {}",
        "pmtrace".bold().cyan(),
        "▶".green(),
        url.dimmed(),
        filter.as_deref()
            .map(|f| format!("[filter: {}]", f).yellow().to_string())
            .unwrap_or_default(),
    );
    println!("{}", "─".repeat(96).dimmed());
    println!(
        "  {:<12} {:<16} {:<24} {:<12} {}",
        "TIME".dimmed(),
        "KIND".dimmed(),
        "USERS".dimmed(),
        "REF".dimmed(),
        "SUMMARY".dimmed(),
    );
    println!("{}", "─".repeat(96).dimmed());

    // 스트림이라 타임아웃 없음
    let client = match Client::builder().timeout(None).build() {
        Ok(c)  => c,
        Err(e) => {
            eprintln!("{} HTTP 클라이언트 생성 실패: {}", "✗".red(), e);
            std::process::exit(1);
        }
    };

    let resp = match client
        .get(&url)
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

        // SSE: "event: kind" / "data: {JSON}" / ": keep-alive" / 빈 줄 - data 만 본다
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
            if !event.kind.to_lowercase().contains(f.as_str()) {
                continue;
            }
        }

        print_event(&event);
        event_count += 1;
    }

    println!("{}", "─".repeat(96).dimmed());
    println!("  스트림 종료 (총 {} 이벤트)", event_count);
}

// ----------------------------------------------------------------------------
// [이벤트 출력]
// ----------------------------------------------------------------------------

fn print_event(e: &TraceEvent) {
    // 세션 이벤트는 session id, 그 외는 matching id 앞 8자리
    let reference = e.session_id.as_deref()
        .or(e.matching_id.as_deref())
        .map(|id| id.chars().take(8).collect::<String>())
        .unwrap_or_else(|| "-".to_string());

    println!(
        "  {} {} {} {} {}",
        format_ts(e.ts).dimmed(),
        colorize_kind(&e.kind),
        pad(&e.users.join(","), 24).bright_white(),
        pad(&reference, 12).dimmed(),
        e.summary.dimmed(),
    );
}

fn colorize_kind(kind: &str) -> String {
    let padded = pad(kind, 16);
    match kind {
        "matched" | "session_created"          => padded.bright_green().bold().to_string(),
        "timeout" | "disconnected"             => padded.bright_red().to_string(),
        "cancelled" | "removed"                => padded.dimmed().to_string(),
        "queued"                               => padded.bright_yellow().to_string(),
        k if k.starts_with("session")          => padded.bright_cyan().to_string(),
        _                                      => padded.normal().to_string(),
    }
}

/// Unix millis → 로컬 "HH:MM:SS.mmm"
fn format_ts(ts_ms: u64) -> String {
    chrono::DateTime::from_timestamp_millis(ts_ms as i64)
        .map(|dt| dt.with_timezone(&chrono::Local).format("%H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn pad(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        format!("{:<width$}", s, width = width)
    } else {
        let head: String = s.chars().take(width - 1).collect();
        format!("{}…", head)
    }
}
