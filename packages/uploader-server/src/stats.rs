//! Request statistics.
//!
//! Every response is counted by status code, both in a one-second window
//! (cleared by a background task) and in running totals, together with
//! response time and size.
//!
//! - `GET /sys/stats` — Current snapshot

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::HttpBody,
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
    Json,
};
use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;

use crate::state::AppState;

/// How often the per-window counters are cleared
pub const WINDOW: Duration = Duration::from_secs(1);

/// Response counters
pub struct Statistic {
    started: Instant,
    pid: u32,
    hostname: String,
    status_code_count: DashMap<u16, u64>,
    total_status_code_count: DashMap<u16, u64>,
    total_count: AtomicU64,
    total_response_time_us: AtomicU64,
    total_response_size: AtomicU64,
}

/// Serialized view of [`Statistic`]
#[derive(Debug, Serialize)]
pub struct StatsSnapshot {
    pub pid: u32,
    pub hostname: String,
    pub uptime: String,
    pub uptime_sec: f64,
    pub time: String,
    pub unixtime: i64,
    pub status_code_count: BTreeMap<String, u64>,
    pub total_status_code_count: BTreeMap<String, u64>,
    pub count: u64,
    pub total_count: u64,
    pub total_response_time: String,
    pub total_response_time_sec: f64,
    pub total_response_size: u64,
    pub average_response_size: u64,
    pub average_response_time: String,
    pub average_response_time_sec: f64,
}

impl Default for Statistic {
    fn default() -> Self {
        Self::new()
    }
}

impl Statistic {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            pid: std::process::id(),
            hostname: std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string()),
            status_code_count: DashMap::new(),
            total_status_code_count: DashMap::new(),
            total_count: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
            total_response_size: AtomicU64::new(0),
        }
    }

    /// Count one response
    pub fn record(&self, status: u16, elapsed: Duration, size: u64) {
        *self.status_code_count.entry(status).or_insert(0) += 1;
        *self.total_status_code_count.entry(status).or_insert(0) += 1;
        self.total_count.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        self.total_response_size.fetch_add(size, Ordering::Relaxed);
    }

    /// Start a new counting window
    pub fn reset_window(&self) {
        self.status_code_count.clear();
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let uptime = self.started.elapsed();
        let now = Utc::now();

        let status_code_count = collect_counts(&self.status_code_count);
        let total_status_code_count = collect_counts(&self.total_status_code_count);
        let count = status_code_count.values().sum();

        let total_count = self.total_count.load(Ordering::Relaxed);
        let total_us = self.total_response_time_us.load(Ordering::Relaxed);
        let total_time = Duration::from_micros(total_us);
        let total_size = self.total_response_size.load(Ordering::Relaxed);

        let (average_size, average_time) = match total_count {
            0 => (0, Duration::ZERO),
            n => (total_size / n, Duration::from_micros(total_us / n)),
        };

        StatsSnapshot {
            pid: self.pid,
            hostname: self.hostname.clone(),
            uptime: format!("{:?}", uptime),
            uptime_sec: uptime.as_secs_f64(),
            time: now.to_rfc3339(),
            unixtime: now.timestamp(),
            status_code_count,
            total_status_code_count,
            count,
            total_count,
            total_response_time: format!("{:?}", total_time),
            total_response_time_sec: total_time.as_secs_f64(),
            total_response_size: total_size,
            average_response_size: average_size,
            average_response_time: format!("{:?}", average_time),
            average_response_time_sec: average_time.as_secs_f64(),
        }
    }
}

fn collect_counts(map: &DashMap<u16, u64>) -> BTreeMap<String, u64> {
    map.iter()
        .map(|entry| (entry.key().to_string(), *entry.value()))
        .collect()
}

/// Clear the per-window counters every [`WINDOW`]
pub fn spawn_window_reset(stats: Arc<Statistic>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(WINDOW);
        loop {
            interval.tick().await;
            stats.reset_window();
        }
    })
}

// ── Middleware & Handler ─────────────────────────────────────────────────────

/// Body size known before it is sent: `Content-Length`, else the body's
/// exact size hint. Streams of unknown length count as 0.
fn response_size(resp: &Response) -> u64 {
    resp.headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .or_else(|| resp.body().size_hint().exact())
        .unwrap_or(0)
}

/// Record status, latency and size of every response
pub async fn track(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let start = Instant::now();
    let resp = next.run(req).await;
    let size = response_size(&resp);

    state.stats.record(resp.status().as_u16(), start.elapsed(), size);
    resp
}

/// GET /sys/stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.stats.snapshot())
}
