//! Prometheus-compatible metrics

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Metrics collector
#[derive(Debug)]
pub struct Metrics {
    /// Server start time
    start_time: Instant,
    /// Total requests processed
    request_count: RwLock<u64>,
    /// Requests by endpoint
    requests_by_endpoint: RwLock<HashMap<String, u64>>,
    /// Sessions started
    sessions_started: RwLock<u64>,
    /// Seeks performed
    seeks: RwLock<u64>,
    /// Transcoder processes launched
    transcoder_launches: RwLock<u64>,
    /// Transcoder launches that failed to spawn
    spawn_failures: RwLock<u64>,
    /// Transcoders that exited unsuccessfully on their own
    failed_exits: RwLock<u64>,
    /// Transcoders killed after ignoring a stop request
    forced_kills: RwLock<u64>,
    /// Errors by kind
    errors_by_type: RwLock<HashMap<String, u64>>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            request_count: RwLock::new(0),
            requests_by_endpoint: RwLock::new(HashMap::new()),
            sessions_started: RwLock::new(0),
            seeks: RwLock::new(0),
            transcoder_launches: RwLock::new(0),
            spawn_failures: RwLock::new(0),
            failed_exits: RwLock::new(0),
            forced_kills: RwLock::new(0),
            errors_by_type: RwLock::new(HashMap::new()),
        }
    }

    /// Record a request
    pub fn record_request(&self, endpoint: &str) {
        *self.request_count.write() += 1;
        *self
            .requests_by_endpoint
            .write()
            .entry(endpoint.to_string())
            .or_insert(0) += 1;
    }

    pub fn record_session_start(&self) {
        *self.sessions_started.write() += 1;
    }

    pub fn record_seek(&self) {
        *self.seeks.write() += 1;
    }

    pub fn record_launch(&self) {
        *self.transcoder_launches.write() += 1;
    }

    pub fn record_spawn_failure(&self) {
        *self.spawn_failures.write() += 1;
    }

    pub fn record_failed_exit(&self) {
        *self.failed_exits.write() += 1;
    }

    pub fn record_forced_kill(&self) {
        *self.forced_kills.write() += 1;
    }

    /// Record error
    pub fn record_error(&self, error_type: &str) {
        *self
            .errors_by_type
            .write()
            .entry(error_type.to_string())
            .or_insert(0) += 1;
    }

    pub fn transcoder_launches(&self) -> u64 {
        *self.transcoder_launches.read()
    }

    pub fn forced_kills(&self) -> u64 {
        *self.forced_kills.read()
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Export metrics in Prometheus format
    pub fn export_prometheus(&self) -> String {
        let mut output = String::new();

        // Server info
        output.push_str("# HELP dash_server_uptime_seconds Server uptime in seconds\n");
        output.push_str("# TYPE dash_server_uptime_seconds counter\n");
        output.push_str(&format!(
            "dash_server_uptime_seconds {}\n",
            self.uptime_secs()
        ));

        output.push_str(
            "\n# HELP dash_server_start_time_seconds Server start time as Unix timestamp\n",
        );
        output.push_str("# TYPE dash_server_start_time_seconds gauge\n");
        output.push_str(&format!(
            "dash_server_start_time_seconds {}\n",
            std::time::SystemTime::UNIX_EPOCH
                .elapsed()
                .unwrap_or(Duration::ZERO)
                .as_secs()
                .saturating_sub(self.uptime_secs())
        ));

        // Request metrics
        output.push_str("\n# HELP dash_requests_total Total number of HTTP requests\n");
        output.push_str("# TYPE dash_requests_total counter\n");
        output.push_str(&format!(
            "dash_requests_total {}\n",
            *self.request_count.read()
        ));

        output.push_str("\n# HELP dash_requests_by_endpoint Requests by endpoint\n");
        output.push_str("# TYPE dash_requests_by_endpoint counter\n");
        for (endpoint, count) in self.requests_by_endpoint.read().iter() {
            output.push_str(&format!(
                "dash_requests_by_endpoint{{endpoint=\"{}\"}} {}\n",
                endpoint, count
            ));
        }

        // Session lifecycle
        let lifecycle = [
            (
                "dash_sessions_started_total",
                "Sessions started",
                *self.sessions_started.read(),
            ),
            ("dash_seeks_total", "Seeks performed", *self.seeks.read()),
            (
                "dash_transcoder_launches_total",
                "Transcoder processes launched",
                *self.transcoder_launches.read(),
            ),
            (
                "dash_transcoder_spawn_failures_total",
                "Transcoder launches that failed to spawn",
                *self.spawn_failures.read(),
            ),
            (
                "dash_transcoder_failed_exits_total",
                "Transcoders that exited with an error",
                *self.failed_exits.read(),
            ),
            (
                "dash_transcoder_forced_kills_total",
                "Transcoders killed after the grace period",
                *self.forced_kills.read(),
            ),
        ];
        for (name, help, value) in lifecycle {
            output.push_str(&format!("\n# HELP {} {}\n", name, help));
            output.push_str(&format!("# TYPE {} counter\n", name));
            output.push_str(&format!("{} {}\n", name, value));
        }

        // Error metrics
        output.push_str("\n# HELP dash_errors_total Total errors by type\n");
        output.push_str("# TYPE dash_errors_total counter\n");
        for (error_type, count) in self.errors_by_type.read().iter() {
            output.push_str(&format!(
                "dash_errors_total{{type=\"{}\"}} {}\n",
                error_type, count
            ));
        }

        output
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
