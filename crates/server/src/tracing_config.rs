//! Structured logging setup and per-request span context.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{Level, Span};
use uuid::Uuid;

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Request context carrying a correlation id, attached as a span to each
/// command a connection executes.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub correlation_id: String,
    pub client_addr: String,
    pub command: Option<String>,
}

impl RequestContext {
    pub fn for_client(client_addr: &str) -> Self {
        Self {
            correlation_id: generate_correlation_id(),
            client_addr: client_addr.to_string(),
            command: None,
        }
    }

    pub fn with_command(mut self, command: &str) -> Self {
        self.command = Some(command.to_uppercase());
        self
    }

    pub fn span(&self) -> Span {
        tracing::info_span!(
            "request",
            correlation_id = %self.correlation_id,
            client = %self.client_addr,
            command = self.command.as_deref().unwrap_or("-"),
        )
    }
}

/// Compact correlation id: time-ordered UUID v7 prefix plus a monotonic
/// counter for uniqueness within one timestamp.
fn generate_correlation_id() -> String {
    let uuid = Uuid::now_v7();
    let counter = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}-{:06x}", &uuid.to_string()[..8], counter & 0xFF_FFFF)
}

pub struct TracingConfig {
    pub level: Level,
    pub json_format: bool,
    pub include_location: bool,
    pub include_thread_ids: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            include_location: false,
            include_thread_ids: false,
        }
    }
}

impl TracingConfig {
    /// Install the global subscriber. `RUST_LOG` overrides the configured
    /// level when set.
    pub fn init(self) {
        use tracing_subscriber::prelude::*;
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.to_string()));

        if self.json_format {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_file(self.include_location)
                        .with_line_number(self.include_location)
                        .with_thread_ids(self.include_thread_ids),
                )
                .init();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_file(self.include_location)
                        .with_line_number(self.include_location)
                        .with_thread_ids(self.include_thread_ids),
                )
                .init();
        }
    }
}
