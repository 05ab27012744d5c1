use serde::Deserialize;

/// Top-level configuration settings for the relay.
///
/// Groups the listener, queue, relay loop, message validation, filter and
/// logging settings.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub queue: QueueSettings,
    pub relay: RelaySettings,
    pub message: MessageSettings,
    pub filter: FilterSettings,
    pub log: LogSettings,
}

/// Where the producer (HTTP) and consumer (WebSocket) endpoints listen.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub http_port: u16,
    pub ws_port: u16,
}

/// Bounded queue and store connection settings.
#[derive(Debug, Deserialize, Clone)]
pub struct QueueSettings {
    pub name: String,
    pub store_connection_target: String,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub max_queue_size: usize,
    pub pop_timeout_secs: u64,
    pub command_timeout_secs: u64,
}

/// Consumer relay loop cadence and reconnect policy.
#[derive(Debug, Deserialize, Clone)]
pub struct RelaySettings {
    pub poll_interval_secs: u64,
    pub reconnect_max_attempts: u32,
    pub reconnect_delay_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MessageSettings {
    pub max_content_length: usize,
}

/// Which messages consumer sessions receive.
///
/// `mode` is kept as free text: unrecognized values are rejected when a
/// message is evaluated, not when the configuration is loaded.
#[derive(Debug, Deserialize, Clone)]
pub struct FilterSettings {
    pub mode: String,
    #[serde(rename = "type")]
    pub filter_type: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub queue: Option<PartialQueueSettings>,
    pub relay: Option<PartialRelaySettings>,
    pub message: Option<PartialMessageSettings>,
    pub filter: Option<PartialFilterSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub http_port: Option<u16>,
    pub ws_port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct PartialQueueSettings {
    pub name: Option<String>,
    pub store_connection_target: Option<String>,
    pub max_retries: Option<u32>,
    pub retry_delay_secs: Option<u64>,
    pub max_queue_size: Option<usize>,
    pub pop_timeout_secs: Option<u64>,
    pub command_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialRelaySettings {
    pub poll_interval_secs: Option<u64>,
    pub reconnect_max_attempts: Option<u32>,
    pub reconnect_delay_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialMessageSettings {
    pub max_content_length: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PartialFilterSettings {
    pub mode: Option<String>,
    #[serde(rename = "type")]
    pub filter_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                http_port: 8000,
                ws_port: 8003,
            },
            queue: QueueSettings {
                name: "message_queue".to_string(),
                store_connection_target: "sled://poprelay_db".to_string(),
                max_retries: 3,
                retry_delay_secs: 2,
                max_queue_size: 50,
                pop_timeout_secs: 2,
                command_timeout_secs: 5,
            },
            relay: RelaySettings {
                poll_interval_secs: 2,
                reconnect_max_attempts: 2,
                reconnect_delay_secs: 1,
            },
            message: MessageSettings {
                max_content_length: 512,
            },
            filter: FilterSettings {
                mode: "allow_all".to_string(),
                filter_type: Some("serviceB".to_string()),
            },
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl PartialSettings {
    /// Overlay whatever was provided on top of `default`.
    pub fn merge(self, default: Settings) -> Settings {
        let server = self.server;
        let queue = self.queue;
        let relay = self.relay;
        let message = self.message;
        let filter = self.filter;
        let log = self.log;

        Settings {
            server: ServerSettings {
                host: server
                    .as_ref()
                    .and_then(|s| s.host.clone())
                    .unwrap_or(default.server.host),
                http_port: server
                    .as_ref()
                    .and_then(|s| s.http_port)
                    .unwrap_or(default.server.http_port),
                ws_port: server
                    .as_ref()
                    .and_then(|s| s.ws_port)
                    .unwrap_or(default.server.ws_port),
            },
            queue: QueueSettings {
                name: queue
                    .as_ref()
                    .and_then(|q| q.name.clone())
                    .unwrap_or(default.queue.name),
                store_connection_target: queue
                    .as_ref()
                    .and_then(|q| q.store_connection_target.clone())
                    .unwrap_or(default.queue.store_connection_target),
                max_retries: queue
                    .as_ref()
                    .and_then(|q| q.max_retries)
                    .unwrap_or(default.queue.max_retries),
                retry_delay_secs: queue
                    .as_ref()
                    .and_then(|q| q.retry_delay_secs)
                    .unwrap_or(default.queue.retry_delay_secs),
                max_queue_size: queue
                    .as_ref()
                    .and_then(|q| q.max_queue_size)
                    .unwrap_or(default.queue.max_queue_size),
                pop_timeout_secs: queue
                    .as_ref()
                    .and_then(|q| q.pop_timeout_secs)
                    .unwrap_or(default.queue.pop_timeout_secs),
                command_timeout_secs: queue
                    .as_ref()
                    .and_then(|q| q.command_timeout_secs)
                    .unwrap_or(default.queue.command_timeout_secs),
            },
            relay: RelaySettings {
                poll_interval_secs: relay
                    .as_ref()
                    .and_then(|r| r.poll_interval_secs)
                    .unwrap_or(default.relay.poll_interval_secs),
                reconnect_max_attempts: relay
                    .as_ref()
                    .and_then(|r| r.reconnect_max_attempts)
                    .unwrap_or(default.relay.reconnect_max_attempts),
                reconnect_delay_secs: relay
                    .as_ref()
                    .and_then(|r| r.reconnect_delay_secs)
                    .unwrap_or(default.relay.reconnect_delay_secs),
            },
            message: MessageSettings {
                max_content_length: message
                    .as_ref()
                    .and_then(|m| m.max_content_length)
                    .unwrap_or(default.message.max_content_length),
            },
            filter: FilterSettings {
                mode: filter
                    .as_ref()
                    .and_then(|f| f.mode.clone())
                    .unwrap_or(default.filter.mode),
                filter_type: filter
                    .and_then(|f| f.filter_type)
                    .or(default.filter.filter_type),
            },
            log: LogSettings {
                level: log
                    .and_then(|l| l.level)
                    .unwrap_or(default.log.level),
            },
        }
    }
}
