use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    /// Directory for rolling file logs; `None` means stdout only.
    pub log_dir: Option<String>,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_acquire_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3000);

        let host = std::env::var("HOST")
            .ok()
            .and_then(|value| value.parse::<IpAddr>().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let log_dir = resolve_log_dir(
            std::env::var("ENABLE_FILE_LOGS").ok().as_deref(),
            std::env::var("LOG_DIR").ok(),
        );

        let database_url = std::env::var("DATABASE_URL").ok();

        let db_max_connections = std::env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(10);

        let db_acquire_timeout_ms = std::env::var("DB_ACQUIRE_TIMEOUT_MS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(5000);

        Self {
            host,
            port,
            log_level,
            log_dir,
            database_url,
            db_max_connections,
            db_acquire_timeout: Duration::from_millis(db_acquire_timeout_ms),
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn resolve_log_dir(enabled: Option<&str>, dir: Option<String>) -> Option<String> {
    match enabled {
        Some("true") | Some("1") => Some(dir.unwrap_or_else(|| "./logs".to_string())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_logging_off_by_default() {
        assert_eq!(resolve_log_dir(None, None), None);
        assert_eq!(resolve_log_dir(Some("false"), Some("./logs".into())), None);
        assert_eq!(resolve_log_dir(Some("0"), None), None);
    }

    #[test]
    fn file_logging_uses_configured_or_default_dir() {
        assert_eq!(
            resolve_log_dir(Some("true"), Some("/var/log/recall".into())),
            Some("/var/log/recall".to_string())
        );
        assert_eq!(resolve_log_dir(Some("1"), None), Some("./logs".to_string()));
    }
}
