// =============================================================================
// Config — environment-sourced runtime settings
// =============================================================================

use std::net::SocketAddr;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8090";
const DEFAULT_NETWORKS_PATH: &str = "gecko-networks.json";
const DEFAULT_HEARTBEAT_CHECK_SECS: u64 = 30;
const DEFAULT_HEARTBEAT_TIMEOUT_SECS: i64 = 60;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;

/// Process configuration loaded from the environment at startup. Every field
/// carries a sane default, so a bare `.env`-less run still boots correctly.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub networks_path: String,
    pub heartbeat_check_interval_secs: u64,
    pub heartbeat_timeout_secs: i64,
    pub http_timeout_secs: u64,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let bind_addr = env_var("CANDLECAST_BIND_ADDR", DEFAULT_BIND_ADDR)
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid CANDLECAST_BIND_ADDR: {e}"))?;
        let networks_path = env_var("CANDLECAST_NETWORKS_PATH", DEFAULT_NETWORKS_PATH);
        let heartbeat_check_interval_secs = env_var(
            "CANDLECAST_HEARTBEAT_CHECK_SECS",
            &DEFAULT_HEARTBEAT_CHECK_SECS.to_string(),
        )
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid CANDLECAST_HEARTBEAT_CHECK_SECS: {e}"))?;
        let heartbeat_timeout_secs = env_var(
            "CANDLECAST_HEARTBEAT_TIMEOUT_SECS",
            &DEFAULT_HEARTBEAT_TIMEOUT_SECS.to_string(),
        )
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid CANDLECAST_HEARTBEAT_TIMEOUT_SECS: {e}"))?;
        let http_timeout_secs = env_var(
            "CANDLECAST_HTTP_TIMEOUT_SECS",
            &DEFAULT_HTTP_TIMEOUT_SECS.to_string(),
        )
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid CANDLECAST_HTTP_TIMEOUT_SECS: {e}"))?;

        Ok(Self {
            bind_addr,
            networks_path,
            heartbeat_check_interval_secs,
            heartbeat_timeout_secs,
            http_timeout_secs,
        })
    }
}

fn env_var(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_cleanly() {
        assert_eq!(
            env_var("CANDLECAST_DOES_NOT_EXIST", DEFAULT_BIND_ADDR)
                .parse::<SocketAddr>()
                .unwrap(),
            DEFAULT_BIND_ADDR.parse::<SocketAddr>().unwrap()
        );
    }
}
