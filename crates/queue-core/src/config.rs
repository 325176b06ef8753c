/// Tunables for `ConcurrentRunner`. Field defaults mirror the ingest
/// runner's configuration in the source pipeline this queue replaces.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub max_workers: usize,
    pub lease_seconds: i64,
    pub heartbeat_interval_seconds: u64,
    pub batch_size: usize,
    pub max_items: Option<u64>,
    pub stop_after: Option<u64>,
    pub max_retries: i32,
    pub enable_discovery: bool,
    pub source_filter: Option<String>,
    pub base_backoff_seconds: f64,
    pub max_backoff_seconds: f64,
    pub respect_retry_after: bool,
    pub requests_per_second: f64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            lease_seconds: 300,
            heartbeat_interval_seconds: 30,
            batch_size: 10,
            max_items: None,
            stop_after: None,
            max_retries: 3,
            enable_discovery: true,
            source_filter: None,
            base_backoff_seconds: 2.0,
            max_backoff_seconds: 300.0,
            respect_retry_after: true,
            requests_per_second: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = RunnerConfig::default();
        assert_eq!(cfg.max_workers, 4);
        assert_eq!(cfg.lease_seconds, 300);
        assert_eq!(cfg.max_retries, 3);
        assert!(cfg.enable_discovery);
        assert_eq!(cfg.requests_per_second, 0.0);
    }
}
