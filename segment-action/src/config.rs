use std::str::FromStr;
use std::time;

use envconfig::Envconfig;

use crate::transform::EventContext;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3302")]
    pub port: u16,

    #[envconfig(default = "false")]
    pub print_sink: bool,

    #[envconfig(default = "https://api.segment.io")]
    pub segment_endpoint: String,

    #[envconfig(default = "100")]
    pub segment_max_batch_size: usize,

    #[envconfig(default = "10000")]
    pub request_timeout: EnvMsDuration,

    #[envconfig(default = "52428800")]
    pub max_body_size: usize,

    #[envconfig(default = "looker/actions")]
    pub app_name: String,

    pub app_version: Option<String>,

    #[envconfig(default = "true")]
    pub export_prometheus: bool,
}

impl Config {
    /// Produce a host:port address for binding a TcpListener.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The application metadata attached to every event.
    pub fn event_context(&self) -> EventContext {
        let version = self
            .app_version
            .as_deref()
            .unwrap_or(env!("CARGO_PKG_VERSION"));
        EventContext::new(&self.app_name, version)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults() {
        let config = Config::init_from_hashmap(&HashMap::new()).expect("invalid defaults");

        assert_eq!(config.bind(), "0.0.0.0:3302");
        assert!(!config.print_sink);
        assert_eq!(config.segment_endpoint, "https://api.segment.io");
        assert_eq!(config.segment_max_batch_size, 100);
        assert_eq!(config.request_timeout.0, time::Duration::from_secs(10));
        assert_eq!(config.max_body_size, 50 * 1024 * 1024);
        assert_eq!(
            config.event_context(),
            EventContext::new("looker/actions", env!("CARGO_PKG_VERSION"))
        );
    }

    #[test]
    fn app_version_override() {
        let vars = HashMap::from([
            ("APP_VERSION".to_owned(), "2.3.4".to_owned()),
            ("BIND_PORT".to_owned(), "8080".to_owned()),
        ]);
        let config = Config::init_from_hashmap(&vars).expect("invalid config");

        assert_eq!(config.port, 8080);
        assert_eq!(config.event_context().app.version, "2.3.4");
    }

    #[test]
    fn ms_durations() {
        assert_eq!(
            "250".parse::<EnvMsDuration>().unwrap().0,
            time::Duration::from_millis(250)
        );
        assert_eq!(
            "soon".parse::<EnvMsDuration>().unwrap_err(),
            ParseEnvMsDurationError
        );
    }
}
