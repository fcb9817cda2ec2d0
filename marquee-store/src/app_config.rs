use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub kafka: Option<KafkaConfig>,
    pub auth: AuthConfig,
    #[serde(default)]
    pub booking: BookingRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BookingRules {
    #[serde(default = "default_seat_lock_ttl")]
    pub seat_lock_ttl_seconds: u64,
}

impl BookingRules {
    pub fn seat_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.seat_lock_ttl_seconds)
    }
}

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            seat_lock_ttl_seconds: default_seat_lock_ttl(),
        }
    }
}

fn default_seat_lock_ttl() -> u64 { 300 }

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg.. `MARQUEE_DATABASE__URL=postgres://...` sets `database.url`
            .add_source(config::Environment::with_prefix("MARQUEE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    fn parse(toml: &str) -> Config {
        config::Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults_fill_optional_sections() {
        let config = parse(
            r#"
            [server]
            port = 8080
            [database]
            url = "postgres://localhost/marquee"
            [redis]
            url = "redis://localhost:6379"
            [auth]
            jwt_secret = "secret"
            "#,
        );

        assert_eq!(config.database.max_connections, 5);
        assert!(config.kafka.is_none());
        assert_eq!(config.booking.seat_lock_ttl(), Duration::from_secs(300));
    }

    #[test]
    fn test_overrides() {
        let config = parse(
            r#"
            [server]
            port = 9000
            [database]
            url = "postgres://db/marquee"
            max_connections = 20
            [redis]
            url = "redis://cache:6379"
            [kafka]
            brokers = "kafka:9092"
            [auth]
            jwt_secret = "secret"
            [booking]
            seat_lock_ttl_seconds = 60
            "#,
        );

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.kafka.unwrap().brokers, "kafka:9092");
        assert_eq!(config.booking.seat_lock_ttl_seconds, 60);
    }
}
