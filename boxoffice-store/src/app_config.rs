use boxoffice_core::LockingStrategy;
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub kafka: Option<KafkaConfig>,
    #[serde(default)]
    pub booking: BookingConfig,
    #[serde(default)]
    pub inventory: InventoryConfig,
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
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

fn default_max_connections() -> u32 { 10 }
fn default_acquire_timeout_ms() -> u64 { 3000 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    #[serde(default = "default_topic")]
    pub topic: String,
}

fn default_topic() -> String { "seats.updated".to_string() }

/// Booking knobs. The lock wait is kept short so callers fail fast, and the
/// lease short so a crashed holder cannot block a seat for long.
#[derive(Debug, Deserialize, Clone)]
pub struct BookingConfig {
    #[serde(default)]
    pub default_strategy: LockingStrategy,
    #[serde(default = "default_lock_wait_ms")]
    pub lock_wait_ms: u64,
    #[serde(default = "default_lock_lease_ms")]
    pub lock_lease_ms: u64,
    #[serde(default = "default_lock_retry_ms")]
    pub lock_retry_ms: u64,
}

fn default_lock_wait_ms() -> u64 { 2000 }
fn default_lock_lease_ms() -> u64 { 5000 }
fn default_lock_retry_ms() -> u64 { 50 }

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            default_strategy: LockingStrategy::default(),
            lock_wait_ms: default_lock_wait_ms(),
            lock_lease_ms: default_lock_lease_ms(),
            lock_retry_ms: default_lock_retry_ms(),
        }
    }
}

impl BookingConfig {
    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }

    pub fn lock_lease(&self) -> Duration {
        Duration::from_millis(self.lock_lease_ms)
    }

    pub fn lock_retry(&self) -> Duration {
        Duration::from_millis(self.lock_retry_ms.max(1))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct InventoryConfig {
    #[serde(default = "default_seed_rows")]
    pub seed_rows: u32,
    #[serde(default = "default_seats_per_row")]
    pub seats_per_row: u32,
}

fn default_seed_rows() -> u32 { 10 }
fn default_seats_per_row() -> u32 { 10 }

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            seed_rows: default_seed_rows(),
            seats_per_row: default_seats_per_row(),
        }
    }
}

impl InventoryConfig {
    /// Seat labels for the seeded hall: `A1..A{n}`, `B1..`, and after `Z`
    /// continuing with `AA`, `AB`, ...
    pub fn labels(&self) -> Vec<String> {
        (0..self.seed_rows)
            .flat_map(|row| {
                let name = row_name(row);
                (1..=self.seats_per_row).map(move |n| format!("{}{}", name, n))
            })
            .collect()
    }
}

fn row_name(mut index: u32) -> String {
    let mut name = Vec::new();
    loop {
        name.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    name.reverse();
    String::from_utf8_lossy(&name).into_owned()
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Environment overlay, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Developer overrides, never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `BOXOFFICE__REDIS__URL=redis://cache:6379` sets `redis.url`
            .add_source(config::Environment::with_prefix("BOXOFFICE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
