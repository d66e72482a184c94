pub mod app_config;
pub mod database;
#[cfg(feature = "kafka")]
pub mod events;
mod lock_wait;
pub mod memory;
pub mod redis_repo;
pub mod seat_repo;

pub use database::DbClient;
#[cfg(feature = "kafka")]
pub use events::EventProducer;
pub use memory::{MemoryLockCoordinator, MemorySeatStore};
pub use redis_repo::RedisClient;
pub use seat_repo::PostgresSeatRepository;
