pub mod app_config;
pub mod booking_repo;
pub mod catalog_repo;
pub mod database;
pub mod events;
pub mod redis_repo;

pub use booking_repo::PgBookingStorage;
pub use catalog_repo::PgCatalog;
pub use database::DbClient;
pub use events::EventProducer;
pub use redis_repo::RedisSeatLocks;
