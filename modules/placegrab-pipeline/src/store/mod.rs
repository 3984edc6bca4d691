pub mod photos;
pub mod postgres;
pub mod redis;

pub use photos::LocalPhotoStore;
pub use postgres::PgCatalog;
pub use self::redis::RedisCounterStore;
