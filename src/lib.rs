pub mod auth;
pub mod compactor;
pub mod config;
pub mod limits;
pub mod model;
pub mod observability;
pub mod reservation;
pub mod sql;
pub mod store;
pub mod wal;
pub mod wire;
