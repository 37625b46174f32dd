pub mod auth;
pub mod clock;
pub mod config;
pub mod dates;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod reaper;
pub mod sql;
pub mod tenant;
pub mod wal;
pub mod wire;
