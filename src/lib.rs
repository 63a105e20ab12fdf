pub mod cache;
pub mod config;
pub mod convert;
pub mod dispatch;
pub mod error;
pub mod local_config;
pub mod merge;
pub mod model;
pub mod observability;
pub mod observer;
pub mod policy;
pub mod reload;
pub mod transport;
