pub mod config;
pub mod error;
pub mod events;
pub mod metrics;
pub mod request;
pub mod target;
pub mod relay;
pub mod handler;
pub mod listener;
pub mod logging;

pub use config::Config;
pub use error::ProxyError;
pub use listener::ProxyListener;
