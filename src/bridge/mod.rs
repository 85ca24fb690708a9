//! The bridge program: an external command that answers run queries as JSON
//! and streams push events as JSON lines.

pub mod channel;
pub mod executor;
pub mod parser;

pub use channel::BridgePushChannel;
pub use executor::BridgeFetcher;
