//! crate error types

use snafu::prelude::*;

use crate::ParseEndpointError;

/// crate result type
pub type Result<T> = std::result::Result<T, Error>;

/// crate error type
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), context(suffix(false)))]
pub enum Error {
    /// Configured endpoint url is invalid
    #[snafu(display("invalid endpoint url {url}: {source}"))]
    InvalidEndpoint {
        /// received url
        url: String,
        /// source error
        source: ParseEndpointError,
    },

    /// Configured port is not a number
    #[snafu(display("invalid port {value}: {source}"))]
    InvalidPort {
        /// received value
        value: String,
        /// source error
        source: std::num::ParseIntError,
    },

    /// Configured flag is not a boolean
    #[snafu(display("invalid value {value} for flag {name}"))]
    InvalidFlag {
        /// flag name
        name: String,
        /// received value
        value: String,
    },

    /// Configured value would stall or crash the connection worker
    #[snafu(display("invalid config {field}: {reason}"))]
    InvalidConfig {
        /// field name
        field: String,
        /// what is wrong with it
        reason: String,
    },

    /// Background connection worker panicked or was cancelled
    #[snafu(display("connection worker stopped abnormally: {source}"))]
    WorkerStopped {
        /// source error
        source: tokio::task::JoinError,
    },
}
