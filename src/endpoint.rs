//! Monitor backend websocket endpoint.

use std::{fmt::Display, str::FromStr};

use snafu::prelude::*;

/// Parse or build endpoint url error
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum ParseEndpointError {
    /// the str is not a valid url
    #[snafu(display("{s} is an invalid url: {source}"))]
    InvalidURL {
        /// string be parsed
        s: String,
        /// source error
        source: url::ParseError,
    },

    /// the parsed url schema is not websocket
    #[snafu(display("the url {s} has invalid schema {schema}, only ws or wss is ok"))]
    InvalidSchema {
        /// the url
        s: String,
        /// invalid schema
        schema: String,
    },

    /// the page url schema is not http(s)
    #[snafu(display("the page url {s} has invalid schema {schema}, only http or https is ok"))]
    InvalidPageSchema {
        /// the url
        s: String,
        /// invalid schema
        schema: String,
    },

    /// the parsed url has no host
    #[snafu(display("the url {s} has no host"))]
    NoHost {
        /// the url
        s: String,
    },
}

/// Where the monitor backend websocket lives.
///
/// The parts are kept as given and only validated when [`Endpoint::url`] builds
/// the final address, so a bad host shows up as a connect-time failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// use `wss` instead of `ws`
    pub secure: bool,
    /// backend host(domain or address)
    pub host: String,
    /// backend port
    pub port: u16,
    /// request path
    pub path: String,
}

impl Endpoint {
    /// Port the monitor backend listens on.
    pub const DEFAULT_PORT: u16 = 8000;

    /// Path of the websocket route.
    pub const DEFAULT_PATH: &'static str = "/ws";

    /// Endpoint on the host that served the dashboard page, the scheme follows
    /// the page's own transport security.
    pub fn for_page<S: Into<String>>(host: S, secure: bool) -> Self {
        Self {
            secure,
            host: host.into(),
            port: Self::DEFAULT_PORT,
            path: Self::DEFAULT_PATH.to_string(),
        }
    }

    /// Same as [`Endpoint::for_page`], but read host and security from the page url,
    /// like `https://rig.local:5173/dashboard`.
    pub fn from_page_url(s: &str) -> Result<Self, ParseEndpointError> {
        let url = url::Url::parse(s).with_context(|_| error::InvalidURL { s })?;

        let secure = match url.scheme() {
            "https" => true,
            "http" => false,
            schema => return error::InvalidPageSchema { s, schema }.fail(),
        };

        let host = url.host_str().with_context(|| error::NoHost { s })?;

        Ok(Self::for_page(host, secure))
    }

    /// url schema
    pub fn scheme(&self) -> &'static str {
        if self.secure {
            "wss"
        } else {
            "ws"
        }
    }

    /// construct final url
    pub fn url(&self) -> Result<url::Url, ParseEndpointError> {
        let s = format!(
            "{}://{}:{}{}",
            self.scheme(),
            self.host,
            self.port,
            self.path
        );

        let u = url::Url::parse(&s).with_context(|_| error::InvalidURL { s: &s })?;

        ensure!(
            u.host_str().map_or(false, |h| !h.is_empty()),
            error::NoHost { s }
        );

        Ok(u)
    }
}

impl FromStr for Endpoint {
    type Err = ParseEndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = url::Url::parse(s).with_context(|_| error::InvalidURL { s })?;

        ensure!(
            url.scheme() == "wss" || url.scheme() == "ws",
            error::InvalidSchema {
                s,
                schema: url.scheme(),
            }
        );

        let host = url.host_str().with_context(|| error::NoHost { s })?;

        Ok(Self {
            secure: url.scheme() == "wss",
            host: host.to_string(),
            port: url.port_or_known_default().unwrap_or(Self::DEFAULT_PORT),
            path: url.path().to_string(),
        })
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}://{}:{}{}",
            self.scheme(),
            self.host,
            self.port,
            self.path
        )
    }
}
