//! Event socket endpoint resolution.

use crate::traits::TransportError;
use std::fmt;

/// Path of the event socket on the page's host.
pub const EVENTS_PATH: &str = "/events";

/// A `ws://` or `wss://` URL to connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: String,
}

impl Endpoint {
    /// Use a WebSocket URL as is.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheme is not `ws` or `wss`.
    pub fn new(url: impl Into<String>) -> Result<Self, TransportError> {
        let url = url.into();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(TransportError::InvalidEndpoint(url));
        }
        Ok(Self { url })
    }

    /// The event socket for a page origin.
    ///
    /// `http://` maps to `ws://` and `https://` to `wss://`. Anything after
    /// the host is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the origin has an unknown scheme or no host.
    pub fn for_origin(origin: &str) -> Result<Self, TransportError> {
        Self::for_origin_with_path(origin, EVENTS_PATH)
    }

    /// Like [`for_origin`](Self::for_origin) with a custom socket path.
    ///
    /// # Errors
    ///
    /// Returns an error if the origin has an unknown scheme or no host.
    pub fn for_origin_with_path(origin: &str, path: &str) -> Result<Self, TransportError> {
        let (scheme, rest) = origin
            .split_once("://")
            .ok_or_else(|| TransportError::InvalidEndpoint(origin.to_string()))?;

        let ws_scheme = match scheme.to_ascii_lowercase().as_str() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            _ => return Err(TransportError::InvalidEndpoint(origin.to_string())),
        };

        let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
        if host.is_empty() {
            return Err(TransportError::InvalidEndpoint(origin.to_string()));
        }

        let path = path.trim_start_matches('/');
        Ok(Self {
            url: format!("{ws_scheme}://{host}/{path}"),
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.url.starts_with("wss://")
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_origin_scheme_mapping() {
        let plain = Endpoint::for_origin("http://localhost:8080").unwrap();
        assert_eq!(plain.url(), "ws://localhost:8080/events");
        assert!(!plain.is_secure());

        let secure = Endpoint::for_origin("https://social.example.com/profile?id=3").unwrap();
        assert_eq!(secure.url(), "wss://social.example.com/events");
        assert!(secure.is_secure());
    }

    #[test]
    fn test_for_origin_custom_path() {
        let endpoint = Endpoint::for_origin_with_path("http://127.0.0.1:9000/", "ws").unwrap();
        assert_eq!(endpoint.to_string(), "ws://127.0.0.1:9000/ws");
    }

    #[test]
    fn test_invalid_origins() {
        assert!(Endpoint::for_origin("ftp://example.com").is_err());
        assert!(Endpoint::for_origin("example.com").is_err());
        assert!(Endpoint::for_origin("http://").is_err());
        assert!(Endpoint::new("http://example.com/events").is_err());
        assert!(Endpoint::new("wss://example.com/events").is_ok());
    }
}
