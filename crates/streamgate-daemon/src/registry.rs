//! Per-process stream lookup and mode checking.
//!
//! Resolution is deterministic and creates no subscription state: an
//! unresolvable target fails before the session touches the event bus.
//! Permission checks run before existence checks can short-circuit, so an
//! unreadable default redirect is reported as `eperm`, never `not_found`.

use std::collections::BTreeSet;

use streamgate_core::{GatewayError, Result};

/// Read/write mode mask for a channel, derived from the connection-time
/// `mode` query parameter. Default is both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamMode(u8);

impl StreamMode {
    pub const READABLE: Self = Self(1);
    pub const WRITABLE: Self = Self(2);
    pub const BOTH: Self = Self(3);

    /// Build from the raw query mask; only `1`, `2` and `3` are valid.
    pub fn from_mask(mask: u8) -> Result<Self> {
        match mask {
            1..=3 => Ok(Self(mask)),
            other => Err(GatewayError::BadValue(format!("mode mask {other}"))),
        }
    }

    pub const fn readable(self) -> bool {
        self.0 & Self::READABLE.0 != 0
    }

    pub const fn writable(self) -> bool {
        self.0 & Self::WRITABLE.0 != 0
    }

    pub const fn mask(self) -> u8 {
        self.0
    }
}

impl Default for StreamMode {
    fn default() -> Self {
        Self::BOTH
    }
}

/// Fixed capability description of a process's streams.
///
/// A closed struct rather than runtime attribute probing: the manager
/// fills it in at registration time and it never changes while the
/// process runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamCaps {
    /// Redirected stdio output streams in redirect order; the first one
    /// is the default read target.
    pub output_streams: Vec<String>,
    /// Whether stdin is redirected and accepts writes.
    pub has_input_stream: bool,
    /// Custom application streams.
    pub custom_streams: BTreeSet<String>,
}

impl StreamCaps {
    pub fn has_output_streams(&self) -> bool {
        !self.output_streams.is_empty()
    }

    /// The stream a default-mode read attaches to.
    pub fn default_output(&self) -> Option<&str> {
        self.output_streams.first().map(String::as_str)
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.output_streams.iter().any(|s| s == name)
    }

    pub fn is_custom(&self, name: &str) -> bool {
        self.custom_streams.contains(name)
    }
}

/// The stream binding a session reads from / writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamTarget {
    /// Default redirected stdio: read the first output redirect, write
    /// the input redirect.
    DefaultRedirect,
    /// One specific redirected stdio output stream.
    NamedRedirect(String),
    /// A custom application stream.
    CustomStream(String),
}

impl StreamTarget {
    /// The stream name a readable session subscribes to, if any.
    pub fn read_stream<'a>(&'a self, caps: &'a StreamCaps) -> Option<&'a str> {
        match self {
            Self::DefaultRedirect => caps.default_output(),
            Self::NamedRedirect(name) | Self::CustomStream(name) => Some(name.as_str()),
        }
    }
}

/// Resolve `(process caps, optional stream name, mode)` to a target.
pub fn resolve(caps: &StreamCaps, stream: Option<&str>, mode: StreamMode) -> Result<StreamTarget> {
    match stream {
        None => {
            if mode.readable() && !caps.has_output_streams() {
                return Err(GatewayError::Permission);
            }
            if mode.writable() && !caps.has_input_stream {
                return Err(GatewayError::Permission);
            }
            Ok(StreamTarget::DefaultRedirect)
        }
        Some(name) => {
            if caps.is_named(name) {
                // a named redirect writes through the default input
                if mode.writable() && !caps.has_input_stream {
                    return Err(GatewayError::Permission);
                }
                Ok(StreamTarget::NamedRedirect(name.to_string()))
            } else if caps.is_custom(name) {
                // custom streams always accept a write request
                Ok(StreamTarget::CustomStream(name.to_string()))
            } else {
                Err(GatewayError::NotFound)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn full_caps() -> StreamCaps {
        StreamCaps {
            output_streams: vec!["stdout".to_string(), "stderr".to_string()],
            has_input_stream: true,
            custom_streams: BTreeSet::from(["logs".to_string()]),
        }
    }

    #[test]
    fn mode_mask_bounds() {
        assert!(StreamMode::from_mask(0).is_err());
        assert!(StreamMode::from_mask(4).is_err());
        assert_eq!(StreamMode::from_mask(3).unwrap(), StreamMode::BOTH);
        assert!(StreamMode::READABLE.readable());
        assert!(!StreamMode::READABLE.writable());
        assert!(StreamMode::WRITABLE.writable());
        assert_eq!(StreamMode::default(), StreamMode::BOTH);
    }

    #[test]
    fn default_mode_with_both_redirects() {
        let target = resolve(&full_caps(), None, StreamMode::BOTH).unwrap();
        assert_eq!(target, StreamTarget::DefaultRedirect);
    }

    #[test]
    fn unreadable_default_is_eperm_not_enoent() {
        let caps = StreamCaps {
            output_streams: Vec::new(),
            has_input_stream: true,
            custom_streams: BTreeSet::new(),
        };
        let err = resolve(&caps, None, StreamMode::READABLE).unwrap_err();
        assert!(matches!(err, GatewayError::Permission));
    }

    #[test]
    fn unwritable_default_is_eperm() {
        let caps = StreamCaps {
            output_streams: vec!["stdout".to_string()],
            has_input_stream: false,
            custom_streams: BTreeSet::new(),
        };
        assert!(matches!(
            resolve(&caps, None, StreamMode::WRITABLE),
            Err(GatewayError::Permission)
        ));
        // read-only still resolves
        assert_eq!(
            resolve(&caps, None, StreamMode::READABLE).unwrap(),
            StreamTarget::DefaultRedirect
        );
    }

    #[test]
    fn named_redirect_resolves() {
        let target = resolve(&full_caps(), Some("stderr"), StreamMode::READABLE).unwrap();
        assert_eq!(target, StreamTarget::NamedRedirect("stderr".to_string()));
    }

    #[test]
    fn named_redirect_write_requires_input_redirect() {
        let caps = StreamCaps {
            output_streams: vec!["stdout".to_string()],
            has_input_stream: false,
            custom_streams: BTreeSet::new(),
        };
        assert!(matches!(
            resolve(&caps, Some("stdout"), StreamMode::BOTH),
            Err(GatewayError::Permission)
        ));
    }

    #[test]
    fn custom_stream_resolves_and_always_accepts_write() {
        // no input redirect at all: a custom stream still takes WRITABLE
        let caps = StreamCaps {
            output_streams: Vec::new(),
            has_input_stream: false,
            custom_streams: BTreeSet::from(["logs".to_string()]),
        };
        let target = resolve(&caps, Some("logs"), StreamMode::BOTH).unwrap();
        assert_eq!(target, StreamTarget::CustomStream("logs".to_string()));
    }

    #[test]
    fn unknown_stream_is_not_found() {
        assert!(matches!(
            resolve(&full_caps(), Some("nope"), StreamMode::BOTH),
            Err(GatewayError::NotFound)
        ));
    }

    #[test]
    fn read_stream_for_each_target() {
        let caps = full_caps();
        assert_eq!(
            StreamTarget::DefaultRedirect.read_stream(&caps),
            Some("stdout")
        );
        assert_eq!(
            StreamTarget::NamedRedirect("stderr".to_string()).read_stream(&caps),
            Some("stderr")
        );
        assert_eq!(
            StreamTarget::CustomStream("logs".to_string()).read_stream(&caps),
            Some("logs")
        );
    }
}
