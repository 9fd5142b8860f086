//! Structured header view.
//!
//! # Responsibilities
//! - Keep an ordered, editable copy of request/response headers for layers
//! - Synchronize with the wire-level `HeaderMap` (pull before layers, push before I/O)
//!
//! # Design Decisions
//! - Lookups are case-insensitive, insertion order is preserved
//! - Values are kept as raw bytes, so obs-text survives a round trip
//! - Pull rejects framing it cannot trust (conflicting `Content-Length`)
//! - A failed sync leaves its target untouched

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;

/// Header synchronization failure.
#[derive(Debug, Error)]
pub enum HeaderSyncError {
    /// Header name cannot be written to the wire.
    #[error("invalid header name {0:?}")]
    InvalidName(String),

    /// Header value cannot be written to the wire.
    #[error("invalid value for header {name}")]
    InvalidValue { name: String },

    /// Wire headers are structurally inconsistent.
    #[error("malformed value for header {name}")]
    Malformed { name: String },
}

/// A single header line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: Vec<u8>,
}

/// Ordered list of headers with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    headers: Vec<Header>,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_slice())
    }

    /// First value for `name` as text.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| std::str::from_utf8(v).ok())
    }

    /// All values for `name`, in order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a [u8]> + 'a {
        self.headers
            .iter()
            .filter(move |h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Replace every value of `name` with a single one, keeping the position
    /// of the first occurrence.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) {
        let name = name.into();
        let value = value.into();
        match self.headers.iter().position(|h| h.name.eq_ignore_ascii_case(&name)) {
            Some(pos) => {
                self.headers[pos].value = value;
                let mut i = 0;
                self.headers.retain(|h| {
                    let keep = i <= pos || !h.name.eq_ignore_ascii_case(&name);
                    i += 1;
                    keep
                });
            }
            None => self.headers.push(Header { name, value }),
        }
    }

    pub fn append(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.headers.push(Header {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Remove every value of `name`. Returns true if something was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.headers.len();
        self.headers.retain(|h| !h.name.eq_ignore_ascii_case(name));
        self.headers.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.headers.iter()
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Replace the view with the contents of a wire header map.
    pub fn pull(&mut self, wire: &HeaderMap) -> Result<(), HeaderSyncError> {
        if !content_length_is_consistent(wire) {
            return Err(HeaderSyncError::Malformed {
                name: header::CONTENT_LENGTH.as_str().to_string(),
            });
        }

        self.headers = wire
            .iter()
            .map(|(name, value)| Header {
                name: name.as_str().to_string(),
                value: value.as_bytes().to_vec(),
            })
            .collect();
        Ok(())
    }

    /// Rebuild a wire header map from the view.
    pub fn push(&self, wire: &mut HeaderMap) -> Result<(), HeaderSyncError> {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for h in &self.headers {
            let name = HeaderName::from_bytes(h.name.as_bytes())
                .map_err(|_| HeaderSyncError::InvalidName(h.name.clone()))?;
            let value = HeaderValue::from_bytes(&h.value).map_err(|_| HeaderSyncError::InvalidValue {
                name: h.name.clone(),
            })?;
            map.append(name, value);
        }
        *wire = map;
        Ok(())
    }
}

/// Every `Content-Length` entry is a decimal length and all of them agree.
fn content_length_is_consistent(wire: &HeaderMap) -> bool {
    let mut length = None;
    for value in wire.get_all(header::CONTENT_LENGTH) {
        let Ok(text) = value.to_str() else {
            return false;
        };
        for part in text.split(',') {
            let Ok(n) = part.trim().parse::<u64>() else {
                return false;
            };
            if *length.get_or_insert(n) != n {
                return false;
            }
        }
    }
    true
}
