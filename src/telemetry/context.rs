//! # Trace Context
//!
//! Identifiers and the context object that ties spans on both sides of an asynchronous
//! hop into one trace, plus B3 header propagation for the inbound boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const B3_TRACE_ID: &str = "X-B3-TraceId";
pub const B3_SPAN_ID: &str = "X-B3-SpanId";
pub const B3_PARENT_SPAN_ID: &str = "X-B3-ParentSpanId";
pub const B3_SAMPLED: &str = "X-B3-Sampled";

/// 128-bit trace identifier, rendered as 32 lowercase hex digits. Never zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceId(u128);

impl TraceId {
    pub fn generate() -> Self {
        loop {
            let id = rand::random::<u128>();
            if id != 0 {
                return Self(id);
            }
        }
    }

    /// Returns `None` for the invalid all-zero id.
    pub fn from_u128(id: u128) -> Option<Self> {
        (id != 0).then_some(Self(id))
    }

    pub fn as_u128(&self) -> u128 {
        self.0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl FromStr for TraceId {
    type Err = TraceContextError;

    /// Accepts the 16- and 32-digit hex forms used by B3.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !matches!(s.len(), 16 | 32) {
            return Err(TraceContextError::InvalidTraceId);
        }
        u128::from_str_radix(s, 16)
            .ok()
            .and_then(Self::from_u128)
            .ok_or(TraceContextError::InvalidTraceId)
    }
}

/// 64-bit span identifier, rendered as 16 lowercase hex digits. Never zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpanId(u64);

impl SpanId {
    pub fn generate() -> Self {
        loop {
            let id = rand::random::<u64>();
            if id != 0 {
                return Self(id);
            }
        }
    }

    pub fn from_u64(id: u64) -> Option<Self> {
        (id != 0).then_some(Self(id))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for SpanId {
    type Err = TraceContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 16 {
            return Err(TraceContextError::InvalidSpanId);
        }
        u64::from_str_radix(s, 16)
            .ok()
            .and_then(Self::from_u64)
            .ok_or(TraceContextError::InvalidSpanId)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TraceContextError {
    #[error("Trace id is zero or malformed")]
    InvalidTraceId,
    #[error("Span id is zero or malformed")]
    InvalidSpanId,
}

/// Position of one span inside a trace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub parent_span_id: Option<SpanId>,
    pub sampled: bool,
}

impl TraceContext {
    /// Starts a new trace.
    pub fn new_root() -> Self {
        Self {
            trace_id: TraceId::generate(),
            span_id: SpanId::generate(),
            parent_span_id: None,
            sampled: true,
        }
    }

    /// A new span in the same trace, parented on this one.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: SpanId::generate(),
            parent_span_id: Some(self.span_id),
            sampled: self.sampled,
        }
    }

    /// Reads a context from B3 multi-header propagation. Header names are matched
    /// case-insensitively.
    ///
    /// Returns `Ok(None)` when no trace id header is present, so the caller starts a new
    /// trace; malformed ids are an error rather than silently starting over.
    pub fn extract_b3<'a, I>(headers: I) -> Result<Option<Self>, TraceContextError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut trace_id = None;
        let mut span_id = None;
        let mut parent_span_id = None;
        let mut sampled = true;

        for (name, value) in headers {
            let value = value.trim();
            if name.eq_ignore_ascii_case(B3_TRACE_ID) {
                trace_id = Some(value.parse::<TraceId>()?);
            } else if name.eq_ignore_ascii_case(B3_SPAN_ID) {
                span_id = Some(value.parse::<SpanId>()?);
            } else if name.eq_ignore_ascii_case(B3_PARENT_SPAN_ID) {
                parent_span_id = Some(value.parse::<SpanId>()?);
            } else if name.eq_ignore_ascii_case(B3_SAMPLED) {
                sampled = !matches!(value, "0" | "false");
            }
        }

        let Some(trace_id) = trace_id else {
            return Ok(None);
        };
        let span_id = span_id.ok_or(TraceContextError::InvalidSpanId)?;
        Ok(Some(Self {
            trace_id,
            span_id,
            parent_span_id,
            sampled,
        }))
    }

    /// Renders this context as B3 headers for an outbound call.
    pub fn b3_headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            (B3_TRACE_ID, self.trace_id.to_string()),
            (B3_SPAN_ID, self.span_id.to_string()),
            (B3_SAMPLED, if self.sampled { "1" } else { "0" }.to_string()),
        ];
        if let Some(parent) = self.parent_span_id {
            headers.push((B3_PARENT_SPAN_ID, parent.to_string()));
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_keeps_trace_and_links_parent() {
        let root = TraceContext::new_root();
        let child = root.child();
        assert_eq!(child.trace_id, root.trace_id);
        assert_eq!(child.parent_span_id, Some(root.span_id));
        assert_ne!(child.span_id, root.span_id);
    }

    #[test]
    fn test_b3_headers_are_read_back() {
        let context = TraceContext::new_root().child();
        let headers = context.b3_headers();
        let extracted = TraceContext::extract_b3(headers.iter().map(|(k, v)| (*k, v.as_str())))
            .unwrap()
            .unwrap();
        assert_eq!(extracted, context);
    }

    #[test]
    fn test_b3_extraction_is_case_insensitive_and_accepts_short_ids() {
        let headers = [
            ("x-b3-traceid", "463ac35c9f6413ad"),
            ("x-b3-spanid", "a2fb4a1d1a96d312"),
            ("x-b3-sampled", "0"),
        ];
        let context = TraceContext::extract_b3(headers).unwrap().unwrap();
        assert_eq!(context.trace_id.to_string(), "0000000000000000463ac35c9f6413ad");
        assert_eq!(context.span_id.to_string(), "a2fb4a1d1a96d312");
        assert!(!context.sampled);
        assert_eq!(context.parent_span_id, None);
    }

    #[test]
    fn test_missing_trace_header_starts_new_trace() {
        let headers = [("content-type", "text/plain")];
        assert_eq!(TraceContext::extract_b3(headers), Ok(None));
    }

    #[test]
    fn test_malformed_ids_are_rejected() {
        let zero = [
            ("X-B3-TraceId", "00000000000000000000000000000000"),
            ("X-B3-SpanId", "a2fb4a1d1a96d312"),
        ];
        assert_eq!(
            TraceContext::extract_b3(zero),
            Err(TraceContextError::InvalidTraceId)
        );

        let missing_span = [("X-B3-TraceId", "463ac35c9f6413ad")];
        assert_eq!(
            TraceContext::extract_b3(missing_span),
            Err(TraceContextError::InvalidSpanId)
        );

        assert!("not-hex-at-all!!".parse::<SpanId>().is_err());
    }
}
