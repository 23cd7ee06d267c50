//! Span utilities for registry operations.

use tracing::{info_span, Span};

use crate::capability::Capability;

/// Extension trait for adding context to spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for service registry spans.
pub struct ServiceSpan;

impl ServiceSpan {
    /// Span with `operation`, `capability` and `hint` set; `status` and
    /// `error.message` are filled by [`SpanExt::record_result`].
    pub fn new(operation: &'static str, capability: Capability, hint: &str) -> Span {
        info_span!(
            "service_registry",
            operation = operation,
            capability = %capability,
            hint = %hint,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
        )
    }
}
