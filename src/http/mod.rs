//! HTTP client module
//!
//! Provides the read-only HTTP client used by connectivity probes and
//! built-in checks.

mod client;

pub use client::{HttpClient, HttpError, HttpRequest, HttpResponse, SAFE_METHODS};
