//! Marketgate - Admission control for the marketplace API
//!
//! This crate implements the HTTP front door of the marketplace REST API.
//! Every request is counted against a per-caller fixed window; callers over
//! their budget get a retryable `429`. The front door also carries the
//! generic request plumbing: security headers, CORS, request logging and a
//! health endpoint.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
