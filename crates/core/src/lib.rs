//! Balancer core
//!
//! Pure domain logic for per-channel sink balancing: profile parsing,
//! pattern compilation and the balance resolver. Device access lives in
//! `balancer-infra`.

pub mod domain;
