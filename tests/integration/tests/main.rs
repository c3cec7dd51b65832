//! End-to-End Integration Tests
//!
//! Convergence properties run against the in-memory identity store; the
//! admin client is exercised against a wiremock server speaking the
//! Keycloak admin API.

mod admin_client;
mod common;
mod convergence;
