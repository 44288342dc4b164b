//! Test support: generated workspaces and in-process definition providers.
//!
//! Available in unit tests and, through the `test-support` feature, to
//! integration tests.

pub mod fake_provider;
pub mod fixture_workspace;
