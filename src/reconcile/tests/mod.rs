//! Unit tests for the reconcile module.
//!
//! Service tests run against the in-memory hosting platform, seeded working
//! copies and the inline image editor, so every remote effect can be
//! asserted without a network.

mod dispatch_tests;
mod session_tests;
