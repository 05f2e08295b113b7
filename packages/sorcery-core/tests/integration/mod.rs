//! Integration test suite for the data access layer.
//!
//! 1. Type and field registration
//! 2. Object set translation, copy and diff
//! 3. Backend chains and caching
//! 4. Observers
//! 5. Mapping configuration files

pub mod config_tests;
pub mod helpers;
pub mod observer_tests;
pub mod registration_tests;
