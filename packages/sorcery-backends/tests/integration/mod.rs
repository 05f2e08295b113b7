//! Integration tests for the bundled backends, each driven through a
//! `Sorcery` instance.

pub mod config_file_tests;
pub mod helpers;
pub mod kvstore_tests;
pub mod realtime_tests;
