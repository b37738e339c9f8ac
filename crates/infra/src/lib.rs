//! Infrastructure layer: storage adapters, configuration and the stock
//! movement use-cases built on them.

pub mod config;
pub mod movements;
pub mod repositories;
pub mod services;

mod integration_tests;
