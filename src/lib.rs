pub mod cli;
pub mod config;
pub mod constraint_guard;
pub mod database;
pub mod domain;
pub mod error;
pub mod host;
pub mod permissions;
pub mod providers;
pub mod registry;
pub mod sanitizer;
pub mod schema;
pub mod upgrade;

#[cfg(test)]
mod test_support;
