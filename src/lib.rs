pub mod app;
pub mod config;
pub mod crypto;
pub mod database;
pub mod entities;
pub mod error;
pub mod logging;
pub mod ports;
pub mod resilience;
pub mod services;
pub mod spotify_rs;
pub mod vault;

#[cfg(test)]
mod test_utils;
