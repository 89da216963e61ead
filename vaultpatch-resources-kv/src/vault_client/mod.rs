//! A minimal client for the Vault HTTP API: AppRole login and whole-document
//! reads and writes on KV v2 secrets.

mod approle;
mod client;

pub use approle::login;
pub use client::{VaultClient, VaultConfig};
