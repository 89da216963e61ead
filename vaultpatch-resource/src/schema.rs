//! Messages exchanged between the command line and resource providers.

pub mod v0;
