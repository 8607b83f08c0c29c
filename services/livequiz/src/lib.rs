#![allow(clippy::new_without_default)]

pub mod cli;
pub mod config;
pub mod directory;
pub mod probe;
pub mod protocol;
pub mod server;
pub mod store;
