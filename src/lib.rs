pub mod actions;
pub mod cli;
pub mod client;
pub mod clvalue;
pub mod config;
pub mod crypto;
pub mod deploy;
pub mod encoding;
pub mod error;
pub mod service;
pub mod state;
pub mod tracker;
