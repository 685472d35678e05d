//! Command handlers

pub mod config;
pub mod diff;
pub mod simulate;
