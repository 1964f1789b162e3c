//! rigbind CLI library.
//!
//! This crate provides the command implementations behind the `rigbind`
//! binary: base mesh loading and the proxy, build, bind and find commands.

pub mod commands;
pub mod input;
