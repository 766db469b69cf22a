//! Scriptforge host library
//!
//! This module exports the internal components of the host for testing purposes.

pub mod config;
pub mod console;
pub mod runtime;
pub mod storage;
