//! Filestore Server Library
//!
//! Exposes the server's modules for the `filestored` binary and for
//! integration testing.

pub mod admission;
pub mod config;
pub mod connection;
pub mod context;
pub mod service;
pub mod storage;
pub mod transfers;
