//! # Container first-boot provisioning
//!
//! This crate implements a run-once initializer for containers: it applies
//! credentials handed in through the environment, makes sure self-signed TLS
//! material exists, and records completion in a marker file so that
//! subsequent container starts leave the system alone.

mod accounts;
mod certs;
pub mod cli;
mod config;
mod database;
mod initializer;
mod sentinel;
