//! An RPKI-to-Router (RTR) client and reference cache server.
//!
//! RTR (RFC 6810, RFC 8210, and draft-ietf-sidrops-rtr-rpki-rov for ASPA)
//! is the protocol routers speak to an RPKI relying party cache to pull
//! validated payload: VRPs, Router Keys and ASPAs. This crate implements
//! the wire codec ([`pdu`]), the authoritative per-cache payload set
//! ([`state`], [`changeset`]), a client session engine that drives the
//! Reset/Serial state machine against one or more caches ([`client`]),
//! an orchestrator that fans that out across caches ([`orchestrator`]),
//! and a minimal reference server ([`server`]) for testing clients
//! against.

#[macro_use] extern crate clap;

pub mod changeset;
pub mod clock;
pub mod client;
pub mod config;
pub mod error;
pub mod log;
pub mod orchestrator;
pub mod pdu;
pub mod persist;
pub mod serial;
pub mod server;
pub mod state;
pub mod utils;

pub use config::Config;
pub use error::ExitError;

