//! An RFC 6762/6763 mDNS responder and one-link service discovery resolver.
//!
//! The entry point is [`core::Mdns`]: create one per host process, enable it
//! on the interfaces it should speak on, register services with
//! [`core::Mdns::service_add`], and drive [`core::Mdns::tick`] from a timer
//! or a background worker thread.

pub mod cache;
pub mod config;
pub mod core;
pub mod error;
pub mod interface;
pub mod notify;
pub mod processor;
pub mod querier;
pub mod responder;
pub mod service;
pub mod timer;
pub mod transport;
pub mod wire;

pub use crate::config::MdnsConfig;
pub use crate::core::{AddOutcome, Mdns, OneShotOutcome, QueryStartOutcome};
pub use crate::error::{MdnsError, Result};
pub use crate::notify::{CacheArenaKind, CacheState, ProbingState, ServiceChangeState};
pub use crate::service::{ServiceDescriptor, ServiceInfo};
