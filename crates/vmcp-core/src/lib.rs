#![doc = include_str!("../README.md")]

//! Multi-backend session subsystem for a Virtual MCP (vMCP) aggregator.
//!
//! This crate implements the core described by the project's design
//! documents: backend connection setup ([`connector`], [`session`]),
//! capability aggregation and deterministic conflict resolution
//! ([`capability`], [`routing`]), per-session dispatch with graceful
//! shutdown ([`admission`], [`multi_session`]), and the two-phase session
//! lifecycle that bridges the MCP streamable-HTTP transport's
//! session-id-before-context requirement to backend fan-out
//! ([`factory`], [`manager`], [`store`], [`registry`]).
//!
//! The outer HTTP listener, auth/audit middleware, config loader, and
//! workflow composer for composite tools are external collaborators; this
//! crate exposes the contracts they consume (see [`manager::SessionManager`]
//! and [`adapter`]) without implementing them itself.

pub mod adapter;
pub mod admission;
pub mod auth;
pub mod backend;
pub mod capability;
pub mod connector;
pub mod error;
pub mod factory;
pub mod http_client;
pub mod identity;
pub mod manager;
pub mod multi_session;
pub mod registry;
pub mod result;
pub mod routing;
pub mod session;
pub mod store;

pub use admission::AdmissionQueue;
pub use backend::{BackendTarget, TransportKind};
pub use capability::CapabilityList;
pub use connector::{Connector, RmcpConnector};
pub use error::VmcpError;
pub use factory::Factory;
pub use identity::Identity;
pub use manager::SessionManager;
pub use multi_session::MultiSession;
pub use registry::{BackendRegistry, StaticBackendRegistry};
pub use routing::RoutingTable;
pub use session::BackendSession;
pub use store::{InMemorySessionStore, SessionStore};
