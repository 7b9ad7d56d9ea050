//! gridlink-core: wire codec, protocol drivers, device bridge, and event hub.
//!
//! This crate drives illuminated button grids across two hardware
//! generations (the extended "mext" protocol and the legacy "series"
//! protocol) through one command/event API. Raw USB plumbing is supplied by
//! the host through [`transport::GridTransport`].

pub mod bridge;
pub mod codec;
pub mod config;
pub mod device;
pub mod error;
pub mod event;
pub mod hub;
pub mod mext;
pub mod protocol;
pub mod series;
pub mod transport;

pub use error::{Error, Result};
pub use event::{Command, EventKind, GridEvent, GridSize, InboundEvent, MapState};
pub use hub::{GridHub, SubscriptionId};
