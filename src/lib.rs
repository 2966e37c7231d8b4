//! Two-host PAR stop-and-wait link layer simulation

#![forbid(unsafe_code, unused_must_use)]
#![warn(clippy::all, missing_docs)]

/// Protocol constants and channel config.
pub mod common;

/// Fatal error kinds.
pub mod error;

/// Host binding of physical and link layers.
pub mod host;

/// Network layers.
pub mod layers;

/// Broadcast media.
pub mod medium;

/// Simulation drivers.
pub mod simulation;
