/// Physical layer definitions
pub mod physical;

/// Link layer event loop and variant registry
pub mod link;

/// PAR stop-and-wait link layer variant
pub mod par;
