use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::layers::physical::EndpointId;

/// Fatal construction-time failures.
///
/// Runtime protocol damage (bad parity, malformed frames) never surfaces
/// here; it is logged and recovered by retransmission.
#[derive(Debug, Error)]
pub enum SimulatorError {
    /// A physical layer transmitted via a medium it is not registered with.
    #[error("endpoint {0:?} is not registered with the medium")]
    UnregisteredSender(EndpointId),

    /// A second link layer attempted to claim an already claimed physical layer.
    #[error("physical layer is already claimed by a link layer")]
    DoubleRegistration,

    /// The requested medium or link layer variant name is not registered.
    #[error("unknown {kind} variant {name:?}")]
    UnknownVariant {
        /// Which registry was consulted ("medium" or "link layer").
        kind: &'static str,
        /// The name that failed to resolve.
        name: String,
    },

    /// The payload file could not be read.
    #[error("payload file {path:?}: {source}")]
    PayloadIo {
        /// Path of the offending file.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// The payload file does not fit in a single in-memory buffer.
    #[error("payload file {path:?} exceeds {max_bytes} bytes")]
    PayloadTooLarge {
        /// Path of the offending file.
        path: PathBuf,
        /// The enforced limit.
        max_bytes: u64,
    },
}
