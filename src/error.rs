// SPDX-License-Identifier: MPL-2.0

use std::collections::TryReserveError;

use sctk::reexports::client::DispatchError;

/// Failures surfaced to the host framework.
///
/// Every variant is terminal for the call that produced it only; the overlay
/// stays usable for later frames unless the connection itself is gone.
#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    #[error("compositor does not provide {0}")]
    CapabilityMissing(&'static str),
    #[error("compositor refused buffer parameters for layer {layer}")]
    NegotiationRefused { layer: usize },
    #[error("layer {layer} has no planes to negotiate")]
    EmptyLayer { layer: usize },
    #[error("out of memory while tracking a buffer exchange")]
    Allocation(#[from] TryReserveError),
    #[error("compositor protocol violation: {0}")]
    PeerProtocolViolation(String),
    #[error("overlay is not initialized")]
    NotInitialized,
    #[error("overlay is already initialized")]
    AlreadyInitialized,
    #[error("invalid presentation extent {width}x{height}")]
    InvalidExtent { width: u32, height: u32 },
    #[error("compositor refused to create {0}")]
    SurfaceCreation(&'static str),
    #[error("compositor connection failed: {0}")]
    Dispatch(#[from] DispatchError),
}
