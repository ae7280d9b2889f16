// SPDX-License-Identifier: MPL-2.0

//! The compositor as seen by the overlay: a request sink plus a round trip.
//!
//! Requests name protocol objects by small copyable ids. Nothing the
//! compositor says is observed until [`Peer::roundtrip`] returns its events,
//! which makes the round trip the only point where state can change under
//! the caller.

use std::os::fd::BorrowedFd;

use drmprime_overlay_config::Placement;

use crate::error::OverlayError;

/// One `zwp_linux_buffer_params_v1` negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u32);

/// A compositor-created `wl_buffer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubsurfaceId(pub u32);

/// Globals the overlay binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Subcompositor,
    Dmabuf,
}

impl Capability {
    pub const fn interface(self) -> &'static str {
        match self {
            Capability::Subcompositor => "wl_subcompositor",
            Capability::Dmabuf => "zwp_linux_dmabuf_v1",
        }
    }

    pub fn from_interface(interface: &str) -> Option<Self> {
        match interface {
            "wl_subcompositor" => Some(Capability::Subcompositor),
            "zwp_linux_dmabuf_v1" => Some(Capability::Dmabuf),
            _ => None,
        }
    }
}

/// Everything the compositor can tell us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    Global {
        name: u32,
        interface: String,
        version: u32,
    },
    GlobalRemoved {
        name: u32,
    },
    /// `zwp_linux_dmabuf_v1.format`
    Format {
        format: u32,
    },
    /// `zwp_linux_dmabuf_v1.modifier`
    Modifier {
        format: u32,
        modifier: u64,
    },
    /// Negotiation succeeded with a new buffer.
    Created {
        request: RequestId,
        buffer: BufferId,
    },
    /// Negotiation refused.
    Failed {
        request: RequestId,
    },
    /// The compositor no longer reads from `buffer`.
    Released {
        buffer: BufferId,
    },
}

/// Arguments of `zwp_linux_buffer_params_v1.add`.
#[derive(Debug, Clone, Copy)]
pub struct PlaneParams<'a> {
    pub fd: BorrowedFd<'a>,
    pub plane_idx: u32,
    pub offset: u32,
    pub stride: u32,
    pub modifier_hi: u32,
    pub modifier_lo: u32,
}

pub trait Peer {
    /// Start listening for globals. They arrive on the next round trip.
    fn listen_registry(&mut self);

    fn bind(&mut self, capability: Capability, name: u32, version: u32);

    /// Destroy the object bound for `capability`, if any.
    fn unbind(&mut self, capability: Capability);

    /// Open a negotiation. Fails if the dmabuf global was never bound.
    fn create_params(&mut self) -> Result<RequestId, OverlayError>;

    fn add_plane(&mut self, request: RequestId, plane: PlaneParams<'_>);

    /// Submit the negotiation. The outcome arrives as `Created` or `Failed`.
    fn create_buffer(&mut self, request: RequestId, width: i32, height: i32, format: u32, flags: u32);

    fn destroy_params(&mut self, request: RequestId);

    fn destroy_buffer(&mut self, buffer: BufferId);

    fn create_surface(&mut self) -> Result<SurfaceId, OverlayError>;

    /// Make `surface` a child of the embedding surface.
    fn create_subsurface(&mut self, surface: SurfaceId) -> Result<SubsurfaceId, OverlayError>;

    /// Restack `subsurface` relative to the embedding surface.
    fn place_subsurface(&mut self, subsurface: SubsurfaceId, placement: Placement);

    fn attach(&mut self, surface: SurfaceId, buffer: Option<BufferId>, x: i32, y: i32);

    fn commit(&mut self, surface: SurfaceId);

    fn destroy_subsurface(&mut self, subsurface: SubsurfaceId);

    fn destroy_surface(&mut self, surface: SurfaceId);

    /// Block until the compositor has processed every request sent so far,
    /// returning the events it produced meanwhile in arrival order.
    fn roundtrip(&mut self) -> Result<Vec<PeerEvent>, OverlayError>;
}
