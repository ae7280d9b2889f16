// SPDX-License-Identifier: MPL-2.0

//! Presents DRM-PRIME hardware frames on a Wayland subsurface.
//!
//! Each frame layer is imported into the compositor through
//! `zwp_linux_dmabuf_v1` and attached to an overlay surface stacked under the
//! host's own surface. The decoder's frame stays referenced until the
//! compositor releases the buffer made from it.
//!
//! ```text
//! OverlayDriver::overlay_frame
//!   ├─ negotiate        params.add(plane…) + params.create
//!   ├─ wait_for_outcome round trip until created / failed
//!   ├─ FrameTracker     hold frame until wl_buffer.release
//!   └─ OverlaySurface   attach + commit
//! ```

pub mod dmabuf;
pub mod driver;
pub mod error;
pub mod exchange;
pub mod frame;
pub mod negotiate;
pub mod peer;
pub mod registry;
pub mod surface;
pub mod tracker;
pub mod wayland;

#[cfg(test)]
mod testing;

pub use driver::{OverlayDriver, status_code};
pub use drmprime_overlay_config::{BufferExtent, Config, Placement};
pub use error::OverlayError;
pub use frame::{DrmFrame, DrmObject, FrameDescriptor, FrameRef, Layer, PlaneRef, Rect};
pub use wayland::{EmbedParams, WaylandPeer};
