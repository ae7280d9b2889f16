// SPDX-License-Identifier: MPL-2.0

//! DRM-PRIME frame descriptors handed over by the hardware decoder.
//!
//! A frame is a set of dma-buf objects plus one or more layers; each layer
//! names up to [`MAX_PLANES`] planes as `(object, offset, stride)` triples:
//!
//! ```text
//! objects: [ fd 7 ─────────────┐ ]
//! layer 0: plane 0 → object 0, offset 0,           stride 1920   (Y)
//!          plane 1 → object 0, offset 1920 * 1088, stride 1920   (UV)
//!          plane 2, plane 3 → unused (stride 0)
//! ```
//!
//! Frames are shared as [`FrameRef`]. Cloning the `Arc` is how the overlay
//! keeps a frame alive while the compositor may still be reading it; dropping
//! the clone gives it back to the decoder.

use std::io;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};
use std::sync::Arc;

/// Plane slots per layer, matching libavutil's `AV_DRM_MAX_PLANES`.
pub const MAX_PLANES: usize = 4;

/// One dma-buf object backing some of a frame's planes.
#[derive(Debug, Clone)]
pub struct DrmObject {
    /// File descriptor (shared Arc for multi-plane in same buffer)
    pub fd: Arc<OwnedFd>,
    /// Size of the object in bytes, 0 if unknown
    pub size: usize,
    /// DRM format modifier the decoder allocated the object with
    pub format_modifier: u64,
}

impl DrmObject {
    pub fn new(fd: OwnedFd, size: usize, format_modifier: u64) -> Self {
        Self {
            fd: Arc::new(fd),
            size,
            format_modifier,
        }
    }

    /// Wrap a decoder-owned fd.
    ///
    /// The fd is duplicated, so the caller keeps ownership of the original.
    pub fn from_raw_fd(raw_fd: RawFd, size: usize, format_modifier: u64) -> io::Result<Self> {
        let dup_fd = nix::unistd::dup(raw_fd).map_err(io::Error::from)?;

        // SAFETY: `dup` returned a fresh descriptor that nothing else owns.
        let fd = unsafe { OwnedFd::from_raw_fd(dup_fd) };

        Ok(Self::new(fd, size, format_modifier))
    }
}

/// A plane slot inside a [`Layer`].
///
/// The default value is an unused slot: stride 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaneRef {
    /// Index into [`FrameDescriptor::objects`]
    pub object_index: usize,
    /// Offset into the object for this plane
    pub offset: u32,
    /// Bytes per row for this plane
    pub stride: u32,
}

impl PlaneRef {
    pub fn new(object_index: usize, offset: u32, stride: u32) -> Self {
        Self {
            object_index,
            offset,
            stride,
        }
    }
}

/// One sub-image of a frame (e.g. the whole NV12 picture).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Layer {
    /// DRM fourcc of the layer
    pub format: u32,
    pub planes: [PlaneRef; MAX_PLANES],
}

impl Layer {
    pub fn new(format: u32) -> Self {
        Self {
            format,
            planes: [PlaneRef::default(); MAX_PLANES],
        }
    }

    /// Fill plane slot `index`. Slots past [`MAX_PLANES`] are ignored.
    #[must_use]
    pub fn with_plane(mut self, index: usize, plane: PlaneRef) -> Self {
        match self.planes.get_mut(index) {
            Some(slot) => *slot = plane,
            None => tracing::warn!(index, "plane slot out of range, ignoring"),
        }
        self
    }
}

/// A plane that will actually be registered with the compositor.
#[derive(Debug, Clone, Copy)]
pub struct PresentPlane<'a> {
    /// Slot index inside the layer, used as the protocol `plane_idx`
    pub index: u32,
    pub object: &'a DrmObject,
    pub offset: u32,
    pub stride: u32,
}

/// Read-only description of one hardware frame.
#[derive(Debug, Clone, Default)]
pub struct FrameDescriptor {
    pub objects: Vec<DrmObject>,
    pub layers: Vec<Layer>,
}

impl FrameDescriptor {
    pub fn object(&self, index: usize) -> Option<&DrmObject> {
        self.objects.get(index)
    }

    /// Present planes of `layer` in slot order.
    ///
    /// A slot is present when its stride is non-zero and its object index
    /// resolves; anything else is an unused slot and silently skipped.
    pub fn present_planes<'a>(&'a self, layer: &'a Layer) -> impl Iterator<Item = PresentPlane<'a>> {
        layer
            .planes
            .iter()
            .enumerate()
            .filter(|(_, plane)| plane.stride != 0)
            .filter_map(move |(index, plane)| {
                let object = self.object(plane.object_index)?;
                Some(PresentPlane {
                    index: index as u32,
                    object,
                    offset: plane.offset,
                    stride: plane.stride,
                })
            })
    }
}

/// A decoded hardware frame as produced by the decoder.
#[derive(Debug, Default)]
pub struct DrmFrame {
    pub descriptor: FrameDescriptor,
    /// Presentation timestamp (nanoseconds from stream start).
    pub pts_ns: Option<u64>,
}

impl DrmFrame {
    pub fn new(descriptor: FrameDescriptor, pts_ns: Option<u64>) -> FrameRef {
        Arc::new(Self { descriptor, pts_ns })
    }
}

/// Shared handle to a frame; each clone is one reference.
pub type FrameRef = Arc<DrmFrame>;

/// Presentation rectangle in host coordinates, `x1`/`y1` exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl Rect {
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Width, clamped to zero for inverted rectangles.
    pub fn width(&self) -> u32 {
        u32::try_from(self.x1.saturating_sub(self.x0)).unwrap_or(0)
    }

    /// Height, clamped to zero for inverted rectangles.
    pub fn height(&self) -> u32 {
        u32::try_from(self.y1.saturating_sub(self.y0)).unwrap_or(0)
    }
}
