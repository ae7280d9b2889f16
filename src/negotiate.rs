// SPDX-License-Identifier: MPL-2.0

//! Turns one layer of a frame into a `zwp_linux_buffer_params_v1` request.
//!
//! This performs the buffer negotiation:
//! 1. Create zwp_linux_buffer_params_v1
//! 2. Add each present plane with fd, offset, stride, modifier
//! 3. Submit `create`; the compositor answers with `created` or `failed`

use std::os::fd::AsFd;

use drmprime_overlay_config::Config;
use tracing::{debug, error};

use crate::dmabuf::{fourcc_name, split_modifier};
use crate::error::OverlayError;
use crate::exchange::PendingExchange;
use crate::frame::FrameDescriptor;
use crate::peer::{Peer, PlaneParams};
use crate::registry::Capabilities;
use crate::tracker::FrameTracker;

/// Where to find the layer being negotiated.
#[derive(Debug, Clone, Copy)]
pub struct LayerSelection<'a> {
    pub descriptor: &'a FrameDescriptor,
    pub index: usize,
}

/// Submit a negotiation for `selection` at `width`x`height`.
///
/// The returned exchange must be resolved with
/// [`wait_for_outcome`](crate::exchange::wait_for_outcome) before the next
/// negotiation starts.
pub fn negotiate<P: Peer>(
    peer: &mut P,
    tracker: &mut FrameTracker,
    capabilities: &Capabilities,
    config: &Config,
    selection: LayerSelection<'_>,
    width: u32,
    height: u32,
) -> Result<PendingExchange, OverlayError> {
    let LayerSelection { descriptor, index } = selection;
    let invalid = || OverlayError::InvalidExtent { width, height };
    if width == 0 || height == 0 {
        return Err(invalid());
    }
    let buffer_width = i32::try_from(width).map_err(|_| invalid())?;
    let buffer_height = i32::try_from(height).map_err(|_| invalid())?;

    let Some(layer) = descriptor.layers.get(index) else {
        return Err(OverlayError::EmptyLayer { layer: index });
    };
    if descriptor.present_planes(layer).next().is_none() {
        return Err(OverlayError::EmptyLayer { layer: index });
    }

    if !capabilities.formats.is_empty() && !capabilities.formats.supports(layer.format) {
        debug!(
            format = %fourcc_name(layer.format),
            "layer format not advertised by compositor, trying anyway"
        );
    }

    let request = peer.create_params()?;

    let mut planes = 0;
    for plane in descriptor.present_planes(layer) {
        let modifier = if config.forward_modifiers {
            plane.object.format_modifier
        } else {
            0
        };
        let (modifier_hi, modifier_lo) = split_modifier(modifier);
        peer.add_plane(
            request,
            PlaneParams {
                fd: plane.object.fd.as_fd(),
                plane_idx: plane.index,
                offset: plane.offset,
                stride: plane.stride,
                modifier_hi,
                modifier_lo,
            },
        );
        planes += 1;
    }

    if let Err(why) = tracker.reserve() {
        error!(?why, layer = index, "Out of memory, abandoning negotiation");
        peer.destroy_params(request);
        return Err(why);
    }

    peer.create_buffer(request, buffer_width, buffer_height, layer.format, 0);

    debug!(
        ?request,
        layer = index,
        width,
        height,
        format = %fourcc_name(layer.format),
        planes,
        "Submitted DMA-BUF buffer parameters"
    );

    Ok(PendingExchange::new(request, index))
}
