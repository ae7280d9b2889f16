// SPDX-License-Identifier: MPL-2.0

//! Host-facing lifecycle of the overlay: `init`, `overlay_frame`, `uninit`.

use drmprime_overlay_config::{BufferExtent, Config};
use tracing::{debug, error, info, trace, warn};

use crate::error::OverlayError;
use crate::exchange::wait_for_outcome;
use crate::frame::{FrameRef, Rect};
use crate::negotiate::{LayerSelection, negotiate};
use crate::peer::{BufferId, Peer, PeerEvent};
use crate::registry::Capabilities;
use crate::surface::OverlaySurface;
use crate::tracker::{FrameTracker, TrackerStats};

/// Map a driver result onto the `0` / `-1` convention of C driver tables.
pub fn status_code<T>(result: &Result<T, OverlayError>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(_) => -1,
    }
}

/// Hand an event that nobody is waiting on to its owner.
fn route_event<P: Peer>(
    peer: &mut P,
    capabilities: &mut Capabilities,
    tracker: &mut FrameTracker,
    event: PeerEvent,
) {
    match event {
        PeerEvent::Released { buffer } => {
            tracker.release(peer, buffer);
        }
        PeerEvent::Created { request, buffer } => {
            warn!(?request, ?buffer, "buffer created for unknown negotiation, destroying");
            peer.destroy_buffer(buffer);
        }
        PeerEvent::Failed { request } => {
            warn!(?request, "failure reported for unknown negotiation");
        }
        other => capabilities.observe(peer, other),
    }
}

/// One overlay per embedding surface.
///
/// Every compositor event is handled inside one of the methods below; there
/// is no background dispatching.
#[derive(Debug)]
pub struct OverlayDriver<P: Peer> {
    peer: P,
    config: Config,
    capabilities: Capabilities,
    surface: OverlaySurface,
    tracker: FrameTracker,
    initialized: bool,
}

impl<P: Peer> OverlayDriver<P> {
    pub const NAME: &'static str = "drmprime-wayland";

    pub fn new(peer: P, config: Config) -> Self {
        Self {
            capabilities: Capabilities::new(&config),
            peer,
            config,
            surface: OverlaySurface::default(),
            tracker: FrameTracker::default(),
            initialized: false,
        }
    }

    /// Bind capabilities and create the overlay surface.
    ///
    /// On failure everything created so far is torn down again.
    pub fn init(&mut self) -> Result<(), OverlayError> {
        if self.initialized {
            return Err(OverlayError::AlreadyInitialized);
        }

        if let Err(why) = self.try_init() {
            error!(?why, "failed to initialize overlay");
            self.uninit();
            return Err(why);
        }

        self.initialized = true;
        info!(
            subcompositor = ?self.capabilities.subcompositor,
            dmabuf = ?self.capabilities.dmabuf,
            formats = self.capabilities.formats.len(),
            "overlay initialized"
        );
        Ok(())
    }

    fn try_init(&mut self) -> Result<(), OverlayError> {
        self.capabilities = Capabilities::bind(&mut self.peer, &self.config)?;
        self.surface
            .init(&mut self.peer, &self.capabilities, self.config.placement)?;

        // make sure the compositor accepted the surfaces before going on
        for event in self.peer.roundtrip()? {
            route_event(
                &mut self.peer,
                &mut self.capabilities,
                &mut self.tracker,
                event,
            );
        }
        Ok(())
    }

    /// Show `frame` on the overlay, or clear it when `frame` is `None`.
    ///
    /// Each layer is negotiated, bound and committed in turn, so with several
    /// layers the last one stays visible. A refused layer fails the call;
    /// layers committed before it stay bound.
    pub fn overlay_frame(
        &mut self,
        frame: Option<&FrameRef>,
        src: Rect,
        dst: Rect,
        new_frame: bool,
    ) -> Result<(), OverlayError> {
        if !self.initialized {
            return Err(OverlayError::NotInitialized);
        }
        trace!(new_frame, ?src, ?dst, "overlay frame");

        let Some(frame) = frame else {
            return self.surface.clear(&mut self.peer);
        };

        let extent = match self.config.buffer_extent {
            BufferExtent::Destination => dst,
            BufferExtent::Source => src,
        };
        let (width, height) = (extent.width(), extent.height());
        if width == 0 || height == 0 {
            return Err(OverlayError::InvalidExtent { width, height });
        }

        if frame.descriptor.layers.is_empty() {
            debug!(pts_ns = ?frame.pts_ns, "frame has no layers, nothing to show");
        }

        for layer in 0..frame.descriptor.layers.len() {
            self.present_layer(frame, layer, width, height)?;
        }
        Ok(())
    }

    fn present_layer(
        &mut self,
        frame: &FrameRef,
        layer: usize,
        width: u32,
        height: u32,
    ) -> Result<(), OverlayError> {
        let Self {
            peer,
            config,
            capabilities,
            surface,
            tracker,
            ..
        } = self;

        let pending = negotiate(
            peer,
            tracker,
            capabilities,
            config,
            LayerSelection {
                descriptor: &frame.descriptor,
                index: layer,
            },
            width,
            height,
        )?;

        let outcome = wait_for_outcome(peer, pending, config.max_outcome_roundtrips, |peer, event| {
            route_event(peer, capabilities, tracker, event)
        })?;

        let Some(buffer) = outcome else {
            warn!(layer, pts_ns = ?frame.pts_ns, "compositor refused buffer, dropping frame");
            return Err(OverlayError::NegotiationRefused { layer });
        };

        tracker.bind(buffer, frame);
        surface.attach(peer, buffer)
    }

    /// Round trip once and handle whatever the compositor sent, releases
    /// included. Lets a paused host get its frames back without presenting.
    pub fn sync(&mut self) -> Result<(), OverlayError> {
        if !self.initialized {
            return Err(OverlayError::NotInitialized);
        }
        for event in self.peer.roundtrip()? {
            route_event(
                &mut self.peer,
                &mut self.capabilities,
                &mut self.tracker,
                event,
            );
        }
        Ok(())
    }

    /// Destroy the overlay surface, give back every frame still held and
    /// release the bound globals.
    ///
    /// Safe to call more than once.
    pub fn uninit(&mut self) {
        if self.surface.teardown(&mut self.peer) {
            match self.peer.roundtrip() {
                Ok(events) => {
                    for event in events {
                        route_event(
                            &mut self.peer,
                            &mut self.capabilities,
                            &mut self.tracker,
                            event,
                        );
                    }
                }
                Err(why) => warn!(?why, "round trip after overlay teardown failed"),
            }
        }

        let retired = self.tracker.retire_all(&mut self.peer);
        if retired > 0 {
            debug!(retired, "destroyed buffers the compositor never released");
        }
        self.capabilities.release(&mut self.peer);

        if self.initialized {
            info!(stats = ?self.tracker.stats(), "overlay uninitialized");
        }
        self.initialized = false;
    }

    pub fn name(&self) -> &'static str {
        Self::NAME
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Number of buffers the compositor still holds.
    pub fn outstanding(&self) -> usize {
        self.tracker.len()
    }

    /// Buffer shown by the last commit.
    pub fn attached(&self) -> Option<BufferId> {
        self.surface.attached()
    }

    pub fn tracker_stats(&self) -> TrackerStats {
        self.tracker.stats()
    }

    pub fn peer(&self) -> &P {
        &self.peer
    }

    pub fn peer_mut(&mut self) -> &mut P {
        &mut self.peer
    }

    #[cfg(test)]
    pub(crate) fn limit_outstanding(&mut self, limit: usize) {
        self.tracker.limit_capacity(limit);
    }
}

impl<P: Peer> Drop for OverlayDriver<P> {
    fn drop(&mut self) {
        let bound = self.capabilities.has_subcompositor() || self.capabilities.has_dmabuf();
        if self.initialized || bound || self.surface.is_initialized() || !self.tracker.is_empty() {
            self.uninit();
        }
    }
}
