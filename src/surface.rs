// SPDX-License-Identifier: MPL-2.0

//! The overlay sub-surface attached to the embedding surface.

use drmprime_overlay_config::Placement;
use tracing::debug;

use crate::error::OverlayError;
use crate::peer::{BufferId, Capability, Peer, SubsurfaceId, SurfaceId};
use crate::registry::Capabilities;

#[derive(Debug, Default)]
pub struct OverlaySurface {
    surface: Option<SurfaceId>,
    subsurface: Option<SubsurfaceId>,
    attached: Option<BufferId>,
}

impl OverlaySurface {
    /// Create the overlay surface as a sub-surface of the embedding surface,
    /// stacked according to `placement`.
    ///
    /// Anything created before a failure is kept so [`teardown`](Self::teardown)
    /// can destroy it.
    pub fn init<P: Peer>(
        &mut self,
        peer: &mut P,
        capabilities: &Capabilities,
        placement: Placement,
    ) -> Result<(), OverlayError> {
        if !capabilities.has_subcompositor() {
            return Err(OverlayError::CapabilityMissing(
                Capability::Subcompositor.interface(),
            ));
        }

        let surface = peer.create_surface()?;
        self.surface = Some(surface);

        let subsurface = peer.create_subsurface(surface)?;
        self.subsurface = Some(subsurface);

        peer.place_subsurface(subsurface, placement);
        debug!(?surface, ?subsurface, ?placement, "overlay surface created");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.surface.is_some() && self.subsurface.is_some()
    }

    /// Attach `buffer` at the origin and commit.
    pub fn attach<P: Peer>(&mut self, peer: &mut P, buffer: BufferId) -> Result<(), OverlayError> {
        let surface = self.surface.ok_or(OverlayError::NotInitialized)?;
        peer.attach(surface, Some(buffer), 0, 0);
        peer.commit(surface);
        self.attached = Some(buffer);
        Ok(())
    }

    /// Attach nothing and commit, hiding the overlay.
    pub fn clear<P: Peer>(&mut self, peer: &mut P) -> Result<(), OverlayError> {
        let surface = self.surface.ok_or(OverlayError::NotInitialized)?;
        peer.attach(surface, None, 0, 0);
        peer.commit(surface);
        self.attached = None;
        Ok(())
    }

    /// Buffer attached by the last commit, if any.
    pub fn attached(&self) -> Option<BufferId> {
        self.attached
    }

    /// Destroy the sub-surface, then the surface. Returns whether anything
    /// was destroyed.
    pub fn teardown<P: Peer>(&mut self, peer: &mut P) -> bool {
        let mut destroyed = false;
        if let Some(subsurface) = self.subsurface.take() {
            peer.destroy_subsurface(subsurface);
            destroyed = true;
        }
        if let Some(surface) = self.surface.take() {
            peer.destroy_surface(surface);
            destroyed = true;
        }
        self.attached = None;
        destroyed
    }
}

#[cfg(test)]
mod tests {
    use drmprime_overlay_config::Config;

    use super::*;
    use crate::testing::{FakePeer, Request};

    fn bound(peer: &mut FakePeer) -> Capabilities {
        let caps = Capabilities::bind(peer, &Config::default()).unwrap();
        peer.requests.clear();
        caps
    }

    #[test]
    fn test_init_places_below_by_default() {
        let mut peer = FakePeer::new();
        let caps = bound(&mut peer);
        let mut surface = OverlaySurface::default();

        surface.init(&mut peer, &caps, Placement::default()).unwrap();
        assert!(surface.is_initialized());
        assert!(matches!(
            peer.requests.as_slice(),
            [
                Request::CreateSurface(_),
                Request::CreateSubsurface(_),
                Request::Place(_, Placement::Below)
            ]
        ));
    }

    #[test]
    fn test_init_without_subcompositor() {
        let mut peer = FakePeer::new().without_global("wl_subcompositor");
        let caps = bound(&mut peer);
        let mut surface = OverlaySurface::default();

        let result = surface.init(&mut peer, &caps, Placement::Below);
        assert!(matches!(
            result,
            Err(OverlayError::CapabilityMissing("wl_subcompositor"))
        ));
        assert!(peer.requests.is_empty());
        assert!(!surface.teardown(&mut peer));
    }

    #[test]
    fn test_partial_init_is_torn_down() {
        let mut peer = FakePeer::new();
        peer.refuse_subsurface = true;
        let caps = bound(&mut peer);
        let mut surface = OverlaySurface::default();

        assert!(surface.init(&mut peer, &caps, Placement::Below).is_err());
        assert!(surface.teardown(&mut peer));
        assert!(matches!(
            peer.requests.as_slice(),
            [Request::CreateSurface(_), Request::DestroySurface(_)]
        ));
    }

    #[test]
    fn test_teardown_destroys_subsurface_first() {
        let mut peer = FakePeer::new();
        let caps = bound(&mut peer);
        let mut surface = OverlaySurface::default();
        surface.init(&mut peer, &caps, Placement::Above).unwrap();
        surface.attach(&mut peer, BufferId(5)).unwrap();
        peer.requests.clear();

        assert!(surface.teardown(&mut peer));
        assert!(matches!(
            peer.requests.as_slice(),
            [Request::DestroySubsurface(_), Request::DestroySurface(_)]
        ));
        assert_eq!(surface.attached(), None);
        assert!(!surface.teardown(&mut peer));
    }

    #[test]
    fn test_attach_before_init() {
        let mut peer = FakePeer::new();
        let mut surface = OverlaySurface::default();
        assert!(matches!(
            surface.attach(&mut peer, BufferId(1)),
            Err(OverlayError::NotInitialized)
        ));
    }
}
