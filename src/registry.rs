// SPDX-License-Identifier: MPL-2.0

//! Discovers and binds the globals the overlay needs.

use drmprime_overlay_config::Config;
use tracing::{debug, info};

use crate::dmabuf::FormatTable;
use crate::error::OverlayError;
use crate::peer::{Capability, Peer, PeerEvent};

/// Bound globals and what the compositor advertised through them.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    /// Bound `wl_subcompositor` version
    pub subcompositor: Option<u32>,
    /// Bound `zwp_linux_dmabuf_v1` version
    pub dmabuf: Option<u32>,
    /// Formats advertised on the dmabuf global. Observed only; negotiation
    /// does not consult them.
    pub formats: FormatTable,
    subcompositor_version: u32,
    dmabuf_version: u32,
    /// Registry names of the bound globals
    subcompositor_global: Option<u32>,
    dmabuf_global: Option<u32>,
}

impl Capabilities {
    pub fn new(config: &Config) -> Self {
        Self {
            subcompositor_version: config.subcompositor_version,
            dmabuf_version: config.dmabuf_version,
            ..Self::default()
        }
    }

    /// Listen for globals and bind what is there after one round trip.
    ///
    /// A missing dmabuf global is not an error here; it surfaces the first
    /// time a frame is negotiated.
    pub fn bind<P: Peer>(peer: &mut P, config: &Config) -> Result<Self, OverlayError> {
        let mut capabilities = Self::new(config);

        peer.listen_registry();
        for event in peer.roundtrip()? {
            capabilities.observe(peer, event);
        }

        if capabilities.dmabuf.is_none() {
            info!("compositor does not advertise zwp_linux_dmabuf_v1");
        }

        Ok(capabilities)
    }

    /// Handle a registry or format event, binding capabilities as they appear.
    pub fn observe<P: Peer>(&mut self, peer: &mut P, event: PeerEvent) {
        match event {
            PeerEvent::Global {
                name,
                interface,
                version,
            } => {
                let Some(capability) = Capability::from_interface(&interface) else {
                    return;
                };
                let wanted = match capability {
                    Capability::Subcompositor => self.subcompositor_version,
                    Capability::Dmabuf => self.dmabuf_version,
                };
                let (slot, global) = self.slot(capability);
                if slot.is_some() {
                    debug!(%interface, name, "already bound, ignoring duplicate global");
                    return;
                }

                let version = version.min(wanted);
                peer.bind(capability, name, version);
                *slot = Some(version);
                *global = Some(name);
                debug!(%interface, version, "Registered for protocol");
            }
            PeerEvent::GlobalRemoved { name } => {
                let removed = [Capability::Subcompositor, Capability::Dmabuf]
                    .into_iter()
                    .find(|&capability| self.global(capability) == Some(name));
                match removed {
                    Some(capability) => {
                        info!(
                            interface = capability.interface(),
                            name, "bound global removed by compositor"
                        );
                        self.unbind(peer, capability);
                    }
                    None => debug!(name, "global removed"),
                }
            }
            PeerEvent::Format { format } => self.formats.insert_format(format),
            PeerEvent::Modifier { format, modifier } => {
                self.formats.insert_modifier(format, modifier);
            }
            other => debug!(?other, "event not handled by capability binder"),
        }
    }

    /// Destroy every bound global and forget what was advertised through them.
    pub fn release<P: Peer>(&mut self, peer: &mut P) {
        for capability in [Capability::Subcompositor, Capability::Dmabuf] {
            self.unbind(peer, capability);
        }
    }

    fn unbind<P: Peer>(&mut self, peer: &mut P, capability: Capability) {
        let (slot, global) = self.slot(capability);
        if slot.take().is_none() {
            return;
        }
        *global = None;
        peer.unbind(capability);
        if capability == Capability::Dmabuf {
            self.formats = FormatTable::default();
        }
    }

    fn global(&self, capability: Capability) -> Option<u32> {
        match capability {
            Capability::Subcompositor => self.subcompositor_global,
            Capability::Dmabuf => self.dmabuf_global,
        }
    }

    fn slot(&mut self, capability: Capability) -> (&mut Option<u32>, &mut Option<u32>) {
        match capability {
            Capability::Subcompositor => {
                (&mut self.subcompositor, &mut self.subcompositor_global)
            }
            Capability::Dmabuf => (&mut self.dmabuf, &mut self.dmabuf_global),
        }
    }

    pub fn has_subcompositor(&self) -> bool {
        self.subcompositor.is_some()
    }

    pub fn has_dmabuf(&self) -> bool {
        self.dmabuf.is_some()
    }
}
