// SPDX-License-Identifier: MPL-2.0

//! [`Peer`] over a real Wayland connection.
//!
//! ```text
//! host surface (host queue)
//!   └─ wl_subsurface ── overlay wl_surface (private queue) ◄── wl_buffer
//!                                                            ▲
//!        zwp_linux_dmabuf_v1 → zwp_linux_buffer_params_v1 ───┘ created / failed
//! ```
//!
//! Everything the overlay creates lives on a private event queue, so the
//! host's own dispatching never runs our handlers and our round trips never
//! run the host's.

use std::collections::{BTreeMap, HashMap};

use drmprime_overlay_config::Placement;
use sctk::reexports::client::{
    Connection, Dispatch, EventQueue, Proxy, QueueHandle, delegate_noop, event_created_child,
    protocol::{
        wl_buffer::{self, WlBuffer},
        wl_compositor::WlCompositor,
        wl_registry::{self, WlRegistry},
        wl_subcompositor::WlSubcompositor,
        wl_subsurface::WlSubsurface,
        wl_surface::WlSurface,
    },
};
use tracing::{debug, info, warn};
use wayland_protocols::wp::linux_dmabuf::zv1::client::{
    zwp_linux_buffer_params_v1::{self, ZwpLinuxBufferParamsV1},
    zwp_linux_dmabuf_v1::{self, ZwpLinuxDmabufV1},
};

use crate::dmabuf::join_modifier;
use crate::error::OverlayError;
use crate::peer::{
    BufferId, Capability, Peer, PeerEvent, PlaneParams, RequestId, SubsurfaceId, SurfaceId,
};

/// What the host hands over so the overlay can attach itself.
#[derive(Debug, Clone)]
pub struct EmbedParams {
    pub connection: Connection,
    pub compositor: WlCompositor,
    /// The surface the overlay is placed relative to
    pub surface: WlSurface,
}

/// Dispatch target of the private queue.
#[derive(Debug, Default)]
pub struct PeerState {
    events: Vec<PeerEvent>,
    buffers: HashMap<BufferId, WlBuffer>,
    /// Globals currently advertised, by registry name
    globals: BTreeMap<u32, (String, u32)>,
}

impl PeerState {
    fn registry_event(&mut self, event: wl_registry::Event) {
        match event {
            wl_registry::Event::Global {
                name,
                interface,
                version,
            } => {
                self.globals.insert(name, (interface.clone(), version));
                self.events.push(PeerEvent::Global {
                    name,
                    interface,
                    version,
                });
            }
            wl_registry::Event::GlobalRemove { name } => {
                self.globals.remove(&name);
                self.events.push(PeerEvent::GlobalRemoved { name });
            }
            _ => {}
        }
    }

    /// Announce every known global again, as a fresh registry would.
    fn replay_globals(&mut self) {
        let globals = self
            .globals
            .iter()
            .map(|(name, (interface, version))| PeerEvent::Global {
                name: *name,
                interface: interface.clone(),
                version: *version,
            });
        self.events.extend(globals);
    }

    fn dmabuf_event(&mut self, event: zwp_linux_dmabuf_v1::Event) {
        match event {
            zwp_linux_dmabuf_v1::Event::Format { format } => {
                self.events.push(PeerEvent::Format { format });
            }
            zwp_linux_dmabuf_v1::Event::Modifier {
                format,
                modifier_hi,
                modifier_lo,
            } => self.events.push(PeerEvent::Modifier {
                format,
                modifier: join_modifier(modifier_hi, modifier_lo),
            }),
            _ => {}
        }
    }

    fn buffer_created(&mut self, request: RequestId, buffer: WlBuffer) {
        let id = BufferId(buffer.id().protocol_id());
        self.buffers.insert(id, buffer);
        self.events.push(PeerEvent::Created {
            request,
            buffer: id,
        });
    }

    fn buffer_released(&mut self, buffer: &WlBuffer) {
        self.events.push(PeerEvent::Released {
            buffer: BufferId(buffer.id().protocol_id()),
        });
    }
}

pub struct WaylandPeer {
    embed: EmbedParams,
    event_queue: EventQueue<PeerState>,
    qh: QueueHandle<PeerState>,
    state: PeerState,
    registry: Option<WlRegistry>,
    subcompositor: Option<WlSubcompositor>,
    dmabuf: Option<ZwpLinuxDmabufV1>,
    params: HashMap<RequestId, ZwpLinuxBufferParamsV1>,
    surfaces: HashMap<SurfaceId, WlSurface>,
    subsurfaces: HashMap<SubsurfaceId, WlSubsurface>,
    next_request: u32,
}

impl WaylandPeer {
    pub fn new(embed: EmbedParams) -> Self {
        let event_queue = embed.connection.new_event_queue();
        let qh = event_queue.handle();
        Self {
            embed,
            event_queue,
            qh,
            state: PeerState::default(),
            registry: None,
            subcompositor: None,
            dmabuf: None,
            params: HashMap::new(),
            surfaces: HashMap::new(),
            subsurfaces: HashMap::new(),
            next_request: 0,
        }
    }

    /// Buffers the compositor created and we have not destroyed yet.
    pub fn live_buffers(&self) -> usize {
        self.state.buffers.len()
    }
}

impl Peer for WaylandPeer {
    fn listen_registry(&mut self) {
        // wl_registry has no destructor, so one per peer is reused
        if self.registry.is_some() {
            self.state.replay_globals();
            return;
        }
        let registry = self.embed.connection.display().get_registry(&self.qh, ());
        self.registry = Some(registry);
    }

    fn bind(&mut self, capability: Capability, name: u32, version: u32) {
        let Some(registry) = self.registry.as_ref() else {
            warn!(?capability, "bind before the registry was requested");
            return;
        };
        match capability {
            Capability::Subcompositor => {
                let bound = registry.bind(name, version, &self.qh, ());
                if let Some(previous) = self.subcompositor.replace(bound) {
                    info!(?capability, "rebinding, destroying previous object");
                    previous.destroy();
                }
            }
            Capability::Dmabuf => {
                let bound = registry.bind(name, version, &self.qh, ());
                if let Some(previous) = self.dmabuf.replace(bound) {
                    info!(?capability, "rebinding, destroying previous object");
                    previous.destroy();
                }
            }
        }
    }

    fn unbind(&mut self, capability: Capability) {
        match capability {
            Capability::Subcompositor => {
                if let Some(subcompositor) = self.subcompositor.take() {
                    subcompositor.destroy();
                }
            }
            Capability::Dmabuf => {
                if let Some(dmabuf) = self.dmabuf.take() {
                    dmabuf.destroy();
                }
            }
        }
    }

    fn create_params(&mut self) -> Result<RequestId, OverlayError> {
        let dmabuf = self
            .dmabuf
            .as_ref()
            .ok_or(OverlayError::CapabilityMissing(Capability::Dmabuf.interface()))?;

        self.next_request = self.next_request.wrapping_add(1);
        let request = RequestId(self.next_request);
        let params = dmabuf.create_params(&self.qh, request);
        self.params.insert(request, params);
        Ok(request)
    }

    fn add_plane(&mut self, request: RequestId, plane: PlaneParams<'_>) {
        let Some(params) = self.params.get(&request) else {
            warn!(?request, "add for unknown buffer parameters");
            return;
        };
        params.add(
            plane.fd,
            plane.plane_idx,
            plane.offset,
            plane.stride,
            plane.modifier_hi,
            plane.modifier_lo,
        );
    }

    fn create_buffer(&mut self, request: RequestId, width: i32, height: i32, format: u32, flags: u32) {
        let Some(params) = self.params.get(&request) else {
            warn!(?request, "create for unknown buffer parameters");
            return;
        };
        params.create(
            width,
            height,
            format,
            zwp_linux_buffer_params_v1::Flags::from_bits_truncate(flags),
        );
    }

    fn destroy_params(&mut self, request: RequestId) {
        if let Some(params) = self.params.remove(&request) {
            params.destroy();
        }
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        match self.state.buffers.remove(&buffer) {
            Some(wl_buffer) => wl_buffer.destroy(),
            None => warn!(?buffer, "destroy for unknown buffer"),
        }
    }

    fn create_surface(&mut self) -> Result<SurfaceId, OverlayError> {
        let surface = self.embed.compositor.create_surface(&self.qh, ());
        if !surface.is_alive() {
            return Err(OverlayError::SurfaceCreation("wl_surface"));
        }
        let id = SurfaceId(surface.id().protocol_id());
        self.surfaces.insert(id, surface);
        Ok(id)
    }

    fn create_subsurface(&mut self, surface: SurfaceId) -> Result<SubsurfaceId, OverlayError> {
        let subcompositor = self.subcompositor.as_ref().ok_or(OverlayError::CapabilityMissing(
            Capability::Subcompositor.interface(),
        ))?;
        let surface = self
            .surfaces
            .get(&surface)
            .ok_or(OverlayError::SurfaceCreation("wl_subsurface"))?;

        let subsurface = subcompositor.get_subsurface(surface, &self.embed.surface, &self.qh, ());
        if !subsurface.is_alive() {
            return Err(OverlayError::SurfaceCreation("wl_subsurface"));
        }
        let id = SubsurfaceId(subsurface.id().protocol_id());
        self.subsurfaces.insert(id, subsurface);
        Ok(id)
    }

    fn place_subsurface(&mut self, subsurface: SubsurfaceId, placement: Placement) {
        let Some(subsurface) = self.subsurfaces.get(&subsurface) else {
            return;
        };
        match placement {
            Placement::Below => subsurface.place_below(&self.embed.surface),
            Placement::Above => subsurface.place_above(&self.embed.surface),
        }
    }

    fn attach(&mut self, surface: SurfaceId, buffer: Option<BufferId>, x: i32, y: i32) {
        let Some(wl_surface) = self.surfaces.get(&surface) else {
            return;
        };
        let wl_buffer = buffer.and_then(|buffer| self.state.buffers.get(&buffer));
        if buffer.is_some() && wl_buffer.is_none() {
            warn!(?buffer, "attaching unknown buffer, clearing instead");
        }
        wl_surface.attach(wl_buffer, x, y);
    }

    fn commit(&mut self, surface: SurfaceId) {
        if let Some(wl_surface) = self.surfaces.get(&surface) {
            wl_surface.commit();
        }
    }

    fn destroy_subsurface(&mut self, subsurface: SubsurfaceId) {
        if let Some(subsurface) = self.subsurfaces.remove(&subsurface) {
            subsurface.destroy();
        }
    }

    fn destroy_surface(&mut self, surface: SurfaceId) {
        if let Some(surface) = self.surfaces.remove(&surface) {
            surface.destroy();
        }
    }

    fn roundtrip(&mut self) -> Result<Vec<PeerEvent>, OverlayError> {
        self.event_queue.roundtrip(&mut self.state)?;
        Ok(std::mem::take(&mut self.state.events))
    }
}

impl Drop for WaylandPeer {
    fn drop(&mut self) {
        // push out destroy requests sent after the last round trip
        if let Err(why) = self.event_queue.flush() {
            debug!(?why, "flush on overlay teardown failed");
        }
    }
}

impl Dispatch<WlRegistry, ()> for PeerState {
    fn event(
        state: &mut Self,
        _registry: &WlRegistry,
        event: wl_registry::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        state.registry_event(event);
    }
}

impl Dispatch<ZwpLinuxDmabufV1, ()> for PeerState {
    fn event(
        state: &mut Self,
        _dmabuf: &ZwpLinuxDmabufV1,
        event: zwp_linux_dmabuf_v1::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        state.dmabuf_event(event);
    }
}

impl Dispatch<ZwpLinuxBufferParamsV1, RequestId> for PeerState {
    fn event(
        state: &mut Self,
        _params: &ZwpLinuxBufferParamsV1,
        event: zwp_linux_buffer_params_v1::Event,
        request: &RequestId,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            zwp_linux_buffer_params_v1::Event::Created { buffer } => {
                state.buffer_created(*request, buffer);
            }
            zwp_linux_buffer_params_v1::Event::Failed => {
                state.events.push(PeerEvent::Failed { request: *request });
            }
            _ => {}
        }
    }

    event_created_child!(PeerState, ZwpLinuxBufferParamsV1, [
        zwp_linux_buffer_params_v1::EVT_CREATED_OPCODE => (WlBuffer, ()),
    ]);
}

impl Dispatch<WlBuffer, ()> for PeerState {
    fn event(
        state: &mut Self,
        buffer: &WlBuffer,
        event: wl_buffer::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let wl_buffer::Event::Release = event {
            state.buffer_released(buffer);
        }
    }
}

delegate_noop!(PeerState: WlSubcompositor);
delegate_noop!(PeerState: WlSubsurface);
delegate_noop!(PeerState: ignore WlSurface);
