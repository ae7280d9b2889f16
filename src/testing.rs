// SPDX-License-Identifier: MPL-2.0

//! In-memory compositor for tests.
//!
//! Records every request in order and answers negotiations according to a
//! queue of scripted verdicts. Events produced by a request are held back
//! until the next round trip, like a real compositor's replies.

use std::collections::{HashSet, VecDeque};
use std::fs::File;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use drmprime_overlay_config::Placement;

use crate::error::OverlayError;
use crate::frame::{DrmFrame, DrmObject, FrameDescriptor, FrameRef, Layer, PlaneRef};
use crate::peer::{
    BufferId, Capability, Peer, PeerEvent, PlaneParams, RequestId, SubsurfaceId, SurfaceId,
};

pub const NV12: u32 = drm_fourcc::DrmFourcc::Nv12 as u32;

/// A fresh fd that is safe to hand around as a fake dma-buf.
pub fn dev_null() -> OwnedFd {
    File::open("/dev/null").unwrap().into()
}

/// A frame with `layers` NV12 layers, all planes on one object.
pub fn nv12_frame(layers: usize) -> FrameRef {
    let layer = Layer::new(NV12)
        .with_plane(0, PlaneRef::new(0, 0, 1920))
        .with_plane(1, PlaneRef::new(0, 1920 * 1088, 1920));
    DrmFrame::new(
        FrameDescriptor {
            objects: vec![DrmObject::new(dev_null(), 1920 * 1088 * 3 / 2, 0)],
            layers: vec![layer; layers],
        },
        None,
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    ListenRegistry,
    Bind {
        capability: Capability,
        version: u32,
    },
    Unbind(Capability),
    CreateParams(RequestId),
    AddPlane {
        request: RequestId,
        fd: RawFd,
        plane_idx: u32,
        offset: u32,
        stride: u32,
        modifier_hi: u32,
        modifier_lo: u32,
    },
    CreateBuffer {
        request: RequestId,
        width: i32,
        height: i32,
        format: u32,
        flags: u32,
    },
    DestroyParams(RequestId),
    DestroyBuffer(BufferId),
    CreateSurface(SurfaceId),
    CreateSubsurface(SubsurfaceId),
    Place(SubsurfaceId, Placement),
    Attach(SurfaceId, Option<BufferId>),
    Commit(SurfaceId),
    DestroySubsurface(SubsurfaceId),
    DestroySurface(SurfaceId),
    Roundtrip,
}

/// How the fake compositor answers the next negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Refuse,
    /// Accept, but only after this many extra round trips.
    Defer(u32),
    /// Never answer.
    Ignore,
}

#[derive(Debug)]
struct Outcome {
    request: RequestId,
    verdict: Verdict,
}

#[derive(Debug)]
pub struct FakePeer {
    pub requests: Vec<Request>,
    pub refuse_subsurface: bool,
    globals: Vec<(u32, String, u32)>,
    formats: Vec<(u32, u64)>,
    verdicts: VecDeque<Verdict>,
    outcomes: Vec<Outcome>,
    queued: Vec<PeerEvent>,
    bound: HashSet<Capability>,
    leaked_globals: usize,
    live_buffers: HashSet<BufferId>,
    next_id: u32,
}

impl Default for FakePeer {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePeer {
    pub fn new() -> Self {
        Self {
            requests: Vec::new(),
            refuse_subsurface: false,
            globals: vec![
                (1, "wl_compositor".into(), 6),
                (2, "wl_subcompositor".into(), 1),
                (3, "zwp_linux_dmabuf_v1".into(), 4),
            ],
            formats: Vec::new(),
            verdicts: VecDeque::new(),
            outcomes: Vec::new(),
            queued: Vec::new(),
            bound: HashSet::new(),
            leaked_globals: 0,
            live_buffers: HashSet::new(),
            next_id: 100,
        }
    }

    pub fn without_global(mut self, interface: &str) -> Self {
        self.globals.retain(|(_, name, _)| name != interface);
        self
    }

    pub fn with_modifier(mut self, format: u32, modifier: u64) -> Self {
        self.formats.push((format, modifier));
        self
    }

    pub fn push_verdict(&mut self, verdict: Verdict) {
        self.verdicts.push_back(verdict);
    }

    /// Queue an event for delivery on the next round trip.
    pub fn queue_event(&mut self, event: PeerEvent) {
        self.queued.push(event);
    }

    pub fn release(&mut self, buffer: BufferId) {
        self.queue_event(PeerEvent::Released { buffer });
    }

    /// Withdraw global `name`; the removal arrives on the next round trip.
    pub fn remove_global(&mut self, name: u32) {
        self.globals.retain(|(global, _, _)| *global != name);
        self.queue_event(PeerEvent::GlobalRemoved { name });
    }

    pub fn is_bound(&self, capability: Capability) -> bool {
        self.bound.contains(&capability)
    }

    /// Binds that replaced a still-bound object of the same capability.
    pub fn leaked_globals(&self) -> usize {
        self.leaked_globals
    }

    pub fn is_live(&self, buffer: BufferId) -> bool {
        self.live_buffers.contains(&buffer)
    }

    pub fn count(&self, pred: impl Fn(&Request) -> bool) -> usize {
        self.requests.iter().filter(|r| pred(r)).count()
    }

    pub fn position(&self, pred: impl Fn(&Request) -> bool) -> Option<usize> {
        self.requests.iter().position(pred)
    }

    /// `(plane_idx, offset, stride)` registered for `request`.
    pub fn planes_added(&self, request: RequestId) -> Vec<(u32, u32, u32)> {
        self.requests
            .iter()
            .filter_map(|r| match r {
                Request::AddPlane {
                    request: id,
                    plane_idx,
                    offset,
                    stride,
                    ..
                } if *id == request => Some((*plane_idx, *offset, *stride)),
                _ => None,
            })
            .collect()
    }

    pub fn requests_created(&self) -> Vec<RequestId> {
        self.requests
            .iter()
            .filter_map(|r| match r {
                Request::CreateParams(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// Buffers attached so far, `None` for clears.
    pub fn attachments(&self) -> Vec<Option<BufferId>> {
        self.requests
            .iter()
            .filter_map(|r| match r {
                Request::Attach(_, buffer) => Some(*buffer),
                _ => None,
            })
            .collect()
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn answer(&mut self, request: RequestId, accept: bool) -> PeerEvent {
        if accept {
            let buffer = BufferId(self.next_id());
            self.live_buffers.insert(buffer);
            PeerEvent::Created { request, buffer }
        } else {
            PeerEvent::Failed { request }
        }
    }
}

impl Peer for FakePeer {
    fn listen_registry(&mut self) {
        self.requests.push(Request::ListenRegistry);
        let globals: Vec<_> = self
            .globals
            .iter()
            .map(|(name, interface, version)| PeerEvent::Global {
                name: *name,
                interface: interface.clone(),
                version: *version,
            })
            .collect();
        self.queued.extend(globals);
    }

    fn bind(&mut self, capability: Capability, _name: u32, version: u32) {
        self.requests.push(Request::Bind {
            capability,
            version,
        });
        if !self.bound.insert(capability) {
            self.leaked_globals += 1;
        }
        match capability {
            Capability::Subcompositor => {}
            Capability::Dmabuf => {
                let formats: Vec<_> = self
                    .formats
                    .iter()
                    .map(|(format, modifier)| PeerEvent::Modifier {
                        format: *format,
                        modifier: *modifier,
                    })
                    .collect();
                self.queued.extend(formats);
            }
        }
    }

    fn unbind(&mut self, capability: Capability) {
        self.requests.push(Request::Unbind(capability));
        self.bound.remove(&capability);
    }

    fn create_params(&mut self) -> Result<RequestId, OverlayError> {
        if !self.is_bound(Capability::Dmabuf) {
            return Err(OverlayError::CapabilityMissing(
                Capability::Dmabuf.interface(),
            ));
        }
        let id = RequestId(self.next_id());
        self.requests.push(Request::CreateParams(id));
        Ok(id)
    }

    fn add_plane(&mut self, request: RequestId, plane: PlaneParams<'_>) {
        self.requests.push(Request::AddPlane {
            request,
            fd: plane.fd.as_raw_fd(),
            plane_idx: plane.plane_idx,
            offset: plane.offset,
            stride: plane.stride,
            modifier_hi: plane.modifier_hi,
            modifier_lo: plane.modifier_lo,
        });
    }

    fn create_buffer(&mut self, request: RequestId, width: i32, height: i32, format: u32, flags: u32) {
        self.requests.push(Request::CreateBuffer {
            request,
            width,
            height,
            format,
            flags,
        });
        let verdict = self.verdicts.pop_front().unwrap_or(Verdict::Accept);
        self.outcomes.push(Outcome { request, verdict });
    }

    fn destroy_params(&mut self, request: RequestId) {
        self.requests.push(Request::DestroyParams(request));
        self.outcomes.retain(|o| o.request != request);
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        self.requests.push(Request::DestroyBuffer(buffer));
        self.live_buffers.remove(&buffer);
    }

    fn create_surface(&mut self) -> Result<SurfaceId, OverlayError> {
        let id = SurfaceId(self.next_id());
        self.requests.push(Request::CreateSurface(id));
        Ok(id)
    }

    fn create_subsurface(&mut self, _surface: SurfaceId) -> Result<SubsurfaceId, OverlayError> {
        if !self.is_bound(Capability::Subcompositor) {
            return Err(OverlayError::CapabilityMissing(
                Capability::Subcompositor.interface(),
            ));
        }
        if self.refuse_subsurface {
            return Err(OverlayError::SurfaceCreation("wl_subsurface"));
        }
        let id = SubsurfaceId(self.next_id());
        self.requests.push(Request::CreateSubsurface(id));
        Ok(id)
    }

    fn place_subsurface(&mut self, subsurface: SubsurfaceId, placement: Placement) {
        self.requests.push(Request::Place(subsurface, placement));
    }

    fn attach(&mut self, surface: SurfaceId, buffer: Option<BufferId>, _x: i32, _y: i32) {
        self.requests.push(Request::Attach(surface, buffer));
    }

    fn commit(&mut self, surface: SurfaceId) {
        self.requests.push(Request::Commit(surface));
    }

    fn destroy_subsurface(&mut self, subsurface: SubsurfaceId) {
        self.requests.push(Request::DestroySubsurface(subsurface));
    }

    fn destroy_surface(&mut self, surface: SurfaceId) {
        self.requests.push(Request::DestroySurface(surface));
    }

    fn roundtrip(&mut self) -> Result<Vec<PeerEvent>, OverlayError> {
        self.requests.push(Request::Roundtrip);
        let mut events = std::mem::take(&mut self.queued);

        let mut waiting = Vec::new();
        for outcome in std::mem::take(&mut self.outcomes) {
            match outcome.verdict {
                Verdict::Accept => events.push(self.answer(outcome.request, true)),
                Verdict::Refuse => events.push(self.answer(outcome.request, false)),
                Verdict::Defer(0) => events.push(self.answer(outcome.request, true)),
                Verdict::Defer(n) => waiting.push(Outcome {
                    request: outcome.request,
                    verdict: Verdict::Defer(n - 1),
                }),
                Verdict::Ignore => waiting.push(outcome),
            }
        }
        self.outcomes = waiting;

        Ok(events)
    }
}
