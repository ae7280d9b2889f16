// SPDX-License-Identifier: MPL-2.0

//! Waits for the compositor to answer a buffer negotiation.
//!
//! The answer to `zwp_linux_buffer_params_v1.create` is asynchronous. We
//! block on round trips until the matching `created` or `failed` shows up,
//! handing every unrelated event to the caller so releases and registry
//! traffic are not lost in the meantime.

use tracing::{debug, warn};

use crate::error::OverlayError;
use crate::peer::{BufferId, Peer, PeerEvent, RequestId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created(BufferId),
    Failed,
}

/// A submitted negotiation whose answer has not been seen yet.
#[derive(Debug)]
#[must_use = "a pending exchange must be resolved with wait_for_outcome"]
pub struct PendingExchange {
    request: RequestId,
    layer: usize,
    outcome: Option<Outcome>,
}

impl PendingExchange {
    pub fn new(request: RequestId, layer: usize) -> Self {
        Self {
            request,
            layer,
            outcome: None,
        }
    }

    pub fn request(&self) -> RequestId {
        self.request
    }

    pub fn layer(&self) -> usize {
        self.layer
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// Record an outcome. Returns `false` if one was already recorded.
    fn resolve(&mut self, outcome: Outcome) -> bool {
        if self.outcome.is_some() {
            return false;
        }
        self.outcome = Some(outcome);
        true
    }
}

/// Round-trip until `pending` has an outcome.
///
/// Returns the created buffer, or `None` if the compositor refused. Events
/// that do not answer `pending` go to `route` in arrival order. The params
/// object is destroyed before returning either way.
///
/// Gives up with [`OverlayError::PeerProtocolViolation`] if the compositor
/// has not answered after `max_roundtrips` round trips.
pub fn wait_for_outcome<P: Peer>(
    peer: &mut P,
    mut pending: PendingExchange,
    max_roundtrips: u32,
    mut route: impl FnMut(&mut P, PeerEvent),
) -> Result<Option<BufferId>, OverlayError> {
    let request = pending.request;
    let max_roundtrips = max_roundtrips.max(1);

    for attempt in 1..=max_roundtrips {
        let events = match peer.roundtrip() {
            Ok(events) => events,
            Err(why) => {
                peer.destroy_params(request);
                return Err(why);
            }
        };

        for event in events {
            match event {
                PeerEvent::Created { request: r, buffer } if r == request => {
                    if !pending.resolve(Outcome::Created(buffer)) {
                        warn!(?request, ?buffer, "second outcome for negotiation, destroying buffer");
                        peer.destroy_buffer(buffer);
                    }
                }
                PeerEvent::Failed { request: r } if r == request => {
                    if !pending.resolve(Outcome::Failed) {
                        warn!(?request, "second outcome for negotiation, ignoring");
                    }
                }
                other => route(peer, other),
            }
        }

        if let Some(outcome) = pending.outcome {
            peer.destroy_params(request);
            debug!(?request, layer = pending.layer, ?outcome, attempt, "negotiation answered");
            return Ok(match outcome {
                Outcome::Created(buffer) => Some(buffer),
                Outcome::Failed => None,
            });
        }
    }

    peer.destroy_params(request);
    Err(OverlayError::PeerProtocolViolation(format!(
        "no answer to buffer negotiation for layer {} after {max_roundtrips} round trips",
        pending.layer
    )))
}
