// SPDX-License-Identifier: MPL-2.0

//! Keeps source frames alive while the compositor owns their buffers.
//!
//! ```text
//!   negotiate ──► Pending ──created──► Bound ──release──► Released
//!                    │                  holds FrameRef      drops FrameRef,
//!                    └─failed─► (nothing held)              destroys wl_buffer
//! ```
//!
//! Pending lives in the exchange; this module owns Bound. Released is
//! terminal: the entry leaves the map, so a second release for the same
//! buffer finds nothing and is ignored.

use std::collections::HashMap;
use std::time::Instant;

use tracing::{debug, error, warn};

use crate::error::OverlayError;
use crate::frame::FrameRef;
use crate::peer::{BufferId, Peer};

/// A compositor buffer and the frame backing it.
#[derive(Debug)]
pub struct OutstandingBuffer {
    frame: FrameRef,
    bound_at: Instant,
}

impl OutstandingBuffer {
    pub fn frame(&self) -> &FrameRef {
        &self.frame
    }
}

/// Statistics about buffer lifetimes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerStats {
    /// Buffers bound to a frame.
    pub bound: u64,
    /// Buffers released by the compositor.
    pub released: u64,
    /// Buffers retired at teardown without a release.
    pub retired: u64,
    /// Release events for buffers not being tracked.
    pub stray_releases: u64,
}

#[derive(Debug, Default)]
pub struct FrameTracker {
    outstanding: HashMap<BufferId, OutstandingBuffer>,
    stats: TrackerStats,
    #[cfg(test)]
    capacity: Option<usize>,
}

impl FrameTracker {
    /// Make room for one more buffer before a negotiation is submitted, so a
    /// successful outcome can always be recorded.
    pub fn reserve(&mut self) -> Result<(), OverlayError> {
        #[cfg(test)]
        self.check_capacity()?;
        self.outstanding.try_reserve(1)?;
        Ok(())
    }

    /// Fail reservations once `limit` buffers are outstanding.
    #[cfg(test)]
    pub fn limit_capacity(&mut self, limit: usize) {
        self.capacity = Some(limit);
    }

    #[cfg(test)]
    fn check_capacity(&self) -> Result<(), OverlayError> {
        match self.capacity {
            Some(limit) if self.outstanding.len() >= limit => {
                Err(Vec::<u8>::new().try_reserve(usize::MAX).unwrap_err().into())
            }
            _ => Ok(()),
        }
    }

    /// Pending → Bound: take a reference on `frame` for as long as the
    /// compositor owns `buffer`.
    pub fn bind(&mut self, buffer: BufferId, frame: &FrameRef) {
        let entry = OutstandingBuffer {
            frame: FrameRef::clone(frame),
            bound_at: Instant::now(),
        };
        if let Some(previous) = self.outstanding.insert(buffer, entry) {
            // protocol ids are only reused after destruction, which we own
            error!(
                ?buffer,
                age_ms = previous.bound_at.elapsed().as_millis(),
                "compositor reused a live buffer id"
            );
        }
        self.stats.bound += 1;
        debug!(?buffer, outstanding = self.outstanding.len(), "buffer bound");
    }

    /// Bound → Released. Returns `false` if `buffer` was not outstanding.
    pub fn release<P: Peer>(&mut self, peer: &mut P, buffer: BufferId) -> bool {
        let Some(entry) = self.outstanding.remove(&buffer) else {
            self.stats.stray_releases += 1;
            warn!(?buffer, "release for a buffer that is not outstanding");
            return false;
        };

        peer.destroy_buffer(buffer);
        self.stats.released += 1;
        tracing::trace!(
            ?buffer,
            pts_ns = ?entry.frame.pts_ns,
            held_ms = entry.bound_at.elapsed().as_millis(),
            "buffer released"
        );
        true
    }

    /// Destroy every outstanding buffer and drop its frame.
    ///
    /// Only valid once nothing can read the buffers any more, i.e. after
    /// the overlay surface is gone.
    pub fn retire_all<P: Peer>(&mut self, peer: &mut P) -> usize {
        let mut buffers: Vec<_> = self.outstanding.drain().map(|(buffer, _)| buffer).collect();
        buffers.sort_unstable();
        for buffer in &buffers {
            peer.destroy_buffer(*buffer);
        }
        self.stats.retired += buffers.len() as u64;
        buffers.len()
    }

    pub fn get(&self, buffer: BufferId) -> Option<&OutstandingBuffer> {
        self.outstanding.get(&buffer)
    }

    pub fn is_bound(&self, buffer: BufferId) -> bool {
        self.outstanding.contains_key(&buffer)
    }

    pub fn len(&self) -> usize {
        self.outstanding.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outstanding.is_empty()
    }

    pub fn stats(&self) -> TrackerStats {
        self.stats.clone()
    }
}
