// SPDX-License-Identifier: MPL-2.0

//! DMA-BUF format and modifier bookkeeping for the linux-dmabuf protocol.
//!
//! ```text
//! decoder planes → zwp_linux_buffer_params_v1 → wl_buffer → compositor
//! ```
//!
//! The compositor advertises what it can import through `format` and
//! `modifier` events on `zwp_linux_dmabuf_v1`; those land in a
//! [`FormatTable`] that the rest of the overlay can consult.

use std::fmt;

use drm_fourcc::{DrmFourcc, DrmModifier};

/// DMA-BUF format and modifier information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DmaBufFormat {
    pub fourcc: u32,
    pub modifier: u64,
}

impl DmaBufFormat {
    pub fn new(fourcc: u32, modifier: u64) -> Self {
        Self { fourcc, modifier }
    }

    /// Format advertised without a modifier (protocol version 1 and 2).
    pub fn implicit(fourcc: u32) -> Self {
        Self {
            fourcc,
            modifier: DrmModifier::Invalid.into(),
        }
    }
}

impl fmt::Display for DmaBufFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:?}, {:#018x})",
            fourcc_name(self.fourcc),
            DrmModifier::from(self.modifier),
            self.modifier
        )
    }
}

pub fn split_modifier(modifier: u64) -> (u32, u32) {
    ((modifier >> 32) as u32, (modifier & 0xFFFF_FFFF) as u32)
}

pub fn join_modifier(modifier_hi: u32, modifier_lo: u32) -> u64 {
    (u64::from(modifier_hi) << 32) | u64::from(modifier_lo)
}

/// Human-readable fourcc, e.g. `NV12`, falling back to hex for unknown codes.
pub fn fourcc_name(fourcc: u32) -> String {
    match DrmFourcc::try_from(fourcc) {
        Ok(known) => known.to_string(),
        Err(_) => {
            let bytes = fourcc.to_le_bytes();
            if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
                bytes.iter().map(|b| char::from(*b)).collect()
            } else {
                format!("{fourcc:#010x}")
            }
        }
    }
}

/// Formats the compositor said it can import.
#[derive(Debug, Clone, Default)]
pub struct FormatTable {
    formats: Vec<DmaBufFormat>,
}

impl FormatTable {
    /// Record a `format` event (no modifier information).
    pub fn insert_format(&mut self, fourcc: u32) {
        self.insert(DmaBufFormat::implicit(fourcc));
    }

    /// Record a `modifier` event.
    pub fn insert_modifier(&mut self, fourcc: u32, modifier: u64) {
        self.insert(DmaBufFormat::new(fourcc, modifier));
    }

    fn insert(&mut self, format: DmaBufFormat) {
        if let Err(pos) = self.formats.binary_search(&format) {
            self.formats.insert(pos, format);
        }
    }

    pub fn supports(&self, fourcc: u32) -> bool {
        self.formats.iter().any(|f| f.fourcc == fourcc)
    }

    pub fn modifiers(&self, fourcc: u32) -> impl Iterator<Item = u64> + '_ {
        self.formats
            .iter()
            .filter(move |f| f.fourcc == fourcc)
            .map(|f| f.modifier)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DmaBufFormat> {
        self.formats.iter()
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}
