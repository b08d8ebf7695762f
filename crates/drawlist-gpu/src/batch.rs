//! Batch descriptors: contiguous token ranges sharing one state object and one target surface.
//!
//! Batches are recorded as offsets into one of two token streams (the shared viewport header or
//! the body built by the compiler). Device addresses are resolved only once both streams have been
//! uploaded; nothing here holds a pointer into a buffer that may still grow.

use crate::device::{StateId, SurfaceId};
use crate::error::DrawListError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamSlot {
    Header,
    Body,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchDescriptor {
    pub stream: StreamSlot,
    pub offset: usize,
    pub size: usize,
    pub state: StateId,
    pub surface: SurfaceId,
}

/// The two token streams batches point into.
#[derive(Clone, Copy, Debug)]
pub struct TokenSources<'a> {
    pub header: &'a [u8],
    pub body: &'a [u8],
}

impl<'a> TokenSources<'a> {
    pub fn stream(&self, slot: StreamSlot) -> &'a [u8] {
        match slot {
            StreamSlot::Header => self.header,
            StreamSlot::Body => self.body,
        }
    }

    /// Bytes of `batch`, or `None` if the range does not fit its stream.
    pub fn slice(&self, batch: &BatchDescriptor) -> Option<&'a [u8]> {
        let end = batch.offset.checked_add(batch.size)?;
        self.stream(batch.stream).get(batch.offset..end)
    }
}

/// Ordered batches plus the parallel arrays the device consumes.
#[derive(Clone, Debug, Default)]
pub struct BatchList {
    batches: Vec<BatchDescriptor>,
    addresses: Vec<u64>,
    sizes: Vec<u32>,
    states: Vec<StateId>,
    surfaces: Vec<SurfaceId>,
}

impl BatchList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        stream: StreamSlot,
        offset: usize,
        size: usize,
        state: StateId,
        surface: SurfaceId,
    ) {
        self.batches.push(BatchDescriptor {
            stream,
            offset,
            size,
            state,
            surface,
        });
        self.sizes.push(size as u32);
        self.states.push(state);
        self.surfaces.push(surface);
        // Any earlier resolution no longer covers every batch.
        self.addresses.clear();
    }

    /// Fill in device addresses once both streams are resident.
    pub fn resolve(&mut self, header_address: u64, body_address: u64) {
        self.addresses = self
            .batches
            .iter()
            .map(|b| {
                let base = match b.stream {
                    StreamSlot::Header => header_address,
                    StreamSlot::Body => body_address,
                };
                base + b.offset as u64
            })
            .collect();
    }

    pub fn is_resolved(&self) -> bool {
        self.addresses.len() == self.batches.len()
    }

    /// Retarget every batch.
    pub fn update_surface(&mut self, surface: SurfaceId) {
        for b in &mut self.batches {
            b.surface = surface;
        }
        for s in &mut self.surfaces {
            *s = surface;
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BatchDescriptor> {
        self.batches.iter()
    }

    pub fn get(&self, index: usize) -> Option<&BatchDescriptor> {
        self.batches.get(index)
    }

    pub fn states(&self) -> &[StateId] {
        &self.states
    }

    pub fn surfaces(&self) -> &[SurfaceId] {
        &self.surfaces
    }

    pub fn sizes(&self) -> &[u32] {
        &self.sizes
    }

    /// Parallel arrays for the first `count` batches of an address-indirect submission.
    pub fn device_arrays(
        &self,
        count: usize,
    ) -> Result<(&[u64], &[u32], &[StateId], &[SurfaceId]), DrawListError> {
        if !self.is_resolved() {
            return Err(DrawListError::UnresolvedBatches);
        }
        let n = count.min(self.batches.len());
        Ok((
            &self.addresses[..n],
            &self.sizes[..n],
            &self.states[..n],
            &self.surfaces[..n],
        ))
    }

    /// CPU-side token slices, one per batch, for filling a command list.
    pub fn client_tokens<'a>(
        &self,
        sources: TokenSources<'a>,
    ) -> Result<Vec<&'a [u8]>, DrawListError> {
        self.batches
            .iter()
            .enumerate()
            .map(|(index, b)| {
                sources
                    .slice(b)
                    .ok_or(DrawListError::BatchOutOfRange { index })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list() -> BatchList {
        let mut list = BatchList::new();
        list.push(StreamSlot::Header, 0, 28, StateId(1), SurfaceId(7));
        list.push(StreamSlot::Body, 0, 64, StateId(2), SurfaceId(7));
        list.push(StreamSlot::Body, 64, 32, StateId(3), SurfaceId(7));
        list
    }

    #[test]
    fn resolve_maps_offsets_per_stream() {
        let mut list = list();
        assert!(matches!(
            list.device_arrays(usize::MAX),
            Err(DrawListError::UnresolvedBatches)
        ));
        list.resolve(0x1000, 0x8000);
        let (addresses, sizes, states, _) = list.device_arrays(usize::MAX).unwrap();
        assert_eq!(addresses, &[0x1000, 0x8000, 0x8040]);
        assert_eq!(sizes, &[28, 64, 32]);
        assert_eq!(states, &[StateId(1), StateId(2), StateId(3)]);
    }

    #[test]
    fn device_arrays_cap_the_count() {
        let mut list = list();
        list.resolve(0, 0);
        let (addresses, sizes, states, surfaces) = list.device_arrays(2).unwrap();
        assert_eq!(
            (addresses.len(), sizes.len(), states.len(), surfaces.len()),
            (2, 2, 2, 2)
        );
    }

    #[test]
    fn pushing_after_resolve_unresolves() {
        let mut list = list();
        list.resolve(0, 0);
        list.push(StreamSlot::Body, 96, 4, StateId(3), SurfaceId(7));
        assert!(!list.is_resolved());
    }

    #[test]
    fn update_surface_rewrites_every_batch() {
        let mut list = list();
        list.update_surface(SurfaceId(9));
        assert!(list.iter().all(|b| b.surface == SurfaceId(9)));
        assert_eq!(list.surfaces(), &[SurfaceId(9); 3]);
    }

    #[test]
    fn client_tokens_rejects_out_of_range_batches() {
        let header = [0u8; 28];
        let body = [0u8; 80];
        let sources = TokenSources {
            header: &header,
            body: &body,
        };
        assert!(matches!(
            list().client_tokens(sources),
            Err(DrawListError::BatchOutOfRange { index: 2 })
        ));
    }
}
