//! Captured state objects, deduplicated by the configuration they capture.
//!
//! Every capture also records a [`MiniState`]: the program and the layout of attribute slots 0
//! and 1, which is all the emulation path needs to reproduce a state object in software.

use std::collections::BTreeMap;

use drawlist_protocol::Topology;
use hashbrown::HashMap;
use tracing::{debug, warn};

use crate::device::{AttribFormat, BaselineDevice, Device, ProgramId, StateId};
use crate::error::DeviceError;
use crate::mesh::TRACKED_ATTRIB_SLOTS;

/// What a state object is captured for.
///
/// `topology` is canonicalised by [`StateRegistry::find_or_create`], so strip and list variants of
/// a family share a key. A slot whose `components` is zero is disabled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateKey {
    pub topology: Topology,
    pub program: ProgramId,
    pub layout: [AttribFormat; TRACKED_ATTRIB_SLOTS],
}

impl StateKey {
    /// Make the device's bound configuration match this key.
    pub fn bind<D: BaselineDevice + ?Sized>(&self, device: &mut D) {
        device.use_program(self.program);
        for (slot, format) in self.layout.iter().enumerate() {
            let slot = slot as u32;
            if format.components != 0 {
                device.set_vertex_attrib_format(slot, *format);
                device.enable_vertex_attrib(slot, true);
            } else {
                device.enable_vertex_attrib(slot, false);
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SlotState {
    pub enabled: bool,
    pub format: AttribFormat,
}

/// Software mirror of a captured state object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MiniState {
    pub mode: Topology,
    pub program: ProgramId,
    pub slots: [SlotState; TRACKED_ATTRIB_SLOTS],
}

impl MiniState {
    /// Read the bound program and the tracked slots back from the device.
    pub fn capture<D: BaselineDevice + ?Sized>(device: &D, mode: Topology) -> Self {
        let mut slots = [SlotState::default(); TRACKED_ATTRIB_SLOTS];
        for (slot, state) in slots.iter_mut().enumerate() {
            let slot = slot as u32;
            *state = SlotState {
                enabled: device.vertex_attrib_enabled(slot),
                format: device.vertex_attrib_format(slot),
            };
        }
        Self {
            mode,
            program: device.current_program(),
            slots,
        }
    }

    /// Re-issue the captured configuration.
    pub fn apply<D: BaselineDevice + ?Sized>(&self, device: &mut D) {
        device.use_program(self.program);
        for (slot, state) in self.slots.iter().enumerate() {
            let slot = slot as u32;
            device.enable_vertex_attrib(slot, state.enabled);
            if state.format.components != 0 {
                device.set_vertex_attrib_format(slot, state.format);
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct StateRegistry {
    by_key: BTreeMap<StateKey, StateId>,
    detached: Vec<StateId>,
    mirrors: HashMap<StateId, MiniState>,
}

impl StateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the state object for `key`, capturing a new one on first use.
    ///
    /// Topologies with no canonical family (fans, loops) yield `Ok(None)` and register nothing.
    pub fn find_or_create<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        key: &StateKey,
    ) -> Result<Option<StateId>, DeviceError> {
        let Some(mode) = key.topology.canonical() else {
            warn!(topology = ?key.topology, "no state object for unsupported topology");
            return Ok(None);
        };
        let key = StateKey {
            topology: mode,
            ..*key
        };
        if let Some(&state) = self.by_key.get(&key) {
            return Ok(Some(state));
        }

        key.bind(device);
        let state = self.capture(device, mode)?;
        debug!(?state, topology = ?mode, program = key.program.0, "captured state object");
        self.by_key.insert(key, state);
        Ok(Some(state))
    }

    /// Capture whatever is bound right now into a state object no key refers to.
    pub fn capture_detached<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        mode: Topology,
    ) -> Result<StateId, DeviceError> {
        let state = self.capture(device, mode)?;
        self.detached.push(state);
        Ok(state)
    }

    fn capture<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        mode: Topology,
    ) -> Result<StateId, DeviceError> {
        let state = device.create_state()?;
        device.capture_state(state, mode)?;
        self.mirrors.insert(state, MiniState::capture(device, mode));
        Ok(state)
    }

    pub fn get(&self, key: &StateKey) -> Option<StateId> {
        let mode = key.topology.canonical()?;
        self.by_key
            .get(&StateKey {
                topology: mode,
                ..*key
            })
            .copied()
    }

    pub fn mirror(&self, state: StateId) -> Option<&MiniState> {
        self.mirrors.get(&state)
    }

    /// Number of live state objects, detached ones included.
    pub fn len(&self) -> usize {
        self.mirrors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mirrors.is_empty()
    }

    /// Release one state object. Returns false if it was not registered here.
    pub fn release<D: Device + ?Sized>(&mut self, device: &mut D, state: StateId) -> bool {
        if self.mirrors.remove(&state).is_none() {
            return false;
        }
        self.by_key.retain(|_, s| *s != state);
        self.detached.retain(|s| *s != state);
        device.delete_state(state);
        true
    }

    pub fn release_all<D: Device + ?Sized>(&mut self, device: &mut D) {
        for state in self.by_key.values().chain(&self.detached) {
            device.delete_state(*state);
        }
        self.by_key.clear();
        self.detached.clear();
        self.mirrors.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::RecordingDevice;

    fn key(topology: Topology) -> StateKey {
        StateKey {
            topology,
            program: ProgramId(5),
            layout: [
                AttribFormat {
                    stride: 24,
                    components: 3,
                    offset: 0,
                },
                AttribFormat {
                    stride: 24,
                    components: 3,
                    offset: 12,
                },
            ],
        }
    }

    #[test]
    fn equal_keys_share_one_state() {
        let mut dev = RecordingDevice::new();
        let mut registry = StateRegistry::new();
        let a = registry
            .find_or_create(&mut dev, &key(Topology::Triangles))
            .unwrap();
        let b = registry
            .find_or_create(&mut dev, &key(Topology::Triangles))
            .unwrap();
        let strip = registry
            .find_or_create(&mut dev, &key(Topology::TriangleStrip))
            .unwrap();
        assert!(a.is_some());
        assert_eq!(a, b);
        assert_eq!(a, strip);
        assert_eq!(registry.len(), 1);
        assert_eq!(dev.live_states(), 1);
    }

    #[test]
    fn unsupported_topologies_register_nothing() {
        let mut dev = RecordingDevice::new();
        let mut registry = StateRegistry::new();
        for topology in [Topology::TriangleFan, Topology::LineLoop] {
            assert_eq!(registry.find_or_create(&mut dev, &key(topology)).unwrap(), None);
            assert_eq!(registry.find_or_create(&mut dev, &key(topology)).unwrap(), None);
        }
        assert!(registry.is_empty());
        assert_eq!(dev.live_states(), 0);
    }

    #[test]
    fn mirror_captures_both_slots_independently() {
        let mut dev = RecordingDevice::new();
        let mut registry = StateRegistry::new();
        let k = key(Topology::Lines);
        let state = registry.find_or_create(&mut dev, &k).unwrap().unwrap();
        let mirror = registry.mirror(state).unwrap();
        assert_eq!(mirror.mode, Topology::Lines);
        assert_eq!(mirror.program, ProgramId(5));
        assert_eq!(mirror.slots[0].format.offset, 0);
        assert_eq!(mirror.slots[1].format.offset, 12);
        assert!(mirror.slots[0].enabled && mirror.slots[1].enabled);
    }

    #[test]
    fn release_all_frees_detached_captures_too() {
        let mut dev = RecordingDevice::new();
        let mut registry = StateRegistry::new();
        registry
            .find_or_create(&mut dev, &key(Topology::Points))
            .unwrap();
        let detached = registry
            .capture_detached(&mut dev, Topology::Triangles)
            .unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.release(&mut dev, detached));
        assert!(!registry.release(&mut dev, detached));

        registry.capture_detached(&mut dev, Topology::Lines).unwrap();
        registry.release_all(&mut dev);
        assert!(registry.is_empty());
        assert_eq!(dev.live_states(), 0);
    }
}
