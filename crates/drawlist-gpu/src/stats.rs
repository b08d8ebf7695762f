use core::ops::AddAssign;

use serde::{Deserialize, Serialize};

/// Counters gathered while recording a token stream. Serializes in field order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderStats {
    pub primitives: u64,
    pub drawcalls: u64,
    /// Attribute-address tokens emitted.
    pub attr_update: u64,
    /// Uniform-address tokens emitted (material and transform changes plus the stream prefix).
    pub uniform_update: u64,
}

impl AddAssign for RenderStats {
    fn add_assign(&mut self, rhs: Self) {
        self.primitives += rhs.primitives;
        self.drawcalls += rhs.drawcalls;
        self.attr_update += rhs.attr_update;
        self.uniform_update += rhs.uniform_update;
    }
}
