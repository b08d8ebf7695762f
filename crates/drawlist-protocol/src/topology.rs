/// Primitive topology.
///
/// Discriminants match the GL primitive enumerants so the raw `mode` field of instanced draw
/// tokens can be compared against a bound topology directly.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Topology {
    Points = 0x0,
    Lines = 0x1,
    LineLoop = 0x2,
    LineStrip = 0x3,
    Triangles = 0x4,
    TriangleStrip = 0x5,
    TriangleFan = 0x6,
    Quads = 0x7,
    QuadStrip = 0x8,
    LinesAdjacency = 0xA,
    LineStripAdjacency = 0xB,
    TrianglesAdjacency = 0xC,
    TriangleStripAdjacency = 0xD,
}

impl Topology {
    pub const ALL: [Topology; 13] = [
        Self::Points,
        Self::Lines,
        Self::LineLoop,
        Self::LineStrip,
        Self::Triangles,
        Self::TriangleStrip,
        Self::TriangleFan,
        Self::Quads,
        Self::QuadStrip,
        Self::LinesAdjacency,
        Self::LineStripAdjacency,
        Self::TrianglesAdjacency,
        Self::TriangleStripAdjacency,
    ];

    pub const fn from_u32(v: u32) -> Option<Self> {
        match v {
            0x0 => Some(Self::Points),
            0x1 => Some(Self::Lines),
            0x2 => Some(Self::LineLoop),
            0x3 => Some(Self::LineStrip),
            0x4 => Some(Self::Triangles),
            0x5 => Some(Self::TriangleStrip),
            0x6 => Some(Self::TriangleFan),
            0x7 => Some(Self::Quads),
            0x8 => Some(Self::QuadStrip),
            0xA => Some(Self::LinesAdjacency),
            0xB => Some(Self::LineStripAdjacency),
            0xC => Some(Self::TrianglesAdjacency),
            0xD => Some(Self::TriangleStripAdjacency),
            _ => None,
        }
    }

    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// Folds strip variants onto their base family.
    ///
    /// Returns `None` for topologies a token stream cannot express (fans and loops); primitive
    /// groups using those are skipped by the compiler.
    pub const fn canonical(self) -> Option<Topology> {
        match self {
            Self::Points => Some(Self::Points),
            Self::Lines | Self::LineStrip => Some(Self::Lines),
            Self::Triangles | Self::TriangleStrip => Some(Self::Triangles),
            Self::Quads | Self::QuadStrip => Some(Self::Quads),
            Self::LinesAdjacency | Self::LineStripAdjacency => Some(Self::LinesAdjacency),
            Self::TrianglesAdjacency | Self::TriangleStripAdjacency => {
                Some(Self::TrianglesAdjacency)
            }
            Self::LineLoop | Self::TriangleFan => None,
        }
    }

    /// Whether draws of this topology use the `*_STRIP` token variants.
    pub const fn is_strip(self) -> bool {
        matches!(
            self,
            Self::LineStrip
                | Self::TriangleStrip
                | Self::QuadStrip
                | Self::LineStripAdjacency
                | Self::TriangleStripAdjacency
        )
    }

    /// Strip variant used when replaying a `*_STRIP` token under this (canonical) mode.
    pub const fn strip_mode(self) -> Topology {
        match self {
            Self::Lines => Self::LineStrip,
            Self::Triangles => Self::TriangleStrip,
            Self::Quads => Self::QuadStrip,
            Self::LinesAdjacency => Self::LineStripAdjacency,
            Self::TrianglesAdjacency => Self::TriangleStripAdjacency,
            other => other,
        }
    }

    /// Loop/fan variant an instanced token may legally carry under this mode.
    pub const fn special_mode(self) -> Topology {
        match self {
            Self::Lines => Self::LineLoop,
            Self::Triangles => Self::TriangleFan,
            other => other,
        }
    }

    /// Primitive count for `vertex_count` vertices, as reported in render stats.
    ///
    /// Points and the topologies without a stats rule report zero.
    pub const fn primitive_count(self, vertex_count: u32) -> u32 {
        match self {
            Self::Lines => vertex_count / 2,
            Self::LineStrip => vertex_count.saturating_sub(1),
            Self::Triangles => vertex_count / 3,
            Self::TriangleStrip => vertex_count.saturating_sub(2),
            Self::Quads => vertex_count / 4,
            Self::QuadStrip => vertex_count.saturating_sub(3),
            _ => 0,
        }
    }
}

/// Index element width referenced by element-address tokens.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum IndexFormat {
    #[default]
    U16,
    U32,
}

impl IndexFormat {
    pub const fn size_bytes(self) -> u32 {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }

    /// Inverse of [`IndexFormat::size_bytes`]; anything other than 4 reads as 16-bit.
    pub const fn from_size_bytes(size: u32) -> Self {
        if size == 4 {
            Self::U32
        } else {
            Self::U16
        }
    }
}
