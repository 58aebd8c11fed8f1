//! Tile content decoding.
//!
//! [`TileContentReader`] turns a tile blob into a [`RenderGraphic`] tree:
//!
//! ```text
//! bytes ──► header ──► feature table ──► scene primitives ──► RenderSystem
//!                                        (yield + cancel       │
//!                                         check per entry)     ▼
//!                                                       Batch(List(...))
//! ```

mod feature;
mod graphic;
mod primitive;
mod reader;

pub use feature::{Feature, FeatureTable, GeometryClass, FEATURE_ENTRY_SIZE};
pub use graphic::{Batch, DefaultRenderSystem, RenderGraphic, RenderSystem};
pub use primitive::{
    read_primitive, ColorInfo, ColorTable, FeatureIndex, Instance, MeshEdges, MeshPrimitive,
    PointStringPrimitive, PolylinePrimitive, Primitive, PrimitiveFlags, PrimitiveKind,
    QParams3d, QPoint3dList, Silhouette, SurfaceType, VertexTable, FEATURE_INDEX_NONE,
    FEATURE_INDEX_PER_VERTEX, MAX_EXPANDED_INDICES, MAX_EXPANDED_VERTICES,
};
pub use reader::{TileContentReader, TileReadResult, TileReadStatus, CURVE_REFINEMENT_MULTIPLIER};
