//! Render primitives decoded from the scene section.
//!
//! Each primitive entry on disk is length-prefixed:
//!
//! ```text
//! u32 entry_len | u8 kind | u8 flags | u16 reserved
//! vertex table
//! kind-specific fields + indices
//! [edges] [silhouettes] [instances]   (present when flagged)
//! ... trailing bytes up to entry_len are skipped
//! ```
//!
//! Positions stay quantized against the tile-local range they were written
//! with; nothing here re-centers or transforms them.

use glam::{DVec3, Vec3};

use crate::format::{ByteStream, FormatError};
use crate::geometry::Range3d;

/// Feature index marker: one feature index per vertex follows.
pub const FEATURE_INDEX_PER_VERTEX: u32 = u32::MAX;

/// Feature index marker: the primitive has no feature.
pub const FEATURE_INDEX_NONE: u32 = u32::MAX - 1;

const QUANTIZATION_RANGE: f64 = 65535.0;

/// Primitive kind tag stored in each entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Mesh,
    Polyline,
    PointString,
}

impl PrimitiveKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Mesh),
            1 => Some(Self::Polyline),
            2 => Some(Self::PointString),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Mesh => 0,
            Self::Polyline => 1,
            Self::PointString => 2,
        }
    }
}

/// Per-entry flags gating the optional sections.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PrimitiveFlags(pub u8);

impl PrimitiveFlags {
    pub const HAS_EDGES: PrimitiveFlags = PrimitiveFlags(1 << 0);
    pub const HAS_SILHOUETTES: PrimitiveFlags = PrimitiveFlags(1 << 1);
    pub const PLANAR: PrimitiveFlags = PrimitiveFlags(1 << 2);
    pub const INSTANCED: PrimitiveFlags = PrimitiveFlags(1 << 3);

    pub fn contains(self, other: PrimitiveFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: PrimitiveFlags) {
        self.0 |= other.0;
    }
}

/// Quantization parameters mapping `[0, 65535]` onto a tile-local range.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QParams3d {
    pub low: DVec3,
    pub high: DVec3,
}

impl QParams3d {
    pub fn from_range(range: &Range3d) -> Self {
        if range.is_null() {
            return Self {
                low: DVec3::ZERO,
                high: DVec3::ZERO,
            };
        }
        Self {
            low: range.low,
            high: range.high,
        }
    }

    /// The range covered by these parameters.
    pub fn range(&self) -> Range3d {
        Range3d::new(self.low, self.high)
    }

    pub fn quantize(&self, point: DVec3) -> [u16; 3] {
        let axis = |value: f64, low: f64, high: f64| -> u16 {
            let extent = high - low;
            if extent <= 0.0 {
                return 0;
            }
            ((value - low) / extent * QUANTIZATION_RANGE)
                .round()
                .clamp(0.0, QUANTIZATION_RANGE) as u16
        };
        [
            axis(point.x, self.low.x, self.high.x),
            axis(point.y, self.low.y, self.high.y),
            axis(point.z, self.low.z, self.high.z),
        ]
    }

    pub fn unquantize(&self, q: [u16; 3]) -> DVec3 {
        let t = DVec3::new(q[0] as f64, q[1] as f64, q[2] as f64) / QUANTIZATION_RANGE;
        self.low + (self.high - self.low) * t
    }
}

/// Quantized vertex positions.
#[derive(Clone, Debug, PartialEq)]
pub struct QPoint3dList {
    pub params: QParams3d,
    pub points: Vec<[u16; 3]>,
}

impl QPoint3dList {
    /// Quantizes `points` against their own bounding range.
    pub fn from_points(points: &[DVec3]) -> Self {
        let mut range = Range3d::null();
        for point in points {
            range.extend_point(*point);
        }
        let params = QParams3d::from_range(&range);
        Self {
            params,
            points: points.iter().map(|p| params.quantize(*p)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn unquantize(&self, index: usize) -> Option<DVec3> {
        self.points.get(index).map(|q| self.params.unquantize(*q))
    }

    /// Tight range of the dequantized points.
    pub fn range(&self) -> Range3d {
        let mut range = Range3d::null();
        for q in &self.points {
            range.extend_point(self.params.unquantize(*q));
        }
        range
    }
}

/// Vertex colors: a palette plus optional per-vertex palette indices.
///
/// Colors are packed as `0xAABBGGRR`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ColorTable {
    pub colors: Vec<u32>,
    pub indices: Vec<u16>,
}

/// Summary of a color table used by renderers to pick a pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColorInfo {
    pub uniform: Option<u32>,
    pub has_translucency: bool,
}

impl ColorTable {
    pub fn uniform(color: u32) -> Self {
        Self {
            colors: vec![color],
            indices: Vec::new(),
        }
    }

    pub fn info(&self) -> ColorInfo {
        ColorInfo {
            uniform: if self.colors.len() == 1 {
                Some(self.colors[0])
            } else {
                None
            },
            has_translucency: self.colors.iter().any(|c| (c >> 24) & 0xff != 0xff),
        }
    }
}

/// How vertices map to entries in the feature table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeatureIndex {
    Empty,
    Uniform(u32),
    NonUniform(Vec<u32>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct VertexTable {
    pub positions: QPoint3dList,
    pub colors: ColorTable,
    pub features: FeatureIndex,
}

impl VertexTable {
    pub fn num_vertices(&self) -> usize {
        self.positions.len()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SurfaceType {
    Unlit,
    Lit,
    Textured,
    TexturedLit,
    VolumeClassifier,
}

impl SurfaceType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Unlit),
            1 => Some(Self::Lit),
            2 => Some(Self::Textured),
            3 => Some(Self::TexturedLit),
            4 => Some(Self::VolumeClassifier),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Unlit => 0,
            Self::Lit => 1,
            Self::Textured => 2,
            Self::TexturedLit => 3,
            Self::VolumeClassifier => 4,
        }
    }
}

/// An edge drawn only where the adjacent faces turn away from the viewer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Silhouette {
    pub indices: [u32; 2],
    /// Oct-encoded normals of the two adjacent faces.
    pub normals: [u16; 2],
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshEdges {
    pub visible: Vec<[u32; 2]>,
    pub silhouettes: Vec<Silhouette>,
}

/// One placement of instanced geometry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Instance {
    /// Translation relative to the tile-local origin.
    pub offset: Vec3,
    pub feature_index: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MeshPrimitive {
    pub vertices: VertexTable,
    pub indices: Vec<u32>,
    pub surface: SurfaceType,
    pub is_planar: bool,
    pub edge_width: u16,
    pub edge_line_code: u16,
    pub edges: Option<MeshEdges>,
    pub instances: Option<Vec<Instance>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PolylinePrimitive {
    pub vertices: VertexTable,
    pub indices: Vec<u32>,
    pub line_weight: u16,
    pub line_code: u16,
    pub is_planar: bool,
    pub instances: Option<Vec<Instance>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PointStringPrimitive {
    pub vertices: VertexTable,
    pub indices: Vec<u32>,
    pub point_weight: u16,
    pub instances: Option<Vec<Instance>>,
}

/// A decoded primitive, tagged by kind.
#[derive(Clone, Debug, PartialEq)]
pub enum Primitive {
    Mesh(MeshPrimitive),
    Polyline(PolylinePrimitive),
    PointString(PointStringPrimitive),
}

impl Primitive {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Self::Mesh(_) => PrimitiveKind::Mesh,
            Self::Polyline(_) => PrimitiveKind::Polyline,
            Self::PointString(_) => PrimitiveKind::PointString,
        }
    }

    pub fn vertices(&self) -> &VertexTable {
        match self {
            Self::Mesh(m) => &m.vertices,
            Self::Polyline(p) => &p.vertices,
            Self::PointString(p) => &p.vertices,
        }
    }

    pub fn indices(&self) -> &[u32] {
        match self {
            Self::Mesh(m) => &m.indices,
            Self::Polyline(p) => &p.indices,
            Self::PointString(p) => &p.indices,
        }
    }

    pub fn instances(&self) -> Option<&[Instance]> {
        match self {
            Self::Mesh(m) => m.instances.as_deref(),
            Self::Polyline(p) => p.instances.as_deref(),
            Self::PointString(p) => p.instances.as_deref(),
        }
    }

    pub fn is_instanced(&self) -> bool {
        self.instances().is_some()
    }

    /// Mesh edges, if this is a mesh that carries any.
    pub fn edges(&self) -> Option<&MeshEdges> {
        match self {
            Self::Mesh(m) => m.edges.as_ref(),
            _ => None,
        }
    }

    pub(crate) fn flags(&self) -> PrimitiveFlags {
        let mut flags = PrimitiveFlags::default();
        if let Some(edges) = self.edges() {
            flags.insert(PrimitiveFlags::HAS_EDGES);
            if !edges.silhouettes.is_empty() {
                flags.insert(PrimitiveFlags::HAS_SILHOUETTES);
            }
        }
        let planar = match self {
            Self::Mesh(m) => m.is_planar,
            Self::Polyline(p) => p.is_planar,
            Self::PointString(_) => false,
        };
        if planar {
            flags.insert(PrimitiveFlags::PLANAR);
        }
        if self.is_instanced() {
            flags.insert(PrimitiveFlags::INSTANCED);
        }
        flags
    }

    /// Replaces instanced geometry with one offset copy per instance.
    ///
    /// Used when the render system cannot draw instances. Positions are
    /// requantized against the combined range; per-instance feature indices
    /// become per-vertex indices. Fails with [`FormatError::Overflow`] when the
    /// copies would exceed [`MAX_EXPANDED_VERTICES`] or [`MAX_EXPANDED_INDICES`].
    pub fn expand_instances(self) -> Result<Primitive, FormatError> {
        let Some(copies) = self.instances().map(<[Instance]>::len) else {
            return Ok(self);
        };

        let source = self.vertices();
        let count = source.num_vertices();
        let total_vertices =
            expanded_len("expanded vertices", count, copies, MAX_EXPANDED_VERTICES)?;
        let total_indices =
            expanded_len("expanded indices", self.indices().len(), copies, MAX_EXPANDED_INDICES)?;
        if let Some(edges) = self.edges() {
            let per_copy = 2 * (edges.visible.len() + edges.silhouettes.len());
            expanded_len("expanded edges", per_copy, copies, MAX_EXPANDED_INDICES)?;
        }

        let mut points = Vec::with_capacity(total_vertices);
        let mut color_indices = Vec::with_capacity(source.colors.indices.len() * copies);
        let mut features = Vec::with_capacity(total_vertices);
        let mut indices = Vec::with_capacity(total_indices);

        let instances = self.instances().unwrap_or_default();
        for (n, instance) in instances.iter().enumerate() {
            let offset = instance.offset.as_dvec3();
            points.extend(
                source
                    .positions
                    .points
                    .iter()
                    .map(|q| source.positions.params.unquantize(*q) + offset),
            );
            color_indices.extend_from_slice(&source.colors.indices);
            features.extend(std::iter::repeat(instance.feature_index).take(count));
            let base = copy_base(n, count);
            indices.extend(self.indices().iter().map(|i| i.saturating_add(base)));
        }

        let vertices = VertexTable {
            positions: QPoint3dList::from_points(&points),
            colors: ColorTable {
                colors: source.colors.colors.clone(),
                indices: color_indices,
            },
            features: FeatureIndex::NonUniform(features),
        };

        match self {
            Self::Mesh(m) => {
                let edges = m.edges.map(|edges| replicate_edges(edges, count, copies));
                Ok(Self::Mesh(MeshPrimitive {
                    vertices,
                    indices,
                    edges,
                    instances: None,
                    ..m
                }))
            }
            Self::Polyline(p) => Ok(Self::Polyline(PolylinePrimitive {
                vertices,
                indices,
                instances: None,
                ..p
            })),
            Self::PointString(p) => Ok(Self::PointString(PointStringPrimitive {
                vertices,
                indices,
                instances: None,
                ..p
            })),
        }
    }
}

/// Largest vertex count instance expansion may produce.
pub const MAX_EXPANDED_VERTICES: usize = 1 << 24;

/// Largest index (or edge endpoint) count instance expansion may produce.
pub const MAX_EXPANDED_INDICES: usize = 1 << 26;

fn expanded_len(
    field: &'static str,
    len: usize,
    copies: usize,
    max: usize,
) -> Result<usize, FormatError> {
    match len.checked_mul(copies) {
        Some(total) if total <= max => Ok(total),
        _ => Err(FormatError::Overflow {
            field,
            value: len.saturating_mul(copies),
        }),
    }
}

/// First vertex index of copy `n`. Callers have bounded `n * vertex_count` by
/// [`MAX_EXPANDED_VERTICES`].
fn copy_base(n: usize, vertex_count: usize) -> u32 {
    u32::try_from(n.saturating_mul(vertex_count)).unwrap_or(u32::MAX)
}

fn replicate_edges(edges: MeshEdges, vertex_count: usize, copies: usize) -> MeshEdges {
    let mut out = MeshEdges::default();
    for n in 0..copies {
        let base = copy_base(n, vertex_count);
        out.visible.extend(
            edges
                .visible
                .iter()
                .map(|[a, b]| [a.saturating_add(base), b.saturating_add(base)]),
        );
        out.silhouettes.extend(edges.silhouettes.iter().map(|s| Silhouette {
            indices: [
                s.indices[0].saturating_add(base),
                s.indices[1].saturating_add(base),
            ],
            normals: s.normals,
        }));
    }
    out
}

// =============================================================================
// Parsing
// =============================================================================

/// Reads one length-prefixed primitive entry.
///
/// The stream is left at the end of the entry even when newer writers appended
/// fields this reader does not know.
pub fn read_primitive(stream: &mut ByteStream<'_>) -> Result<Primitive, FormatError> {
    let start = stream.pos();
    let entry_len = stream.read_u32()? as usize;
    if entry_len < 8 || entry_len > stream.len() - start {
        return Err(FormatError::section(
            "primitive",
            format!("entry length {} at offset {}", entry_len, start),
        ));
    }

    let kind_tag = stream.read_u8()?;
    let kind = PrimitiveKind::from_u8(kind_tag)
        .ok_or_else(|| FormatError::section("primitive", format!("unknown kind {}", kind_tag)))?;
    let flags = PrimitiveFlags(stream.read_u8()?);
    stream.advance(2)?;

    let vertices = read_vertex_table(stream)?;
    let count = vertices.num_vertices() as u32;

    let primitive = match kind {
        PrimitiveKind::Mesh => {
            let surface_tag = stream.read_u8()?;
            let surface = SurfaceType::from_u8(surface_tag).ok_or_else(|| {
                FormatError::section("mesh", format!("unknown surface type {}", surface_tag))
            })?;
            stream.advance(1)?;
            let edge_width = stream.read_u16()?;
            let edge_line_code = stream.read_u16()?;
            stream.advance(2)?;
            let indices = read_indices(stream, count)?;

            let mut edges = None;
            if flags.contains(PrimitiveFlags::HAS_EDGES) {
                let visible = read_segments(stream, count)?;
                edges = Some(MeshEdges {
                    visible,
                    silhouettes: Vec::new(),
                });
            }
            if flags.contains(PrimitiveFlags::HAS_SILHOUETTES) {
                let silhouettes = read_silhouettes(stream, count)?;
                edges.get_or_insert_with(MeshEdges::default).silhouettes = silhouettes;
            }

            Primitive::Mesh(MeshPrimitive {
                vertices,
                indices,
                surface,
                is_planar: flags.contains(PrimitiveFlags::PLANAR),
                edge_width,
                edge_line_code,
                edges,
                instances: None,
            })
        }
        PrimitiveKind::Polyline => {
            let line_weight = stream.read_u16()?;
            let line_code = stream.read_u16()?;
            let indices = read_indices(stream, count)?;
            Primitive::Polyline(PolylinePrimitive {
                vertices,
                indices,
                line_weight,
                line_code,
                is_planar: flags.contains(PrimitiveFlags::PLANAR),
                instances: None,
            })
        }
        PrimitiveKind::PointString => {
            let point_weight = stream.read_u16()?;
            stream.advance(2)?;
            let indices = read_indices(stream, count)?;
            Primitive::PointString(PointStringPrimitive {
                vertices,
                indices,
                point_weight,
                instances: None,
            })
        }
    };

    let primitive = if flags.contains(PrimitiveFlags::INSTANCED) {
        let instances = read_instances(stream)?;
        match primitive {
            Primitive::Mesh(m) => Primitive::Mesh(MeshPrimitive {
                instances: Some(instances),
                ..m
            }),
            Primitive::Polyline(p) => Primitive::Polyline(PolylinePrimitive {
                instances: Some(instances),
                ..p
            }),
            Primitive::PointString(p) => Primitive::PointString(PointStringPrimitive {
                instances: Some(instances),
                ..p
            }),
        }
    } else {
        primitive
    };

    let end = start + entry_len;
    if stream.pos() > end {
        return Err(FormatError::section(
            "primitive",
            format!("contents overrun entry length {}", entry_len),
        ));
    }
    stream.set_pos(end)?;
    Ok(primitive)
}

fn read_vertex_table(stream: &mut ByteStream<'_>) -> Result<VertexTable, FormatError> {
    let count = stream.read_u32()? as usize;
    let low = stream.read_dvec3()?;
    let high = stream.read_dvec3()?;
    let params = QParams3d::from_range(&Range3d::new(low, high));

    if count.saturating_mul(6) > stream.remaining() {
        return Err(FormatError::section("vertex table", format!("{} vertices", count)));
    }
    let mut points = Vec::with_capacity(count);
    for _ in 0..count {
        points.push([stream.read_u16()?, stream.read_u16()?, stream.read_u16()?]);
    }

    let num_colors = stream.read_count(4)?;
    let mut colors = Vec::with_capacity(num_colors);
    for _ in 0..num_colors {
        colors.push(stream.read_u32()?);
    }

    let mut color_indices = Vec::new();
    if num_colors > 1 {
        color_indices.reserve(count);
        for _ in 0..count {
            let index = stream.read_u16()?;
            if index as usize >= num_colors {
                return Err(FormatError::section(
                    "vertex table",
                    format!("color index {} exceeds palette of {}", index, num_colors),
                ));
            }
            color_indices.push(index);
        }
    }

    let features = match stream.read_u32()? {
        FEATURE_INDEX_NONE => FeatureIndex::Empty,
        FEATURE_INDEX_PER_VERTEX => {
            let mut indices = Vec::with_capacity(count);
            for _ in 0..count {
                indices.push(stream.read_u32()?);
            }
            FeatureIndex::NonUniform(indices)
        }
        index => FeatureIndex::Uniform(index),
    };

    Ok(VertexTable {
        positions: QPoint3dList { params, points },
        colors: ColorTable {
            colors,
            indices: color_indices,
        },
        features,
    })
}

fn check_index(index: u32, count: u32) -> Result<u32, FormatError> {
    if index < count {
        Ok(index)
    } else {
        Err(FormatError::IndexOutOfRange { index, count })
    }
}

fn read_indices(stream: &mut ByteStream<'_>, vertex_count: u32) -> Result<Vec<u32>, FormatError> {
    let count = stream.read_count(4)?;
    let mut indices = Vec::with_capacity(count);
    for _ in 0..count {
        indices.push(check_index(stream.read_u32()?, vertex_count)?);
    }
    Ok(indices)
}

fn read_segments(
    stream: &mut ByteStream<'_>,
    vertex_count: u32,
) -> Result<Vec<[u32; 2]>, FormatError> {
    let count = stream.read_count(8)?;
    let mut segments = Vec::with_capacity(count);
    for _ in 0..count {
        let a = check_index(stream.read_u32()?, vertex_count)?;
        let b = check_index(stream.read_u32()?, vertex_count)?;
        segments.push([a, b]);
    }
    Ok(segments)
}

fn read_silhouettes(
    stream: &mut ByteStream<'_>,
    vertex_count: u32,
) -> Result<Vec<Silhouette>, FormatError> {
    let count = stream.read_count(12)?;
    let mut silhouettes = Vec::with_capacity(count);
    for _ in 0..count {
        let a = check_index(stream.read_u32()?, vertex_count)?;
        let b = check_index(stream.read_u32()?, vertex_count)?;
        let n0 = stream.read_u16()?;
        let n1 = stream.read_u16()?;
        silhouettes.push(Silhouette {
            indices: [a, b],
            normals: [n0, n1],
        });
    }
    Ok(silhouettes)
}

fn read_instances(stream: &mut ByteStream<'_>) -> Result<Vec<Instance>, FormatError> {
    let count = stream.read_count(16)?;
    let mut instances = Vec::with_capacity(count);
    for _ in 0..count {
        let offset = Vec3::new(stream.read_f32()?, stream.read_f32()?, stream.read_f32()?);
        let feature_index = stream.read_u32()?;
        instances.push(Instance {
            offset,
            feature_index,
        });
    }
    Ok(instances)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::encode_primitive;

    fn triangle() -> Primitive {
        Primitive::Mesh(MeshPrimitive {
            vertices: VertexTable {
                positions: QPoint3dList::from_points(&[
                    DVec3::new(0.0, 0.0, 0.0),
                    DVec3::new(1.0, 0.0, 0.0),
                    DVec3::new(0.0, 1.0, 0.0),
                ]),
                colors: ColorTable::uniform(0xff00_00ff),
                features: FeatureIndex::Uniform(0),
            },
            indices: vec![0, 1, 2],
            surface: SurfaceType::Lit,
            is_planar: true,
            edge_width: 1,
            edge_line_code: 0,
            edges: Some(MeshEdges {
                visible: vec![[0, 1], [1, 2], [2, 0]],
                silhouettes: Vec::new(),
            }),
            instances: None,
        })
    }

    #[test]
    fn test_qparams_corners_are_exact() {
        let range = Range3d::new(DVec3::new(-2.5, -5.0, 0.0), DVec3::new(2.5, 5.0, 0.0));
        let params = QParams3d::from_range(&range);

        assert_eq!(params.quantize(range.low), [0, 0, 0]);
        assert_eq!(params.quantize(range.high), [65535, 65535, 0]);
        assert_eq!(params.unquantize([65535, 65535, 0]), range.high);
    }

    #[test]
    fn test_color_info() {
        let opaque = ColorTable::uniform(0xff12_3456);
        assert_eq!(opaque.info().uniform, Some(0xff12_3456));
        assert!(!opaque.info().has_translucency);

        let mixed = ColorTable {
            colors: vec![0xff00_0000, 0x8000_0000],
            indices: vec![0, 1],
        };
        assert_eq!(mixed.info().uniform, None);
        assert!(mixed.info().has_translucency);
    }

    #[test]
    fn test_read_primitive_with_edges() {
        let mut bytes = Vec::new();
        encode_primitive(&mut bytes, &triangle()).unwrap();

        let mut stream = ByteStream::new(&bytes);
        let parsed = read_primitive(&mut stream).unwrap();

        assert_eq!(parsed, triangle());
        assert!(stream.is_at_end());
    }

    #[test]
    fn test_read_primitive_skips_trailing_fields() {
        let mut bytes = Vec::new();
        encode_primitive(&mut bytes, &triangle()).unwrap();
        let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) + 12;
        bytes[..4].copy_from_slice(&len.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 12]);

        let mut stream = ByteStream::new(&bytes);
        assert!(read_primitive(&mut stream).is_ok());
        assert!(stream.is_at_end());
    }

    #[test]
    fn test_read_primitive_rejects_bad_index() {
        let mut bad = triangle();
        if let Primitive::Mesh(ref mut mesh) = bad {
            mesh.indices = vec![0, 1, 7];
        }
        let mut bytes = Vec::new();
        encode_primitive(&mut bytes, &bad).unwrap();

        let err = read_primitive(&mut ByteStream::new(&bytes)).unwrap_err();
        assert_eq!(err, FormatError::IndexOutOfRange { index: 7, count: 3 });
    }

    #[test]
    fn test_expand_instances() {
        let mut instanced = triangle();
        if let Primitive::Mesh(ref mut mesh) = instanced {
            mesh.instances = Some(vec![
                Instance {
                    offset: Vec3::ZERO,
                    feature_index: 3,
                },
                Instance {
                    offset: Vec3::new(10.0, 0.0, 0.0),
                    feature_index: 4,
                },
            ]);
        }

        let expanded = instanced.expand_instances().unwrap();
        assert!(!expanded.is_instanced());
        assert_eq!(expanded.vertices().num_vertices(), 6);
        assert_eq!(expanded.indices(), &[0, 1, 2, 3, 4, 5]);
        assert_eq!(expanded.edges().map(|e| e.visible.len()), Some(6));
        assert_eq!(
            expanded.vertices().features,
            FeatureIndex::NonUniform(vec![3, 3, 3, 4, 4, 4])
        );

        let range = expanded.vertices().positions.range();
        assert!((range.high.x - 11.0).abs() < 1.0e-3);
    }

    #[test]
    fn test_expand_instances_rejects_oversized_copies() {
        let mut instanced = triangle();
        if let Primitive::Mesh(ref mut mesh) = instanced {
            let copies = MAX_EXPANDED_VERTICES / 3 + 1;
            mesh.instances = Some(vec![
                Instance {
                    offset: Vec3::ZERO,
                    feature_index: 0,
                };
                copies
            ]);
        }

        let err = instanced.expand_instances().unwrap_err();
        assert!(matches!(
            err,
            FormatError::Overflow {
                field: "expanded vertices",
                ..
            }
        ));
    }

    #[test]
    fn test_expanded_len_rejects_wrapping_products() {
        assert_eq!(expanded_len("n", 3, 4, 12).unwrap(), 12);
        assert!(expanded_len("n", 3, 5, 12).is_err());
        assert!(expanded_len("n", usize::MAX, 2, usize::MAX).is_err());
    }
}
