//! Tile content writer.
//!
//! Produces complete tile blobs: header, feature table, scene section and an
//! optional pattern section. Header and tile lengths are patched in when the
//! blob is finished.
//!
//! # Example
//!
//! ```ignore
//! let bytes = TileContentWriter::new(FormatVersion::CURRENT, model_id)
//!     .content_range(range)
//!     .element(element_id)
//!     .primitive(PrimitiveBuilder::mesh(positions, indices).color(0xff0000ff))
//!     .finish()?;
//! ```

use glam::DVec3;

use super::error::FormatError;
use super::header::{push_dvec3, FormatVersion, ImdlFlags, TileFormatHeader};
use crate::decode::{
    ColorTable, Feature, FeatureIndex, FeatureTable, GeometryClass, Instance, MeshEdges,
    MeshPrimitive, PointStringPrimitive, PolylinePrimitive, Primitive, PrimitiveKind,
    QPoint3dList, Silhouette, SurfaceType, VertexTable, FEATURE_INDEX_NONE,
    FEATURE_INDEX_PER_VERTEX,
};
use crate::geometry::Range3d;
use crate::id::{BatchType, Id64};

/// Default opaque white, packed `0xAABBGGRR`.
pub const DEFAULT_COLOR: u32 = 0xffff_ffff;

/// Builds one [`Primitive`] from unquantized positions.
#[derive(Clone, Debug)]
pub struct PrimitiveBuilder {
    kind: PrimitiveKind,
    positions: Vec<DVec3>,
    indices: Vec<u32>,
    colors: ColorTable,
    features: FeatureIndex,
    surface: SurfaceType,
    is_planar: bool,
    weight: u16,
    line_code: u16,
    edges: Option<Vec<[u32; 2]>>,
    silhouettes: Vec<Silhouette>,
    instances: Option<Vec<Instance>>,
}

impl PrimitiveBuilder {
    fn new(kind: PrimitiveKind, positions: Vec<DVec3>, indices: Vec<u32>) -> Self {
        Self {
            kind,
            positions,
            indices,
            colors: ColorTable::uniform(DEFAULT_COLOR),
            features: FeatureIndex::Uniform(0),
            surface: SurfaceType::Lit,
            is_planar: false,
            weight: 1,
            line_code: 0,
            edges: None,
            silhouettes: Vec::new(),
            instances: None,
        }
    }

    /// Triangle mesh; `indices` holds three entries per triangle.
    pub fn mesh(positions: Vec<DVec3>, indices: Vec<u32>) -> Self {
        Self::new(PrimitiveKind::Mesh, positions, indices)
    }

    pub fn polyline(positions: Vec<DVec3>, indices: Vec<u32>) -> Self {
        Self::new(PrimitiveKind::Polyline, positions, indices)
    }

    pub fn point_string(positions: Vec<DVec3>, indices: Vec<u32>) -> Self {
        Self::new(PrimitiveKind::PointString, positions, indices)
    }

    pub fn color(mut self, color: u32) -> Self {
        self.colors = ColorTable::uniform(color);
        self
    }

    pub fn colors(mut self, palette: Vec<u32>, indices: Vec<u16>) -> Self {
        self.colors = ColorTable {
            colors: palette,
            indices,
        };
        self
    }

    pub fn feature_index(mut self, index: u32) -> Self {
        self.features = FeatureIndex::Uniform(index);
        self
    }

    pub fn per_vertex_features(mut self, indices: Vec<u32>) -> Self {
        self.features = FeatureIndex::NonUniform(indices);
        self
    }

    pub fn no_feature(mut self) -> Self {
        self.features = FeatureIndex::Empty;
        self
    }

    pub fn surface(mut self, surface: SurfaceType) -> Self {
        self.surface = surface;
        self
    }

    pub fn planar(mut self, is_planar: bool) -> Self {
        self.is_planar = is_planar;
        self
    }

    /// Line weight for polylines, point size for point strings.
    pub fn weight(mut self, weight: u16) -> Self {
        self.weight = weight;
        self
    }

    pub fn line_code(mut self, line_code: u16) -> Self {
        self.line_code = line_code;
        self
    }

    pub fn edges(mut self, edges: Vec<[u32; 2]>) -> Self {
        self.edges = Some(edges);
        self
    }

    pub fn silhouettes(mut self, silhouettes: Vec<Silhouette>) -> Self {
        self.silhouettes = silhouettes;
        self
    }

    pub fn instances(mut self, instances: Vec<Instance>) -> Self {
        self.instances = Some(instances);
        self
    }

    pub fn build(self) -> Primitive {
        let vertices = VertexTable {
            positions: QPoint3dList::from_points(&self.positions),
            colors: self.colors,
            features: self.features,
        };
        match self.kind {
            PrimitiveKind::Mesh => {
                let edges = if self.edges.is_some() || !self.silhouettes.is_empty() {
                    Some(MeshEdges {
                        visible: self.edges.unwrap_or_default(),
                        silhouettes: self.silhouettes,
                    })
                } else {
                    None
                };
                Primitive::Mesh(MeshPrimitive {
                    vertices,
                    indices: self.indices,
                    surface: self.surface,
                    is_planar: self.is_planar,
                    edge_width: self.weight,
                    edge_line_code: self.line_code,
                    edges,
                    instances: self.instances,
                })
            }
            PrimitiveKind::Polyline => Primitive::Polyline(PolylinePrimitive {
                vertices,
                indices: self.indices,
                line_weight: self.weight,
                line_code: self.line_code,
                is_planar: self.is_planar,
                instances: self.instances,
            }),
            PrimitiveKind::PointString => Primitive::PointString(PointStringPrimitive {
                vertices,
                indices: self.indices,
                point_weight: self.weight,
                instances: self.instances,
            }),
        }
    }
}

/// Assembles a complete tile blob.
#[derive(Clone, Debug)]
pub struct TileContentWriter {
    version: FormatVersion,
    flags: ImdlFlags,
    content_range: Range3d,
    elements_excluded: u32,
    empty_sub_ranges: u32,
    extra_header_bytes: u32,
    features: FeatureTable,
    primitives: Vec<Primitive>,
    patterns: Vec<Primitive>,
}

impl TileContentWriter {
    pub fn new(version: FormatVersion, model_id: Id64) -> Self {
        Self {
            version,
            flags: ImdlFlags::NONE,
            content_range: Range3d::null(),
            elements_excluded: 0,
            empty_sub_ranges: 0,
            extra_header_bytes: 0,
            features: FeatureTable::new(0, model_id, BatchType::Primary),
            primitives: Vec::new(),
            patterns: Vec::new(),
        }
    }

    pub fn content_range(mut self, range: Range3d) -> Self {
        self.content_range = range;
        self
    }

    pub fn flags(mut self, flags: ImdlFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn elements_excluded(mut self, count: u32) -> Self {
        self.elements_excluded = count;
        self
    }

    pub fn empty_sub_ranges(mut self, bits: u32) -> Self {
        self.empty_sub_ranges = bits;
        self
    }

    /// Pads the header with bytes a reader of this version does not know.
    pub fn extra_header_bytes(mut self, count: u32) -> Self {
        self.extra_header_bytes = count;
        self
    }

    /// Adds a primary-class feature for `element_id`.
    pub fn element(self, element_id: Id64) -> Self {
        self.feature(Feature::new(element_id, Id64::INVALID, GeometryClass::Primary))
    }

    pub fn feature(mut self, feature: Feature) -> Self {
        self.features.insert(feature);
        self
    }

    pub fn primitive(mut self, primitive: PrimitiveBuilder) -> Self {
        self.primitives.push(primitive.build());
        self
    }

    /// Adds pattern symbol geometry, usually instanced.
    pub fn pattern(mut self, primitive: PrimitiveBuilder) -> Self {
        self.patterns.push(primitive.build());
        self
    }

    pub fn finish(self) -> Result<Vec<u8>, FormatError> {
        let mut flags = self.flags;
        if !self.patterns.is_empty() {
            flags.insert(ImdlFlags::HAS_PATTERNS);
        }

        let mut header = TileFormatHeader::new(self.version, flags, self.content_range);
        header.header_length += self.extra_header_bytes;
        header.num_elements_included = count_u32("elements", self.distinct_elements())?;
        header.num_elements_excluded = self.elements_excluded;
        header.empty_sub_ranges = self.empty_sub_ranges;

        let mut out = header.encode();
        self.features.encode(&mut out);
        encode_section(&mut out, &self.primitives)?;
        if !self.patterns.is_empty() {
            encode_section(&mut out, &self.patterns)?;
        }

        let tile_length = count_u32("tile length", out.len())?;
        out[16..20].copy_from_slice(&tile_length.to_le_bytes());
        Ok(out)
    }

    fn distinct_elements(&self) -> usize {
        let mut ids: Vec<Id64> = self.features.iter().map(|f| f.element_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }
}

fn count_u32(field: &'static str, value: usize) -> Result<u32, FormatError> {
    u32::try_from(value).map_err(|_| FormatError::Overflow { field, value })
}

fn push_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn push_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn encode_section(out: &mut Vec<u8>, primitives: &[Primitive]) -> Result<(), FormatError> {
    let start = out.len();
    push_u32(out, 0);
    push_u32(out, count_u32("primitives", primitives.len())?);
    for primitive in primitives {
        encode_primitive(out, primitive)?;
    }
    let len = count_u32("section length", out.len() - start)?;
    out[start..start + 4].copy_from_slice(&len.to_le_bytes());
    Ok(())
}

/// Appends one length-prefixed primitive entry.
pub fn encode_primitive(out: &mut Vec<u8>, primitive: &Primitive) -> Result<(), FormatError> {
    let start = out.len();
    push_u32(out, 0);
    out.push(primitive.kind().as_u8());
    out.push(primitive.flags().0);
    push_u16(out, 0);

    encode_vertex_table(out, primitive.vertices())?;

    match primitive {
        Primitive::Mesh(mesh) => {
            out.push(mesh.surface.as_u8());
            out.push(0);
            push_u16(out, mesh.edge_width);
            push_u16(out, mesh.edge_line_code);
            push_u16(out, 0);
            encode_indices(out, &mesh.indices)?;
            if let Some(edges) = &mesh.edges {
                push_u32(out, count_u32("edges", edges.visible.len())?);
                for [a, b] in &edges.visible {
                    push_u32(out, *a);
                    push_u32(out, *b);
                }
                if !edges.silhouettes.is_empty() {
                    push_u32(out, count_u32("silhouettes", edges.silhouettes.len())?);
                    for silhouette in &edges.silhouettes {
                        push_u32(out, silhouette.indices[0]);
                        push_u32(out, silhouette.indices[1]);
                        push_u16(out, silhouette.normals[0]);
                        push_u16(out, silhouette.normals[1]);
                    }
                }
            }
        }
        Primitive::Polyline(polyline) => {
            push_u16(out, polyline.line_weight);
            push_u16(out, polyline.line_code);
            encode_indices(out, &polyline.indices)?;
        }
        Primitive::PointString(points) => {
            push_u16(out, points.point_weight);
            push_u16(out, 0);
            encode_indices(out, &points.indices)?;
        }
    }

    if let Some(instances) = primitive.instances() {
        push_u32(out, count_u32("instances", instances.len())?);
        for instance in instances {
            out.extend_from_slice(&instance.offset.x.to_le_bytes());
            out.extend_from_slice(&instance.offset.y.to_le_bytes());
            out.extend_from_slice(&instance.offset.z.to_le_bytes());
            push_u32(out, instance.feature_index);
        }
    }

    let len = count_u32("primitive length", out.len() - start)?;
    out[start..start + 4].copy_from_slice(&len.to_le_bytes());
    Ok(())
}

fn encode_vertex_table(out: &mut Vec<u8>, vertices: &VertexTable) -> Result<(), FormatError> {
    push_u32(out, count_u32("vertices", vertices.num_vertices())?);
    let range = vertices.positions.params.range();
    push_dvec3(out, range.low);
    push_dvec3(out, range.high);
    for q in &vertices.positions.points {
        for component in q {
            push_u16(out, *component);
        }
    }

    push_u32(out, count_u32("colors", vertices.colors.colors.len())?);
    for color in &vertices.colors.colors {
        push_u32(out, *color);
    }
    if vertices.colors.colors.len() > 1 {
        if vertices.colors.indices.len() != vertices.num_vertices() {
            return Err(FormatError::section(
                "vertex table",
                "color indices must match vertex count",
            ));
        }
        for index in &vertices.colors.indices {
            push_u16(out, *index);
        }
    }

    match &vertices.features {
        FeatureIndex::Empty => push_u32(out, FEATURE_INDEX_NONE),
        FeatureIndex::Uniform(index) => push_u32(out, *index),
        FeatureIndex::NonUniform(indices) => {
            if indices.len() != vertices.num_vertices() {
                return Err(FormatError::section(
                    "vertex table",
                    "feature indices must match vertex count",
                ));
            }
            push_u32(out, FEATURE_INDEX_PER_VERTEX);
            for index in indices {
                push_u32(out, *index);
            }
        }
    }
    Ok(())
}

fn encode_indices(out: &mut Vec<u8>, indices: &[u32]) -> Result<(), FormatError> {
    push_u32(out, count_u32("indices", indices.len())?);
    for index in indices {
        push_u32(out, *index);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::stream::ByteStream;

    #[test]
    fn test_finish_patches_lengths() {
        let bytes = TileContentWriter::new(FormatVersion::new(2, 0), Id64(1))
            .element(Id64(2))
            .element(Id64(3))
            .primitive(PrimitiveBuilder::point_string(vec![DVec3::ZERO], vec![0]))
            .finish()
            .unwrap();

        let header = TileFormatHeader::read(&mut ByteStream::new(&bytes));
        assert!(header.is_valid());
        assert_eq!(header.tile_length as usize, bytes.len());
        assert_eq!(header.num_elements_included, 2);
        assert!(!header.flags.contains(ImdlFlags::HAS_PATTERNS));
    }

    #[test]
    fn test_patterns_set_flag() {
        let bytes = TileContentWriter::new(FormatVersion::CURRENT, Id64(1))
            .pattern(PrimitiveBuilder::point_string(vec![DVec3::ZERO], vec![0]))
            .finish()
            .unwrap();
        let header = TileFormatHeader::read(&mut ByteStream::new(&bytes));
        assert!(header.flags.contains(ImdlFlags::HAS_PATTERNS));
    }

    #[test]
    fn test_extra_header_bytes() {
        let plain = TileContentWriter::new(FormatVersion::new(1, 0), Id64(1))
            .finish()
            .unwrap();
        let padded = TileContentWriter::new(FormatVersion::new(1, 0), Id64(1))
            .extra_header_bytes(8)
            .finish()
            .unwrap();
        assert_eq!(padded.len(), plain.len() + 8);
    }

    #[test]
    fn test_mismatched_feature_indices_fail() {
        let result = TileContentWriter::new(FormatVersion::CURRENT, Id64(1))
            .primitive(
                PrimitiveBuilder::point_string(vec![DVec3::ZERO, DVec3::ONE], vec![0, 1])
                    .per_vertex_features(vec![0]),
            )
            .finish();
        assert!(matches!(result, Err(FormatError::InvalidSection { .. })));
    }
}
