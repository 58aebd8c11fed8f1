//! Asynchronous tile content reader.
//!
//! Decoding runs on the caller's task and yields between primitives so a
//! large tile never monopolizes an executor thread. Cancellation is checked
//! before decoding starts and at every yield point; a canceled read resolves
//! to [`TileReadStatus::Canceled`] with no graphic.
//!
//! # Example
//!
//! ```ignore
//! let reader = TileContentReader::create(bytes, model_id, true, render_system)
//!     .ok_or(...)?
//!     .with_edges(false)
//!     .with_cancellation(token.clone());
//! let result = reader.read().await;
//! ```

use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::feature::FeatureTable;
use super::graphic::{RenderGraphic, RenderSystem};
use super::primitive::{read_primitive, Primitive, SurfaceType};
use crate::format::{ByteStream, FormatError, ImdlFlags, TileFormatHeader};
use crate::geometry::Range3d;
use crate::id::{BatchType, Id64};

/// Size multiplier of the single refinement child of a tile with curves.
pub const CURVE_REFINEMENT_MULTIPLIER: f64 = 2.0;

/// Outcome of decoding one tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TileReadStatus {
    Success,
    InvalidHeader,
    NewerMajorVersion,
    InvalidFeatureTable,
    InvalidScene,
    Canceled,
}

impl TileReadStatus {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Everything a decode produces.
#[derive(Clone, Debug)]
pub struct TileReadResult {
    pub status: TileReadStatus,
    pub is_leaf: bool,
    /// Set when the tile refines into one higher-resolution child.
    pub size_multiplier: Option<f64>,
    pub content_range: Option<Range3d>,
    pub empty_sub_ranges: u32,
    pub graphic: Option<RenderGraphic>,
    /// Primitives the render system declined to build.
    pub rejected_primitives: usize,
}

impl TileReadResult {
    fn with_status(status: TileReadStatus) -> Self {
        Self {
            status,
            is_leaf: true,
            size_multiplier: None,
            content_range: None,
            empty_sub_ranges: 0,
            graphic: None,
            rejected_primitives: 0,
        }
    }

    /// Result for content that [`TileContentReader::create`] refused: a
    /// well-formed header from a newer major version is
    /// [`TileReadStatus::NewerMajorVersion`], anything else is
    /// [`TileReadStatus::InvalidHeader`].
    pub fn rejected(bytes: &[u8]) -> Self {
        let header = TileFormatHeader::read(&mut ByteStream::new(bytes));
        if header.is_valid() && !header.is_readable_version() {
            Self::with_status(TileReadStatus::NewerMajorVersion)
        } else {
            Self::with_status(TileReadStatus::InvalidHeader)
        }
    }
}

enum DecodeError {
    Canceled,
    FeatureTable(FormatError),
    Scene(FormatError),
}

/// Reads one tile blob into graphics.
pub struct TileContentReader {
    bytes: Bytes,
    header: TileFormatHeader,
    model_id: Id64,
    is_3d: bool,
    render_system: Arc<dyn RenderSystem>,
    batch_type: BatchType,
    produce_edges: bool,
    cancel: Option<CancellationToken>,
}

impl TileContentReader {
    /// Validates the header and prepares a reader.
    ///
    /// Returns `None` if the header is malformed or its major version is newer
    /// than this crate reads.
    pub fn create(
        bytes: Bytes,
        model_id: Id64,
        is_3d: bool,
        render_system: Arc<dyn RenderSystem>,
    ) -> Option<Self> {
        let header = TileFormatHeader::read(&mut ByteStream::new(&bytes));
        if !header.is_valid() || !header.is_readable_version() {
            debug!(
                valid = header.is_valid(),
                version = %header.version,
                "Rejecting tile content"
            );
            return None;
        }

        Some(Self {
            bytes,
            header,
            model_id,
            is_3d,
            render_system,
            batch_type: BatchType::Primary,
            produce_edges: true,
            cancel: None,
        })
    }

    pub fn with_batch_type(mut self, batch_type: BatchType) -> Self {
        self.batch_type = batch_type;
        self
    }

    pub fn with_edges(mut self, produce_edges: bool) -> Self {
        self.produce_edges = produce_edges;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn header(&self) -> &TileFormatHeader {
        &self.header
    }

    fn is_canceled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }

    /// Decodes the tile.
    pub async fn read(&self) -> TileReadResult {
        if self.is_canceled() {
            return TileReadResult::with_status(TileReadStatus::Canceled);
        }

        match self.decode().await {
            Ok(result) => result,
            Err(DecodeError::Canceled) => {
                trace!("Tile decode canceled");
                TileReadResult::with_status(TileReadStatus::Canceled)
            }
            Err(DecodeError::FeatureTable(e)) => {
                debug!(error = %e, "Invalid feature table");
                TileReadResult::with_status(TileReadStatus::InvalidFeatureTable)
            }
            Err(DecodeError::Scene(e)) => {
                debug!(error = %e, "Invalid scene");
                TileReadResult::with_status(TileReadStatus::InvalidScene)
            }
        }
    }

    async fn decode(&self) -> Result<TileReadResult, DecodeError> {
        let mut stream = ByteStream::new(&self.bytes);
        stream
            .set_pos(self.header.header_length as usize)
            .map_err(DecodeError::FeatureTable)?;

        let features = FeatureTable::read(&mut stream, self.model_id, self.batch_type)
            .map_err(DecodeError::FeatureTable)?;

        let mut graphics = Vec::new();
        let mut rejected = 0;
        self.read_section(&mut stream, &mut graphics, &mut rejected).await?;
        if self.header.flags.contains(ImdlFlags::HAS_PATTERNS) {
            self.read_section(&mut stream, &mut graphics, &mut rejected).await?;
        }

        let content_range = self.content_range();
        let graphic = match graphics.len() {
            0 => None,
            1 => graphics.pop(),
            _ => Some(self.render_system.create_graphic_list(graphics)),
        }
        .map(|g| {
            self.render_system.create_batch(
                g,
                Arc::new(features),
                content_range.unwrap_or_else(Range3d::null),
            )
        });

        let (is_leaf, size_multiplier) = self.refinement(content_range.is_some());

        Ok(TileReadResult {
            status: TileReadStatus::Success,
            is_leaf,
            size_multiplier,
            content_range,
            empty_sub_ranges: self.header.empty_sub_ranges,
            graphic,
            rejected_primitives: rejected,
        })
    }

    async fn read_section(
        &self,
        stream: &mut ByteStream<'_>,
        graphics: &mut Vec<RenderGraphic>,
        rejected: &mut usize,
    ) -> Result<(), DecodeError> {
        let start = stream.pos();
        let section_len = stream.read_u32().map_err(DecodeError::Scene)? as usize;
        let count = stream.read_u32().map_err(DecodeError::Scene)?;

        for _ in 0..count {
            tokio::task::yield_now().await;
            if self.is_canceled() {
                return Err(DecodeError::Canceled);
            }

            let primitive = read_primitive(stream).map_err(DecodeError::Scene)?;
            let Some(primitive) = self.prepare(primitive).map_err(DecodeError::Scene)? else {
                continue;
            };
            match self.render_system.create_primitive(primitive) {
                Some(graphic) => graphics.push(graphic),
                None => *rejected += 1,
            }
        }

        let end = start + section_len;
        if stream.pos() > end {
            return Err(DecodeError::Scene(FormatError::section(
                "scene",
                format!("contents overrun section length {}", section_len),
            )));
        }
        stream.set_pos(end).map_err(DecodeError::Scene)
    }

    /// Applies batch-type and capability rules to a decoded primitive.
    fn prepare(&self, primitive: Primitive) -> Result<Option<Primitive>, FormatError> {
        let keep_edges = self.produce_edges && !self.batch_type.is_classifier();

        let mut primitive = match primitive {
            Primitive::Mesh(mut mesh) => {
                if !keep_edges {
                    mesh.edges = None;
                }
                if self.batch_type == BatchType::VolumeClassifier {
                    mesh.surface = SurfaceType::VolumeClassifier;
                }
                Primitive::Mesh(mesh)
            }
            other if self.batch_type == BatchType::VolumeClassifier => {
                trace!(kind = ?other.kind(), "Dropping non-mesh primitive from volume classifier");
                return Ok(None);
            }
            other => other,
        };

        if primitive.is_instanced() && !self.render_system.supports_instancing() {
            primitive = primitive.expand_instances()?;
        }
        Ok(Some(primitive))
    }

    fn content_range(&self) -> Option<Range3d> {
        let mut range = self.header.content_range;
        if range.is_null() {
            return None;
        }
        if !self.is_3d {
            range.low.z = 0.0;
            range.high.z = 0.0;
        }
        Some(range)
    }

    fn refinement(&self, has_range: bool) -> (bool, Option<f64>) {
        let flags = self.header.flags;
        let incomplete =
            flags.contains(ImdlFlags::INCOMPLETE) || self.header.num_elements_excluded > 0;

        if !has_range || incomplete {
            return (false, None);
        }
        if flags.contains(ImdlFlags::CONTAINS_CURVES) {
            return (false, Some(CURVE_REFINEMENT_MULTIPLIER));
        }
        (true, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::graphic::DefaultRenderSystem;
    use crate::format::{FormatVersion, PrimitiveBuilder, TileContentWriter};
    use glam::DVec3;

    fn rectangle_range() -> Range3d {
        Range3d::new(DVec3::new(-2.5, -5.0, 0.0), DVec3::new(2.5, 5.0, 0.0))
    }

    fn rectangle() -> PrimitiveBuilder {
        PrimitiveBuilder::mesh(
            vec![
                DVec3::new(-2.5, -5.0, 0.0),
                DVec3::new(2.5, -5.0, 0.0),
                DVec3::new(2.5, 5.0, 0.0),
                DVec3::new(-2.5, 5.0, 0.0),
            ],
            vec![0, 1, 2, 0, 2, 3],
        )
        .edges(vec![[0, 1], [1, 2], [2, 3], [3, 0]])
    }

    fn writer(flags: ImdlFlags) -> TileContentWriter {
        TileContentWriter::new(FormatVersion::CURRENT, Id64(0x1c))
            .content_range(rectangle_range())
            .flags(flags)
            .element(Id64(0x20))
            .primitive(rectangle())
    }

    fn reader(bytes: Vec<u8>) -> TileContentReader {
        TileContentReader::create(
            Bytes::from(bytes),
            Id64(0x1c),
            true,
            Arc::new(DefaultRenderSystem::new()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_read_rectangle() {
        let result = reader(writer(ImdlFlags::NONE).finish().unwrap()).read().await;

        assert_eq!(result.status, TileReadStatus::Success);
        assert!(result.is_leaf);
        assert_eq!(result.size_multiplier, None);
        assert!(result
            .content_range
            .unwrap()
            .is_almost_equal(&rectangle_range(), 5.0e-4));

        let graphic = result.graphic.unwrap();
        let batch = graphic.as_batch().unwrap();
        assert_eq!(batch.features.len(), 1);
        assert_eq!(graphic.primitive_count(), 1);
    }

    #[tokio::test]
    async fn test_curves_refine_to_single_child() {
        let result = reader(writer(ImdlFlags::CONTAINS_CURVES).finish().unwrap())
            .read()
            .await;
        assert!(!result.is_leaf);
        assert_eq!(result.size_multiplier, Some(CURVE_REFINEMENT_MULTIPLIER));
    }

    #[tokio::test]
    async fn test_incomplete_is_not_leaf() {
        let result = reader(writer(ImdlFlags::INCOMPLETE).finish().unwrap()).read().await;
        assert!(!result.is_leaf);
        assert_eq!(result.size_multiplier, None);

        let excluded = writer(ImdlFlags::NONE).elements_excluded(3).finish().unwrap();
        assert!(!reader(excluded).read().await.is_leaf);
    }

    #[tokio::test]
    async fn test_empty_range_is_never_leaf() {
        let bytes = TileContentWriter::new(FormatVersion::CURRENT, Id64(0x1c))
            .finish()
            .unwrap();
        let result = reader(bytes).read().await;
        assert_eq!(result.status, TileReadStatus::Success);
        assert!(!result.is_leaf);
        assert!(result.content_range.is_none());
        assert!(result.graphic.is_none());
    }

    #[tokio::test]
    async fn test_cancel_before_read() {
        let token = CancellationToken::new();
        token.cancel();
        let result = reader(writer(ImdlFlags::NONE).finish().unwrap())
            .with_cancellation(token)
            .read()
            .await;
        assert_eq!(result.status, TileReadStatus::Canceled);
        assert!(result.graphic.is_none());
    }

    #[tokio::test]
    async fn test_edges_can_be_suppressed() {
        let bytes = writer(ImdlFlags::NONE).finish().unwrap();

        let with_edges = reader(bytes.clone()).read().await.graphic.unwrap();
        let mut edges = 0;
        with_edges.for_each_primitive(&mut |p| edges += p.edges().map_or(0, |e| e.visible.len()));
        assert_eq!(edges, 4);

        let without = reader(bytes).with_edges(false).read().await.graphic.unwrap();
        let mut any_edges = false;
        without.for_each_primitive(&mut |p| any_edges |= p.edges().is_some());
        assert!(!any_edges);
    }

    #[tokio::test]
    async fn test_volume_classifier_keeps_only_meshes() {
        let bytes = writer(ImdlFlags::NONE)
            .primitive(PrimitiveBuilder::polyline(
                vec![DVec3::ZERO, DVec3::new(1.0, 0.0, 0.0)],
                vec![0, 1],
            ))
            .finish()
            .unwrap();

        let graphic = reader(bytes)
            .with_batch_type(BatchType::VolumeClassifier)
            .read()
            .await
            .graphic
            .unwrap();

        let mut kinds = Vec::new();
        graphic.for_each_primitive(&mut |p| {
            if let Primitive::Mesh(mesh) = p {
                assert_eq!(mesh.surface, SurfaceType::VolumeClassifier);
                assert!(mesh.edges.is_none());
            }
            kinds.push(p.kind());
        });
        assert_eq!(kinds.len(), 1);
    }

    #[tokio::test]
    async fn test_two_dimensional_range_is_flat() {
        let bytes = TileContentWriter::new(FormatVersion::CURRENT, Id64(0x1c))
            .content_range(Range3d::new(DVec3::splat(-1.0), DVec3::splat(1.0)))
            .primitive(rectangle())
            .finish()
            .unwrap();
        let result = TileContentReader::create(
            Bytes::from(bytes),
            Id64(0x1c),
            false,
            Arc::new(DefaultRenderSystem::new()),
        )
        .unwrap()
        .read()
        .await;

        let range = result.content_range.unwrap();
        assert_eq!(range.low.z, 0.0);
        assert_eq!(range.high.z, 0.0);
    }

    #[test]
    fn test_create_rejects_bad_header() {
        let system: Arc<dyn RenderSystem> = Arc::new(DefaultRenderSystem::new());
        let garbage = Bytes::from_static(b"nope");
        let reader = TileContentReader::create(garbage.clone(), Id64(1), true, system.clone());
        assert!(reader.is_none());
        assert_eq!(TileReadResult::rejected(&garbage).status, TileReadStatus::InvalidHeader);

        let version = FormatVersion::new(crate::format::CURRENT_MAJOR_VERSION + 1, 0);
        let newer = Bytes::from(TileContentWriter::new(version, Id64(1)).finish().unwrap());
        assert!(TileContentReader::create(newer.clone(), Id64(1), true, system).is_none());
        assert_eq!(TileReadResult::rejected(&newer).status, TileReadStatus::NewerMajorVersion);
    }
}
