//! Decoded graphics and the render-system capability that builds them.
//!
//! The decoder does not talk to a GPU. It hands each decoded [`Primitive`] to a
//! [`RenderSystem`], which may accept it as a graphic or reject it (for example
//! a backend without point-string support). Accepted graphics are grouped into
//! a list and wrapped in a [`Batch`] carrying the tile's feature table.

use std::sync::Arc;

use super::feature::FeatureTable;
use super::primitive::Primitive;
use crate::geometry::Range3d;

/// A decoded graphic tree.
#[derive(Clone, Debug, PartialEq)]
pub enum RenderGraphic {
    Primitive(Primitive),
    List(Vec<RenderGraphic>),
    Batch(Batch),
}

/// Graphics that share one feature table.
#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    pub graphic: Box<RenderGraphic>,
    pub features: Arc<FeatureTable>,
    pub range: Range3d,
}

impl RenderGraphic {
    /// Visits every primitive in the tree, depth first.
    pub fn for_each_primitive(&self, f: &mut dyn FnMut(&Primitive)) {
        match self {
            Self::Primitive(primitive) => f(primitive),
            Self::List(graphics) => {
                for graphic in graphics {
                    graphic.for_each_primitive(f);
                }
            }
            Self::Batch(batch) => batch.graphic.for_each_primitive(f),
        }
    }

    pub fn primitive_count(&self) -> usize {
        let mut count = 0;
        self.for_each_primitive(&mut |_| count += 1);
        count
    }

    /// The outermost batch, if any.
    pub fn as_batch(&self) -> Option<&Batch> {
        match self {
            Self::Batch(batch) => Some(batch),
            _ => None,
        }
    }
}

/// Render capability used by the decoder to turn primitives into graphics.
pub trait RenderSystem: Send + Sync {
    /// Whether instanced primitives can be drawn as-is. When false the decoder
    /// expands instances into plain geometry.
    fn supports_instancing(&self) -> bool {
        true
    }

    /// Builds a graphic for one primitive, or `None` if it cannot be drawn.
    fn create_primitive(&self, primitive: Primitive) -> Option<RenderGraphic> {
        Some(RenderGraphic::Primitive(primitive))
    }

    fn create_graphic_list(&self, graphics: Vec<RenderGraphic>) -> RenderGraphic {
        RenderGraphic::List(graphics)
    }

    fn create_batch(
        &self,
        graphic: RenderGraphic,
        features: Arc<FeatureTable>,
        range: Range3d,
    ) -> RenderGraphic {
        RenderGraphic::Batch(Batch {
            graphic: Box::new(graphic),
            features,
            range,
        })
    }
}

/// Render system that accepts every primitive.
#[derive(Clone, Copy, Debug)]
pub struct DefaultRenderSystem {
    instancing: bool,
}

impl DefaultRenderSystem {
    pub fn new() -> Self {
        Self { instancing: true }
    }

    pub fn without_instancing() -> Self {
        Self { instancing: false }
    }
}

impl Default for DefaultRenderSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderSystem for DefaultRenderSystem {
    fn supports_instancing(&self) -> bool {
        self.instancing
    }
}
