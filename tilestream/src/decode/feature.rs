//! Feature table: the elements a tile's geometry belongs to.

use crate::format::{ByteStream, FormatError};
use crate::id::{BatchType, Id64};

/// Size of one packed feature entry on disk.
pub const FEATURE_ENTRY_SIZE: usize = 20;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum GeometryClass {
    #[default]
    Primary,
    Construction,
    Dimension,
    Pattern,
}

impl GeometryClass {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Primary),
            1 => Some(Self::Construction),
            2 => Some(Self::Dimension),
            3 => Some(Self::Pattern),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Primary => 0,
            Self::Construction => 1,
            Self::Dimension => 2,
            Self::Pattern => 3,
        }
    }
}

/// One element / subcategory / geometry class combination.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Feature {
    pub element_id: Id64,
    pub subcategory_id: Id64,
    pub geometry_class: GeometryClass,
}

impl Feature {
    pub fn new(element_id: Id64, subcategory_id: Id64, geometry_class: GeometryClass) -> Self {
        Self {
            element_id,
            subcategory_id,
            geometry_class,
        }
    }
}

/// Features referenced by a tile's primitives, indexed by position.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureTable {
    pub max_features: u32,
    pub model_id: Id64,
    pub batch_type: BatchType,
    features: Vec<Feature>,
}

impl FeatureTable {
    pub fn new(max_features: u32, model_id: Id64, batch_type: BatchType) -> Self {
        Self {
            max_features,
            model_id,
            batch_type,
            features: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// A table with exactly one feature lets renderers skip per-vertex lookup.
    pub fn is_uniform(&self) -> bool {
        self.features.len() == 1
    }

    pub fn get(&self, index: u32) -> Option<&Feature> {
        self.features.get(index as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    /// Index of `feature`, inserting it if absent.
    pub fn insert(&mut self, feature: Feature) -> u32 {
        if let Some(index) = self.features.iter().position(|f| *f == feature) {
            return index as u32;
        }
        self.features.push(feature);
        (self.features.len() - 1) as u32
    }

    /// Reads the feature table section at the stream's position.
    ///
    /// The stream is left at the end of the section.
    pub fn read(
        stream: &mut ByteStream<'_>,
        model_id: Id64,
        batch_type: BatchType,
    ) -> Result<Self, FormatError> {
        let start = stream.pos();
        let section_len = stream.read_u32()? as usize;
        let max_features = stream.read_u32()?;
        let count = stream.read_count(FEATURE_ENTRY_SIZE)?;

        if count > max_features as usize {
            return Err(FormatError::section(
                "feature table",
                format!("{} features exceed maximum {}", count, max_features),
            ));
        }

        let mut table = Self::new(max_features, model_id, batch_type);
        table.features.reserve(count);
        for _ in 0..count {
            let element_id = Id64(stream.read_u64()?);
            let subcategory_id = Id64(stream.read_u64()?);
            let class = stream.read_u8()?;
            stream.advance(3)?;
            let geometry_class = GeometryClass::from_u8(class).ok_or_else(|| {
                FormatError::section("feature table", format!("geometry class {}", class))
            })?;
            table.features.push(Feature::new(element_id, subcategory_id, geometry_class));
        }

        let end = start + section_len;
        if stream.pos() > end {
            return Err(FormatError::section(
                "feature table",
                format!("contents overrun section length {}", section_len),
            ));
        }
        stream.set_pos(end)?;
        Ok(table)
    }

    /// Encodes the table as a length-prefixed section.
    pub fn encode(&self, out: &mut Vec<u8>) {
        let start = out.len();
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&self.max_features.max(self.features.len() as u32).to_le_bytes());
        out.extend_from_slice(&(self.features.len() as u32).to_le_bytes());
        for feature in &self.features {
            out.extend_from_slice(&feature.element_id.0.to_le_bytes());
            out.extend_from_slice(&feature.subcategory_id.0.to_le_bytes());
            out.push(feature.geometry_class.as_u8());
            out.extend_from_slice(&[0u8; 3]);
        }
        let len = (out.len() - start) as u32;
        out[start..start + 4].copy_from_slice(&len.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FeatureTable {
        let mut table = FeatureTable::new(8, Id64(0x1c), BatchType::Primary);
        table.insert(Feature::new(Id64(0x20), Id64(0x30), GeometryClass::Primary));
        table.insert(Feature::new(Id64(0x21), Id64(0x30), GeometryClass::Construction));
        table
    }

    #[test]
    fn test_insert_deduplicates() {
        let mut table = sample();
        let index = table.insert(Feature::new(Id64(0x20), Id64(0x30), GeometryClass::Primary));
        assert_eq!(index, 0);
        assert_eq!(table.len(), 2);
        assert!(!table.is_uniform());
    }

    #[test]
    fn test_read_encoded_table() {
        let table = sample();
        let mut bytes = Vec::new();
        table.encode(&mut bytes);
        bytes.extend_from_slice(&[0xee; 4]);

        let mut stream = ByteStream::new(&bytes);
        let parsed = FeatureTable::read(&mut stream, Id64(0x1c), BatchType::Primary).unwrap();
        assert_eq!(parsed, table);
        assert_eq!(stream.remaining(), 4);
    }

    #[test]
    fn test_count_above_max_is_rejected() {
        let mut bytes = Vec::new();
        sample().encode(&mut bytes);
        bytes[4..8].copy_from_slice(&1u32.to_le_bytes());

        let result =
            FeatureTable::read(&mut ByteStream::new(&bytes), Id64(0x1c), BatchType::Primary);
        assert!(result.is_err());
    }
}
