//! `inspect` command - header fields and content summary of a tile file.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tilestream::decode::{
    DefaultRenderSystem, PrimitiveKind, TileContentReader, TileReadResult, TileReadStatus,
};
use tilestream::format::{ByteStream, TileFormatHeader};

use super::sample::SAMPLE_MODEL_ID;
use crate::error::CliError;

/// What `inspect` reports about one tile.
#[derive(Debug, Default, PartialEq)]
pub struct TileSummary {
    pub meshes: usize,
    pub polylines: usize,
    pub point_strings: usize,
    pub instanced: usize,
    pub features: usize,
    pub rejected: usize,
}

pub fn read_header(bytes: &[u8]) -> Result<TileFormatHeader, CliError> {
    let header = TileFormatHeader::read(&mut ByteStream::new(bytes));
    if !header.is_valid() {
        return Err(CliError::UnreadableTile("invalid header".to_string()));
    }
    Ok(header)
}

pub async fn decode(bytes: Bytes) -> Result<TileReadResult, CliError> {
    let reader = TileContentReader::create(
        bytes,
        SAMPLE_MODEL_ID,
        true,
        Arc::new(DefaultRenderSystem::new()),
    )
    .ok_or_else(|| CliError::UnreadableTile("unsupported format version".to_string()))?;

    let result = reader.read().await;
    if result.status != TileReadStatus::Success {
        return Err(CliError::UnreadableTile(format!("{:?}", result.status)));
    }
    Ok(result)
}

pub fn summarize(result: &TileReadResult) -> TileSummary {
    let mut summary = TileSummary {
        rejected: result.rejected_primitives,
        ..TileSummary::default()
    };
    let Some(graphic) = &result.graphic else {
        return summary;
    };

    if let Some(batch) = graphic.as_batch() {
        summary.features = batch.features.len();
    }
    graphic.for_each_primitive(&mut |primitive| {
        match primitive.kind() {
            PrimitiveKind::Mesh => summary.meshes += 1,
            PrimitiveKind::Polyline => summary.polylines += 1,
            PrimitiveKind::PointString => summary.point_strings += 1,
        }
        if primitive.is_instanced() {
            summary.instanced += 1;
        }
    });
    summary
}

pub fn run(file: &Path) -> Result<(), CliError> {
    let bytes = std::fs::read(file).map_err(|source| CliError::Read {
        path: file.to_path_buf(),
        source,
    })?;
    let header = read_header(&bytes)?;

    println!("Tile: {}", file.display());
    println!("  Version:           {}", header.version);
    println!("  Header length:     {}", header.header_length);
    println!("  Tile length:       {}", header.tile_length);
    println!("  Flags:             {:#06x}", header.flags.bits());
    println!("  Elements included: {}", header.num_elements_included);
    println!("  Elements excluded: {}", header.num_elements_excluded);
    if header.content_range.is_null() {
        println!("  Content range:     (empty)");
    } else {
        let range = &header.content_range;
        println!("  Content range:     {:?} .. {:?}", range.low, range.high);
    }
    println!("  Empty sub-ranges:  {:#010b}", header.empty_sub_ranges);

    let result = super::runtime()?.block_on(decode(Bytes::from(bytes)))?;
    let summary = summarize(&result);

    println!();
    println!("  Leaf:              {}", result.is_leaf);
    if let Some(multiplier) = result.size_multiplier {
        println!("  Size multiplier:   {}", multiplier);
    }
    println!("  Features:          {}", summary.features);
    println!("  Meshes:            {}", summary.meshes);
    println!("  Polylines:         {}", summary.polylines);
    println!("  Point strings:     {}", summary.point_strings);
    println!("  Instanced:         {}", summary.instanced);
    Ok(())
}
