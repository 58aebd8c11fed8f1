//! Shared fixtures for integration tests.
//!
//! [`MockTransport`] is a scriptable in-memory backend: it serves the same
//! tree metadata for any tree id, serves a default tile for any content id,
//! and can be told to time out, fail, delay, or hold requests until released.
//! Like a real backend, it reports format version 3.x for unversioned (legacy)
//! tree ids and the id's own major version otherwise, unless the template
//! props pin a version.
//!
//! [`GatedCache`] holds cache lookups until released, so a test can cancel a
//! request while its cache lookup is outstanding.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use glam::DVec3;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use tilestream::cache::{BoxFuture, Cache, GcResult, MemoryCacheProvider, ServiceCacheError};
use tilestream::decode::DefaultRenderSystem;
use tilestream::format::{FormatVersion, ImdlFlags, PrimitiveBuilder, TileContentWriter};
use tilestream::geometry::Range3d;
use tilestream::id::{parse_tree_id, Id64, TileContentIdentifier};
use tilestream::transport::{TileProps, TileTransport, TileTreeProps, TransportError};
use tilestream::{TileAdmin, TileAdminConfig, TileSession};

pub const MODEL_ID: Id64 = Id64(0x1c);

/// Version a backend produces for unversioned tree ids.
pub const LEGACY_MAJOR_VERSION: u16 = 3;

// ============================================================================
// Tile fixtures
// ============================================================================

pub fn rectangle_range() -> Range3d {
    Range3d::new(DVec3::new(-2.5, -5.0, 0.0), DVec3::new(2.5, 5.0, 0.0))
}

pub fn rectangle() -> PrimitiveBuilder {
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

/// A single-rectangle tile in `version`.
pub fn rectangle_writer(version: FormatVersion) -> TileContentWriter {
    TileContentWriter::new(version, MODEL_ID)
        .content_range(rectangle_range())
        .element(Id64(0x20))
        .primitive(rectangle())
}

pub fn rectangle_tile(version: FormatVersion) -> Bytes {
    Bytes::from(rectangle_writer(version).finish().unwrap())
}

/// A tile that refines: incomplete content, so children are generated.
pub fn incomplete_tile() -> Bytes {
    Bytes::from(
        rectangle_writer(FormatVersion::CURRENT)
            .flags(ImdlFlags::INCOMPLETE)
            .finish()
            .unwrap(),
    )
}

/// A tile with no geometry and no content range.
pub fn empty_tile() -> Bytes {
    Bytes::from(
        TileContentWriter::new(FormatVersion::CURRENT, MODEL_ID)
            .finish()
            .unwrap(),
    )
}

pub fn tree_props(format_version: Option<u32>) -> TileTreeProps {
    TileTreeProps {
        id: String::new(),
        format_version,
        root_tile: TileProps {
            content_id: String::new(),
            range: Range3d::new(DVec3::new(-8.0, -8.0, -8.0), DVec3::new(8.0, 8.0, 8.0)),
            content_range: None,
            is_leaf: false,
        },
        max_tiles_to_skip: 0,
        is_3d: true,
    }
}

// ============================================================================
// Mock transport
// ============================================================================

#[derive(Clone, Debug)]
struct FailureScript {
    error: TransportError,
    remaining: usize,
}

pub struct MockTransport {
    props: TileTreeProps,
    default_content: Mutex<Bytes>,
    content: Mutex<HashMap<String, Bytes>>,
    content_failures: Mutex<HashMap<String, FailureScript>>,
    all_content_failure: Mutex<Option<FailureScript>>,
    props_failure: Mutex<Option<FailureScript>>,
    content_delay: Mutex<Option<Duration>>,
    gate: Option<Arc<Semaphore>>,
    props_requests: AtomicUsize,
    content_requests: Mutex<Vec<TileContentIdentifier>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTransport {
    pub fn new(props: TileTreeProps) -> Self {
        Self {
            props,
            default_content: Mutex::new(rectangle_tile(FormatVersion::CURRENT)),
            content: Mutex::new(HashMap::new()),
            content_failures: Mutex::new(HashMap::new()),
            all_content_failure: Mutex::new(None),
            props_failure: Mutex::new(None),
            content_delay: Mutex::new(None),
            gate: None,
            props_requests: AtomicUsize::new(0),
            content_requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Content requests wait for a [`release`](Self::release) permit each.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    pub fn release(&self, count: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(count);
        }
    }

    pub fn set_default_content(&self, bytes: Bytes) {
        *self.default_content.lock() = bytes;
    }

    pub fn set_content(&self, content_id: &str, bytes: Bytes) {
        self.content.lock().insert(content_id.to_string(), bytes);
    }

    pub fn set_content_delay(&self, delay: Duration) {
        *self.content_delay.lock() = Some(delay);
    }

    /// The next `times` requests for `content_id` fail with `error`.
    pub fn fail_content(&self, content_id: &str, error: TransportError, times: usize) {
        self.content_failures.lock().insert(
            content_id.to_string(),
            FailureScript {
                error,
                remaining: times,
            },
        );
    }

    /// The next `times` content requests, whatever the tile, fail with `error`.
    pub fn fail_all_content(&self, error: TransportError, times: usize) {
        *self.all_content_failure.lock() = Some(FailureScript {
            error,
            remaining: times,
        });
    }

    pub fn fail_props(&self, error: TransportError, times: usize) {
        *self.props_failure.lock() = Some(FailureScript {
            error,
            remaining: times,
        });
    }

    pub fn props_request_count(&self) -> usize {
        self.props_requests.load(Ordering::SeqCst)
    }

    pub fn content_request_count(&self) -> usize {
        self.content_requests.lock().len()
    }

    pub fn requested_content_ids(&self) -> Vec<String> {
        self.content_requests
            .lock()
            .iter()
            .map(|id| id.content_id.clone())
            .collect()
    }

    pub fn requests(&self) -> Vec<TileContentIdentifier> {
        self.content_requests.lock().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn take_failure(script: &mut Option<FailureScript>) -> Option<TransportError> {
        let failure = script.as_mut()?;
        if failure.remaining == 0 {
            return None;
        }
        failure.remaining -= 1;
        Some(failure.error.clone())
    }

    fn next_content_failure(&self, content_id: &str) -> Option<TransportError> {
        if let Some(error) = Self::take_failure(&mut self.all_content_failure.lock()) {
            return Some(error);
        }
        let mut failures = self.content_failures.lock();
        let script = failures.get_mut(content_id)?;
        if script.remaining == 0 {
            return None;
        }
        script.remaining -= 1;
        Some(script.error.clone())
    }
}

impl TileTransport for MockTransport {
    fn get_tile_tree_props<'a>(
        &'a self,
        tree_id: &'a str,
    ) -> BoxFuture<'a, Result<TileTreeProps, TransportError>> {
        Box::pin(async move {
            self.props_requests.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if let Some(error) = Self::take_failure(&mut self.props_failure.lock()) {
                return Err(error);
            }
            let mut props = self.props.clone();
            props.id = tree_id.to_string();
            if props.format_version.is_none() {
                let major = parse_tree_id(tree_id)
                    .ok()
                    .and_then(|parsed| parsed.major_version)
                    .unwrap_or(LEGACY_MAJOR_VERSION);
                props.format_version = Some(u32::from(major) << 16);
            }
            Ok(props)
        })
    }

    fn request_tile_content<'a>(
        &'a self,
        id: &'a TileContentIdentifier,
    ) -> BoxFuture<'a, Result<Bytes, TransportError>> {
        Box::pin(async move {
            self.content_requests.lock().push(id.clone());
            let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

            if let Some(gate) = &self.gate {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }
            let delay = *self.content_delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let result = match self.next_content_failure(&id.content_id) {
                Some(error) => Err(error),
                None => Ok(self
                    .content
                    .lock()
                    .get(&id.content_id)
                    .cloned()
                    .unwrap_or_else(|| self.default_content.lock().clone())),
            };
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        })
    }
}

// ============================================================================
// Gated cache
// ============================================================================

/// In-memory cache whose lookups wait for a [`release`](Self::release) permit.
pub struct GatedCache {
    inner: MemoryCacheProvider,
    gate: Semaphore,
    lookups: AtomicUsize,
}

impl GatedCache {
    pub fn new() -> Self {
        Self {
            inner: MemoryCacheProvider::new(64 * 1024 * 1024, None),
            gate: Semaphore::new(0),
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn release(&self, count: usize) {
        self.gate.add_permits(count);
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Waits until `count` lookups have started.
    pub async fn wait_for_lookups(&self, count: usize) {
        while self.lookup_count() < count {
            tokio::task::yield_now().await;
        }
    }
}

impl Cache for GatedCache {
    fn set(&self, key: &str, value: Bytes) -> BoxFuture<'_, Result<(), ServiceCacheError>> {
        self.inner.set(key, value)
    }

    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<Bytes>, ServiceCacheError>> {
        let key = key.to_string();
        Box::pin(async move {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
            self.inner.get(&key).await
        })
    }

    fn delete(&self, key: &str) -> BoxFuture<'_, Result<bool, ServiceCacheError>> {
        self.inner.delete(key)
    }

    fn contains(&self, key: &str) -> BoxFuture<'_, Result<bool, ServiceCacheError>> {
        self.inner.contains(key)
    }

    fn size_bytes(&self) -> u64 {
        self.inner.size_bytes()
    }

    fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    fn max_size_bytes(&self) -> u64 {
        self.inner.max_size_bytes()
    }

    fn gc(&self) -> BoxFuture<'_, Result<GcResult, ServiceCacheError>> {
        self.inner.gc()
    }
}

// ============================================================================
// Session helpers
// ============================================================================

/// Fast retries so timeout tests don't sleep for seconds.
pub fn test_config() -> TileAdminConfig {
    TileAdminConfig::default().with_retry_policy(tilestream::request::RetryPolicy::fixed(
        3,
        Duration::from_millis(1),
    ))
}

pub fn session(transport: Arc<MockTransport>, config: TileAdminConfig) -> TileSession {
    TileSession::new(
        "test-connection",
        TileAdmin::new(config),
        transport,
        Arc::new(DefaultRenderSystem::new()),
    )
}
