use crate::format::CURRENT_MAJOR_VERSION;

/// Negotiates the major tile format version to request.
///
/// The result is the smallest of the configured maximum, the backend's major
/// version (when known, from a packed `major << 16 | minor` format version) and
/// the newest version this crate reads, and is never below 1.
pub fn max_major_version(configured: Option<u16>, backend_format_version: Option<u32>) -> u16 {
    let mut major = configured
        .unwrap_or(CURRENT_MAJOR_VERSION)
        .min(CURRENT_MAJOR_VERSION);
    if let Some(version) = backend_format_version {
        major = major.min((version >> 16) as u16);
    }
    major.max(1)
}
