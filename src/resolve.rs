//! Release selection

use crate::catalog::{Channel, ReleaseRecord};
use crate::error::{InstallerError, Result};

/// Does `record` match `selector` by build, version, major version or year?
pub fn matches(record: &ReleaseRecord, selector: &str) -> bool {
    record.build == selector
        || record.version == selector
        || record.major_version == selector
        || record.year() == selector
}

/// Pick one release from catalog-ordered `records`.
///
/// Without a selector the first (latest) record wins; with one, the first
/// record that [`matches`] it does.
pub fn resolve(
    records: Vec<ReleaseRecord>,
    selector: Option<&str>,
    channel: Channel,
    code: &str,
) -> Result<ReleaseRecord> {
    let found = match selector {
        None => records.into_iter().next(),
        Some(selector) => records.into_iter().find(|r| matches(r, selector)),
    };

    found.ok_or_else(|| InstallerError::ReleaseNotFound {
        channel: channel.to_string(),
        selector: selector.unwrap_or("latest").to_string(),
        code: code.to_string(),
    })
}
