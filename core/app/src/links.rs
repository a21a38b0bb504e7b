//! Download and share URLs derived from entries.

use filedeck_api::encode_segment;
use filedeck_common::EntryId;

/// URL that opens or downloads a file: `{base}/files/{id}/{name}`.
pub fn open_url(base_url: &str, id: &EntryId, name: &str) -> String {
    format!(
        "{}/files/{}/{}",
        base_url.trim_end_matches('/'),
        encode_segment(id.as_str()),
        encode_segment(name)
    )
}

/// Shareable link to a file: `{base}/files/{id}`.
pub fn share_link(base_url: &str, id: &EntryId) -> String {
    format!(
        "{}/files/{}",
        base_url.trim_end_matches('/'),
        encode_segment(id.as_str())
    )
}
