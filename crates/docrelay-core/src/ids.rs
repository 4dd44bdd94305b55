//! Document id rules.

/// Id of the store's version metadata document. Never relayed.
pub const VERSION_DOC_ID: &str = "obsydian_livesync_version";

/// Whether a document id is content that may be relayed.
///
/// Ids containing `:` belong to chunks and other internal entries.
pub fn is_eligible(id: &str) -> bool {
    id != VERSION_DOC_ID && !id.contains(':')
}

/// Move `id` from under `from_prefix` to under `to_prefix`.
///
/// Returns `None` when `id` does not start with `from_prefix`.
pub fn rehome(id: &str, from_prefix: &str, to_prefix: &str) -> Option<String> {
    id.strip_prefix(from_prefix)
        .map(|rest| format!("{to_prefix}{rest}"))
}
