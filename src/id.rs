//! Merchant reference generation for orders.
//!
//! Format: `{prefix}_{unix_millis}_{8 hex chars}`. The timestamp keeps
//! references sortable in the PesaPal dashboard; the random suffix keeps two
//! submissions in the same millisecond apart.

use chrono::Utc;
use uuid::Uuid;

/// PesaPal rejects merchant references longer than this.
pub const MAX_REFERENCE_LEN: usize = 50;

/// Generates a new merchant reference for an order.
pub fn gen_order_id(prefix: &str) -> String {
    let suffix = Uuid::new_v4().as_simple().to_string();
    let id = format!("{}_{}_{}", prefix, Utc::now().timestamp_millis(), &suffix[..8]);
    // Trim from the front of the prefix side so the unique tail survives.
    let excess = id.len().saturating_sub(MAX_REFERENCE_LEN);
    match id.char_indices().map(|(i, _)| i).find(|i| *i >= excess) {
        Some(start) if start > 0 => id[start..].to_string(),
        _ => id,
    }
}

/// Validate that a string can be used as a merchant reference.
///
/// PesaPal accepts alphanumerics plus `-`, `_`, `.` and `:`.
pub fn is_valid_reference(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_REFERENCE_LEN
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}
