//! Reserved view names. The naming convention is the registry: any view
//! matching [`managed_view_pattern`] is owned by the generator.

use crate::sql::{escape_like, quote::MAX_IDENTIFIER_LEN};

const VIEW_PREFIX: &str = "view_";
const SEPARATOR: &str = "__";
const META_SUFFIX: &str = "__meta";
const LOCK_PREFIX: &str = "entity_views:";

/// `view_<entity kind>__<bundle>`
pub fn view_name(entity_kind: &str, bundle: &str) -> String {
    format!("{}{}{}{}", VIEW_PREFIX, entity_kind, SEPARATOR, bundle)
}

/// `view_<entity kind>__<bundle>__meta`
pub fn meta_view_name(entity_kind: &str, bundle: &str) -> String {
    format!("{}{}", view_name(entity_kind, bundle), META_SUFFIX)
}

/// `LIKE` pattern for `view_<anything>__<anything>`, with the literal
/// underscores escaped.
pub fn managed_view_pattern() -> String {
    format!("{}%{}%", escape_like(VIEW_PREFIX), escape_like(SEPARATOR))
}

/// Advisory lock guarding one view's unit of work. Lock names share the
/// identifier length limit, so long ones are cut; a shared prefix only makes
/// two bundles wait on each other.
pub fn lock_name(view: &str) -> String {
    format!("{}{}", LOCK_PREFIX, view)
        .chars()
        .take(MAX_IDENTIFIER_LEN)
        .collect()
}
