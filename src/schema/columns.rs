//! Value column selection for satellite tables.

/// Columns that carry an attribute's value, most significant first.
pub const PREFERRED_VALUE_COLUMNS: [&str; 10] = [
    "value",
    "target_id",
    "uri",
    "url",
    "title",
    "entity_id",
    "format",
    "width",
    "height",
    "fid",
];

/// Bookkeeping columns every satellite table has.
pub const STRUCTURAL_COLUMNS: [&str; 6] = [
    "bundle",
    "deleted",
    "entity_id",
    "revision_id",
    "langcode",
    "delta",
];

/// Pick the column(s) whose first non-null value represents the attribute.
///
/// Preferred columns present in `columns` win, in preference order. Without
/// any, every non-structural column is used in table order. An empty result
/// means the attribute has nothing to show.
pub fn select_value_columns(columns: &[String]) -> Vec<String> {
    let preferred: Vec<String> = PREFERRED_VALUE_COLUMNS
        .iter()
        .filter(|p| columns.iter().any(|c| c == *p))
        .map(|p| p.to_string())
        .collect();

    if !preferred.is_empty() {
        return preferred;
    }

    columns
        .iter()
        .filter(|c| !STRUCTURAL_COLUMNS.contains(&c.as_str()))
        .cloned()
        .collect()
}
