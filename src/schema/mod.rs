pub mod columns;
pub mod introspector;

pub use columns::{PREFERRED_VALUE_COLUMNS, STRUCTURAL_COLUMNS, select_value_columns};
pub use introspector::SchemaIntrospector;
