pub mod memory;
pub mod schema;

pub use memory::MemoryCatalog;
pub use schema::*;

use std::fmt::Debug;
use std::sync::Arc;

/// Source of entity, table and enum metadata used to resolve query paths.
pub trait SchemaCatalog: Debug + Send + Sync {
    /// Resolve an entity type by its query-language name.
    fn resolve_entity(&self, name: &str) -> Option<Arc<EntityType>>;

    /// Resolve a physical table by name. Used for link and collection tables
    /// that have no entity of their own.
    fn resolve_table(&self, name: &str) -> Option<Arc<Table>>;

    /// Resolve an enum constant, e.g. `Status` + `SHIPPED`.
    fn resolve_enum(&self, type_name: &str, constant: &str) -> Option<EnumConstant>;
}
