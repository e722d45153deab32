/// Identity field naming convention. A registered type must declare a field with
/// this exact name; it becomes the primary key column of the derived table.
pub const ID_FIELD: &str = "id";

/// Suffix appended to a relation field's name to form its foreign key column.
pub const RELATION_SUFFIX: &str = "_id";

/// Name of the self-mapped table holding schema version records.
pub const META_TABLE: &str = "schema_meta";
