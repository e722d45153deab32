use crate::common::{Value, ID_FIELD, RELATION_SUFFIX};
use crate::connection::StoreConnection;
use crate::errors::{ErrorKind, FerriteError, FerriteResult};
use crate::mapper::row_mapper::EntityMapper;
use crate::schema::{ColumnDef, ColumnKind, TableSchema};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Trait implemented by every type that maps to a table.
///
/// # Purpose
/// The registration seam of the layer. Instead of runtime reflection, a type
/// declares its persistent fields once through an [EntityFields] collector of
/// typed get/set closures; everything else (schema, mapper, repository) is
/// derived from that declaration.
///
/// # Identity convention
/// A field declared with the literal name `id` becomes the primary key column.
/// Declaring no such field is a registration-time failure, not a runtime one.
///
/// # Usage
/// ```ignore
/// #[derive(Clone, Default)]
/// struct Person {
///     id: i64,
///     name: String,
///     age: i32,
/// }
///
/// impl Entity for Person {
///     fn table_name() -> &'static str {
///         "person"
///     }
///
///     fn fields(fields: &mut EntityFields<Self>) {
///         fields
///             .int64("id", |p| p.id, |p, v| p.id = v)
///             .text("name", |p| p.name.clone(), |p, v| p.name = v)
///             .int32("age", |p| p.age, |p, v| p.age = v);
///     }
/// }
/// ```
pub trait Entity: Default + Clone + Send + Sync + 'static {
    /// The physical table name for this type.
    fn table_name() -> &'static str;

    /// Declares the persistent fields, in order. Declaration order fixes the
    /// column positions for the lifetime of the descriptor.
    fn fields(fields: &mut EntityFields<Self>);
}

pub(crate) type Getter<T> = Box<dyn Fn(&T) -> Value + Send + Sync>;
pub(crate) type Setter<T> = Box<dyn Fn(&mut T, Value) -> FerriteResult<()> + Send + Sync>;
type SaveFn<T> = Box<dyn Fn(&T, &StoreConnection) -> FerriteResult<Option<i64>> + Send + Sync>;
type LoadFn<T> = Box<dyn Fn(&mut T, Option<i64>, &StoreConnection) -> FerriteResult<()> + Send + Sync>;
type RemoveFn = Box<dyn Fn(i64, &StoreConnection) -> FerriteResult<usize> + Send + Sync>;

/// How one column binds to one field of `T`.
pub(crate) enum FieldBinding<T> {
    /// A plain value column with a typed getter and setter.
    Scalar { get: Getter<T>, set: Setter<T> },
    /// A foreign reference to another mapped type, stored as `<field>_id`.
    /// The closures dispatch into the child type's own mapper.
    Relation {
        child_table: &'static str,
        save: SaveFn<T>,
        load: LoadFn<T>,
        remove: RemoveFn,
    },
}

pub(crate) struct FieldAccessor<T> {
    pub(crate) column: String,
    pub(crate) kind: ColumnKind,
    pub(crate) binding: FieldBinding<T>,
    is_identity: bool,
}

/// One outgoing edge of the relation graph, expandable without building the
/// child's full descriptor.
pub(crate) struct RelationEdge {
    pub(crate) table: &'static str,
    pub(crate) expand: fn() -> Vec<RelationEdge>,
}

/// Collects the relation edges a type declares. Used by the registry's cycle
/// check; runs the type's field declaration but keeps only the edges.
pub(crate) fn collect_relation_edges<E: Entity>() -> Vec<RelationEdge> {
    let mut fields = EntityFields::<E>::new();
    E::fields(&mut fields);
    fields.relation_edges
}

/// Collector of a type's persistent field declarations.
///
/// One method per column kind plus [EntityFields::relation]. Fields are
/// recorded in call order; that order becomes the stable column positions.
pub struct EntityFields<T> {
    accessors: Vec<FieldAccessor<T>>,
    relation_edges: Vec<RelationEdge>,
}

impl<T: Entity> EntityFields<T> {
    pub(crate) fn new() -> Self {
        EntityFields {
            accessors: Vec::new(),
            relation_edges: Vec::new(),
        }
    }

    fn scalar(&mut self, name: &str, kind: ColumnKind, get: Getter<T>, set: Setter<T>) -> &mut Self {
        self.accessors.push(FieldAccessor {
            column: name.to_string(),
            kind,
            binding: FieldBinding::Scalar { get, set },
            is_identity: name.eq_ignore_ascii_case(ID_FIELD),
        });
        self
    }

    pub fn int32(
        &mut self,
        name: &str,
        get: impl Fn(&T) -> i32 + Send + Sync + 'static,
        set: impl Fn(&mut T, i32) + Send + Sync + 'static,
    ) -> &mut Self {
        self.scalar(
            name,
            ColumnKind::Int32,
            Box::new(move |t| Value::I32(get(t))),
            Box::new(move |t, v| {
                if let Value::I32(v) = v.coerce(ColumnKind::Int32)? {
                    set(t, v);
                }
                Ok(())
            }),
        )
    }

    pub fn int64(
        &mut self,
        name: &str,
        get: impl Fn(&T) -> i64 + Send + Sync + 'static,
        set: impl Fn(&mut T, i64) + Send + Sync + 'static,
    ) -> &mut Self {
        self.scalar(
            name,
            ColumnKind::Int64,
            Box::new(move |t| Value::I64(get(t))),
            Box::new(move |t, v| {
                if let Value::I64(v) = v.coerce(ColumnKind::Int64)? {
                    set(t, v);
                }
                Ok(())
            }),
        )
    }

    pub fn float32(
        &mut self,
        name: &str,
        get: impl Fn(&T) -> f32 + Send + Sync + 'static,
        set: impl Fn(&mut T, f32) + Send + Sync + 'static,
    ) -> &mut Self {
        self.scalar(
            name,
            ColumnKind::Float32,
            Box::new(move |t| Value::F32(get(t))),
            Box::new(move |t, v| {
                if let Value::F32(v) = v.coerce(ColumnKind::Float32)? {
                    set(t, v);
                }
                Ok(())
            }),
        )
    }

    pub fn float64(
        &mut self,
        name: &str,
        get: impl Fn(&T) -> f64 + Send + Sync + 'static,
        set: impl Fn(&mut T, f64) + Send + Sync + 'static,
    ) -> &mut Self {
        self.scalar(
            name,
            ColumnKind::Float64,
            Box::new(move |t| Value::F64(get(t))),
            Box::new(move |t, v| {
                if let Value::F64(v) = v.coerce(ColumnKind::Float64)? {
                    set(t, v);
                }
                Ok(())
            }),
        )
    }

    pub fn text(
        &mut self,
        name: &str,
        get: impl Fn(&T) -> String + Send + Sync + 'static,
        set: impl Fn(&mut T, String) + Send + Sync + 'static,
    ) -> &mut Self {
        self.scalar(
            name,
            ColumnKind::Text,
            Box::new(move |t| Value::Text(get(t))),
            Box::new(move |t, v| {
                if let Value::Text(v) = v.coerce(ColumnKind::Text)? {
                    set(t, v);
                }
                Ok(())
            }),
        )
    }

    pub fn boolean(
        &mut self,
        name: &str,
        get: impl Fn(&T) -> bool + Send + Sync + 'static,
        set: impl Fn(&mut T, bool) + Send + Sync + 'static,
    ) -> &mut Self {
        self.scalar(
            name,
            ColumnKind::Bool,
            Box::new(move |t| Value::Bool(get(t))),
            Box::new(move |t, v| {
                if let Value::Bool(v) = v.coerce(ColumnKind::Bool)? {
                    set(t, v);
                }
                Ok(())
            }),
        )
    }

    pub fn timestamp(
        &mut self,
        name: &str,
        get: impl Fn(&T) -> DateTime<Utc> + Send + Sync + 'static,
        set: impl Fn(&mut T, DateTime<Utc>) + Send + Sync + 'static,
    ) -> &mut Self {
        self.scalar(
            name,
            ColumnKind::Timestamp,
            Box::new(move |t| Value::from(get(t))),
            Box::new(move |t, v| {
                let coerced = v.coerce(ColumnKind::Timestamp)?;
                if let Some(dt) = coerced.as_datetime() {
                    set(t, dt);
                } else if !coerced.is_null() {
                    return Err(FerriteError::new(
                        "Timestamp value out of range",
                        ErrorKind::InvalidDataType,
                    ));
                }
                Ok(())
            }),
        )
    }

    pub fn blob(
        &mut self,
        name: &str,
        get: impl Fn(&T) -> Vec<u8> + Send + Sync + 'static,
        set: impl Fn(&mut T, Vec<u8>) + Send + Sync + 'static,
    ) -> &mut Self {
        self.scalar(
            name,
            ColumnKind::Blob,
            Box::new(move |t| Value::Blob(get(t))),
            Box::new(move |t, v| {
                if let Value::Blob(v) = v.coerce(ColumnKind::Blob)? {
                    set(t, v);
                }
                Ok(())
            }),
        )
    }

    /// Declares a one-to-one relation to another mapped type.
    ///
    /// The column is named `<name>_id` with kind Int64 and stores the child's
    /// identity. Writes dispatch into the child type's own mapper first, reads
    /// materialize the full child instance, deletes remove the referenced row.
    pub fn relation<C: Entity>(
        &mut self,
        name: &str,
        get: impl Fn(&T) -> Option<C> + Send + Sync + 'static,
        set: impl Fn(&mut T, Option<C>) + Send + Sync + 'static,
    ) -> &mut Self {
        let save: SaveFn<T> = Box::new(move |t, conn| match get(t) {
            Some(mut child) => {
                let mapper = EntityMapper::<C>::new()?;
                let id = mapper.save(&mut child, conn)?;
                Ok(Some(id))
            }
            None => Ok(None),
        });
        let load: LoadFn<T> = Box::new(move |t, id, conn| {
            match id {
                Some(id) => {
                    let mapper = EntityMapper::<C>::new()?;
                    set(t, mapper.fetch(id, conn)?);
                }
                None => set(t, None),
            }
            Ok(())
        });
        let remove: RemoveFn = Box::new(move |id, conn| {
            let mapper = EntityMapper::<C>::new()?;
            mapper.delete(id, conn)
        });
        self.accessors.push(FieldAccessor {
            column: format!("{}{}", name, RELATION_SUFFIX),
            kind: ColumnKind::Int64,
            binding: FieldBinding::Relation {
                child_table: C::table_name(),
                save,
                load,
                remove,
            },
            is_identity: false,
        });
        self.relation_edges.push(RelationEdge {
            table: C::table_name(),
            expand: collect_relation_edges::<C>,
        });
        self
    }
}

/// The built schema descriptor of an entity type: the table schema plus the
/// typed field accessors feeding the row mapper.
///
/// Immutable after construction; clones share the same schema and accessors.
pub struct EntityDescriptor<T> {
    schema: Arc<TableSchema>,
    accessors: Arc<Vec<FieldAccessor<T>>>,
    identity_index: usize,
}

impl<T> std::fmt::Debug for EntityDescriptor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityDescriptor")
            .field("schema", &self.schema)
            .field("identity_index", &self.identity_index)
            .finish()
    }
}

impl<T> Clone for EntityDescriptor<T> {
    fn clone(&self) -> Self {
        EntityDescriptor {
            schema: self.schema.clone(),
            accessors: self.accessors.clone(),
            identity_index: self.identity_index,
        }
    }
}

impl<T: Entity> EntityDescriptor<T> {
    /// Builds the descriptor for `T`.
    ///
    /// Runs the type's field declaration, assigns column positions in
    /// declaration order, and locates the identity field.
    ///
    /// # Errors
    /// - [ErrorKind::NoPrimaryKey] if no field named `id` is declared
    /// - [ErrorKind::UnsupportedFieldType] if the identity field is not an
    ///   integer kind
    pub fn build() -> FerriteResult<EntityDescriptor<T>> {
        let mut fields = EntityFields::new();
        T::fields(&mut fields);
        let mut columns = Vec::with_capacity(fields.accessors.len());
        let mut identity_index = None;
        for (index, accessor) in fields.accessors.iter().enumerate() {
            if accessor.is_identity {
                if !matches!(accessor.kind, ColumnKind::Int32 | ColumnKind::Int64) {
                    return Err(FerriteError::new(
                        &format!(
                            "Identity field of {} must be an integer kind, found {}",
                            T::table_name(),
                            accessor.kind
                        ),
                        ErrorKind::UnsupportedFieldType,
                    ));
                }
                identity_index = Some(index);
                columns.push(ColumnDef::primary(&accessor.column, accessor.kind));
            } else {
                columns.push(ColumnDef::new(&accessor.column, accessor.kind));
            }
        }
        let schema = TableSchema::new(T::table_name(), columns)?;
        let identity_index = identity_index.ok_or_else(|| {
            FerriteError::new(
                &format!("No identity field found for table {}", T::table_name()),
                ErrorKind::NoPrimaryKey,
            )
        })?;
        Ok(EntityDescriptor {
            schema: Arc::new(schema),
            accessors: Arc::new(fields.accessors),
            identity_index,
        })
    }

    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    pub(crate) fn accessors(&self) -> &[FieldAccessor<T>] {
        &self.accessors
    }

    /// Reads the identity of an instance as `i64`. An unsaved instance reports 0.
    pub fn identity_of(&self, instance: &T) -> i64 {
        match &self.accessors[self.identity_index].binding {
            FieldBinding::Scalar { get, .. } => get(instance).as_i64().unwrap_or(0),
            FieldBinding::Relation { .. } => 0,
        }
    }

    /// Assigns a freshly generated identity back onto an instance.
    pub fn assign_identity(&self, instance: &mut T, id: i64) -> FerriteResult<()> {
        match &self.accessors[self.identity_index].binding {
            FieldBinding::Scalar { set, .. } => set(instance, Value::I64(id)),
            FieldBinding::Relation { .. } => Err(FerriteError::new(
                "Identity field cannot be a relation",
                ErrorKind::InternalError,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct Person {
        id: i64,
        name: String,
        age: i32,
    }

    impl Entity for Person {
        fn table_name() -> &'static str {
            "person"
        }

        fn fields(fields: &mut EntityFields<Self>) {
            fields
                .int64("id", |p| p.id, |p, v| p.id = v)
                .text("name", |p| p.name.clone(), |p, v| p.name = v)
                .int32("age", |p| p.age, |p, v| p.age = v);
        }
    }

    #[derive(Clone, Default)]
    struct NoIdentity {
        name: String,
    }

    impl Entity for NoIdentity {
        fn table_name() -> &'static str {
            "no_identity"
        }

        fn fields(fields: &mut EntityFields<Self>) {
            fields.text("name", |p| p.name.clone(), |p, v| p.name = v);
        }
    }

    #[derive(Clone, Default)]
    struct TextIdentity {
        id: String,
    }

    impl Entity for TextIdentity {
        fn table_name() -> &'static str {
            "text_identity"
        }

        fn fields(fields: &mut EntityFields<Self>) {
            fields.text("id", |p| p.id.clone(), |p, v| p.id = v);
        }
    }

    #[derive(Clone, Default)]
    struct Employee {
        id: i64,
        address: Option<Person>,
    }

    impl Entity for Employee {
        fn table_name() -> &'static str {
            "employee"
        }

        fn fields(fields: &mut EntityFields<Self>) {
            fields
                .int64("id", |e| e.id, |e, v| e.id = v)
                .relation::<Person>("address", |e| e.address.clone(), |e, v| e.address = v);
        }
    }

    #[test]
    fn test_build_assigns_positions_in_declaration_order() {
        let descriptor = EntityDescriptor::<Person>::build().unwrap();
        let schema = descriptor.schema();
        assert_eq!(schema.name(), "person");
        assert_eq!(schema.primary_key(), "id");
        let names: Vec<String> = schema.column_names();
        assert_eq!(names, vec!["id", "name", "age"]);
        for (index, column) in schema.columns().iter().enumerate() {
            assert_eq!(column.position(), index);
        }
    }

    #[test]
    fn test_build_twice_yields_identical_schemas() {
        let first = EntityDescriptor::<Person>::build().unwrap();
        let second = EntityDescriptor::<Person>::build().unwrap();
        assert_eq!(first.schema().as_ref(), second.schema().as_ref());
    }

    #[test]
    fn test_missing_identity_fails_at_build() {
        let err = EntityDescriptor::<NoIdentity>::build().unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::NoPrimaryKey);
    }

    #[test]
    fn test_non_integer_identity_fails_at_build() {
        let err = EntityDescriptor::<TextIdentity>::build().unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::UnsupportedFieldType);
    }

    #[test]
    fn test_relation_column_naming() {
        let descriptor = EntityDescriptor::<Employee>::build().unwrap();
        let schema = descriptor.schema();
        let column = schema.column("address_id").unwrap();
        assert_eq!(column.kind(), ColumnKind::Int64);
        assert!(!column.is_primary_key());
    }

    #[test]
    fn test_identity_round_trip() {
        let descriptor = EntityDescriptor::<Person>::build().unwrap();
        let mut person = Person::default();
        assert_eq!(descriptor.identity_of(&person), 0);
        descriptor.assign_identity(&mut person, 42).unwrap();
        assert_eq!(person.id, 42);
        assert_eq!(descriptor.identity_of(&person), 42);
    }

    #[test]
    fn test_collect_relation_edges() {
        let edges = collect_relation_edges::<Employee>();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].table, "person");
        assert!((edges[0].expand)().is_empty());
    }
}
