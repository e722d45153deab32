//! Object to row mapping.
//!
//! A type registers its persistent fields once through [EntityFields]; the
//! build step derives a [crate::schema::TableSchema] and an [EntityMapper]
//! implementing the bidirectional instance/row contract.

pub(crate) mod entity;
mod row_mapper;
mod row_values;

pub use entity::{Entity, EntityDescriptor, EntityFields};
pub use row_mapper::EntityMapper;
pub use row_values::RowValues;
