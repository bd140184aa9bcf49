//! Model-shaped import input.
//!
//! The [`Model`] trait is the seam to whatever object layer the caller uses:
//! it exposes raw attribute reads and writes, persistence state and
//! one-to-many / one-to-one children for recursive imports.
//! [`DynamicModel`] is a ready-made attribute bag implementing it.

use crate::schema::TableSchema;
use crate::value::{Record, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// A relation from a parent model to the child rows that reference it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    pub name: String,
    /// Column on the child holding the parent's id.
    pub foreign_key: String,
    /// Column on the child holding the parent's model name, for polymorphic relations.
    pub polymorphic_type: Option<String>,
}

impl Association {
    pub fn new(name: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            foreign_key: foreign_key.into(),
            polymorphic_type: None,
        }
    }

    pub fn polymorphic(mut self, type_column: impl Into<String>) -> Self {
        self.polymorphic_type = Some(type_column.into());
        self
    }
}

/// Children of one association, borrowed from their parent.
pub struct AssociatedRecords<'a> {
    pub association: Association,
    pub records: Vec<&'a mut dyn Model>,
}

pub trait Model {
    fn schema(&self) -> Arc<TableSchema>;

    /// Raw attribute value, before any type coercion.
    fn read_attribute(&self, column: &str) -> Value;

    fn write_attribute(&mut self, column: &str, value: Value);

    fn is_new_record(&self) -> bool;

    fn is_changed(&self) -> bool {
        self.is_new_record()
    }

    /// Clear dirty tracking and flag the model as stored.
    fn mark_persisted(&mut self);

    /// Model-specific validation on top of the schema's rules.
    fn validate(&self) -> Vec<String> {
        Vec::new()
    }

    fn associations(&mut self) -> Vec<AssociatedRecords<'_>> {
        Vec::new()
    }

    fn to_record(&self, columns: &[String]) -> Record {
        Record::from_parts(
            columns.to_vec(),
            columns.iter().map(|c| self.read_attribute(c)).collect(),
        )
    }
}

/// A schema-backed attribute bag with dirty tracking and nested children.
#[derive(Debug, Clone)]
pub struct DynamicModel {
    schema: Arc<TableSchema>,
    attributes: Record,
    new_record: bool,
    changed: HashSet<String>,
    children: Vec<(Association, Vec<DynamicModel>)>,
}

impl DynamicModel {
    pub fn new(schema: Arc<TableSchema>) -> Self {
        Self {
            schema,
            attributes: Record::new(),
            new_record: true,
            changed: HashSet::new(),
            children: Vec::new(),
        }
    }

    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.write_attribute(column, value.into());
        self
    }

    /// Add `child` under `association`, creating the association on first use.
    pub fn add_child(&mut self, association: &Association, child: DynamicModel) {
        match self
            .children
            .iter_mut()
            .find(|(existing, _)| existing == association)
        {
            Some((_, records)) => records.push(child),
            None => self.children.push((association.clone(), vec![child])),
        }
    }

    pub fn children(&self, association: &str) -> &[DynamicModel] {
        self.children
            .iter()
            .find(|(assoc, _)| assoc.name == association)
            .map(|(_, records)| records.as_slice())
            .unwrap_or(&[])
    }

    pub fn get(&self, column: &str) -> Value {
        self.read_attribute(column)
    }

    pub fn id(&self) -> Value {
        match self.schema.primary_key.first() {
            Some(pk) => self.read_attribute(pk),
            None => Value::Null,
        }
    }

    pub fn attributes(&self) -> &Record {
        &self.attributes
    }
}

impl Model for DynamicModel {
    fn schema(&self) -> Arc<TableSchema> {
        Arc::clone(&self.schema)
    }

    fn read_attribute(&self, column: &str) -> Value {
        self.attributes.get(column).cloned().unwrap_or(Value::Null)
    }

    fn write_attribute(&mut self, column: &str, value: Value) {
        if self.attributes.get(column) != Some(&value) {
            self.changed.insert(column.to_string());
        }
        self.attributes.insert(column, value);
    }

    fn is_new_record(&self) -> bool {
        self.new_record
    }

    fn is_changed(&self) -> bool {
        self.new_record || !self.changed.is_empty()
    }

    fn mark_persisted(&mut self) {
        self.new_record = false;
        self.changed.clear();
    }

    fn associations(&mut self) -> Vec<AssociatedRecords<'_>> {
        self.children
            .iter_mut()
            .map(|(association, records)| AssociatedRecords {
                association: association.clone(),
                records: records.iter_mut().map(|r| r as &mut dyn Model).collect(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirty_tracking() {
        let schema = Arc::new(TableSchema::new("topics"));
        let mut topic = DynamicModel::new(schema).with("title", "Book");
        assert!(topic.is_new_record());
        topic.mark_persisted();
        assert!(!topic.is_changed());
        topic.write_attribute("title", "Book".into());
        assert!(!topic.is_changed());
        topic.write_attribute("title", "Book 2".into());
        assert!(topic.is_changed());
    }

    #[test]
    fn test_children_grouped_by_association() {
        let topics = Arc::new(TableSchema::new("topics"));
        let books = Arc::new(TableSchema::new("books"));
        let assoc = Association::new("books", "topic_id");
        let mut topic = DynamicModel::new(topics);
        topic.add_child(&assoc, DynamicModel::new(books.clone()));
        topic.add_child(&assoc, DynamicModel::new(books));
        assert_eq!(topic.children("books").len(), 2);
        assert_eq!(topic.associations().len(), 1);
    }
}
