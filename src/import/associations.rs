//! Gathering children of freshly inserted parents for recursive imports.

use crate::model::Model;
use crate::schema::TableSchema;
use crate::value::Value;
use std::sync::Arc;

/// Children bound for one table, already stamped with their parent's key.
pub(crate) struct ChildGroup<'m> {
    pub schema: Arc<TableSchema>,
    pub records: Vec<&'m mut dyn Model>,
}

/// Stamp foreign keys (and polymorphic type columns) onto the new or
/// changed children of `parents`, grouped by child table in first-seen order.
///
/// Parents without an id are skipped.
pub(crate) fn collect_children<'m>(
    parents: &'m mut [&mut dyn Model],
    primary_key: &str,
) -> Vec<ChildGroup<'m>> {
    let mut groups: Vec<ChildGroup<'m>> = Vec::new();

    for parent in parents.iter_mut() {
        let parent: &'m mut dyn Model = &mut **parent;
        let parent_id = parent.read_attribute(primary_key);
        if parent_id.is_null() {
            continue;
        }
        let parent_type = parent.schema().model_name.clone();

        for associated in parent.associations() {
            let association = associated.association;
            for child in associated.records {
                if !(child.is_new_record() || child.is_changed()) {
                    continue;
                }
                child.write_attribute(&association.foreign_key, parent_id.clone());
                if let Some(type_column) = &association.polymorphic_type {
                    child.write_attribute(type_column, Value::Text(parent_type.clone()));
                }

                let schema = child.schema();
                match groups
                    .iter_mut()
                    .find(|group| group.schema.table_name == schema.table_name)
                {
                    Some(group) => group.records.push(child),
                    None => groups.push(ChildGroup {
                        schema,
                        records: vec![child],
                    }),
                }
            }
        }
    }

    groups
}
