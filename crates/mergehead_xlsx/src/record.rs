//! Field access by name.
//!
//! The layout and projection code never inspects records directly; it asks
//! a [`FieldAccessor`] for named values and, for object tables, named lists
//! of nested records.

use std::collections::{BTreeMap, HashMap};

use indexmap::IndexMap;

use crate::spec::EnumFieldValue;

/// "Get field value by name" capability supplied by the caller.
pub trait FieldAccessor {
    /// Scalar value of `name`, or `None` when the record has no such field.
    ///
    /// A field that exists but holds no value returns `Some(EnumFieldValue::Null)`.
    fn field(&self, name: &str) -> Option<EnumFieldValue>;

    /// Nested records held by the list-valued field `name`.
    fn field_records(&self, _name: &str) -> Option<Vec<&dyn FieldAccessor>> {
        None
    }
}

impl<T: FieldAccessor + ?Sized> FieldAccessor for &T {
    fn field(&self, name: &str) -> Option<EnumFieldValue> {
        (**self).field(name)
    }

    fn field_records(&self, name: &str) -> Option<Vec<&dyn FieldAccessor>> {
        (**self).field_records(name)
    }
}

impl FieldAccessor for IndexMap<String, EnumFieldValue> {
    fn field(&self, name: &str) -> Option<EnumFieldValue> {
        self.get(name).cloned()
    }
}

impl FieldAccessor for BTreeMap<String, EnumFieldValue> {
    fn field(&self, name: &str) -> Option<EnumFieldValue> {
        self.get(name).cloned()
    }
}

impl<S: std::hash::BuildHasher> FieldAccessor for HashMap<String, EnumFieldValue, S> {
    fn field(&self, name: &str) -> Option<EnumFieldValue> {
        self.get(name).cloned()
    }
}

/// Owned dictionary record with optional nested record lists.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecRecord {
    values: IndexMap<String, EnumFieldValue>,
    children: IndexMap<String, Vec<SpecRecord>>,
}

impl SpecRecord {
    /// Empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style scalar setter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<EnumFieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Builder-style list setter.
    pub fn with_records(mut self, name: impl Into<String>, records: Vec<SpecRecord>) -> Self {
        self.insert_records(name, records);
        self
    }

    /// Set a scalar field.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<EnumFieldValue>) {
        self.values.insert(name.into(), value.into());
    }

    /// Set a list-valued field.
    pub fn insert_records(&mut self, name: impl Into<String>, records: Vec<SpecRecord>) {
        self.children.insert(name.into(), records);
    }

    /// Scalar field names in insertion order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl FieldAccessor for SpecRecord {
    fn field(&self, name: &str) -> Option<EnumFieldValue> {
        self.values.get(name).cloned()
    }

    fn field_records(&self, name: &str) -> Option<Vec<&dyn FieldAccessor>> {
        self.children.get(name).map(|l_records| {
            l_records
                .iter()
                .map(|record| record as &dyn FieldAccessor)
                .collect()
        })
    }
}

impl FromIterator<(String, EnumFieldValue)> for SpecRecord {
    fn from_iter<I: IntoIterator<Item = (String, EnumFieldValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
            children: IndexMap::new(),
        }
    }
}
