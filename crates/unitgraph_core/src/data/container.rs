//! Per-object state record.

use crate::error::{CoreError, CoreResult};
use crate::mapping::ClassDefinition;
use crate::types::{ClassId, ObjectId, Timestamp};
use crate::value::Value;
use std::collections::BTreeMap;

/// Lifecycle state of an object as seen by one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectState {
    /// The identity is valid but no data has been loaded yet.
    NotLoadedYet,
    /// Created in this transaction and never persisted.
    New,
    /// Loaded and not modified.
    Unchanged,
    /// Loaded and modified.
    Changed,
    /// Marked for deletion; removed from storage on commit.
    Deleted,
    /// Removed from the identity map before it was persisted.
    Discarded,
    /// Terminal: the object can no longer be used in this transaction.
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    New,
    Existing,
}

/// Original and current value of one property.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PropertyValue {
    original: Value,
    current: Value,
    touched: bool,
}

impl PropertyValue {
    fn unchanged(value: Value) -> Self {
        Self {
            original: value.clone(),
            current: value,
            touched: false,
        }
    }

    fn has_changed(&self) -> bool {
        self.original != self.current
    }
}

/// In-memory record of one object's property values and lifecycle flags.
///
/// Exactly one container exists per [`ObjectId`] per transaction. Relation
/// foreign keys are stored here as ordinary properties; real relation end
/// points read and write them through the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataContainer {
    id: ObjectId,
    origin: Origin,
    properties: BTreeMap<&'static str, PropertyValue>,
    timestamp: Option<Timestamp>,
    deleted: bool,
    discarded: bool,
    marked_changed: bool,
}

impl DataContainer {
    /// Creates the container of a new object, initialized with the class defaults.
    #[must_use]
    pub fn new_object(id: ObjectId, class: &ClassDefinition) -> Self {
        let properties = class
            .properties()
            .map(|p| (p.name(), PropertyValue::unchanged(p.default_value().clone())))
            .collect();
        Self {
            id,
            origin: Origin::New,
            properties,
            timestamp: None,
            deleted: false,
            discarded: false,
            marked_changed: false,
        }
    }

    /// Creates the container of a loaded object.
    #[must_use]
    pub fn for_existing(
        id: ObjectId,
        timestamp: Option<Timestamp>,
        values: impl IntoIterator<Item = (&'static str, Value)>,
    ) -> Self {
        let properties = values
            .into_iter()
            .map(|(name, value)| (name, PropertyValue::unchanged(value)))
            .collect();
        Self {
            id,
            origin: Origin::Existing,
            properties,
            timestamp,
            deleted: false,
            discarded: false,
            marked_changed: false,
        }
    }

    /// Creates the container of a loaded object of `class`.
    ///
    /// Mapped properties absent from `values` take their class default, so an
    /// omitted foreign key reads as `Value::Null`.
    #[must_use]
    pub fn from_loaded(
        id: ObjectId,
        class: &ClassDefinition,
        timestamp: Option<Timestamp>,
        values: impl IntoIterator<Item = (&'static str, Value)>,
    ) -> Self {
        let mut container = Self::for_existing(id, timestamp, values);
        for property in class.properties() {
            container
                .properties
                .entry(property.name())
                .or_insert_with(|| PropertyValue::unchanged(property.default_value().clone()));
        }
        container
    }

    /// Identity of the object.
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Class of the object.
    #[must_use]
    pub fn class_id(&self) -> ClassId {
        self.id.class_id()
    }

    /// Returns `true` if the object was created in this transaction.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.origin == Origin::New
    }

    /// Returns `true` if the object is marked for deletion.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Returns `true` once the container has been discarded.
    #[must_use]
    pub fn is_discarded(&self) -> bool {
        self.discarded
    }

    /// State derived from the container's own fields.
    ///
    /// Registration is not considered here; see
    /// [`DataContainerMap::state_of`](crate::data::DataContainerMap::state_of).
    #[must_use]
    pub fn state(&self) -> ObjectState {
        if self.discarded {
            ObjectState::Discarded
        } else if self.deleted {
            ObjectState::Deleted
        } else if self.origin == Origin::New {
            ObjectState::New
        } else if self.marked_changed || self.properties.values().any(PropertyValue::has_changed) {
            ObjectState::Changed
        } else {
            ObjectState::Unchanged
        }
    }

    /// Optimistic-concurrency token from the last load or save.
    #[must_use]
    pub fn timestamp(&self) -> Option<Timestamp> {
        self.timestamp
    }

    /// Replaces the timestamp after a successful save.
    pub fn set_timestamp(&mut self, timestamp: Timestamp) {
        self.timestamp = Some(timestamp);
    }

    /// Names of all stored properties.
    pub fn property_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.properties.keys().copied()
    }

    /// Current values of all properties.
    pub fn values(&self) -> impl Iterator<Item = (&'static str, &Value)> + '_ {
        self.properties.iter().map(|(name, v)| (*name, &v.current))
    }

    /// Current value of a property.
    pub fn value(&self, property: &str) -> CoreResult<&Value> {
        self.ensure_not_discarded()?;
        self.property(property).map(|p| &p.current)
    }

    /// Value of a property as of the last load or commit.
    pub fn original_value(&self, property: &str) -> CoreResult<&Value> {
        self.ensure_not_discarded()?;
        self.property(property).map(|p| &p.original)
    }

    /// Sets the current value of a property.
    ///
    /// No events are raised; callers notify observers themselves.
    pub fn set_value(&mut self, property: &str, value: Value) -> CoreResult<()> {
        self.ensure_not_discarded()?;
        if self.deleted {
            return Err(CoreError::object_deleted(self.id));
        }
        let class_id = self.class_id();
        let slot = self
            .properties
            .get_mut(property)
            .ok_or_else(|| CoreError::property_not_found(class_id, property))?;
        if !slot.current.is_compatible_with(&value) {
            return Err(CoreError::invalid_operation(format!(
                "value {value} is not compatible with {class_id}.{property}"
            )));
        }
        slot.current = value;
        slot.touched = true;
        Ok(())
    }

    /// Returns `true` if the current value differs from the original.
    #[must_use]
    pub fn has_value_changed(&self, property: &str) -> bool {
        self.properties
            .get(property)
            .is_some_and(PropertyValue::has_changed)
    }

    /// Returns `true` if the property was written since the last commit or rollback.
    #[must_use]
    pub fn was_touched(&self, property: &str) -> bool {
        self.properties.get(property).is_some_and(|p| p.touched)
    }

    /// Forces the state to [`ObjectState::Changed`] without changing a value.
    pub fn mark_as_changed(&mut self) -> CoreResult<()> {
        self.ensure_not_discarded()?;
        match self.state() {
            ObjectState::Unchanged | ObjectState::Changed => {
                self.marked_changed = true;
                Ok(())
            }
            state => Err(CoreError::invalid_operation(format!(
                "only existing objects can be marked as changed, {} is {state:?}",
                self.id
            ))),
        }
    }

    /// Marks an existing object for deletion.
    ///
    /// New objects are discarded instead of deleted.
    pub fn delete(&mut self) -> CoreResult<()> {
        self.ensure_not_discarded()?;
        if self.is_new() {
            return Err(CoreError::invalid_operation(format!(
                "new object {} must be discarded, not deleted",
                self.id
            )));
        }
        self.deleted = true;
        Ok(())
    }

    /// Marks the container as discarded. Every later access fails.
    pub fn discard(&mut self) {
        self.discarded = true;
    }

    /// Accepts the current values as the new originals.
    pub fn commit_state(&mut self) -> CoreResult<()> {
        self.ensure_not_discarded()?;
        if self.deleted {
            return Err(CoreError::invalid_operation(format!(
                "deleted object {} must be discarded on commit",
                self.id
            )));
        }
        for value in self.properties.values_mut() {
            value.original = value.current.clone();
            value.touched = false;
        }
        self.origin = Origin::Existing;
        self.marked_changed = false;
        Ok(())
    }

    /// Restores the original values and clears the deleted flag.
    pub fn rollback_state(&mut self) -> CoreResult<()> {
        self.ensure_not_discarded()?;
        if self.is_new() {
            return Err(CoreError::invalid_operation(format!(
                "new object {} must be discarded on rollback",
                self.id
            )));
        }
        for value in self.properties.values_mut() {
            value.current = value.original.clone();
            value.touched = false;
        }
        self.deleted = false;
        self.marked_changed = false;
        Ok(())
    }

    /// Takes over the current values of the same object from a sub-transaction.
    pub fn set_data_from_sub_transaction(&mut self, source: &DataContainer) -> CoreResult<()> {
        self.ensure_not_discarded()?;
        if source.id != self.id {
            return Err(CoreError::invalid_operation(format!(
                "cannot take data of {} into {}",
                source.id, self.id
            )));
        }
        for (name, value) in &source.properties {
            if let Some(target) = self.properties.get_mut(name) {
                if target.current != value.current {
                    target.current = value.current.clone();
                    target.touched = true;
                }
            }
        }
        if source.marked_changed && !self.is_new() {
            self.marked_changed = true;
        }
        Ok(())
    }

    fn property(&self, property: &str) -> CoreResult<&PropertyValue> {
        self.properties
            .get(property)
            .ok_or_else(|| CoreError::property_not_found(self.class_id(), property))
    }

    fn ensure_not_discarded(&self) -> CoreResult<()> {
        if self.discarded {
            Err(CoreError::object_invalid(self.id))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::MappingBuilder;
    use crate::types::ObjectKey;
    use proptest::prelude::*;

    fn order_id() -> ObjectId {
        ObjectId::new(ClassId::new("Order"), ObjectKey::from_u128(1))
    }

    fn existing() -> DataContainer {
        DataContainer::for_existing(
            order_id(),
            Some(Timestamp::new(1)),
            [("OrderNumber", Value::Integer(1)), ("Customer", Value::Null)],
        )
    }

    #[test]
    fn new_object_uses_defaults() {
        let mapping = MappingBuilder::new()
            .class("Order")
            .property("Order", "OrderNumber", Value::Integer(42))
            .build()
            .unwrap();
        let class = mapping.class_by_name("Order").unwrap();
        let container = DataContainer::new_object(order_id(), class);

        assert_eq!(container.state(), ObjectState::New);
        assert_eq!(container.value("OrderNumber").unwrap(), &Value::Integer(42));
        assert!(container.timestamp().is_none());
    }

    #[test]
    fn loaded_object_fills_omitted_properties_with_defaults() {
        let mapping = MappingBuilder::new()
            .class("Customer")
            .class("Order")
            .property("Order", "OrderNumber", Value::Integer(42))
            .one_to_many(("Customer", "Orders"), ("Order", "Customer"))
            .build()
            .unwrap();
        let class = mapping.class_by_name("Order").unwrap();
        let container = DataContainer::from_loaded(
            order_id(),
            class,
            Some(Timestamp::new(3)),
            [("OrderNumber", Value::Integer(7))],
        );

        assert_eq!(container.state(), ObjectState::Unchanged);
        assert_eq!(container.value("OrderNumber").unwrap(), &Value::Integer(7));
        assert_eq!(container.value("Customer").unwrap(), &Value::Null);
        assert_eq!(container.original_value("Customer").unwrap(), &Value::Null);
    }

    #[test]
    fn set_value_changes_state() {
        let mut container = existing();
        assert_eq!(container.state(), ObjectState::Unchanged);

        container.set_value("OrderNumber", Value::Integer(2)).unwrap();
        assert_eq!(container.state(), ObjectState::Changed);
        assert!(container.has_value_changed("OrderNumber"));
        assert_eq!(container.original_value("OrderNumber").unwrap(), &Value::Integer(1));

        container.set_value("OrderNumber", Value::Integer(1)).unwrap();
        assert_eq!(container.state(), ObjectState::Unchanged);
        assert!(container.was_touched("OrderNumber"));
    }

    #[test]
    fn incompatible_value_is_rejected() {
        let mut container = existing();
        let err = container
            .set_value("OrderNumber", Value::Text("x".into()))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
    }

    #[test]
    fn unknown_property_is_rejected() {
        let container = existing();
        assert!(matches!(
            container.value("Missing"),
            Err(CoreError::PropertyNotFound { .. })
        ));
    }

    #[test]
    fn commit_and_rollback() {
        let mut container = existing();
        container.set_value("OrderNumber", Value::Integer(5)).unwrap();
        container.rollback_state().unwrap();
        assert_eq!(container.value("OrderNumber").unwrap(), &Value::Integer(1));

        container.set_value("OrderNumber", Value::Integer(6)).unwrap();
        container.commit_state().unwrap();
        assert_eq!(container.state(), ObjectState::Unchanged);
        assert_eq!(container.original_value("OrderNumber").unwrap(), &Value::Integer(6));
    }

    #[test]
    fn deleted_container_rejects_writes() {
        let mut container = existing();
        container.delete().unwrap();
        assert_eq!(container.state(), ObjectState::Deleted);
        assert!(matches!(
            container.set_value("OrderNumber", Value::Integer(3)),
            Err(CoreError::ObjectDeleted { .. })
        ));
        container.rollback_state().unwrap();
        assert_eq!(container.state(), ObjectState::Unchanged);
    }

    #[test]
    fn discarded_container_is_invalid() {
        let mut container = existing();
        container.discard();
        assert_eq!(container.state(), ObjectState::Discarded);
        assert!(matches!(
            container.value("OrderNumber"),
            Err(CoreError::ObjectInvalid { .. })
        ));
    }

    #[test]
    fn mark_as_changed() {
        let mut container = existing();
        container.mark_as_changed().unwrap();
        assert_eq!(container.state(), ObjectState::Changed);
        container.commit_state().unwrap();
        assert_eq!(container.state(), ObjectState::Unchanged);
    }

    #[test]
    fn data_from_sub_transaction() {
        let mut parent = existing();
        let mut child = existing();
        child.set_value("OrderNumber", Value::Integer(9)).unwrap();

        parent.set_data_from_sub_transaction(&child).unwrap();
        assert_eq!(parent.value("OrderNumber").unwrap(), &Value::Integer(9));
        assert_eq!(parent.state(), ObjectState::Changed);
    }

    proptest! {
        #[test]
        fn state_follows_the_last_write(writes in prop::collection::vec(-5i64..5, 1..8)) {
            let mut container = existing();
            for value in &writes {
                container.set_value("OrderNumber", Value::Integer(*value)).unwrap();
            }
            let changed = writes.last() != Some(&1);
            prop_assert_eq!(container.has_value_changed("OrderNumber"), changed);
            prop_assert_eq!(
                container.state(),
                if changed { ObjectState::Changed } else { ObjectState::Unchanged }
            );

            container.rollback_state().unwrap();
            prop_assert_eq!(container.value("OrderNumber").unwrap(), &Value::Integer(1));
            prop_assert_eq!(container.state(), ObjectState::Unchanged);
        }
    }
}
