//! Mapping configuration: classes, properties and relation end point definitions.
//!
//! A mapping describes which properties each class carries and how classes
//! are related. Every bidirectional relation has exactly one *real* side,
//! which stores the foreign key, and one *virtual* side, which is computed
//! from the real sides that point at it.
//!
//! ```rust
//! use unitgraph_core::{MappingBuilder, Value};
//!
//! let mapping = MappingBuilder::new()
//!     .class("Customer")
//!     .class("Order")
//!     .property("Order", "OrderNumber", Value::Integer(0))
//!     .one_to_many(("Customer", "Orders"), ("Order", "Customer"))
//!     .build()
//!     .unwrap();
//!
//! assert!(mapping.class_by_name("Order").is_ok());
//! ```

use crate::error::{CoreError, CoreResult};
use crate::types::{ClassId, ObjectId, RelationEndPointId};
use crate::value::Value;
use std::collections::HashMap;

/// Shape of a relation end point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndPointKind {
    /// Holds the foreign key.
    Real,
    /// Computed single-object inverse navigation.
    VirtualObject,
    /// Computed collection inverse navigation.
    VirtualCollection,
    /// The missing side of a unidirectional relation; never materialized.
    Anonymous,
}

/// Definition of one side of a relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationEndPointDefinition {
    class_id: ClassId,
    property: &'static str,
    kind: EndPointKind,
    mandatory: bool,
    opposite_class_id: ClassId,
    opposite_property: Option<&'static str>,
}

impl RelationEndPointDefinition {
    /// Class owning this end point.
    #[must_use]
    pub fn class_id(&self) -> ClassId {
        self.class_id
    }

    /// Relation property name.
    #[must_use]
    pub fn property(&self) -> &'static str {
        self.property
    }

    /// Shape of the end point.
    #[must_use]
    pub fn kind(&self) -> EndPointKind {
        self.kind
    }

    /// Whether commit requires this end point to be non-empty.
    #[must_use]
    pub fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    /// Returns `true` for virtual object and virtual collection end points.
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        matches!(
            self.kind,
            EndPointKind::VirtualObject | EndPointKind::VirtualCollection
        )
    }

    /// Class on the other side of the relation.
    #[must_use]
    pub fn opposite_class_id(&self) -> ClassId {
        self.opposite_class_id
    }

    /// Property on the other side, `None` if the relation is unidirectional.
    #[must_use]
    pub fn opposite_property(&self) -> Option<&'static str> {
        self.opposite_property
    }

    /// Identity of the opposite end point for the given related object.
    #[must_use]
    pub fn opposite_end_point_id(&self, related: ObjectId) -> Option<RelationEndPointId> {
        self.opposite_property
            .map(|property| RelationEndPointId::new(related, property))
    }
}

/// Definition of a stored property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDefinition {
    name: &'static str,
    default: Value,
    foreign_key: bool,
}

impl PropertyDefinition {
    /// Property name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Value assigned to new objects.
    #[must_use]
    pub fn default_value(&self) -> &Value {
        &self.default
    }

    /// Whether this property stores a real relation end point's foreign key.
    #[must_use]
    pub fn is_foreign_key(&self) -> bool {
        self.foreign_key
    }
}

/// Definition of a mapped class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDefinition {
    id: ClassId,
    properties: Vec<PropertyDefinition>,
    end_points: Vec<RelationEndPointDefinition>,
}

impl ClassDefinition {
    fn new(id: ClassId) -> Self {
        Self {
            id,
            properties: Vec::new(),
            end_points: Vec::new(),
        }
    }

    /// Class identity.
    #[must_use]
    pub fn id(&self) -> ClassId {
        self.id
    }

    /// Stored properties, foreign keys included.
    pub fn properties(&self) -> impl Iterator<Item = &PropertyDefinition> {
        self.properties.iter()
    }

    /// Relation end points, in declaration order.
    pub fn end_points(&self) -> impl Iterator<Item = &RelationEndPointDefinition> {
        self.end_points.iter()
    }

    /// Looks up a stored property.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyDefinition> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Looks up a relation end point.
    #[must_use]
    pub fn end_point(&self, property: &str) -> Option<&RelationEndPointDefinition> {
        self.end_points.iter().find(|e| e.property == property)
    }
}

/// Immutable set of class definitions shared by every transaction of a hierarchy.
#[derive(Debug, Clone, Default)]
pub struct MappingConfiguration {
    classes: HashMap<ClassId, ClassDefinition>,
}

impl MappingConfiguration {
    /// Returns the definition of a class.
    pub fn class(&self, id: ClassId) -> CoreResult<&ClassDefinition> {
        self.classes
            .get(&id)
            .ok_or_else(|| CoreError::mapping(format!("class {id} is not mapped")))
    }

    /// Returns the definition of a class by name.
    pub fn class_by_name(&self, name: &str) -> CoreResult<&ClassDefinition> {
        self.classes
            .values()
            .find(|c| c.id.name() == name)
            .ok_or_else(|| CoreError::mapping(format!("class {name} is not mapped")))
    }

    /// Returns the definition of the given end point.
    pub fn end_point(&self, id: &RelationEndPointId) -> CoreResult<&RelationEndPointDefinition> {
        let class_id = id.object_id().class_id();
        self.class(class_id)?
            .end_point(id.property())
            .ok_or_else(|| CoreError::property_not_found(class_id, id.property()))
    }

    /// Returns the definition on the other side of `definition`.
    ///
    /// Returns `None` for unidirectional relations.
    pub fn opposite(
        &self,
        definition: &RelationEndPointDefinition,
    ) -> CoreResult<Option<&RelationEndPointDefinition>> {
        match definition.opposite_property {
            Some(property) => {
                let class = self.class(definition.opposite_class_id)?;
                class
                    .end_point(property)
                    .map(Some)
                    .ok_or_else(|| CoreError::property_not_found(class.id, property))
            }
            None => Ok(None),
        }
    }

    /// Number of mapped classes.
    #[must_use]
    pub fn class_count(&self) -> usize {
        self.classes.len()
    }
}

/// Fluent builder for [`MappingConfiguration`].
#[derive(Debug, Default)]
pub struct MappingBuilder {
    classes: Vec<ClassDefinition>,
    errors: Vec<String>,
}

impl MappingBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a class.
    #[must_use]
    pub fn class(mut self, name: &'static str) -> Self {
        if self.find(name).is_some() {
            self.errors.push(format!("class {name} declared twice"));
        } else {
            self.classes.push(ClassDefinition::new(ClassId::new(name)));
        }
        self
    }

    /// Declares a stored property with its default value.
    #[must_use]
    pub fn property(mut self, class: &'static str, name: &'static str, default: Value) -> Self {
        self.add_property(class, name, default, false);
        self
    }

    /// Declares a bidirectional one-to-many relation.
    ///
    /// `one` is the collection side (virtual), `many` the foreign-key side (real).
    #[must_use]
    pub fn one_to_many(
        mut self,
        one: (&'static str, &'static str),
        many: (&'static str, &'static str),
    ) -> Self {
        self.add_relation(one, EndPointKind::VirtualCollection, many);
        self
    }

    /// Declares a bidirectional one-to-one relation.
    ///
    /// `virtual_side` navigates without a foreign key, `real_side` stores it.
    #[must_use]
    pub fn one_to_one(
        mut self,
        virtual_side: (&'static str, &'static str),
        real_side: (&'static str, &'static str),
    ) -> Self {
        self.add_relation(virtual_side, EndPointKind::VirtualObject, real_side);
        self
    }

    /// Declares a unidirectional relation from `(class, property)` to `target`.
    #[must_use]
    pub fn unidirectional(
        mut self,
        (class, property): (&'static str, &'static str),
        target: &'static str,
    ) -> Self {
        let Some(target_id) = self.find(target).map(|c| c.id) else {
            self.errors.push(format!("class {target} is not declared"));
            return self;
        };
        self.add_property(class, property, Value::Null, true);
        self.add_end_point(
            class,
            RelationEndPointDefinition {
                class_id: ClassId::new(class),
                property,
                kind: EndPointKind::Real,
                mandatory: false,
                opposite_class_id: target_id,
                opposite_property: None,
            },
        );
        self
    }

    /// Marks a relation end point as mandatory.
    #[must_use]
    pub fn mandatory(mut self, class: &'static str, property: &'static str) -> Self {
        match self
            .find_mut(class)
            .and_then(|c| c.end_points.iter_mut().find(|e| e.property == property))
        {
            Some(end_point) => end_point.mandatory = true,
            None => self
                .errors
                .push(format!("relation {class}.{property} is not declared")),
        }
        self
    }

    /// Validates and builds the mapping.
    pub fn build(self) -> CoreResult<MappingConfiguration> {
        if let Some(first) = self.errors.first() {
            return Err(CoreError::mapping(first.clone()));
        }
        let classes = self.classes.into_iter().map(|c| (c.id, c)).collect();
        Ok(MappingConfiguration { classes })
    }

    fn find(&self, name: &str) -> Option<&ClassDefinition> {
        self.classes.iter().find(|c| c.id.name() == name)
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut ClassDefinition> {
        self.classes.iter_mut().find(|c| c.id.name() == name)
    }

    fn add_property(&mut self, class: &'static str, name: &'static str, default: Value, fk: bool) {
        let Some(definition) = self.find_mut(class) else {
            self.errors.push(format!("class {class} is not declared"));
            return;
        };
        if definition.property(name).is_some() || definition.end_point(name).is_some() {
            self.errors.push(format!("property {class}.{name} declared twice"));
            return;
        }
        definition.properties.push(PropertyDefinition {
            name,
            default,
            foreign_key: fk,
        });
    }

    fn add_end_point(&mut self, class: &'static str, end_point: RelationEndPointDefinition) {
        if let Some(definition) = self.find_mut(class) {
            definition.end_points.push(end_point);
        }
    }

    fn add_relation(
        &mut self,
        (virtual_class, virtual_property): (&'static str, &'static str),
        virtual_kind: EndPointKind,
        (real_class, real_property): (&'static str, &'static str),
    ) {
        if self.find(virtual_class).is_none() {
            self.errors.push(format!("class {virtual_class} is not declared"));
            return;
        }
        if self
            .find(virtual_class)
            .is_some_and(|c| c.end_point(virtual_property).is_some())
        {
            self.errors
                .push(format!("relation {virtual_class}.{virtual_property} declared twice"));
            return;
        }
        self.add_property(real_class, real_property, Value::Null, true);
        self.add_end_point(
            real_class,
            RelationEndPointDefinition {
                class_id: ClassId::new(real_class),
                property: real_property,
                kind: EndPointKind::Real,
                mandatory: false,
                opposite_class_id: ClassId::new(virtual_class),
                opposite_property: Some(virtual_property),
            },
        );
        self.add_end_point(
            virtual_class,
            RelationEndPointDefinition {
                class_id: ClassId::new(virtual_class),
                property: virtual_property,
                kind: virtual_kind,
                mandatory: false,
                opposite_class_id: ClassId::new(real_class),
                opposite_property: Some(real_property),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ObjectKey;

    fn mapping() -> MappingConfiguration {
        MappingBuilder::new()
            .class("Customer")
            .class("Order")
            .class("OrderTicket")
            .class("Official")
            .property("Order", "OrderNumber", Value::Integer(0))
            .one_to_many(("Customer", "Orders"), ("Order", "Customer"))
            .one_to_one(("Order", "OrderTicket"), ("OrderTicket", "Order"))
            .unidirectional(("Order", "Official"), "Official")
            .mandatory("OrderTicket", "Order")
            .build()
            .unwrap()
    }

    #[test]
    fn real_side_gets_foreign_key_property() {
        let mapping = mapping();
        let order = mapping.class_by_name("Order").unwrap();
        assert!(order.property("Customer").unwrap().is_foreign_key());
        assert!(!order.property("OrderNumber").unwrap().is_foreign_key());
        assert!(order.property("Orders").is_none());
    }

    #[test]
    fn opposite_lookup() {
        let mapping = mapping();
        let id = RelationEndPointId::new(
            ObjectId::new(ClassId::new("Order"), ObjectKey::from_u128(1)),
            "Customer",
        );
        let definition = mapping.end_point(&id).unwrap();
        assert_eq!(definition.kind(), EndPointKind::Real);
        let opposite = mapping.opposite(definition).unwrap().unwrap();
        assert_eq!(opposite.kind(), EndPointKind::VirtualCollection);
        assert_eq!(opposite.property(), "Orders");
    }

    #[test]
    fn unidirectional_has_no_opposite() {
        let mapping = mapping();
        let order = mapping.class_by_name("Order").unwrap();
        let official = order.end_point("Official").unwrap();
        assert!(mapping.opposite(official).unwrap().is_none());
        assert!(official
            .opposite_end_point_id(ObjectId::random(ClassId::new("Official")))
            .is_none());
    }

    #[test]
    fn mandatory_flag_is_recorded() {
        let mapping = mapping();
        let ticket = mapping.class_by_name("OrderTicket").unwrap();
        assert!(ticket.end_point("Order").unwrap().is_mandatory());
    }

    #[test]
    fn undeclared_class_is_rejected() {
        let result = MappingBuilder::new()
            .class("Order")
            .one_to_many(("Customer", "Orders"), ("Order", "Customer"))
            .build();
        assert!(matches!(result, Err(CoreError::Mapping { .. })));
    }

    #[test]
    fn duplicate_property_is_rejected() {
        let result = MappingBuilder::new()
            .class("Order")
            .property("Order", "Number", Value::Null)
            .property("Order", "Number", Value::Null)
            .build();
        assert!(result.is_err());
    }
}
