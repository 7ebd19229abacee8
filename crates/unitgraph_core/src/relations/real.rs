//! Foreign-key holding end points.

use crate::data::DataContainer;
use crate::error::{CoreError, CoreResult};
use crate::types::{ObjectId, RelationEndPointId};
use crate::value::Value;

/// End point that stores the opposite identity as a foreign key.
///
/// The foreign key lives in the owning [`DataContainer`]; this type only
/// knows how to read and write it, so the end point and the property can
/// never disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealObjectEndPoint {
    id: RelationEndPointId,
    opposite_property: Option<&'static str>,
    touched: bool,
}

impl RealObjectEndPoint {
    /// Creates an end point. `opposite_property` is `None` for unidirectional relations.
    #[must_use]
    pub fn new(id: RelationEndPointId, opposite_property: Option<&'static str>) -> Self {
        Self {
            id,
            opposite_property,
            touched: false,
        }
    }

    /// Identity of the end point.
    #[must_use]
    pub fn id(&self) -> RelationEndPointId {
        self.id
    }

    /// Property of the virtual end point on the other side.
    #[must_use]
    pub fn opposite_property(&self) -> Option<&'static str> {
        self.opposite_property
    }

    /// Returns `true` if written since the last commit or rollback.
    #[must_use]
    pub fn is_touched(&self) -> bool {
        self.touched
    }

    /// Marks the end point as written.
    pub fn touch(&mut self) {
        self.touched = true;
    }

    /// Current opposite object.
    pub fn opposite_object_id(&self, container: &DataContainer) -> CoreResult<Option<ObjectId>> {
        self.check_owner(container)?;
        container
            .value(self.id.property())
            .map(Value::as_object_id)
    }

    /// Opposite object as of the last load or commit.
    pub fn original_opposite_object_id(
        &self,
        container: &DataContainer,
    ) -> CoreResult<Option<ObjectId>> {
        self.check_owner(container)?;
        container
            .original_value(self.id.property())
            .map(Value::as_object_id)
    }

    /// Identity of the current opposite end point, if bidirectional and set.
    pub fn opposite_end_point_id(
        &self,
        container: &DataContainer,
    ) -> CoreResult<Option<RelationEndPointId>> {
        let opposite = self.opposite_object_id(container)?;
        Ok(opposite
            .zip(self.opposite_property)
            .map(|(object, property)| RelationEndPointId::new(object, property)))
    }

    /// Returns `true` if the foreign key differs from the original.
    #[must_use]
    pub fn has_changed(&self, container: &DataContainer) -> bool {
        container.has_value_changed(self.id.property())
    }

    /// Writes the foreign key.
    pub fn set_opposite_object_id(
        &mut self,
        container: &mut DataContainer,
        opposite: Option<ObjectId>,
    ) -> CoreResult<()> {
        self.check_owner(container)?;
        container.set_value(self.id.property(), Value::from_object_id(opposite))?;
        self.touched = true;
        Ok(())
    }

    /// Clears the touched flag.
    pub fn reset_touched(&mut self) {
        self.touched = false;
    }

    fn check_owner(&self, container: &DataContainer) -> CoreResult<()> {
        if container.id() == self.id.object_id() {
            Ok(())
        } else {
            Err(CoreError::invalid_operation(format!(
                "{} is not owned by {}",
                self.id,
                container.id()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClassId, ObjectKey};

    #[test]
    fn reads_and_writes_foreign_key() {
        let order = ObjectId::new(ClassId::new("Order"), ObjectKey::from_u128(1));
        let customer = ObjectId::new(ClassId::new("Customer"), ObjectKey::from_u128(2));
        let mut container =
            DataContainer::for_existing(order, None, [("Customer", Value::Object(customer))]);
        let mut end_point =
            RealObjectEndPoint::new(RelationEndPointId::new(order, "Customer"), Some("Orders"));

        assert_eq!(end_point.opposite_object_id(&container).unwrap(), Some(customer));
        assert_eq!(
            end_point.opposite_end_point_id(&container).unwrap(),
            Some(RelationEndPointId::new(customer, "Orders"))
        );

        end_point.set_opposite_object_id(&mut container, None).unwrap();
        assert!(end_point.is_touched());
        assert!(end_point.has_changed(&container));
        assert_eq!(container.value("Customer").unwrap(), &Value::Null);
        assert_eq!(
            end_point.original_opposite_object_id(&container).unwrap(),
            Some(customer)
        );
    }

    #[test]
    fn rejects_foreign_container() {
        let order = ObjectId::new(ClassId::new("Order"), ObjectKey::from_u128(1));
        let other = ObjectId::new(ClassId::new("Order"), ObjectKey::from_u128(2));
        let container = DataContainer::for_existing(other, None, [("Customer", Value::Null)]);
        let end_point = RealObjectEndPoint::new(RelationEndPointId::new(order, "Customer"), None);
        assert!(end_point.opposite_object_id(&container).is_err());
    }
}
