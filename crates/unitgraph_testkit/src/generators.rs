//! Property-based test generators using proptest.
//!
//! Provides strategies for identities, values and sequences of hierarchy
//! operations on the seeded order graph.

use crate::fixtures::Seed;
use proptest::prelude::*;
use unitgraph_core::{
    ClassId, CoreResult, ObjectId, ObjectKey, TransactionHierarchy, Value,
};

/// Strategy for generating object keys.
pub fn object_key_strategy() -> impl Strategy<Value = ObjectKey> {
    prop::array::uniform16(any::<u8>()).prop_map(ObjectKey::from_bytes)
}

/// Strategy for generating identities of one class.
pub fn object_id_strategy(class: &'static str) -> impl Strategy<Value = ObjectId> {
    object_key_strategy().prop_map(move |key| ObjectId::new(ClassId::new(class), key))
}

/// Strategy for generating non-reference property values.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        "[a-zA-Z ]{0,16}".prop_map(Value::Text),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
    ]
}

/// An operation on a hierarchy over the seeded order graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HierarchyOp {
    /// Sets the order number of the seeded order.
    SetOrderNumber(i64),
    /// Moves seeded item `index` to the first (`false`) or second (`true`)
    /// order of the seeded customer.
    MoveItem {
        /// 0 or 1.
        index: usize,
        /// Target order.
        to_other: bool,
    },
    /// Creates a new item in the seeded order.
    AddNewItem,
    /// Opens a sub-transaction.
    CreateSubTransaction,
    /// Commits the current transaction.
    Commit,
    /// Rolls the current transaction back.
    Rollback,
    /// Discards the leaf sub-transaction, if there is one.
    DiscardSubTransaction,
    /// Unloads the seeded order.
    UnloadOrder,
    /// Unloads everything in the current transaction and its ancestors.
    UnloadAll,
}

impl HierarchyOp {
    /// Applies the operation.
    ///
    /// Failures that the operation is allowed to produce, such as unloading
    /// a changed object, are returned as errors; the hierarchy must stay
    /// consistent either way.
    pub fn apply(&self, hierarchy: &mut TransactionHierarchy, seed: &Seed) -> CoreResult<()> {
        match self {
            Self::SetOrderNumber(number) => {
                let order = hierarchy.get_object(seed.order)?;
                hierarchy.set_value(&order, "OrderNumber", Value::Integer(*number))
            }
            Self::MoveItem { index, to_other } => {
                let item = hierarchy.get_object(seed.items[*index % 2])?;
                let target = if *to_other { seed.other_order } else { seed.order };
                let target = hierarchy.get_object(target)?;
                hierarchy.set_related_object(&item, "Order", Some(&target))
            }
            Self::AddNewItem => {
                let order = hierarchy.get_object(seed.order)?;
                let item = hierarchy.new_object("OrderItem")?;
                hierarchy.add_related_object(&order, "OrderItems", &item)
            }
            Self::CreateSubTransaction => hierarchy.create_sub_transaction().map(|_| ()),
            Self::Commit => hierarchy.commit(),
            Self::Rollback => hierarchy.rollback(),
            Self::DiscardSubTransaction => {
                if hierarchy.depth() > 1 {
                    hierarchy.discard_sub_transaction()?;
                }
                Ok(())
            }
            Self::UnloadOrder => hierarchy.unload_data(&[seed.order]),
            Self::UnloadAll => hierarchy.unload_all(),
        }
    }
}

/// Strategy for a single hierarchy operation.
pub fn hierarchy_op_strategy() -> impl Strategy<Value = HierarchyOp> {
    prop_oneof![
        3 => (-1000i64..1000).prop_map(HierarchyOp::SetOrderNumber),
        3 => (0usize..2, any::<bool>())
            .prop_map(|(index, to_other)| HierarchyOp::MoveItem { index, to_other }),
        2 => Just(HierarchyOp::AddNewItem),
        1 => Just(HierarchyOp::CreateSubTransaction),
        2 => Just(HierarchyOp::Commit),
        1 => Just(HierarchyOp::Rollback),
        1 => Just(HierarchyOp::DiscardSubTransaction),
        1 => Just(HierarchyOp::UnloadOrder),
        1 => Just(HierarchyOp::UnloadAll),
    ]
}

/// Strategy for a sequence of hierarchy operations.
pub fn hierarchy_ops_strategy(max_len: usize) -> impl Strategy<Value = Vec<HierarchyOp>> {
    prop::collection::vec(hierarchy_op_strategy(), 1..=max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn object_ids_keep_their_class(id in object_id_strategy("Order")) {
            prop_assert_eq!(id.class_id(), ClassId::new("Order"));
        }

        #[test]
        fn scalar_values_never_reference_objects(value in scalar_value_strategy()) {
            prop_assert!(value.as_object_id().is_none());
        }
    }
}
