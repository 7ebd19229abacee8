//! Shared fixtures for unit tests.

use crate::config::Config;
use crate::data_manager::DataManager;
use crate::error::CoreResult;
use crate::events::TransactionEventSink;
use crate::loading::LazyLoader;
use crate::mapping::{MappingBuilder, MappingConfiguration, RelationEndPointDefinition};
use crate::persistence::{InMemoryStorage, ObjectData, Query};
use crate::types::{ClassId, ObjectId, ObjectKey, TransactionId};
use crate::value::Value;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub(crate) fn id(class: &'static str, key: u128) -> ObjectId {
    ObjectId::new(ClassId::new(class), ObjectKey::from_u128(key))
}

/// Customer 1-n Order 1-n OrderItem, Order 1-1 OrderTicket.
pub(crate) fn mapping() -> Arc<MappingConfiguration> {
    Arc::new(
        MappingBuilder::new()
            .class("Customer")
            .class("Order")
            .class("OrderItem")
            .class("OrderTicket")
            .property("Customer", "Name", Value::Null)
            .property("Order", "OrderNumber", Value::Integer(0))
            .property("OrderItem", "Product", Value::Null)
            .property("OrderTicket", "FileName", Value::Null)
            .one_to_many(("Customer", "Orders"), ("Order", "Customer"))
            .one_to_many(("Order", "OrderItems"), ("OrderItem", "Order"))
            .one_to_one(("Order", "OrderTicket"), ("OrderTicket", "Order"))
            .build()
            .unwrap(),
    )
}

pub(crate) fn data_manager_with(mapping: Arc<MappingConfiguration>, tx: u64) -> DataManager {
    let tx = TransactionId::new(tx);
    DataManager::new(
        tx,
        mapping,
        Arc::new(Config::default()),
        Arc::new(TransactionEventSink::new(tx)),
        Arc::new(AtomicBool::new(true)),
        false,
    )
}

pub(crate) fn data_manager() -> DataManager {
    data_manager_with(mapping(), 1)
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct SeededIds {
    pub customer: ObjectId,
    pub order: ObjectId,
    pub ticket: ObjectId,
    pub item: ObjectId,
}

/// One customer with one order, which has one ticket and one item.
pub(crate) fn seeded_storage() -> (InMemoryStorage, SeededIds) {
    let storage = InMemoryStorage::new();
    let ids = SeededIds {
        customer: id("Customer", 1),
        order: id("Order", 1),
        ticket: id("OrderTicket", 1),
        item: id("OrderItem", 1),
    };
    storage.insert(ids.customer, [("Name", Value::from("Kim"))]);
    storage.insert(
        ids.order,
        [
            ("OrderNumber", Value::Integer(1)),
            ("Customer", Value::Object(ids.customer)),
        ],
    );
    storage.insert(
        ids.ticket,
        [
            ("FileName", Value::from("ticket.txt")),
            ("Order", Value::Object(ids.order)),
        ],
    );
    storage.insert(
        ids.item,
        [
            ("Product", Value::from("Mainboard")),
            ("Order", Value::Object(ids.order)),
        ],
    );
    (storage, ids)
}

/// A loader over an empty data source.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct NoLoader;

impl LazyLoader for NoLoader {
    fn load_object_data(&mut self, _id: ObjectId) -> CoreResult<Option<ObjectData>> {
        Ok(None)
    }

    fn load_related_object_data(
        &mut self,
        _definition: &RelationEndPointDefinition,
        _owner: ObjectId,
    ) -> CoreResult<Vec<ObjectData>> {
        Ok(Vec::new())
    }

    fn execute_query(&mut self, _query: &Query) -> CoreResult<Vec<ObjectData>> {
        Ok(Vec::new())
    }
}
