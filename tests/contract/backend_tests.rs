//! Backend interface tests.
//!
//! These tests verify the contract of the Backend trait. Each backend should
//! run these tests. Partitions are prefixed `contract_backend_` and every
//! test uses its own partition.

use dynaredis::backend::{Axis, Query, ReturnValues, Select, WriteOp};
use dynaredis::expression::{ExpressionBuilder, SortCondition};
use dynaredis::item::{Attribute, Item, Key};
use dynaredis::{Backend, Error, ErrorKind, Value};

fn none() -> ExpressionBuilder {
    ExpressionBuilder::new()
}

async fn put(backend: &dyn Backend, item: Item) {
    backend
        .put_item(item, &none(), ReturnValues::None)
        .await
        .expect("put should succeed");
}

/// Follow cursors until the query is exhausted.
async fn query_all(backend: &dyn Backend, mut query: Query) -> Vec<Item> {
    let mut items = Vec::new();
    loop {
        let page = backend.query(&query).await.expect("query should succeed");
        items.extend(page.items);
        match page.cursor {
            Some(cursor) => query.cursor = Some(cursor),
            None => return items,
        }
    }
}

fn sorts(items: &[Item]) -> Vec<&str> {
    items.iter().map(|i| i.sort_key()).collect()
}

// =============================================================================
// Point operations
// =============================================================================

pub async fn test_get_missing(backend: &dyn Backend) {
    let found = backend
        .get_item(&Key::new("contract_backend_missing", "nothing"), true)
        .await
        .expect("get should succeed");
    assert!(found.is_none(), "missing item should be None");
}

pub async fn test_put_and_get_values(backend: &dyn Backend) {
    let partition = "contract_backend_values";
    let values = [
        ("s", Value::from("text")),
        ("i", Value::Integer(-42)),
        ("f", Value::Float(2.5)),
        ("b", Value::Bytes(vec![0, 1, 255])),
    ];
    for (sort, value) in &values {
        put(
            backend,
            Item::new(Key::new(partition, *sort))
                .with_score(7.25)
                .with_value(value.clone()),
        )
        .await;
    }

    for (sort, value) in values {
        let item = backend
            .get_item(&Key::new(partition, sort), true)
            .await
            .unwrap()
            .expect("item should exist");
        assert_eq!(item.value, Some(value));
        assert_eq!(item.score, Some(7.25));
    }
}

pub async fn test_put_returns_old_item(backend: &dyn Backend) {
    let key = Key::new("contract_backend_put_old", "m");
    let first = backend
        .put_item(
            Item::new(key.clone()).with_value(Value::from("one")),
            &none(),
            ReturnValues::AllOld,
        )
        .await
        .unwrap();
    assert!(first.is_none(), "first put has no old item");

    let second = backend
        .put_item(
            Item::new(key.clone()).with_value(Value::from("two")),
            &none(),
            ReturnValues::AllOld,
        )
        .await
        .unwrap()
        .expect("second put returns the old item");
    assert_eq!(second.value, Some(Value::from("one")));
}

pub async fn test_conditional_put(backend: &dyn Backend) {
    let key = Key::new("contract_backend_cond_put", "m");
    let not_exists = none().not_exists(Attribute::PartitionKey);

    backend
        .put_item(
            Item::new(key.clone()).with_value(Value::from("first")),
            &not_exists,
            ReturnValues::None,
        )
        .await
        .expect("first conditional put should succeed");

    let err = backend
        .put_item(
            Item::new(key.clone()).with_value(Value::from("second")),
            &not_exists,
            ReturnValues::None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConditionFailed), "got {err:?}");
    assert_eq!(err.kind(), ErrorKind::ConditionFailed);

    let item = backend.get_item(&key, true).await.unwrap().unwrap();
    assert_eq!(item.value, Some(Value::from("first")), "store unchanged");

    let wrong_value = none().equals(Attribute::Value, "other");
    assert!(backend
        .put_item(Item::new(key.clone()), &wrong_value, ReturnValues::None)
        .await
        .unwrap_err()
        .is_condition_failed());

    let right_value = none().equals(Attribute::Value, "first");
    backend
        .put_item(
            Item::new(key.clone()).with_value(Value::from("third")),
            &right_value,
            ReturnValues::None,
        )
        .await
        .expect("equality condition should hold");
}

// =============================================================================
// Updates
// =============================================================================

pub async fn test_update_add_counter(backend: &dyn Backend) {
    let key = Key::new("contract_backend_counter", "n");
    let add = |n: i64| none().add(Attribute::Value, n);

    let created = backend
        .update_item(&key, &add(1), ReturnValues::AllNew)
        .await
        .unwrap()
        .expect("AllNew returns the item");
    assert_eq!(created.value, Some(Value::Integer(1)), "absent counts as 0");

    let old = backend
        .update_item(&key, &add(5), ReturnValues::AllOld)
        .await
        .unwrap()
        .expect("AllOld returns the previous item");
    assert_eq!(old.value, Some(Value::Integer(1)));

    let after = backend
        .update_item(&key, &add(-10), ReturnValues::AllNew)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.value, Some(Value::Integer(-4)));
}

pub async fn test_update_set_score(backend: &dyn Backend) {
    let key = Key::new("contract_backend_set_score", "m");
    let fresh = backend
        .update_item(
            &key,
            &none().set(Attribute::Score, 3.5),
            ReturnValues::AllOld,
        )
        .await
        .unwrap();
    assert!(fresh.is_none(), "update creates the item");

    let err = backend
        .update_item(
            &key,
            &none()
                .set(Attribute::Score, 9.5)
                .not_exists(Attribute::PartitionKey),
            ReturnValues::None,
        )
        .await
        .unwrap_err();
    assert!(err.is_condition_failed());

    let item = backend.get_item(&key, true).await.unwrap().unwrap();
    assert_eq!(item.score, Some(3.5));
}

pub async fn test_delete(backend: &dyn Backend) {
    let key = Key::new("contract_backend_delete", "m");
    let exists = none().exists(Attribute::PartitionKey);

    let err = backend
        .delete_item(&key, &exists, ReturnValues::None)
        .await
        .unwrap_err();
    assert!(err.is_condition_failed(), "deleting a missing item with exists");

    let gone = backend
        .delete_item(&key, &none(), ReturnValues::AllOld)
        .await
        .unwrap();
    assert!(gone.is_none(), "unconditional delete of a missing item");

    put(backend, Item::new(key.clone()).with_value(Value::from("x"))).await;
    let old = backend
        .delete_item(&key, &exists, ReturnValues::AllOld)
        .await
        .unwrap()
        .expect("delete returns the old item");
    assert_eq!(old.value, Some(Value::from("x")));
    assert!(backend.get_item(&key, true).await.unwrap().is_none());
}

// =============================================================================
// Queries
// =============================================================================

pub async fn test_query_sort_axis_pages(backend: &dyn Backend) {
    let partition = "contract_backend_query_sk";
    for i in (0..7).rev() {
        put(backend, Item::new(Key::new(partition, format!("k{i}")))).await;
    }
    put(backend, Item::new(Key::new(partition, "other"))).await;

    let mut query = Query::new(partition);
    query.limit = Some(3);
    let items = query_all(backend, query.clone()).await;
    assert_eq!(
        sorts(&items),
        ["k0", "k1", "k2", "k3", "k4", "k5", "k6", "other"]
    );

    query.forward = false;
    query.condition = Some(SortCondition::BeginsWith("k".into()));
    let items = query_all(backend, query.clone()).await;
    assert_eq!(sorts(&items), ["k6", "k5", "k4", "k3", "k2", "k1", "k0"]);

    query.forward = true;
    query.condition = Some(SortCondition::Between(Value::from("k2"), Value::from("k4")));
    let items = query_all(backend, query).await;
    assert_eq!(sorts(&items), ["k2", "k3", "k4"]);
}

pub async fn test_query_score_axis(backend: &dyn Backend) {
    let partition = "contract_backend_query_score";
    for (sort, score) in [("a", 3.0), ("b", 1.0), ("c", 2.0), ("d", 2.0)] {
        put(backend, Item::new(Key::new(partition, sort)).with_score(score)).await;
    }
    put(backend, Item::new(Key::new(partition, "unscored"))).await;

    let mut query = Query::new(partition);
    query.axis = Axis::Score;
    query.select = Select::Keys;
    query.limit = Some(2);
    let items = query_all(backend, query.clone()).await;
    assert_eq!(items.len(), 4, "unscored items are not on the score axis");
    let scores: Vec<f64> = items.iter().map(|i| i.score.unwrap()).collect();
    assert_eq!(scores, [1.0, 2.0, 2.0, 3.0]);

    query.forward = false;
    query.condition = Some(SortCondition::LessThan(Value::Float(3.0)));
    let items = query_all(backend, query.clone()).await;
    assert_eq!(items.first().map(|i| i.score), Some(Some(2.0)));
    assert_eq!(items.last().map(|i| i.sort_key()), Some("b"));

    query.forward = true;
    query.condition = Some(SortCondition::AtLeast(Value::Float(2.0)));
    query.select = Select::Count;
    query.limit = None;
    let mut total = 0;
    loop {
        let page = backend.query(&query).await.unwrap();
        assert!(page.items.is_empty(), "count queries return no items");
        total += page.count;
        match page.cursor {
            Some(cursor) => query.cursor = Some(cursor),
            None => break,
        }
    }
    assert_eq!(total, 3);
}

// =============================================================================
// Transactions
// =============================================================================

pub async fn test_transact_write_all_or_nothing(backend: &dyn Backend) {
    let partition = "contract_backend_tx";
    put(backend, Item::new(Key::new(partition, "present"))).await;

    let failing = vec![
        WriteOp::Put {
            item: Item::new(Key::new(partition, "new")),
            expression: none(),
        },
        WriteOp::Delete {
            key: Key::new(partition, "present"),
            expression: none(),
        },
        WriteOp::ConditionCheck {
            key: Key::new(partition, "absent"),
            expression: none().exists(Attribute::PartitionKey),
        },
    ];
    let err = backend.transact_write(failing).await.unwrap_err();
    assert!(err.is_condition_failed(), "got {err:?}");
    assert!(backend
        .get_item(&Key::new(partition, "new"), true)
        .await
        .unwrap()
        .is_none());
    assert!(backend
        .get_item(&Key::new(partition, "present"), true)
        .await
        .unwrap()
        .is_some());

    let passing = vec![
        WriteOp::Put {
            item: Item::new(Key::new(partition, "new")),
            expression: none().not_exists(Attribute::PartitionKey),
        },
        WriteOp::Update {
            key: Key::new(partition, "counter"),
            expression: none().add(Attribute::Value, 2),
        },
        WriteOp::Delete {
            key: Key::new(partition, "present"),
            expression: none().exists(Attribute::PartitionKey),
        },
    ];
    backend.transact_write(passing).await.unwrap();

    let got = backend
        .transact_get(&[
            Key::new(partition, "counter"),
            Key::new(partition, "present"),
            Key::new(partition, "new"),
        ])
        .await
        .unwrap();
    assert_eq!(got.len(), 3);
    assert_eq!(got[0].as_ref().and_then(|i| i.value.clone()), Some(Value::Integer(2)));
    assert!(got[1].is_none());
    assert!(got[2].is_some());
}

pub async fn test_transact_write_rejects_duplicate_keys(backend: &dyn Backend) {
    let key = Key::new("contract_backend_tx_dup", "m");
    let ops = vec![
        WriteOp::Put {
            item: Item::new(key.clone()),
            expression: none(),
        },
        WriteOp::Delete {
            key: key.clone(),
            expression: none(),
        },
    ];
    assert!(backend.transact_write(ops).await.is_err());
    assert!(backend.get_item(&key, true).await.unwrap().is_none());
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all Backend interface tests against a backend.
#[macro_export]
macro_rules! run_backend_tests {
    ($backend:expr) => {
        use $crate::contract::backend_tests::*;

        // point operations
        test_get_missing($backend).await;
        println!("  test_get_missing: PASSED");

        test_put_and_get_values($backend).await;
        println!("  test_put_and_get_values: PASSED");

        test_put_returns_old_item($backend).await;
        println!("  test_put_returns_old_item: PASSED");

        test_conditional_put($backend).await;
        println!("  test_conditional_put: PASSED");

        // updates
        test_update_add_counter($backend).await;
        println!("  test_update_add_counter: PASSED");

        test_update_set_score($backend).await;
        println!("  test_update_set_score: PASSED");

        test_delete($backend).await;
        println!("  test_delete: PASSED");

        // queries
        test_query_sort_axis_pages($backend).await;
        println!("  test_query_sort_axis_pages: PASSED");

        test_query_score_axis($backend).await;
        println!("  test_query_score_axis: PASSED");

        // transactions
        test_transact_write_all_or_nothing($backend).await;
        println!("  test_transact_write_all_or_nothing: PASSED");

        test_transact_write_rejects_duplicate_keys($backend).await;
        println!("  test_transact_write_rejects_duplicate_keys: PASSED");
    };
}
