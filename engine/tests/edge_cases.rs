//! Edge case tests for tally-engine
//!
//! These tests cover boundary conditions and unusual inputs.

use proptest::prelude::*;
use tally_engine::{
    AccountEntry, AccountStatus, AccountTxKind, AccountType, ApplyOutcome, ClientSnapshot,
    EntityKind, EntityPayload, Error, LocalStore, NewProduct, NewSale, OpStatus, OpType,
    Operation, OperationQueue, PaymentMethod, Product, SaleItem, SyncRequest, SyncResponse,
};

const NOW: i64 = 1_706_745_600_000;

fn product(id: &str, name: &str, barcode: Option<&str>, stock: i64) -> Product {
    Product {
        id: id.into(),
        name: name.into(),
        price: 2.0,
        cost: 1.0,
        stock,
        category: None,
        barcode: barcode.map(str::to_string),
        min_stock: None,
        supplier_id: None,
        image_url: None,
        is_active: true,
    }
}

fn op(id: &str) -> Operation {
    Operation::new(OpType::Create, EntityKind::Report, "{}", "dev-1", NOW).with_id(id)
}

// ============================================================================
// String Edge Cases
// ============================================================================

#[test]
fn unicode_product_names() {
    let mut store = LocalStore::new("dev-1");
    let names = ["日本語テスト", "Привет мир", "مرحبا", "🎉🚀💯", "Hello\nWorld\tTab"];

    for (i, name) in names.iter().enumerate() {
        let created = store
            .create_product(
                NewProduct {
                    name: name.to_string(),
                    price: 1.0,
                    ..Default::default()
                },
                NOW + i as i64,
            )
            .unwrap();
        assert_eq!(store.cache().products.get(&created.id).unwrap().name, *name);
    }

    for pending in store.pending_operations() {
        let EntityPayload::ProductCreate(decoded) = pending.decode().unwrap() else {
            panic!("expected product create");
        };
        assert!(names.contains(&decoded.name.as_str()));
    }
}

#[test]
fn empty_barcodes_never_collide() {
    let mut store = LocalStore::new("dev-1");
    store.upsert_product(product("p1", "Tea", Some(""), 1));

    let incoming = Operation::from_payload(
        &EntityPayload::ProductCreate(product("p2", "Juice", Some(""), 1)),
        "dev-2",
        NOW,
    )
    .unwrap();

    assert_eq!(store.apply_remote(&incoming).unwrap(), ApplyOutcome::Applied);
    assert_eq!(store.cache().products.len(), 2);
}

// ============================================================================
// Payload Edge Cases
// ============================================================================

#[test]
fn unknown_keys_are_ignored() {
    let data = r#"{"id":"p1","name":"Tea","price":1,"stock":0,"color":"green","extra":{"a":[1,2]}}"#;
    let payload = EntityPayload::decode(EntityKind::Product, OpType::Create, data).unwrap();
    assert_eq!(payload.kind(), EntityKind::Product);
}

#[test]
fn every_unsupported_pair_is_rejected() {
    let supported = [
        (EntityKind::Product, OpType::Create),
        (EntityKind::Product, OpType::Update),
        (EntityKind::Product, OpType::Delete),
        (EntityKind::Transaction, OpType::Create),
        (EntityKind::AccountTransaction, OpType::Create),
        (EntityKind::AccountTransaction, OpType::Update),
        (EntityKind::CashRegister, OpType::Create),
        (EntityKind::CashRegister, OpType::Update),
        (EntityKind::SalesRecord, OpType::Create),
        (EntityKind::Report, OpType::Create),
        (EntityKind::InventoryLog, OpType::Create),
    ];
    let kinds = [
        EntityKind::Product,
        EntityKind::Transaction,
        EntityKind::AccountTransaction,
        EntityKind::CashRegister,
        EntityKind::SalesRecord,
        EntityKind::Report,
        EntityKind::InventoryLog,
    ];

    for kind in kinds {
        for op_type in [OpType::Create, OpType::Update, OpType::Delete] {
            if supported.contains(&(kind, op_type)) {
                continue;
            }
            let err = EntityPayload::decode(kind, op_type, "{}").unwrap_err();
            assert!(
                matches!(err, Error::UnsupportedOperation { .. }),
                "{kind} {op_type} should be unsupported"
            );
        }
    }
}

#[test]
fn close_directive_with_unknown_operation_is_invalid() {
    let data = r#"{"operation":"reopen","accountId":"a1"}"#;
    let err = EntityPayload::decode(EntityKind::AccountTransaction, OpType::Update, data).unwrap_err();
    assert!(matches!(err, Error::InvalidPayload { .. }));
}

// ============================================================================
// Numeric Edge Cases
// ============================================================================

#[test]
fn large_timestamps_survive_the_wire() {
    let op = Operation::new(OpType::Create, EntityKind::Report, "{}", "d", i64::MAX);
    let json = serde_json::to_string(&op).unwrap();
    let parsed: Operation = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.timestamp, i64::MAX);
}

#[test]
fn discount_reduces_sale_amount() {
    let mut store = LocalStore::new("dev-1");
    store.upsert_product(product("p1", "Tea", None, 5));

    let tx = store
        .record_sale(
            NewSale {
                items: vec![SaleItem::new("p1", 3)],
                payment: PaymentMethod::Transfer,
                discount: 1.5,
                customer_name: Some("Ana".into()),
                user_id: "u1".into(),
            },
            NOW,
        )
        .unwrap();

    assert_eq!(tx.amount, 4.5);
    assert_eq!(tx.discount, 1.5);
}

#[test]
fn selling_entire_stock_reaches_zero() {
    let mut store = LocalStore::new("dev-1");
    store.upsert_product(product("p1", "Tea", None, 2));

    store
        .record_sale(
            NewSale {
                items: vec![SaleItem::new("p1", 2)],
                payment: PaymentMethod::Cash,
                discount: 0.0,
                customer_name: None,
                user_id: "u1".into(),
            },
            NOW,
        )
        .unwrap();

    assert_eq!(store.cache().products.get("p1").unwrap().stock, 0);
}

// ============================================================================
// Account Edge Cases
// ============================================================================

#[test]
fn entry_on_unknown_account() {
    let mut store = LocalStore::new("dev-1");
    let result = store.add_account_items(
        "missing",
        AccountEntry {
            kind: AccountTxKind::Credit,
            items: vec![],
            amount: Some(10.0),
            discount: None,
            method: None,
            note: None,
            user_id: "u1".into(),
        },
        NOW,
    );
    assert!(matches!(result, Err(Error::NotFound { kind: "account", .. })));
    assert_eq!(store.pending_count(), 0);
}

#[test]
fn remote_account_transaction_without_account_is_skipped() {
    let mut store = LocalStore::new("dev-1");
    let data = r#"{"id":"t1","accountType":"PREPAID","type":"credit","amount":5,"createdAt":"2024-02-01T00:00:00Z"}"#;
    let op = Operation::new(OpType::Create, EntityKind::AccountTransaction, data, "dev-2", NOW);

    assert_eq!(store.apply_remote(&op).unwrap(), ApplyOutcome::Skipped);
    assert!(store.cache().account_transactions.is_empty());
}

#[test]
fn remote_close_of_unknown_account_is_skipped() {
    let mut store = LocalStore::new("dev-1");
    let data = r#"{"operation":"close","accountId":"a9","timestamp":"2024-02-01T00:00:00Z","userId":"u1"}"#;
    let op = Operation::new(OpType::Update, EntityKind::AccountTransaction, data, "dev-2", NOW);

    assert_eq!(store.apply_remote(&op).unwrap(), ApplyOutcome::Skipped);
}

#[test]
fn closed_status_survives_snapshot() {
    let mut store = LocalStore::new("dev-1");
    store.upsert_account(tally_engine::Account {
        id: "a1".into(),
        customer_name: "Ana".into(),
        account_type: AccountType::Accumulated,
        status: AccountStatus::Open,
        opened_at: tally_engine::datetime_from_millis(NOW),
        closed_at: None,
        closed_by: None,
        credit_limit: Some(100.0),
    });
    store.close_account("a1", "u1", NOW).unwrap();

    let json = ClientSnapshot::capture(&store, NOW).to_json().unwrap();
    let (restored, _) = ClientSnapshot::from_json(&json).unwrap().into_store();

    assert_eq!(
        restored.cache().accounts.get("a1").unwrap().status,
        AccountStatus::Closed
    );
    assert_eq!(restored.pending_count(), 1);
}

// ============================================================================
// Protocol Edge Cases
// ============================================================================

#[test]
fn response_without_error_field_parses() {
    let json = r#"{"success":true,"operations":[],"lastSyncTimestamp":99}"#;
    let response: SyncResponse = serde_json::from_str(json).unwrap();
    assert!(response.success);
    assert_eq!(response.error, None);
}

#[test]
fn request_carries_pending_operations_verbatim() {
    let mut store = LocalStore::new("dev-1");
    store.upsert_product(product("p1", "Tea", None, 5));
    store.adjust_stock("p1", 3, NOW).unwrap();

    let request = SyncRequest::new("dev-1", 0).with_operations(store.pending_operations());
    let json = serde_json::to_string(&request).unwrap();
    let parsed: SyncRequest = serde_json::from_str(&json).unwrap();

    assert_eq!(parsed.operations, store.pending_operations());
}

// ============================================================================
// Queue Invariants
// ============================================================================

#[derive(Debug, Clone)]
enum QueueAction {
    Enqueue(u8),
    Complete(u8),
    Fail(u8),
    ClearCompleted,
}

fn queue_action() -> impl Strategy<Value = QueueAction> {
    prop_oneof![
        (0u8..16).prop_map(QueueAction::Enqueue),
        (0u8..16).prop_map(QueueAction::Complete),
        (0u8..16).prop_map(QueueAction::Fail),
        Just(QueueAction::ClearCompleted),
    ]
}

proptest! {
    #[test]
    fn queue_counts_stay_consistent(actions in prop::collection::vec(queue_action(), 0..64)) {
        let mut queue = OperationQueue::new();

        for action in actions {
            match action {
                QueueAction::Enqueue(n) => {
                    let id = format!("op-{n}");
                    let existed = queue.get(&id).is_some();
                    let result = queue.enqueue(op(&id));
                    prop_assert_eq!(result.is_err(), existed);
                }
                QueueAction::Complete(n) => queue.mark_completed(&format!("op-{n}")),
                QueueAction::Fail(n) => queue.mark_failed(&format!("op-{n}")),
                QueueAction::ClearCompleted => {
                    queue.clear_completed();
                    prop_assert_eq!(queue.count_by_status(OpStatus::Completed), 0);
                }
            }

            let total = queue.count_by_status(OpStatus::Pending)
                + queue.count_by_status(OpStatus::Completed)
                + queue.count_by_status(OpStatus::Failed);
            prop_assert_eq!(total, queue.len());

            let mut ids: Vec<_> = queue.ids().cloned().collect();
            let before = ids.len();
            ids.sort();
            ids.dedup();
            prop_assert_eq!(ids.len(), before);
        }
    }

    #[test]
    fn pending_operations_are_exactly_the_pending_ones(
        ids in prop::collection::btree_set(0u16..500, 0..40),
        complete_every in 1usize..5,
    ) {
        let mut queue = OperationQueue::new();
        let ids: Vec<String> = ids.into_iter().map(|n| format!("op-{n}")).collect();
        for id in &ids {
            queue.enqueue(op(id)).unwrap();
        }
        for id in ids.iter().step_by(complete_every) {
            queue.mark_completed(id);
        }

        let pending = queue.pending_operations();
        prop_assert!(pending.iter().all(|o| o.status == OpStatus::Pending));
        prop_assert_eq!(pending.len(), ids.len() - ids.iter().step_by(complete_every).count());
    }
}
