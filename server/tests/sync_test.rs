//! Integration tests for the reconciliation service.
//!
//! Everything runs against the in-memory store; no database is needed.

use async_trait::async_trait;
use std::sync::Arc;
use tally_engine::{
    datetime_from_millis, Account, AccountClose, AccountDirective, AccountStatus,
    AccountTransaction, AccountTxKind, AccountType, CashRegister, EntityKind, EntityPayload,
    Identity, InventoryLog, OpStatus, OpType, Operation, PaymentMethod, Product, RegisterStatus,
    Report, SaleSource, SyncRequest, Transaction, TransactionItem, TransactionStatus,
    SERVER_DEVICE_ID,
};
use tally_server::db::Database;
use tally_server::{
    DocumentUploader, MemoryDatabase, OpOutcome, ProductDedup, Reconciler, SyncService,
    UploadError,
};
use tokio::sync::Mutex;

const BASE_TS: i64 = 1_706_745_600_000;

fn caller() -> Identity {
    Identity::user("cashier-1")
}

fn product(id: &str, name: &str, price: f64, stock: i64) -> Product {
    Product {
        id: id.into(),
        name: name.into(),
        price,
        cost: 0.0,
        stock,
        category: None,
        barcode: None,
        min_stock: None,
        supplier_id: None,
        image_url: None,
        is_active: true,
    }
}

fn account(id: &str, account_type: AccountType) -> Account {
    Account {
        id: id.into(),
        customer_name: "Ana".into(),
        account_type,
        status: AccountStatus::Open,
        opened_at: datetime_from_millis(BASE_TS),
        closed_at: None,
        closed_by: None,
        credit_limit: None,
    }
}

fn sale(id: &str, items: Vec<TransactionItem>) -> Transaction {
    let amount = items.iter().map(TransactionItem::line_total).sum();
    Transaction {
        id: id.into(),
        amount,
        discount: 0.0,
        payment: PaymentMethod::Cash,
        created_at: datetime_from_millis(BASE_TS),
        customer_name: None,
        user_id: "cashier-1".into(),
        device_id: "dev-a".into(),
        status: TransactionStatus::Active,
        items,
    }
}

fn movement(
    id: &str,
    account_id: Option<&str>,
    account_type: AccountType,
    kind: AccountTxKind,
    items: Vec<TransactionItem>,
) -> AccountTransaction {
    let amount = items.iter().map(TransactionItem::line_total).sum();
    AccountTransaction {
        id: id.into(),
        account_id: account_id.map(Into::into),
        account_type,
        kind,
        amount,
        user_id: "cashier-1".into(),
        created_at: datetime_from_millis(BASE_TS),
        items,
        status: TransactionStatus::Active,
        method: None,
        note: None,
        discount: None,
    }
}

fn op(payload: EntityPayload, device: &str, ts: i64) -> Operation {
    Operation::from_payload(&payload, device, ts).unwrap()
}

async fn seed_products(db: &MemoryDatabase, products: &[Product]) {
    let mut session = db.session().await.unwrap();
    for p in products {
        session.insert_product(p).await.unwrap();
    }
}

async fn seed_account(db: &MemoryDatabase, account: &Account) {
    let mut session = db.session().await.unwrap();
    session.upsert_account(account).await.unwrap();
}

async fn stock_of(db: &MemoryDatabase, id: &str) -> i64 {
    let mut session = db.session().await.unwrap();
    session.find_product(id).await.unwrap().unwrap().stock
}

async fn status_of(db: &MemoryDatabase, op_id: &str) -> Option<OpStatus> {
    let mut session = db.session().await.unwrap();
    session
        .find_operation(op_id)
        .await
        .unwrap()
        .map(|op| op.status)
}

fn reconciler(db: &MemoryDatabase) -> Reconciler {
    Reconciler::new(Arc::new(db.clone()))
}

#[cfg(test)]
mod idempotency_tests {
    use super::*;

    #[tokio::test]
    async fn test_same_operation_twice_applies_once() {
        let db = MemoryDatabase::new();
        seed_products(&db, &[product("p1", "Cola", 2.0, 10)]).await;
        let service = reconciler(&db);

        let sale_op = op(
            EntityPayload::TransactionCreate(sale("t1", vec![TransactionItem::new("p1", 3, 2.0)])),
            "dev-a",
            BASE_TS,
        );

        let first = service.process(&sale_op, &caller()).await.unwrap();
        let second = service.process(&sale_op, &caller()).await.unwrap();

        assert_eq!(first, OpOutcome::Applied);
        assert_eq!(second, OpOutcome::Duplicate);
        assert_eq!(stock_of(&db, "p1").await, 7);
        assert_eq!(status_of(&db, &sale_op.id).await, Some(OpStatus::Completed));
    }

    #[tokio::test]
    async fn test_duplicate_batch_is_absorbed() {
        let db = MemoryDatabase::new();
        let service = reconciler(&db);
        let create = op(
            EntityPayload::ProductCreate(product("p1", "Cola", 2.0, 10)),
            "dev-a",
            BASE_TS,
        );

        let batch = vec![create.clone(), create];
        let report = service.process_batch(&batch, &caller()).await.unwrap();

        assert_eq!(report.applied, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.failed, 0);
    }
}

#[cfg(test)]
mod scenario_tests {
    use super::*;

    #[tokio::test]
    async fn test_pos_sale_moves_stock_and_records_revenue_once() {
        let db = MemoryDatabase::new();
        seed_products(
            &db,
            &[product("p1", "Burger", 5.0, 10), product("p2", "Fries", 3.0, 10)],
        )
        .await;
        let service = reconciler(&db);

        let transaction = sale(
            "t1",
            vec![
                TransactionItem::new("p1", 2, 5.0),
                TransactionItem::new("p2", 1, 3.0),
            ],
        );
        let first = op(
            EntityPayload::TransactionCreate(transaction.clone()),
            "dev-a",
            BASE_TS,
        );
        // Same transaction replayed under a fresh operation id.
        let replay = op(EntityPayload::TransactionCreate(transaction), "dev-a", BASE_TS + 1);

        assert_eq!(service.process(&first, &caller()).await.unwrap(), OpOutcome::Applied);
        assert_eq!(service.process(&replay, &caller()).await.unwrap(), OpOutcome::Skipped);

        assert_eq!(stock_of(&db, "p1").await, 8);
        assert_eq!(stock_of(&db, "p2").await, 9);

        let mut session = db.session().await.unwrap();
        let record = session.find_sale("t1", SaleSource::Pos).await.unwrap().unwrap();
        assert_eq!(record.total, 13.0);
        assert_eq!(record.lines.len(), 2);
    }

    #[tokio::test]
    async fn test_same_product_name_from_two_devices_keeps_one() {
        let db = MemoryDatabase::new();
        let service = reconciler(&db);

        let from_a = op(
            EntityPayload::ProductCreate(product("w1", "Widget", 1.0, 5)),
            "dev-a",
            BASE_TS,
        );
        let from_b = op(
            EntityPayload::ProductCreate(product("w2", "Widget", 1.5, 7)),
            "dev-b",
            BASE_TS + 10,
        );

        service.process(&from_a, &caller()).await.unwrap();
        let outcome = service.process(&from_b, &caller()).await.unwrap();

        assert_eq!(outcome, OpOutcome::Skipped);
        assert_eq!(status_of(&db, &from_b.id).await, Some(OpStatus::Completed));

        let mut session = db.session().await.unwrap();
        let products = session.list_products().await.unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].id, "w1");
    }

    #[tokio::test]
    async fn test_barcode_collision_is_a_duplicate() {
        let db = MemoryDatabase::new();
        let service = reconciler(&db);

        let mut first = product("a", "Soda 330ml", 1.0, 5);
        first.barcode = Some("7790001".into());
        let mut second = product("b", "Soda can", 1.0, 5);
        second.barcode = Some("7790001".into());

        service
            .process(&op(EntityPayload::ProductCreate(first), "dev-a", BASE_TS), &caller())
            .await
            .unwrap();
        let outcome = service
            .process(&op(EntityPayload::ProductCreate(second), "dev-b", BASE_TS), &caller())
            .await
            .unwrap();

        assert_eq!(outcome, OpOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_concurrent_creates_of_same_name_keep_one() {
        let db = MemoryDatabase::new();
        let service = reconciler(&db);
        let who = caller();

        let from_a = SyncRequest::new("dev-a", 1).with_operations(vec![op(
            EntityPayload::ProductCreate(product("w1", "Widget", 1.0, 5)),
            "dev-a",
            BASE_TS,
        )]);
        let from_b = SyncRequest::new("dev-b", 1).with_operations(vec![op(
            EntityPayload::ProductCreate(product("w2", "Widget", 1.5, 7)),
            "dev-b",
            BASE_TS,
        )]);

        let (a, b) = tokio::join!(
            service.reconcile(from_a, &who),
            service.reconcile(from_b, &who)
        );
        assert!(a.unwrap().success);
        assert!(b.unwrap().success);

        let mut session = db.session().await.unwrap();
        let products = session.list_products().await.unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].name, "Widget");
    }

    #[tokio::test]
    async fn test_id_only_dedup_keeps_both_products() {
        let db = MemoryDatabase::new();
        let service = reconciler(&db).with_product_dedup(ProductDedup::IdOnly);

        for (id, device) in [("w1", "dev-a"), ("w2", "dev-b")] {
            let create = op(
                EntityPayload::ProductCreate(product(id, "Widget", 1.0, 5)),
                device,
                BASE_TS,
            );
            assert_eq!(service.process(&create, &caller()).await.unwrap(), OpOutcome::Applied);
        }

        let mut session = db.session().await.unwrap();
        assert_eq!(session.list_products().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_initial_sync_returns_product_snapshot() {
        let db = MemoryDatabase::new();
        let products: Vec<Product> = (1..=5)
            .map(|i| product(&format!("p{i}"), &format!("Item {i}"), 1.0, i))
            .collect();
        seed_products(&db, &products).await;
        let service = reconciler(&db);

        let response = service
            .reconcile(SyncRequest::new("dev-new", 0), &caller())
            .await
            .unwrap();

        assert!(response.success);
        assert_eq!(response.operations.len(), 5);
        for op in &response.operations {
            assert_eq!(op.op_type, OpType::Create);
            assert_eq!(op.entity, EntityKind::Product);
            assert_eq!(op.device_id, SERVER_DEVICE_ID);
            assert_eq!(op.status, OpStatus::Completed);
            assert!(op.id.starts_with("initial-"));
            assert!(matches!(op.decode().unwrap(), EntityPayload::ProductCreate(_)));
        }
        assert!(response.last_sync_timestamp > 0);
    }
}

#[cfg(test)]
mod pull_tests {
    use super::*;

    #[tokio::test]
    async fn test_device_never_pulls_its_own_operations() {
        let db = MemoryDatabase::new();
        let service = reconciler(&db);

        let mine = op(
            EntityPayload::ProductCreate(product("p1", "Cola", 2.0, 10)),
            "dev-a",
            BASE_TS,
        );
        let request = SyncRequest::new("dev-a", 1).with_operations(vec![mine.clone()]);
        let response = service.reconcile(request, &caller()).await.unwrap();
        assert!(response.operations.is_empty());

        let other = service
            .reconcile(SyncRequest::new("dev-b", 1), &caller())
            .await
            .unwrap();
        assert_eq!(other.operations.len(), 1);
        assert_eq!(other.operations[0].id, mine.id);
        assert_eq!(other.operations[0].status, OpStatus::Completed);
    }

    #[tokio::test]
    async fn test_pull_set_is_ordered_and_excludes_failures() {
        let db = MemoryDatabase::new();
        let service = reconciler(&db);

        let late = op(
            EntityPayload::ProductCreate(product("p2", "Tea", 1.0, 1)),
            "dev-a",
            BASE_TS + 500,
        );
        let early = op(
            EntityPayload::ProductCreate(product("p1", "Cola", 1.0, 1)),
            "dev-a",
            BASE_TS + 100,
        );
        let broken = Operation::new(OpType::Create, EntityKind::Product, "{", "dev-a", BASE_TS + 200);
        let old = op(
            EntityPayload::ProductCreate(product("p0", "Water", 1.0, 1)),
            "dev-a",
            BASE_TS - 100,
        );

        service
            .process_batch(&[late.clone(), early.clone(), broken, old], &caller())
            .await
            .unwrap();

        let pulled = service.pull_set(BASE_TS, "dev-b").await.unwrap();
        let ids: Vec<&str> = pulled.iter().map(|op| op.id.as_str()).collect();
        assert_eq!(ids, vec![early.id.as_str(), late.id.as_str()]);
    }

    #[tokio::test]
    async fn test_cursor_never_goes_below_the_watermark() {
        let db = MemoryDatabase::new();
        let service = reconciler(&db);
        let future = i64::MAX / 2;

        let response = service
            .reconcile(SyncRequest::new("dev-a", future), &caller())
            .await
            .unwrap();
        assert_eq!(response.last_sync_timestamp, future);

        let response = service
            .reconcile(SyncRequest::new("dev-a", BASE_TS), &caller())
            .await
            .unwrap();
        assert!(response.last_sync_timestamp >= BASE_TS);
    }
}

#[cfg(test)]
mod batch_tests {
    use super::*;

    #[tokio::test]
    async fn test_failed_operation_does_not_stop_the_batch() {
        let db = MemoryDatabase::new();
        let service = reconciler(&db);

        let first = op(
            EntityPayload::ProductCreate(product("p1", "Cola", 1.0, 1)),
            "dev-a",
            BASE_TS,
        );
        let bad = Operation::new(OpType::Update, EntityKind::Transaction, "{}", "dev-a", BASE_TS + 1);
        let third = op(
            EntityPayload::ProductCreate(product("p2", "Tea", 1.0, 1)),
            "dev-a",
            BASE_TS + 2,
        );

        let report = service
            .process_batch(&[first.clone(), bad.clone(), third.clone()], &caller())
            .await
            .unwrap();

        assert_eq!(report.applied, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(status_of(&db, &first.id).await, Some(OpStatus::Completed));
        assert_eq!(status_of(&db, &bad.id).await, Some(OpStatus::Failed));
        assert_eq!(status_of(&db, &third.id).await, Some(OpStatus::Completed));
    }

    #[tokio::test]
    async fn test_failed_operation_is_not_retried() {
        let db = MemoryDatabase::new();
        let service = reconciler(&db);
        let bad = Operation::new(OpType::Create, EntityKind::Product, "not json", "dev-a", BASE_TS);

        assert!(matches!(
            service.process(&bad, &caller()).await.unwrap(),
            OpOutcome::Failed(_)
        ));
        assert_eq!(service.process(&bad, &caller()).await.unwrap(), OpOutcome::Duplicate);
    }

    #[tokio::test]
    async fn test_update_and_delete_of_missing_product_are_skipped() {
        let db = MemoryDatabase::new();
        let service = reconciler(&db);

        let update = op(
            EntityPayload::ProductUpdate(product("ghost", "Ghost", 1.0, 1)),
            "dev-a",
            BASE_TS,
        );
        let delete = op(
            EntityPayload::ProductDelete(tally_engine::ProductRef { id: "ghost".into() }),
            "dev-a",
            BASE_TS,
        );

        assert_eq!(service.process(&update, &caller()).await.unwrap(), OpOutcome::Skipped);
        assert_eq!(service.process(&delete, &caller()).await.unwrap(), OpOutcome::Skipped);
    }
}

#[cfg(test)]
mod account_tests {
    use super::*;

    #[tokio::test]
    async fn test_failed_stock_step_leaves_no_partial_rows() {
        let db = MemoryDatabase::new();
        seed_products(&db, &[product("p1", "Beer", 4.0, 10)]).await;
        seed_account(&db, &account("acc-1", AccountType::Accumulated)).await;
        let service = reconciler(&db);

        let debit = movement(
            "atx-1",
            Some("acc-1"),
            AccountType::Accumulated,
            AccountTxKind::Debit,
            vec![
                TransactionItem::new("p1", 2, 4.0),
                TransactionItem::new("missing", 1, 1.0),
            ],
        );
        let outcome = service
            .process(
                &op(EntityPayload::AccountTransactionCreate(debit), "dev-a", BASE_TS),
                &caller(),
            )
            .await
            .unwrap();

        assert!(matches!(outcome, OpOutcome::Failed(_)));
        assert_eq!(stock_of(&db, "p1").await, 10);

        let mut session = db.session().await.unwrap();
        assert!(session.find_account_transaction("atx-1").await.unwrap().is_none());
        assert!(session
            .find_sale("atx-1", SaleSource::Accumulated)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_accumulated_debit_moves_stock_and_revenue() {
        let db = MemoryDatabase::new();
        seed_products(&db, &[product("p1", "Beer", 4.0, 10)]).await;
        seed_account(&db, &account("acc-1", AccountType::Accumulated)).await;
        let service = reconciler(&db);

        let debit = movement(
            "atx-1",
            Some("acc-1"),
            AccountType::Accumulated,
            AccountTxKind::Debit,
            vec![TransactionItem::new("p1", 3, 4.0)],
        );
        service
            .process(
                &op(EntityPayload::AccountTransactionCreate(debit), "dev-a", BASE_TS),
                &caller(),
            )
            .await
            .unwrap();

        assert_eq!(stock_of(&db, "p1").await, 7);
        let mut session = db.session().await.unwrap();
        let record = session
            .find_sale("atx-1", SaleSource::Accumulated)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.total, 12.0);
    }

    #[tokio::test]
    async fn test_prepaid_counters_follow_credits_and_debits() {
        let db = MemoryDatabase::new();
        seed_products(
            &db,
            &[product("p1", "Coffee", 2.0, 20), product("p2", "Tea", 2.0, 20)],
        )
        .await;
        seed_account(&db, &account("acc-1", AccountType::Prepaid)).await;
        let service = reconciler(&db);

        let credit = movement(
            "c1",
            Some("acc-1"),
            AccountType::Prepaid,
            AccountTxKind::Credit,
            vec![TransactionItem::new("p1", 5, 2.0)],
        );
        let debit = movement(
            "d1",
            Some("acc-1"),
            AccountType::Prepaid,
            AccountTxKind::Debit,
            vec![
                TransactionItem::new("p1", 2, 2.0),
                TransactionItem::new("p2", 1, 2.0),
            ],
        );

        let batch = vec![
            op(EntityPayload::AccountTransactionCreate(credit), "dev-a", BASE_TS),
            op(EntityPayload::AccountTransactionCreate(debit), "dev-a", BASE_TS + 1),
        ];
        let report = service.process_batch(&batch, &caller()).await.unwrap();
        assert_eq!(report.applied, 2);

        // Goods leave on the prepaid credit only.
        assert_eq!(stock_of(&db, "p1").await, 15);
        assert_eq!(stock_of(&db, "p2").await, 20);

        let mut session = db.session().await.unwrap();
        let counter = session.find_prepaid("acc-1", "p1").await.unwrap().unwrap();
        assert_eq!((counter.paid, counter.consumed), (5, 2));
        assert!(session.find_prepaid("acc-1", "p2").await.unwrap().is_none());
        assert!(session.find_sale("c1", SaleSource::Prepaid).await.unwrap().is_some());
        assert!(session.find_sale("d1", SaleSource::Prepaid).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_prepaid_credits_all_count() {
        let db = MemoryDatabase::new();
        seed_products(&db, &[product("p1", "Coffee", 2.0, 50)]).await;
        seed_account(&db, &account("acc-1", AccountType::Prepaid)).await;
        let service = reconciler(&db);
        let who = caller();

        let credit = |id: &str, quantity: i64, device: &str| {
            let tx = movement(
                id,
                Some("acc-1"),
                AccountType::Prepaid,
                AccountTxKind::Credit,
                vec![TransactionItem::new("p1", quantity, 2.0)],
            );
            SyncRequest::new(device, 1).with_operations(vec![op(
                EntityPayload::AccountTransactionCreate(tx),
                device,
                BASE_TS,
            )])
        };

        service
            .reconcile(credit("c0", 3, "dev-a"), &who)
            .await
            .unwrap();
        let (a, b) = tokio::join!(
            service.reconcile(credit("c1", 2, "dev-a"), &who),
            service.reconcile(credit("c2", 4, "dev-b"), &who)
        );
        assert!(a.unwrap().success);
        assert!(b.unwrap().success);

        assert_eq!(stock_of(&db, "p1").await, 41);
        let mut session = db.session().await.unwrap();
        let counter = session.find_prepaid("acc-1", "p1").await.unwrap().unwrap();
        assert_eq!((counter.paid, counter.consumed), (9, 0));
    }

    #[tokio::test]
    async fn test_movement_without_account_is_a_no_op() {
        let db = MemoryDatabase::new();
        seed_products(&db, &[product("p1", "Beer", 4.0, 10)]).await;
        let service = reconciler(&db);

        let orphan = movement(
            "atx-9",
            None,
            AccountType::Accumulated,
            AccountTxKind::Debit,
            vec![TransactionItem::new("p1", 1, 4.0)],
        );
        let outcome = service
            .process(
                &op(EntityPayload::AccountTransactionCreate(orphan), "dev-a", BASE_TS),
                &caller(),
            )
            .await
            .unwrap();

        assert_eq!(outcome, OpOutcome::Skipped);
        assert_eq!(stock_of(&db, "p1").await, 10);
    }

    #[tokio::test]
    async fn test_close_marks_account_and_transactions() {
        let db = MemoryDatabase::new();
        seed_products(&db, &[product("p1", "Beer", 4.0, 10)]).await;
        seed_account(&db, &account("acc-1", AccountType::Accumulated)).await;
        let service = reconciler(&db);

        let mut batch: Vec<Operation> = (0..2)
            .map(|i| {
                let debit = movement(
                    &format!("atx-{i}"),
                    Some("acc-1"),
                    AccountType::Accumulated,
                    AccountTxKind::Debit,
                    vec![TransactionItem::new("p1", 1, 4.0)],
                );
                op(EntityPayload::AccountTransactionCreate(debit), "dev-a", BASE_TS + i)
            })
            .collect();
        batch.push(op(
            EntityPayload::AccountDirective(AccountDirective::Close(AccountClose {
                account_id: "acc-1".into(),
                timestamp: datetime_from_millis(BASE_TS + 10),
                user_id: "manager".into(),
            })),
            "dev-a",
            BASE_TS + 10,
        ));

        let report = service.process_batch(&batch, &caller()).await.unwrap();
        assert_eq!(report.applied, 3);

        let mut session = db.session().await.unwrap();
        let closed = session.find_account("acc-1").await.unwrap().unwrap();
        assert_eq!(closed.status, AccountStatus::Closed);
        assert_eq!(closed.closed_by.as_deref(), Some("manager"));

        let txs = session.account_transactions("acc-1").await.unwrap();
        assert_eq!(txs.len(), 2);
        assert!(txs.iter().all(|tx| tx.status == TransactionStatus::Closed));
    }

    #[tokio::test]
    async fn test_closing_unknown_account_fails() {
        let db = MemoryDatabase::new();
        let service = reconciler(&db);

        let close = op(
            EntityPayload::AccountDirective(AccountDirective::Close(AccountClose {
                account_id: "nope".into(),
                timestamp: datetime_from_millis(BASE_TS),
                user_id: "manager".into(),
            })),
            "dev-a",
            BASE_TS,
        );

        assert!(matches!(
            service.process(&close, &caller()).await.unwrap(),
            OpOutcome::Failed(_)
        ));
    }
}

/// Records every upload, optionally failing them.
#[derive(Default)]
struct RecordingUploader {
    uploads: Mutex<Vec<(String, String)>>,
    fail: bool,
}

#[async_trait]
impl DocumentUploader for RecordingUploader {
    async fn upload_csv(&self, content: &str, filename: &str) -> Result<String, UploadError> {
        if self.fail {
            return Err(UploadError::Disabled);
        }
        self.uploads
            .lock()
            .await
            .push((filename.to_string(), content.to_string()));
        Ok(format!("https://docs.example/{filename}"))
    }
}

#[cfg(test)]
mod other_entity_tests {
    use super::*;

    fn report_op() -> Operation {
        op(
            EntityPayload::ReportCreate(Report {
                filename: "sales-2024-02-01.csv".into(),
                content: "product,total\nBurger,13\n".into(),
            }),
            "dev-a",
            BASE_TS,
        )
    }

    #[tokio::test]
    async fn test_report_is_uploaded() {
        let db = MemoryDatabase::new();
        let uploader = Arc::new(RecordingUploader::default());
        let service = reconciler(&db).with_uploader(uploader.clone());

        let outcome = service.process(&report_op(), &caller()).await.unwrap();

        assert_eq!(outcome, OpOutcome::Applied);
        let uploads = uploader.uploads.lock().await;
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].0, "sales-2024-02-01.csv");
    }

    #[tokio::test]
    async fn test_report_upload_failure_is_swallowed() {
        let db = MemoryDatabase::new();
        let uploader = Arc::new(RecordingUploader {
            fail: true,
            ..Default::default()
        });
        let service = reconciler(&db).with_uploader(uploader);

        let report = report_op();
        assert_eq!(service.process(&report, &caller()).await.unwrap(), OpOutcome::Applied);
        assert_eq!(status_of(&db, &report.id).await, Some(OpStatus::Completed));
    }

    #[tokio::test]
    async fn test_cash_register_create_then_update() {
        let db = MemoryDatabase::new();
        let service = reconciler(&db);

        let opened = CashRegister {
            id: "reg-1".into(),
            status: RegisterStatus::Open,
            initial_amount: 100.0,
            final_amount: None,
            opened_at: datetime_from_millis(BASE_TS),
            closed_at: None,
            device_id: "dev-a".into(),
            user_id: String::new(),
        };
        let closed = CashRegister {
            status: RegisterStatus::Closed,
            final_amount: Some(250.0),
            closed_at: Some(datetime_from_millis(BASE_TS + 1000)),
            ..opened.clone()
        };

        let batch = vec![
            op(EntityPayload::CashRegisterCreate(opened), "dev-a", BASE_TS),
            op(EntityPayload::CashRegisterUpdate(closed), "dev-a", BASE_TS + 1000),
        ];
        service.process_batch(&batch, &caller()).await.unwrap();

        let mut session = db.session().await.unwrap();
        let register = session.find_cash_register("reg-1").await.unwrap().unwrap();
        assert_eq!(register.status, RegisterStatus::Closed);
        assert_eq!(register.final_amount, Some(250.0));
        // Empty audit user falls back to the caller.
        assert_eq!(register.user_id, "cashier-1");
    }

    #[tokio::test]
    async fn test_inventory_log_is_stored_once() {
        let db = MemoryDatabase::new();
        let service = reconciler(&db);

        let log = InventoryLog {
            id: "log-1".into(),
            product_id: "p1".into(),
            product_name: "Cola".into(),
            user_id: "cashier-1".into(),
            action: "adjust".into(),
            description: Some("recount".into()),
            timestamp: datetime_from_millis(BASE_TS),
        };
        let first = op(EntityPayload::InventoryLogCreate(log.clone()), "dev-a", BASE_TS);
        let again = op(EntityPayload::InventoryLogCreate(log), "dev-b", BASE_TS);

        assert_eq!(service.process(&first, &caller()).await.unwrap(), OpOutcome::Applied);
        assert_eq!(service.process(&again, &caller()).await.unwrap(), OpOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_sales_record_is_unique_per_source() {
        let db = MemoryDatabase::new();
        let service = reconciler(&db);

        let record = tally_engine::SalesRecord::from_items(
            SaleSource::Pos,
            "t-77",
            "cashier-1",
            &[TransactionItem::new("p1", 1, 2.0)],
            datetime_from_millis(BASE_TS),
        );
        let first = op(EntityPayload::SalesRecordCreate(record.clone()), "dev-a", BASE_TS);
        let again = op(EntityPayload::SalesRecordCreate(record), "dev-a", BASE_TS);

        assert_eq!(service.process(&first, &caller()).await.unwrap(), OpOutcome::Applied);
        assert_eq!(service.process(&again, &caller()).await.unwrap(), OpOutcome::Skipped);
    }
}
