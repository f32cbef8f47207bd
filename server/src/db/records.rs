//! Database operations for the entity tables.

use super::pool::{parse_tag, tag};
use super::{EntityStore, PgSession, StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::Row;
use tally_engine::{
    Account, AccountTransaction, AccountTxKind, CashRegister, InventoryLog, PrepaidProduct, Product,
    SaleLine, SaleSource, SalesRecord, Transaction, TransactionItem, TransactionStatus,
};

const PRODUCT_COLUMNS: &str = "id, name, price, cost, stock, category, barcode, min_stock, \
                               supplier_id, image_url, is_active";

const ACCOUNT_TX_COLUMNS: &str = "id, account_id, account_type, kind, amount, user_id, \
                                  created_at, status, method, note, discount, items";

fn product_from_row(row: &PgRow) -> StoreResult<Product> {
    Ok(Product {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        price: row.try_get("price")?,
        cost: row.try_get("cost")?,
        stock: row.try_get("stock")?,
        category: row.try_get("category")?,
        barcode: row.try_get("barcode")?,
        min_stock: row.try_get("min_stock")?,
        supplier_id: row.try_get("supplier_id")?,
        image_url: row.try_get("image_url")?,
        is_active: row.try_get("is_active")?,
    })
}

fn account_from_row(row: &PgRow) -> StoreResult<Account> {
    Ok(Account {
        id: row.try_get("id")?,
        customer_name: row.try_get("customer_name")?,
        account_type: parse_tag("account_type", row.try_get("account_type")?)?,
        status: parse_tag("status", row.try_get("status")?)?,
        opened_at: row.try_get("opened_at")?,
        closed_at: row.try_get("closed_at")?,
        closed_by: row.try_get("closed_by")?,
        credit_limit: row.try_get("credit_limit")?,
    })
}

fn account_tx_from_row(row: &PgRow) -> StoreResult<AccountTransaction> {
    let Json(items): Json<Vec<TransactionItem>> = row.try_get("items")?;
    Ok(AccountTransaction {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        account_type: parse_tag("account_type", row.try_get("account_type")?)?,
        kind: parse_tag("kind", row.try_get("kind")?)?,
        amount: row.try_get("amount")?,
        user_id: row.try_get("user_id")?,
        created_at: row.try_get("created_at")?,
        items,
        status: parse_tag("status", row.try_get("status")?)?,
        method: row.try_get("method")?,
        note: row.try_get("note")?,
        discount: row.try_get("discount")?,
    })
}

fn register_from_row(row: &PgRow) -> StoreResult<CashRegister> {
    Ok(CashRegister {
        id: row.try_get("id")?,
        status: parse_tag("status", row.try_get("status")?)?,
        initial_amount: row.try_get("initial_amount")?,
        final_amount: row.try_get("final_amount")?,
        opened_at: row.try_get("opened_at")?,
        closed_at: row.try_get("closed_at")?,
        device_id: row.try_get("device_id")?,
        user_id: row.try_get("user_id")?,
    })
}

fn sale_from_row(row: &PgRow) -> StoreResult<SalesRecord> {
    let Json(lines): Json<Vec<SaleLine>> = row.try_get("lines")?;
    Ok(SalesRecord {
        source_id: row.try_get("source_id")?,
        source: parse_tag("source", row.try_get("source")?)?,
        user_id: row.try_get("user_id")?,
        total: row.try_get("total")?,
        lines,
        created_at: row.try_get("created_at")?,
    })
}

fn inventory_log_from_row(row: &PgRow) -> StoreResult<InventoryLog> {
    Ok(InventoryLog {
        id: row.try_get("id")?,
        product_id: row.try_get("product_id")?,
        product_name: row.try_get("product_name")?,
        user_id: row.try_get("user_id")?,
        action: row.try_get("action")?,
        description: row.try_get("description")?,
        timestamp: row.try_get("timestamp")?,
    })
}

#[async_trait]
impl EntityStore for PgSession {
    async fn find_product(&mut self, id: &str) -> StoreResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(self.conn())
            .await?;
        row.as_ref().map(product_from_row).transpose()
    }

    async fn find_colliding_product(
        &mut self,
        name: &str,
        barcode: Option<&str>,
    ) -> StoreResult<Option<Product>> {
        let barcode = barcode.filter(|b| !b.is_empty());
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE name = $1 OR ($2::TEXT IS NOT NULL AND barcode = $2) \
             LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(name)
            .bind(barcode)
            .fetch_optional(self.conn())
            .await?;
        row.as_ref().map(product_from_row).transpose()
    }

    async fn list_products(&mut self) -> StoreResult<Vec<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id");
        let rows = sqlx::query(&sql).fetch_all(self.conn()).await?;
        rows.iter().map(product_from_row).collect()
    }

    async fn lock_product_keys(&mut self, keys: &[String]) -> StoreResult<()> {
        // Every session takes the locks in the same order.
        let mut keys: Vec<&str> = keys.iter().map(String::as_str).collect();
        keys.sort_unstable();
        keys.dedup();
        for key in keys {
            sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
                .bind(key)
                .execute(self.conn())
                .await?;
        }
        Ok(())
    }

    async fn insert_product(&mut self, product: &Product) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, price, cost, stock, category, barcode,
                min_stock, supplier_id, image_url, is_active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(product.price)
        .bind(product.cost)
        .bind(product.stock)
        .bind(&product.category)
        .bind(&product.barcode)
        .bind(product.min_stock)
        .bind(&product.supplier_id)
        .bind(&product.image_url)
        .bind(product.is_active)
        .execute(self.conn())
        .await?;
        Ok(())
    }

    async fn update_product(&mut self, product: &Product) -> StoreResult<bool> {
        let done = sqlx::query(
            r#"
            UPDATE products SET
                name = $2, price = $3, cost = $4, stock = $5, category = $6,
                barcode = $7, min_stock = $8, supplier_id = $9, image_url = $10,
                is_active = $11
            WHERE id = $1
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(product.price)
        .bind(product.cost)
        .bind(product.stock)
        .bind(&product.category)
        .bind(&product.barcode)
        .bind(product.min_stock)
        .bind(&product.supplier_id)
        .bind(&product.image_url)
        .bind(product.is_active)
        .execute(self.conn())
        .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn delete_product(&mut self, id: &str) -> StoreResult<bool> {
        let done = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(self.conn())
            .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn adjust_stock(&mut self, product_id: &str, delta: i64) -> StoreResult<()> {
        let done = sqlx::query("UPDATE products SET stock = stock + $2 WHERE id = $1")
            .bind(product_id)
            .bind(delta)
            .execute(self.conn())
            .await?;
        if done.rows_affected() == 0 {
            return Err(StoreError::not_found("product", product_id));
        }
        Ok(())
    }

    async fn transaction_exists(&mut self, id: &str) -> StoreResult<bool> {
        let result: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM transactions WHERE id = $1)")
                .bind(id)
                .fetch_one(self.conn())
                .await?;
        Ok(result.0)
    }

    async fn insert_transaction(&mut self, transaction: &Transaction) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, amount, discount, payment, created_at, customer_name,
                user_id, device_id, status, items
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&transaction.id)
        .bind(transaction.amount)
        .bind(transaction.discount)
        .bind(tag(&transaction.payment))
        .bind(transaction.created_at)
        .bind(&transaction.customer_name)
        .bind(&transaction.user_id)
        .bind(&transaction.device_id)
        .bind(transaction.status.as_str())
        .bind(Json(&transaction.items))
        .execute(self.conn())
        .await?;
        Ok(())
    }

    async fn find_account(&mut self, id: &str) -> StoreResult<Option<Account>> {
        let row = sqlx::query(
            r#"
            SELECT id, customer_name, account_type, status, opened_at,
                   closed_at, closed_by, credit_limit
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.conn())
        .await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn upsert_account(&mut self, account: &Account) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (
                id, customer_name, account_type, status, opened_at,
                closed_at, closed_by, credit_limit
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                customer_name = EXCLUDED.customer_name,
                account_type = EXCLUDED.account_type,
                status = EXCLUDED.status,
                opened_at = EXCLUDED.opened_at,
                closed_at = EXCLUDED.closed_at,
                closed_by = EXCLUDED.closed_by,
                credit_limit = EXCLUDED.credit_limit
            "#,
        )
        .bind(&account.id)
        .bind(&account.customer_name)
        .bind(account.account_type.as_str())
        .bind(tag(&account.status))
        .bind(account.opened_at)
        .bind(account.closed_at)
        .bind(&account.closed_by)
        .bind(account.credit_limit)
        .execute(self.conn())
        .await?;
        Ok(())
    }

    async fn close_account(
        &mut self,
        id: &str,
        closed_at: DateTime<Utc>,
        closed_by: &str,
    ) -> StoreResult<bool> {
        let done = sqlx::query(
            "UPDATE accounts SET status = 'closed', closed_at = $2, closed_by = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(closed_at)
        .bind(closed_by)
        .execute(self.conn())
        .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn find_account_transaction(
        &mut self,
        id: &str,
    ) -> StoreResult<Option<AccountTransaction>> {
        let sql = format!("SELECT {ACCOUNT_TX_COLUMNS} FROM account_transactions WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(self.conn())
            .await?;
        row.as_ref().map(account_tx_from_row).transpose()
    }

    async fn insert_account_transaction(&mut self, tx: &AccountTransaction) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO account_transactions (
                id, account_id, account_type, kind, amount, user_id,
                created_at, status, method, note, discount, items
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(&tx.id)
        .bind(&tx.account_id)
        .bind(tx.account_type.as_str())
        .bind(tx.kind.as_str())
        .bind(tx.amount)
        .bind(&tx.user_id)
        .bind(tx.created_at)
        .bind(tx.status.as_str())
        .bind(&tx.method)
        .bind(&tx.note)
        .bind(tx.discount)
        .bind(Json(&tx.items))
        .execute(self.conn())
        .await?;
        Ok(())
    }

    async fn account_transactions(
        &mut self,
        account_id: &str,
    ) -> StoreResult<Vec<AccountTransaction>> {
        let sql = format!(
            "SELECT {ACCOUNT_TX_COLUMNS} FROM account_transactions \
             WHERE account_id = $1 ORDER BY created_at"
        );
        let rows = sqlx::query(&sql)
            .bind(account_id)
            .fetch_all(self.conn())
            .await?;
        rows.iter().map(account_tx_from_row).collect()
    }

    async fn close_account_transactions(&mut self, account_id: &str) -> StoreResult<u64> {
        let done = sqlx::query("UPDATE account_transactions SET status = $2 WHERE account_id = $1")
            .bind(account_id)
            .bind(TransactionStatus::Closed.as_str())
            .execute(self.conn())
            .await?;
        Ok(done.rows_affected())
    }

    async fn find_prepaid(
        &mut self,
        account_id: &str,
        product_id: &str,
    ) -> StoreResult<Option<PrepaidProduct>> {
        let row = sqlx::query(
            r#"
            SELECT account_id, product_id, paid, consumed
            FROM prepaid_products
            WHERE account_id = $1 AND product_id = $2
            "#,
        )
        .bind(account_id)
        .bind(product_id)
        .fetch_optional(self.conn())
        .await?;

        match row {
            Some(row) => Ok(Some(PrepaidProduct {
                account_id: row.try_get("account_id")?,
                product_id: row.try_get("product_id")?,
                paid: row.try_get("paid")?,
                consumed: row.try_get("consumed")?,
            })),
            None => Ok(None),
        }
    }

    async fn record_prepaid(
        &mut self,
        account_id: &str,
        product_id: &str,
        kind: AccountTxKind,
        quantity: i64,
    ) -> StoreResult<bool> {
        // Deltas only: concurrent movements on one row must all count.
        let query = match kind {
            AccountTxKind::Credit => sqlx::query(
                r#"
                INSERT INTO prepaid_products (account_id, product_id, paid, consumed)
                VALUES ($1, $2, $3, 0)
                ON CONFLICT (account_id, product_id) DO UPDATE SET
                    paid = prepaid_products.paid + EXCLUDED.paid
                "#,
            ),
            AccountTxKind::Debit => sqlx::query(
                r#"
                UPDATE prepaid_products
                SET consumed = consumed + $3
                WHERE account_id = $1 AND product_id = $2
                "#,
            ),
        };
        let result = query
            .bind(account_id)
            .bind(product_id)
            .bind(quantity)
            .execute(self.conn())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_cash_register(&mut self, id: &str) -> StoreResult<Option<CashRegister>> {
        let row = sqlx::query(
            r#"
            SELECT id, status, initial_amount, final_amount, opened_at,
                   closed_at, device_id, user_id
            FROM cash_registers
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.conn())
        .await?;
        row.as_ref().map(register_from_row).transpose()
    }

    async fn upsert_cash_register(&mut self, register: &CashRegister) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO cash_registers (
                id, status, initial_amount, final_amount, opened_at,
                closed_at, device_id, user_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                initial_amount = EXCLUDED.initial_amount,
                final_amount = EXCLUDED.final_amount,
                opened_at = EXCLUDED.opened_at,
                closed_at = EXCLUDED.closed_at,
                device_id = EXCLUDED.device_id,
                user_id = EXCLUDED.user_id
            "#,
        )
        .bind(&register.id)
        .bind(register.status.as_str())
        .bind(register.initial_amount)
        .bind(register.final_amount)
        .bind(register.opened_at)
        .bind(register.closed_at)
        .bind(&register.device_id)
        .bind(&register.user_id)
        .execute(self.conn())
        .await?;
        Ok(())
    }

    async fn record_sale(&mut self, record: &SalesRecord) -> StoreResult<bool> {
        let done = sqlx::query(
            r#"
            INSERT INTO sales_records (source_id, source, user_id, total, lines, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (source_id, source) DO NOTHING
            "#,
        )
        .bind(&record.source_id)
        .bind(record.source.as_str())
        .bind(&record.user_id)
        .bind(record.total)
        .bind(Json(&record.lines))
        .bind(record.created_at)
        .execute(self.conn())
        .await?;
        Ok(done.rows_affected() == 1)
    }

    async fn find_sale(
        &mut self,
        source_id: &str,
        source: SaleSource,
    ) -> StoreResult<Option<SalesRecord>> {
        let row = sqlx::query(
            r#"
            SELECT source_id, source, user_id, total, lines, created_at
            FROM sales_records
            WHERE source_id = $1 AND source = $2
            "#,
        )
        .bind(source_id)
        .bind(source.as_str())
        .fetch_optional(self.conn())
        .await?;
        row.as_ref().map(sale_from_row).transpose()
    }

    async fn find_inventory_log(&mut self, id: &str) -> StoreResult<Option<InventoryLog>> {
        let row = sqlx::query(
            r#"
            SELECT id, product_id, product_name, user_id, action, description, timestamp
            FROM inventory_logs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.conn())
        .await?;
        row.as_ref().map(inventory_log_from_row).transpose()
    }

    async fn insert_inventory_log(&mut self, log: &InventoryLog) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory_logs (
                id, product_id, product_name, user_id, action, description, timestamp
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&log.id)
        .bind(&log.product_id)
        .bind(&log.product_name)
        .bind(&log.user_id)
        .bind(&log.action)
        .bind(&log.description)
        .bind(log.timestamp)
        .execute(self.conn())
        .await?;
        Ok(())
    }
}
