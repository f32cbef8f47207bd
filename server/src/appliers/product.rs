use super::{ApplyContext, ApplyResult};
use crate::config::ProductDedup;
use tally_engine::{ApplyOutcome, Product};

/// Insert unless the product is already known. First writer wins.
///
/// Runs in one store transaction holding locks on the product's identity
/// keys, so concurrent creates of the same product are decided one at a
/// time.
pub(super) async fn create(ctx: &ApplyContext<'_>, product: &Product) -> ApplyResult {
    let mut tx = ctx.db.begin().await?;
    tx.lock_product_keys(&identity_keys(product, ctx.product_dedup))
        .await?;

    if tx.find_product(&product.id).await?.is_some() {
        tracing::debug!(product_id = %product.id, "Product already exists, skipping");
        return Ok(ApplyOutcome::Skipped);
    }

    if ctx.product_dedup == ProductDedup::NameOrBarcode {
        let existing = tx
            .find_colliding_product(&product.name, product.barcode.as_deref())
            .await?;
        if let Some(existing) = existing {
            tracing::info!(
                product_id = %product.id,
                existing_id = %existing.id,
                name = %product.name,
                "Duplicate product name or barcode, keeping existing"
            );
            return Ok(ApplyOutcome::Skipped);
        }
    }

    tx.insert_product(product).await?;
    tx.commit().await?;
    Ok(ApplyOutcome::Applied)
}

/// Keys two creates contend on when they could describe the same product.
fn identity_keys(product: &Product, dedup: ProductDedup) -> Vec<String> {
    let mut keys = vec![format!("product:id:{}", product.id)];
    if dedup == ProductDedup::NameOrBarcode {
        keys.push(format!("product:name:{}", product.name));
        if let Some(barcode) = product.barcode.as_deref().filter(|b| !b.is_empty()) {
            keys.push(format!("product:barcode:{barcode}"));
        }
    }
    keys
}

pub(super) async fn update(ctx: &ApplyContext<'_>, product: &Product) -> ApplyResult {
    let mut session = ctx.db.session().await?;
    if session.update_product(product).await? {
        Ok(ApplyOutcome::Applied)
    } else {
        tracing::debug!(product_id = %product.id, "Update for missing product, skipping");
        Ok(ApplyOutcome::Skipped)
    }
}

pub(super) async fn delete(ctx: &ApplyContext<'_>, product_id: &str) -> ApplyResult {
    let mut session = ctx.db.session().await?;
    if session.delete_product(product_id).await? {
        Ok(ApplyOutcome::Applied)
    } else {
        tracing::debug!(product_id, "Delete for missing product, skipping");
        Ok(ApplyOutcome::Skipped)
    }
}
