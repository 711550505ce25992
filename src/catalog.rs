//! Product catalog: creation, edits, image bookkeeping and deletion.
//!
//! Files are written before the row that references them is committed and
//! purged after the row that referenced them is gone. Image uploads write
//! while holding the product's row lock, so when that transaction fails the
//! files it wrote are purged again. Purging is best-effort.

use diesel::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::equipments::parse_equipments;
use crate::errors::{StoreError, StoreResult};
use crate::insertables::{NewProduct, NewProductForm, ProductChanges, ProductChangeset, Upload};
use crate::models::{Product, DELETED_PRODUCT_IMAGE};
use crate::schema::{cart_items, products};
use crate::storage::{purge_quietly, Storage};

pub const PRODUCT_IMAGES_DIR: &str = "product_images/";

/// Stem shared by every additional image of a product, e.g. `thinkpad-x1-genx`.
pub fn image_stem(product_name: &str, product_model: &str) -> String {
    let stem = slug::slugify(format!("{} {}", product_name, product_model));
    if stem.is_empty() {
        "product".to_string()
    } else {
        stem
    }
}

impl Product {
    /// Stores `uploads` as `<stem>_<n><ext>` with `n` counting on from
    /// `images_max_ord`, appending each stored name to `images` in order.
    ///
    /// If storage fails part way, the files already stored stay recorded
    /// and the error is returned.
    pub fn add_images(&mut self, storage: &dyn Storage, uploads: &[Upload]) -> StoreResult<Vec<String>> {
        let stem = image_stem(&self.name, &self.model);
        let mut stored = Vec::with_capacity(uploads.len());
        for upload in uploads {
            let ord = self.images_max_ord + 1;
            let requested = format!("{}{}_{}{}", PRODUCT_IMAGES_DIR, stem, ord, upload.extension());
            let path = storage.save(&requested, &upload.bytes)?;
            self.images.push(path.clone());
            self.images_max_ord = ord;
            stored.push(path);
        }
        Ok(stored)
    }

    /// Drops the listed paths from `images` without touching storage and
    /// returns the ones that were present. The counter goes down by one only
    /// when the last image in the sequence is among them.
    pub fn detach_images(&mut self, paths: &[String]) -> Vec<String> {
        let top = self.images.last().cloned();
        let mut removed = Vec::new();
        for path in paths {
            if let Some(pos) = self.images.iter().position(|p| p == path) {
                removed.push(self.images.remove(pos));
            }
        }
        let top_removed = top.map_or(false, |top| removed.contains(&top));
        if top_removed && self.images_max_ord > 0 {
            self.images_max_ord -= 1;
        }
        removed
    }

    /// [`Product::detach_images`] followed by a best-effort purge of the
    /// detached files.
    pub fn remove_images(&mut self, storage: &dyn Storage, paths: &[String]) -> Vec<String> {
        let removed = self.detach_images(paths);
        for path in &removed {
            purge_quietly(storage, path);
        }
        removed
    }

    /// Every stored file belonging to this product.
    pub fn stored_files(&self) -> Vec<&str> {
        std::iter::once(self.image.as_str())
            .chain(self.images.iter().map(String::as_str))
            .filter(|path| !path.is_empty() && *path != DELETED_PRODUCT_IMAGE)
            .collect()
    }
}

fn validate_price(price: Decimal) -> StoreResult<()> {
    if price.is_sign_negative() {
        return Err(StoreError::Validation("price must not be negative".to_string()));
    }
    if price.normalize().scale() > 2 {
        return Err(StoreError::Validation(
            "price may have at most two decimal places".to_string(),
        ));
    }
    if price >= Decimal::from(100_000_000) {
        return Err(StoreError::Validation("price is too large".to_string()));
    }
    Ok(())
}

fn store_primary_image(storage: &dyn Storage, upload: &Upload) -> StoreResult<String> {
    let basename = match upload.basename() {
        "" => "image",
        name => name,
    };
    Ok(storage.save(&format!("{}{}", PRODUCT_IMAGES_DIR, basename), &upload.bytes)?)
}

/// Purges every listed file, returning how many are gone.
fn purge_all<'a>(storage: &dyn Storage, files: impl IntoIterator<Item = &'a str>) -> usize {
    files
        .into_iter()
        .filter(|file| purge_quietly(storage, file))
        .count()
}

/// Nothing points at files written by a transaction that did not commit.
fn discard_on_rollback<T>(
    storage: &dyn Storage,
    written: &[String],
    result: StoreResult<T>,
) -> StoreResult<T> {
    if result.is_err() && !written.is_empty() {
        let purged = purge_all(storage, written.iter().map(String::as_str));
        tracing::warn!(written = written.len(), purged, "discarded images of a rolled back upload");
    }
    result
}

fn load_product_for_update(conn: &mut PgConnection, product_id: i32) -> StoreResult<Product> {
    products::table
        .find(product_id)
        .select(Product::as_select())
        .for_update()
        .first(conn)
        .optional()?
        .ok_or_else(|| StoreError::not_found(format!("product {}", product_id)))
}

fn save_image_state(conn: &mut PgConnection, product: &Product) -> StoreResult<()> {
    diesel::update(products::table.find(product.id))
        .set((
            products::images.eq(&product.images),
            products::images_max_ord.eq(product.images_max_ord),
        ))
        .execute(conn)?;
    Ok(())
}

#[derive(Deserialize, Default, Debug, Clone)]
pub struct CatalogFilter {
    /// Case-insensitive substring of the name or the model.
    pub search: Option<String>,
    /// Exact model.
    pub model: Option<String>,
}

impl CatalogFilter {
    fn search_term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|term| !term.is_empty())
    }

    pub fn is_unfiltered(&self) -> bool {
        self.search_term().is_none() && self.model.is_none()
    }
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub fn list_products(conn: &mut PgConnection, filter: &CatalogFilter) -> StoreResult<Vec<Product>> {
    let mut query = products::table
        .select(Product::as_select())
        .order(products::id)
        .into_boxed();
    if let Some(term) = filter.search_term() {
        let pattern = format!("%{}%", escape_like(term));
        query = query.filter(
            products::name
                .ilike(pattern.clone())
                .or(products::model.ilike(pattern)),
        );
    }
    if let Some(model) = &filter.model {
        query = query.filter(products::model.eq(model.clone()));
    }
    Ok(query.load(conn)?)
}

pub fn get_product(conn: &mut PgConnection, product_id: i32) -> StoreResult<Product> {
    products::table
        .find(product_id)
        .select(Product::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| StoreError::not_found(format!("product {}", product_id)))
}

pub fn create_product(
    conn: &mut PgConnection,
    storage: &dyn Storage,
    form: NewProductForm,
) -> StoreResult<Product> {
    form.validate()?;
    validate_price(form.price)?;
    let equipments = parse_equipments(&form.equipments)?;
    let upload = form.image.decode()?;
    let image = store_primary_image(storage, &upload)?;

    let new_product = NewProduct {
        name: form.name,
        model: form.model,
        price: form.price,
        description: form.description,
        stock: form.stock,
        image: image.clone(),
        images: Vec::new(),
        images_max_ord: 0,
        equipments,
    };
    let created = diesel::insert_into(products::table)
        .values(&new_product)
        .returning(Product::as_returning())
        .get_result(conn);
    match created {
        Ok(product) => {
            tracing::info!(product_id = product.id, name = %product.name, "product created");
            Ok(product)
        }
        Err(err) => {
            purge_quietly(storage, &image);
            Err(err.into())
        }
    }
}

pub fn update_product(
    conn: &mut PgConnection,
    storage: &dyn Storage,
    product_id: i32,
    changes: ProductChanges,
) -> StoreResult<Product> {
    changes.validate()?;
    if let Some(price) = changes.price {
        validate_price(price)?;
    }
    let equipments = changes
        .equipments
        .as_deref()
        .map(parse_equipments)
        .transpose()?;
    let upload = changes.image.as_ref().map(|file| file.decode()).transpose()?;
    let new_image = upload
        .as_ref()
        .map(|upload| store_primary_image(storage, upload))
        .transpose()?;

    let changeset = ProductChangeset {
        name: changes.name,
        model: changes.model,
        price: changes.price,
        description: changes.description,
        stock: changes.stock,
        image: new_image.clone(),
        equipments,
    };
    let result = conn.transaction::<_, StoreError, _>(|conn| {
        let previous = load_product_for_update(conn, product_id)?;
        if changeset.is_empty() {
            return Ok((previous.clone(), previous));
        }
        let updated = diesel::update(products::table.find(product_id))
            .set(&changeset)
            .returning(Product::as_returning())
            .get_result(conn)?;
        Ok((previous, updated))
    });
    match result {
        Ok((previous, updated)) => {
            if previous.image != updated.image && previous.image != DELETED_PRODUCT_IMAGE {
                purge_quietly(storage, &previous.image);
            }
            Ok(updated)
        }
        Err(err) => {
            if let Some(image) = new_image {
                purge_quietly(storage, &image);
            }
            Err(err)
        }
    }
}

pub fn add_product_images(
    conn: &mut PgConnection,
    storage: &dyn Storage,
    product_id: i32,
    uploads: &[Upload],
) -> StoreResult<Product> {
    let mut written: Vec<String> = Vec::new();
    let transaction = conn.transaction::<_, StoreError, _>(|conn| {
        let mut product = load_product_for_update(conn, product_id)?;
        let before = product.images.len();
        let outcome = product.add_images(storage, uploads);
        written = product.images[before..].to_vec();
        save_image_state(conn, &product)?;
        Ok((product, outcome))
    });
    let (product, outcome) = discard_on_rollback(storage, &written, transaction)?;
    match outcome {
        Ok(stored) => {
            tracing::info!(product_id, added = stored.len(), max_ord = product.images_max_ord, "product images added");
            Ok(product)
        }
        Err(err) => {
            tracing::warn!(product_id, kept = product.images.len(), error = %err, "image upload stopped part way");
            Err(err)
        }
    }
}

pub fn remove_product_images(
    conn: &mut PgConnection,
    storage: &dyn Storage,
    product_id: i32,
    paths: &[String],
) -> StoreResult<Product> {
    let (product, removed) = conn.transaction::<_, StoreError, _>(|conn| {
        let mut product = load_product_for_update(conn, product_id)?;
        let removed = product.detach_images(paths);
        if !removed.is_empty() {
            save_image_state(conn, &product)?;
        }
        Ok((product, removed))
    })?;
    for path in &removed {
        purge_quietly(storage, path);
    }
    tracing::info!(product_id, removed = removed.len(), max_ord = product.images_max_ord, "product images removed");
    Ok(product)
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct DeletedProductReport {
    pub product_id: i32,
    /// Cart items whose reference now resolves to the deleted-product placeholder.
    pub repointed_items: usize,
    /// Files actually removed from storage.
    pub purged_files: usize,
}

/// Deletes a product. Clearing the cart items' references (keeping a
/// snapshot of the product on each) and removing the row commit together;
/// the product's files are purged afterwards.
pub fn delete_product(
    conn: &mut PgConnection,
    storage: &dyn Storage,
    product_id: i32,
) -> StoreResult<DeletedProductReport> {
    let (product, repointed_items) = conn.transaction::<_, StoreError, _>(|conn| {
        let product = load_product_for_update(conn, product_id)?;
        let repointed = diesel::update(cart_items::table.filter(cart_items::product_id.eq(product_id)))
            .set((
                cart_items::product_id.eq(None::<i32>),
                cart_items::product_snapshot.eq(Some(product.snapshot())),
            ))
            .execute(conn)?;
        diesel::delete(products::table.find(product_id)).execute(conn)?;
        Ok((product, repointed))
    })?;

    let files = product.stored_files();
    let purged_files = purge_all(storage, files.iter().copied());
    if purged_files < files.len() {
        tracing::warn!(product_id, files = files.len(), purged_files, "some product files were left behind");
    }
    tracing::info!(product_id, repointed_items, purged_files, "product deleted");
    Ok(DeletedProductReport {
        product_id,
        repointed_items,
        purged_files,
    })
}
