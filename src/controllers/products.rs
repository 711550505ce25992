use actix_web::{delete, get, patch, post, web, HttpResponse, Responder, Result};
use thinkpad_store_api::cache::CatalogCache;
use thinkpad_store_api::catalog::{self, CatalogFilter};
use thinkpad_store_api::errors::StoreResult;
use thinkpad_store_api::insertables::{
    decode_all, ImagesForm, NewProductForm, ProductChanges, RemoveImagesForm,
};
use thinkpad_store_api::storage::Storage;
use thinkpad_store_api::DbPool;

#[get("/api/products")]
async fn get_products(
    pool: web::Data<DbPool>,
    cache: web::Data<CatalogCache>,
    filter: web::Query<CatalogFilter>,
) -> Result<impl Responder> {
    let filter = filter.into_inner();
    let all_products_json = web::block(move || -> StoreResult<String> {
        let generation = if filter.is_unfiltered() {
            cache.generation()
        } else {
            None
        };
        if let Some(cached) = generation.and_then(|generation| cache.catalog(generation)) {
            return Ok(cached);
        }
        let mut conn = pool.get()?;
        let all_products = catalog::list_products(&mut conn, &filter)?;
        let json = serde_json::to_string(&all_products)?;
        if let Some(generation) = generation {
            cache.store_catalog(generation, &json);
        }
        Ok(json)
    })
    .await??;

    Ok(HttpResponse::Ok()
        .content_type("application/json")
        .body(all_products_json))
}

#[get("/api/products/{product_id}")]
async fn get_product(
    pool: web::Data<DbPool>,
    product_id: web::Path<i32>,
) -> Result<impl Responder> {
    let product = web::block(move || -> StoreResult<_> {
        let mut conn = pool.get()?;
        catalog::get_product(&mut conn, *product_id)
    })
    .await??;
    Ok(HttpResponse::Ok().json(product))
}

#[post("/api/products")]
async fn create_product(
    pool: web::Data<DbPool>,
    storage: web::Data<dyn Storage>,
    cache: web::Data<CatalogCache>,
    form: web::Json<NewProductForm>,
) -> Result<impl Responder> {
    let product = web::block(move || -> StoreResult<_> {
        let mut conn = pool.get()?;
        let product = catalog::create_product(&mut conn, storage.get_ref(), form.into_inner())?;
        cache.invalidate();
        Ok(product)
    })
    .await??;
    Ok(HttpResponse::Created().json(product))
}

#[patch("/api/products/{product_id}")]
async fn update_product(
    pool: web::Data<DbPool>,
    storage: web::Data<dyn Storage>,
    cache: web::Data<CatalogCache>,
    product_id: web::Path<i32>,
    form: web::Json<ProductChanges>,
) -> Result<impl Responder> {
    let product = web::block(move || -> StoreResult<_> {
        let mut conn = pool.get()?;
        let product =
            catalog::update_product(&mut conn, storage.get_ref(), *product_id, form.into_inner())?;
        cache.invalidate();
        Ok(product)
    })
    .await??;
    Ok(HttpResponse::Ok().json(product))
}

#[post("/api/products/{product_id}/images")]
async fn add_product_images(
    pool: web::Data<DbPool>,
    storage: web::Data<dyn Storage>,
    cache: web::Data<CatalogCache>,
    product_id: web::Path<i32>,
    form: web::Json<ImagesForm>,
) -> Result<impl Responder> {
    let product = web::block(move || -> StoreResult<_> {
        let uploads = decode_all(&form.files)?;
        let mut conn = pool.get()?;
        let result = catalog::add_product_images(&mut conn, storage.get_ref(), *product_id, &uploads);
        // a partial upload still changed the stored image list
        cache.invalidate();
        result
    })
    .await??;
    Ok(HttpResponse::Ok().json(product))
}

#[delete("/api/products/{product_id}/images")]
async fn remove_product_images(
    pool: web::Data<DbPool>,
    storage: web::Data<dyn Storage>,
    cache: web::Data<CatalogCache>,
    product_id: web::Path<i32>,
    form: web::Json<RemoveImagesForm>,
) -> Result<impl Responder> {
    let product = web::block(move || -> StoreResult<_> {
        let mut conn = pool.get()?;
        let product =
            catalog::remove_product_images(&mut conn, storage.get_ref(), *product_id, &form.paths)?;
        cache.invalidate();
        Ok(product)
    })
    .await??;
    Ok(HttpResponse::Ok().json(product))
}

#[delete("/api/products/{product_id}")]
async fn delete_product(
    pool: web::Data<DbPool>,
    storage: web::Data<dyn Storage>,
    cache: web::Data<CatalogCache>,
    product_id: web::Path<i32>,
) -> Result<impl Responder> {
    let report = web::block(move || -> StoreResult<_> {
        let mut conn = pool.get()?;
        let report = catalog::delete_product(&mut conn, storage.get_ref(), *product_id)?;
        cache.invalidate();
        Ok(report)
    })
    .await??;
    Ok(HttpResponse::Ok().json(report))
}
