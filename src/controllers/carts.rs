use actix_web::{delete, get, patch, post, web, HttpResponse, Responder, Result};
use chrono::Utc;
use serde_json::json;
use thinkpad_store_api::carts::{self, UpsertOutcome};
use thinkpad_store_api::config::Settings;
use thinkpad_store_api::errors::StoreResult;
use thinkpad_store_api::insertables::{CartItemForm, QuantityForm};
use thinkpad_store_api::DbPool;

#[get("/api/users/{user_id}/cart")]
async fn get_cart(
    pool: web::Data<DbPool>,
    settings: web::Data<Settings>,
    user_id: web::Path<i32>,
) -> Result<impl Responder> {
    let window = settings.discount_window;
    let cart = web::block(move || -> StoreResult<_> {
        let mut conn = pool.get()?;
        carts::cart_view(&mut conn, *user_id, Utc::now(), window)
    })
    .await??;
    Ok(HttpResponse::Ok().json(cart))
}

#[post("/api/users/{user_id}/cart/items")]
async fn add_cart_item(
    pool: web::Data<DbPool>,
    user_id: web::Path<i32>,
    form: web::Json<CartItemForm>,
) -> Result<impl Responder> {
    let (item, outcome) = web::block(move || -> StoreResult<_> {
        let mut conn = pool.get()?;
        let cart = carts::cart_for_user(&mut conn, *user_id)?;
        carts::upsert_cart_item(&mut conn, cart.id, form.product_id, form.quantity)
    })
    .await??;

    let body = json!({ "item": item, "outcome": outcome });
    Ok(match outcome {
        UpsertOutcome::Inserted => HttpResponse::Created().json(body),
        UpsertOutcome::Merged => HttpResponse::Ok().json(body),
    })
}

#[patch("/api/users/{user_id}/cart/items/{item_id}")]
async fn update_cart_item(
    pool: web::Data<DbPool>,
    path: web::Path<(i32, i32)>,
    form: web::Json<QuantityForm>,
) -> Result<impl Responder> {
    let (user_id, item_id) = path.into_inner();
    let item = web::block(move || -> StoreResult<_> {
        let mut conn = pool.get()?;
        let cart = carts::cart_for_user(&mut conn, user_id)?;
        carts::set_cart_item_quantity(&mut conn, cart.id, item_id, form.quantity)
    })
    .await??;
    Ok(HttpResponse::Ok().json(item))
}

#[delete("/api/users/{user_id}/cart/items/{item_id}")]
async fn delete_cart_item(
    pool: web::Data<DbPool>,
    path: web::Path<(i32, i32)>,
) -> Result<impl Responder> {
    let (user_id, item_id) = path.into_inner();
    web::block(move || -> StoreResult<_> {
        let mut conn = pool.get()?;
        let cart = carts::cart_for_user(&mut conn, user_id)?;
        carts::remove_cart_item(&mut conn, cart.id, item_id)
    })
    .await??;
    Ok(HttpResponse::Ok().json("Cart item deleted"))
}
