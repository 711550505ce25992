use actix_web::{delete, get, post, web, HttpResponse, Responder, Result};
use thinkpad_store_api::carts;
use thinkpad_store_api::errors::StoreResult;
use thinkpad_store_api::insertables::NewUserForm;
use thinkpad_store_api::DbPool;

#[get("/api/users/{user_id}")]
async fn get_user(pool: web::Data<DbPool>, user_id: web::Path<i32>) -> Result<impl Responder> {
    let user = web::block(move || -> StoreResult<_> {
        let mut conn = pool.get()?;
        carts::get_user(&mut conn, *user_id)
    })
    .await??;
    Ok(HttpResponse::Ok().json(user))
}

#[post("/api/users")]
async fn create_user(
    pool: web::Data<DbPool>,
    form: web::Json<NewUserForm>,
) -> Result<impl Responder> {
    let user = web::block(move || -> StoreResult<_> {
        let mut conn = pool.get()?;
        carts::create_user_with_cart(&mut conn, form.into_inner())
    })
    .await??;
    Ok(HttpResponse::Created().json(user))
}

#[delete("/api/users/{user_id}")]
async fn delete_user(pool: web::Data<DbPool>, user_id: web::Path<i32>) -> Result<impl Responder> {
    web::block(move || -> StoreResult<_> {
        let mut conn = pool.get()?;
        carts::delete_user(&mut conn, *user_id)
    })
    .await??;
    Ok(HttpResponse::Ok().json("User deleted"))
}
