use actix_web::{delete, get, post, web, HttpResponse, Responder, Result};
use thinkpad_store_api::errors::StoreResult;
use thinkpad_store_api::insertables::DiscountPromotionForm;
use thinkpad_store_api::promotions;
use thinkpad_store_api::DbPool;

#[get("/api/promotions")]
async fn get_promotions(pool: web::Data<DbPool>) -> Result<impl Responder> {
    let all_promotions = web::block(move || -> StoreResult<_> {
        let mut conn = pool.get()?;
        promotions::list_promotions(&mut conn)
    })
    .await??;
    Ok(HttpResponse::Ok().json(all_promotions))
}

#[post("/api/promotions")]
async fn create_promotion(
    pool: web::Data<DbPool>,
    form: web::Json<DiscountPromotionForm>,
) -> Result<impl Responder> {
    let promotion = web::block(move || -> StoreResult<_> {
        let mut conn = pool.get()?;
        promotions::create_promotion(&mut conn, form.into_inner())
    })
    .await??;
    Ok(HttpResponse::Created().json(promotion))
}

#[delete("/api/promotions/{promotion_id}")]
async fn delete_promotion(
    pool: web::Data<DbPool>,
    promotion_id: web::Path<i32>,
) -> Result<impl Responder> {
    web::block(move || -> StoreResult<_> {
        let mut conn = pool.get()?;
        promotions::delete_promotion(&mut conn, *promotion_id)
    })
    .await??;
    Ok(HttpResponse::Ok().json("Promotion deleted"))
}
