mod controllers {
    pub mod carts;
    pub mod products;
    pub mod promotions;
    pub mod users;
}
use actix_web::{middleware::Logger, web, App, HttpServer};
use controllers::carts;
use controllers::products;
use controllers::promotions;
use controllers::users;
use std::io;
use std::sync::Arc;
use thinkpad_store_api::cache::CatalogCache;
use thinkpad_store_api::config::Settings;
use thinkpad_store_api::initialize_db_pool;
use thinkpad_store_api::logging::init_tracing;
use thinkpad_store_api::storage::{ensure_deleted_product_image, FileSystemStorage, Storage};

// product images arrive base64-encoded inside JSON bodies
const JSON_LIMIT: usize = 32 * 1024 * 1024;

#[actix_web::main]
async fn main() -> io::Result<()> {
    let settings = Settings::from_env().map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
    init_tracing(settings.log_format);

    let db_pool = initialize_db_pool(&settings.database_url)
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
    let storage: Arc<dyn Storage> = Arc::new(FileSystemStorage::new(
        settings.media_root.clone(),
        settings.media_url.clone(),
    ));
    ensure_deleted_product_image(storage.as_ref())?;
    let cache = initialize_catalog_cache(&settings);

    tracing::info!(
        host = %settings.host,
        port = settings.port,
        discount_window = %settings.discount_window,
        catalog_cache = cache.is_enabled(),
        "starting store api"
    );
    let bind = (settings.host.clone(), settings.port);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(web::JsonConfig::default().limit(JSON_LIMIT))
            .app_data(web::Data::new(db_pool.clone()))
            .app_data(web::Data::from(storage.clone()))
            .app_data(web::Data::new(cache.clone()))
            .app_data(web::Data::new(settings.clone()))
            .service(users::get_user)
            .service(users::create_user)
            .service(users::delete_user)
            .service(products::get_products)
            .service(products::get_product)
            .service(products::create_product)
            .service(products::update_product)
            .service(products::add_product_images)
            .service(products::remove_product_images)
            .service(products::delete_product)
            .service(carts::get_cart)
            .service(carts::add_cart_item)
            .service(carts::update_cart_item)
            .service(carts::delete_cart_item)
            .service(promotions::get_promotions)
            .service(promotions::create_promotion)
            .service(promotions::delete_promotion)
    })
    .bind(bind)?
    .run()
    .await
}

fn initialize_catalog_cache(settings: &Settings) -> CatalogCache {
    let Some(redis_url) = settings.redis_url.as_deref() else {
        return CatalogCache::disabled();
    };
    match CatalogCache::connect(redis_url, settings.catalog_cache_ttl_secs) {
        Ok(cache) => cache,
        Err(err) => {
            tracing::warn!(error = %err, "redis unavailable, catalog cache disabled");
            CatalogCache::disabled()
        }
    }
}
