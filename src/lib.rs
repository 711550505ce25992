pub mod cache;
pub mod carts;
pub mod catalog;
pub mod config;
pub mod equipments;
pub mod errors;
pub mod insertables;
pub mod logging;
pub mod models;
pub mod promotions;
pub mod schema;
pub mod storage;

use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2;

pub type DbPool = r2d2::Pool<r2d2::ConnectionManager<PgConnection>>;

pub fn establish_connection(database_url: &str) -> ConnectionResult<PgConnection> {
    PgConnection::establish(database_url)
}

pub fn initialize_db_pool(database_url: &str) -> Result<DbPool, r2d2::PoolError> {
    let manager = r2d2::ConnectionManager::<PgConnection>::new(database_url);
    r2d2::Pool::builder().build(manager)
}
