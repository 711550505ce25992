use chrono::{DateTime, Utc};
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::Jsonb;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::schema::{cart_items, carts, discount_promotions, products, users};

pub const DELETED_PRODUCT_NAME: &str = "(Deleted Product)";
pub const DELETED_PRODUCT_MODEL: &str = "N/A";
pub const DELETED_PRODUCT_DESCRIPTION: &str = "This product has been removed from the catalog.";
pub const DELETED_PRODUCT_IMAGE: &str = "product_images/deleted_product.svg";

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = users)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_vip: bool,
    pub date_joined: DateTime<Utc>,
}

/// An add-on a customer may choose together with a product.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Equipment {
    pub name: String,
    pub extra_price: Decimal,
}

#[derive(Serialize, Deserialize, AsExpression, FromSqlRow, Debug, Clone, Default, PartialEq, Eq)]
#[diesel(sql_type = Jsonb)]
#[serde(transparent)]
pub struct Equipments(pub Vec<Equipment>);

impl FromSql<Jsonb, Pg> for Equipments {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let value = <serde_json::Value as FromSql<Jsonb, Pg>>::from_sql(bytes)?;
        Ok(serde_json::from_value(value)?)
    }
}

impl ToSql<Jsonb, Pg> for Equipments {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        let value = serde_json::to_value(self)?;
        <serde_json::Value as ToSql<Jsonb, Pg>>::to_sql(&value, &mut out.reborrow())
    }
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = products)]
pub struct Product {
    pub id: i32,
    pub name: String,
    pub model: String,
    pub price: Decimal,
    pub description: String,
    pub stock: i32,
    pub image: String,
    pub images: Vec<String>,
    pub images_max_ord: i32,
    pub equipments: Equipments,
}

impl Product {
    pub fn snapshot(&self) -> ProductSnapshot {
        ProductSnapshot {
            id: self.id,
            name: self.name.clone(),
            model: self.model.clone(),
            price: self.price,
        }
    }
}

/// What a cart item remembers about a product that has since been deleted.
#[derive(Serialize, Deserialize, AsExpression, FromSqlRow, Debug, Clone, PartialEq, Eq)]
#[diesel(sql_type = Jsonb)]
pub struct ProductSnapshot {
    pub id: i32,
    pub name: String,
    pub model: String,
    pub price: Decimal,
}

impl FromSql<Jsonb, Pg> for ProductSnapshot {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let value = <serde_json::Value as FromSql<Jsonb, Pg>>::from_sql(bytes)?;
        Ok(serde_json::from_value(value)?)
    }
}

impl ToSql<Jsonb, Pg> for ProductSnapshot {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        let value = serde_json::to_value(self)?;
        <serde_json::Value as ToSql<Jsonb, Pg>>::to_sql(&value, &mut out.reborrow())
    }
}

/// Stand-in shown wherever a cart still refers to a deleted product.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DeletedProduct {
    pub name: &'static str,
    pub model: &'static str,
    pub price: Decimal,
    pub stock: i32,
    pub description: &'static str,
    pub image: &'static str,
    pub equipments: Equipments,
    pub former: Option<ProductSnapshot>,
}

impl DeletedProduct {
    pub fn new(former: Option<ProductSnapshot>) -> Self {
        DeletedProduct {
            name: DELETED_PRODUCT_NAME,
            model: DELETED_PRODUCT_MODEL,
            price: Decimal::ZERO,
            stock: 0,
            description: DELETED_PRODUCT_DESCRIPTION,
            image: DELETED_PRODUCT_IMAGE,
            equipments: Equipments::default(),
            former,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CartProduct {
    Active(Product),
    Deleted(DeletedProduct),
}

impl CartProduct {
    pub fn price(&self) -> Decimal {
        match self {
            CartProduct::Active(product) => product.price,
            CartProduct::Deleted(placeholder) => placeholder.price,
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, CartProduct::Deleted(_))
    }
}

#[derive(Queryable, Selectable, Identifiable, Associations, Serialize, Debug, Clone, PartialEq)]
#[diesel(belongs_to(User))]
#[diesel(table_name = carts)]
pub struct Cart {
    pub id: i32,
    pub user_id: i32,
}

#[derive(Queryable, Selectable, Identifiable, Associations, Serialize, Debug, Clone, PartialEq)]
#[diesel(belongs_to(Cart))]
#[diesel(table_name = cart_items)]
pub struct CartItem {
    pub id: i32,
    pub cart_id: i32,
    pub product_id: Option<i32>,
    pub quantity: i32,
    pub product_snapshot: Option<ProductSnapshot>,
}

impl CartItem {
    /// Resolves the item's product reference. `product` is the row loaded for
    /// `product_id`, if any.
    pub fn resolve(&self, product: Option<&Product>) -> CartProduct {
        match (self.product_id, product) {
            (Some(id), Some(product)) if product.id == id => CartProduct::Active(product.clone()),
            _ => CartProduct::Deleted(DeletedProduct::new(self.product_snapshot.clone())),
        }
    }
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = discount_promotions)]
pub struct DiscountPromotion {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// Tenths of the price still paid: 8 means 20% off.
    pub discount: i16,
}
