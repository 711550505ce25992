use std::collections::HashMap;

use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use validator::Validate;

use crate::errors::{StoreError, StoreResult};
use crate::insertables::{NewCart, NewCartItem, NewUser, NewUserForm};
use crate::models::{Cart, CartItem, CartProduct, DiscountPromotion, Product, User};
use crate::promotions::{active_discount_promotions, combined_rate, DiscountWindow};
use crate::schema::{cart_items, carts, products, users};

fn hash_password(password: &str) -> StoreResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| StoreError::PasswordHash(err.to_string()))
}

/// Inserts a user and the user's cart in one transaction.
pub fn create_user_with_cart(conn: &mut PgConnection, form: NewUserForm) -> StoreResult<User> {
    form.validate()?;
    let new_user = NewUser {
        username: form.username,
        email: form.email.trim().to_lowercase(),
        password_hash: hash_password(&form.password)?,
        is_vip: form.is_vip,
    };
    let user = conn.transaction::<_, StoreError, _>(|conn| {
        let user: User = diesel::insert_into(users::table)
            .values(&new_user)
            .returning(User::as_returning())
            .get_result(conn)?;
        diesel::insert_into(carts::table)
            .values(&NewCart { user_id: user.id })
            .execute(conn)?;
        Ok(user)
    })?;
    tracing::info!(user_id = user.id, username = %user.username, "user registered with cart");
    Ok(user)
}

pub fn get_user(conn: &mut PgConnection, user_id: i32) -> StoreResult<User> {
    users::table
        .find(user_id)
        .select(User::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| StoreError::not_found(format!("user {}", user_id)))
}

/// Deleting the user cascades to the cart and its items.
pub fn delete_user(conn: &mut PgConnection, user_id: i32) -> StoreResult<()> {
    let deleted = diesel::delete(users::table.find(user_id)).execute(conn)?;
    if deleted == 0 {
        return Err(StoreError::not_found(format!("user {}", user_id)));
    }
    Ok(())
}

pub fn cart_for_user(conn: &mut PgConnection, user_id: i32) -> StoreResult<Cart> {
    carts::table
        .filter(carts::user_id.eq(user_id))
        .select(Cart::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| StoreError::not_found(format!("cart of user {}", user_id)))
}

/// Largest quantity a single cart item may hold. The database enforces the
/// same bound, so a merge can never overflow the column.
pub const MAX_ITEM_QUANTITY: i32 = 1_000_000;

fn validate_quantity(quantity: i32) -> StoreResult<()> {
    if !(1..=MAX_ITEM_QUANTITY).contains(&quantity) {
        return Err(StoreError::Validation(format!(
            "quantity must be between 1 and {}",
            MAX_ITEM_QUANTITY
        )));
    }
    Ok(())
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    /// No item existed for the (cart, product) pair; a row was created.
    Inserted,
    /// The existing row's quantity was increased; no new row exists.
    Merged,
}

impl UpsertOutcome {
    /// Quantities are at least one, so an existing row always ends up above
    /// `delta`.
    pub fn from_quantities(resulting: i32, delta: i32) -> Self {
        if resulting == delta {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Merged
        }
    }
}

/// Adds `delta` of a product to a cart.
///
/// A merge that would take the row past [`MAX_ITEM_QUANTITY`] fails the
/// column's check constraint and is reported as a validation error.
///
/// Returns the single row for the pair after the call together with whether
/// it was created or merged into. The insert-or-increment is one statement,
/// so concurrent calls for the same pair cannot produce a second row or lose
/// an increment.
pub fn upsert_cart_item(
    conn: &mut PgConnection,
    cart_id: i32,
    product_id: i32,
    delta: i32,
) -> StoreResult<(CartItem, UpsertOutcome)> {
    validate_quantity(delta)?;
    let product_exists: bool = diesel::select(diesel::dsl::exists(products::table.find(product_id)))
        .get_result(conn)?;
    if !product_exists {
        return Err(StoreError::not_found(format!("product {}", product_id)));
    }

    let new_item = NewCartItem {
        cart_id,
        product_id,
        quantity: delta,
    };
    let item: CartItem = diesel::insert_into(cart_items::table)
        .values(&new_item)
        .on_conflict((cart_items::cart_id, cart_items::product_id))
        .do_update()
        .set(cart_items::quantity.eq(cart_items::quantity + excluded(cart_items::quantity)))
        .returning(CartItem::as_returning())
        .get_result(conn)?;
    let outcome = UpsertOutcome::from_quantities(item.quantity, delta);
    tracing::debug!(cart_id, product_id, item_id = item.id, quantity = item.quantity, ?outcome, "cart item upserted");
    Ok((item, outcome))
}

/// Sets an existing item's quantity. Never merges.
pub fn set_cart_item_quantity(
    conn: &mut PgConnection,
    cart_id: i32,
    item_id: i32,
    quantity: i32,
) -> StoreResult<CartItem> {
    validate_quantity(quantity)?;
    diesel::update(
        cart_items::table
            .filter(cart_items::id.eq(item_id))
            .filter(cart_items::cart_id.eq(cart_id)),
    )
    .set(cart_items::quantity.eq(quantity))
    .returning(CartItem::as_returning())
    .get_result(conn)
    .optional()?
    .ok_or_else(|| StoreError::not_found(format!("cart item {}", item_id)))
}

pub fn remove_cart_item(conn: &mut PgConnection, cart_id: i32, item_id: i32) -> StoreResult<()> {
    let deleted = diesel::delete(
        cart_items::table
            .filter(cart_items::id.eq(item_id))
            .filter(cart_items::cart_id.eq(cart_id)),
    )
    .execute(conn)?;
    if deleted == 0 {
        return Err(StoreError::not_found(format!("cart item {}", item_id)));
    }
    Ok(())
}

/// Rounds a money amount to cents, halves away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// `quantity * price`, before any promotion.
pub fn original_total_price(quantity: i32, unit_price: Decimal) -> Decimal {
    Decimal::from(quantity) * unit_price
}

/// `quantity * price * rate`, rounded to cents.
pub fn discounted_total_price(quantity: i32, unit_price: Decimal, rate: Decimal) -> Decimal {
    round_money(original_total_price(quantity, unit_price) * rate)
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CartItemView {
    pub id: i32,
    pub quantity: i32,
    pub product: CartProduct,
    pub original_total_price: Decimal,
    pub total_price: Decimal,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CartView {
    pub id: i32,
    pub user_id: i32,
    pub items: Vec<CartItemView>,
    pub total_price: Decimal,
    /// Promotions that were applied to every item.
    pub promotions: Vec<DiscountPromotion>,
}

/// Assembles the view from already loaded rows. `catalog` holds the products
/// the items still point to.
pub fn build_cart_view(
    cart: &Cart,
    items: &[CartItem],
    catalog: &HashMap<i32, Product>,
    promotions: Vec<DiscountPromotion>,
) -> CartView {
    let rate = combined_rate(&promotions);
    let items: Vec<CartItemView> = items
        .iter()
        .map(|item| {
            let product = item.resolve(item.product_id.and_then(|id| catalog.get(&id)));
            let unit_price = product.price();
            CartItemView {
                id: item.id,
                quantity: item.quantity,
                original_total_price: original_total_price(item.quantity, unit_price),
                total_price: discounted_total_price(item.quantity, unit_price, rate),
                product,
            }
        })
        .collect();
    let total_price = items.iter().map(|item| item.total_price).sum();
    CartView {
        id: cart.id,
        user_id: cart.user_id,
        items,
        total_price,
        promotions,
    }
}

pub fn cart_view(
    conn: &mut PgConnection,
    user_id: i32,
    now: DateTime<Utc>,
    window: DiscountWindow,
) -> StoreResult<CartView> {
    let cart = cart_for_user(conn, user_id)?;
    let items: Vec<CartItem> = CartItem::belonging_to(&cart)
        .select(CartItem::as_select())
        .order(cart_items::id)
        .load(conn)?;
    let product_ids: Vec<i32> = items.iter().filter_map(|item| item.product_id).collect();
    let catalog: HashMap<i32, Product> = products::table
        .filter(products::id.eq_any(&product_ids))
        .select(Product::as_select())
        .load(conn)?
        .into_iter()
        .map(|product| (product.id, product))
        .collect();
    let promotions = active_discount_promotions(conn, now, window)?;
    Ok(build_cart_view(&cart, &items, &catalog, promotions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Equipments, ProductSnapshot};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn product(id: i32, price: Decimal) -> Product {
        Product {
            id,
            name: format!("ThinkPad {}", id),
            model: "T".to_string(),
            price,
            description: String::new(),
            stock: 1,
            image: String::new(),
            images: Vec::new(),
            images_max_ord: 0,
            equipments: Equipments::default(),
        }
    }

    fn item(id: i32, product_id: Option<i32>, quantity: i32) -> CartItem {
        CartItem {
            id,
            cart_id: 1,
            product_id,
            quantity,
            product_snapshot: None,
        }
    }

    fn promotion(discount: i16) -> DiscountPromotion {
        let now = Utc::now();
        DiscountPromotion {
            id: discount as i32,
            name: format!("{} tenths", discount),
            description: String::new(),
            start_date: now,
            end_date: now + Duration::days(1),
            discount,
        }
    }

    #[test]
    fn quantities_are_bounded() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(MAX_ITEM_QUANTITY).is_ok());
        assert!(matches!(validate_quantity(0), Err(StoreError::Validation(_))));
        assert!(matches!(validate_quantity(i32::MAX), Err(StoreError::Validation(_))));
        // two maximal quantities still fit the column
        assert!(MAX_ITEM_QUANTITY.checked_mul(2).is_some());
    }

    #[test]
    fn outcome_follows_resulting_quantity() {
        assert_eq!(UpsertOutcome::from_quantities(2, 2), UpsertOutcome::Inserted);
        assert_eq!(UpsertOutcome::from_quantities(5, 2), UpsertOutcome::Merged);
    }

    #[test]
    fn totals_without_promotions() {
        let cart = Cart { id: 1, user_id: 9 };
        let catalog = HashMap::from([(1, product(1, dec!(10.50))), (2, product(2, dec!(3.00)))]);
        let view = build_cart_view(&cart, &[item(1, Some(1), 2), item(2, Some(2), 3)], &catalog, vec![]);
        assert_eq!(view.items[0].total_price, dec!(21.00));
        assert_eq!(view.items[1].total_price, dec!(9.00));
        assert_eq!(view.total_price, dec!(30.00));
    }

    #[test]
    fn promotions_multiply_item_totals() {
        let cart = Cart { id: 1, user_id: 9 };
        let catalog = HashMap::from([(1, product(1, dec!(100.00)))]);
        let view = build_cart_view(
            &cart,
            &[item(1, Some(1), 1)],
            &catalog,
            vec![promotion(8), promotion(9)],
        );
        assert_eq!(view.items[0].original_total_price, dec!(100.00));
        assert_eq!(view.items[0].total_price, dec!(72.00));
        assert_eq!(view.total_price, dec!(72.00));
    }

    #[test]
    fn deleted_products_cost_nothing() {
        let cart = Cart { id: 1, user_id: 9 };
        let mut gone = item(1, None, 4);
        gone.product_snapshot = Some(ProductSnapshot {
            id: 5,
            name: "ThinkPad 5".to_string(),
            model: "T".to_string(),
            price: dec!(999.00),
        });
        let catalog = HashMap::from([(2, product(2, dec!(1.25)))]);
        let view = build_cart_view(&cart, &[gone, item(2, Some(2), 2)], &catalog, vec![]);
        assert!(view.items[0].product.is_deleted());
        assert_eq!(view.items[0].total_price, Decimal::ZERO);
        assert_eq!(view.total_price, dec!(2.50));
    }

    #[test]
    fn money_rounds_half_away_from_zero() {
        assert_eq!(round_money(dec!(0.125)), dec!(0.13));
        assert_eq!(discounted_total_price(3, dec!(0.33), dec!(0.5)), dec!(0.50));
    }

    #[test]
    fn password_hash_is_argon2() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert_ne!(hash, hash_password("correct horse battery").unwrap());
    }
}
