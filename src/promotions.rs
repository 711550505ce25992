use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;
use validator::Validate;

use crate::errors::{StoreError, StoreResult};
use crate::insertables::{DiscountPromotionForm, NewDiscountPromotion};
use crate::models::DiscountPromotion;
use crate::schema::discount_promotions::dsl::*;

/// Which promotions count as running at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscountWindow {
    /// `start_date >= now AND end_date <= now`, the predicate the store has
    /// always used. Only a promotion whose window collapses onto `now`
    /// matches it.
    #[default]
    Legacy,
    /// `start_date <= now AND end_date >= now`.
    Containing,
}

impl FromStr for DiscountWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" => Ok(DiscountWindow::Legacy),
            "containing" => Ok(DiscountWindow::Containing),
            other => Err(format!(
                "unknown discount window `{}` (expected `legacy` or `containing`)",
                other
            )),
        }
    }
}

impl fmt::Display for DiscountWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscountWindow::Legacy => f.write_str("legacy"),
            DiscountWindow::Containing => f.write_str("containing"),
        }
    }
}

impl DiscountPromotion {
    /// Fraction of the price still paid. A discount of 8 gives 0.8.
    pub fn rate(&self) -> Decimal {
        Decimal::from(self.discount) / Decimal::TEN
    }

    pub fn is_active_at(&self, now: DateTime<Utc>, window: DiscountWindow) -> bool {
        match window {
            DiscountWindow::Legacy => self.start_date >= now && self.end_date <= now,
            DiscountWindow::Containing => self.start_date <= now && self.end_date >= now,
        }
    }
}

/// Product of the rates of every promotion given; stacking is multiplicative.
pub fn combined_rate<'a>(promotions: impl IntoIterator<Item = &'a DiscountPromotion>) -> Decimal {
    promotions
        .into_iter()
        .fold(Decimal::ONE, |acc, promotion| acc * promotion.rate())
}

pub fn active_discount_promotions(
    conn: &mut PgConnection,
    now: DateTime<Utc>,
    window: DiscountWindow,
) -> StoreResult<Vec<DiscountPromotion>> {
    let query = discount_promotions
        .select(DiscountPromotion::as_select())
        .order(id)
        .into_boxed();
    let query = match window {
        DiscountWindow::Legacy => query.filter(start_date.ge(now).and(end_date.le(now))),
        DiscountWindow::Containing => query.filter(start_date.le(now).and(end_date.ge(now))),
    };
    Ok(query.load(conn)?)
}

pub fn list_promotions(conn: &mut PgConnection) -> StoreResult<Vec<DiscountPromotion>> {
    Ok(discount_promotions
        .select(DiscountPromotion::as_select())
        .order(id)
        .load(conn)?)
}

pub fn build_promotion(
    form: DiscountPromotionForm,
    now: DateTime<Utc>,
) -> StoreResult<NewDiscountPromotion> {
    form.validate()?;
    let starts = form.start_date.unwrap_or(now);
    if form.end_date < starts {
        return Err(StoreError::Validation(
            "end_date must not be before start_date".to_string(),
        ));
    }
    Ok(NewDiscountPromotion {
        name: form.name,
        description: form.description,
        start_date: starts,
        end_date: form.end_date,
        discount: form.discount,
    })
}

pub fn create_promotion(
    conn: &mut PgConnection,
    form: DiscountPromotionForm,
) -> StoreResult<DiscountPromotion> {
    let new_promotion = build_promotion(form, Utc::now())?;
    let created = diesel::insert_into(discount_promotions)
        .values(&new_promotion)
        .returning(DiscountPromotion::as_returning())
        .get_result(conn)?;
    tracing::info!(promotion_id = created.id, discount = created.discount, "promotion created");
    Ok(created)
}

pub fn delete_promotion(conn: &mut PgConnection, promotion_id: i32) -> StoreResult<()> {
    let deleted = diesel::delete(discount_promotions.filter(id.eq(promotion_id))).execute(conn)?;
    if deleted == 0 {
        return Err(StoreError::not_found(format!("promotion {}", promotion_id)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn promotion(discount_value: i16, start: DateTime<Utc>, end: DateTime<Utc>) -> DiscountPromotion {
        DiscountPromotion {
            id: 1,
            name: "Back to school".to_string(),
            description: String::new(),
            start_date: start,
            end_date: end,
            discount: discount_value,
        }
    }

    #[test]
    fn discount_eight_pays_eighty_percent() {
        let now = Utc::now();
        assert_eq!(promotion(8, now, now).rate(), dec!(0.8));
        assert_eq!(promotion(10, now, now).rate(), Decimal::ONE);
        assert_eq!(promotion(0, now, now).rate(), Decimal::ZERO);
    }

    #[test]
    fn rates_stack_multiplicatively() {
        let now = Utc::now();
        let both = [promotion(8, now, now), promotion(5, now, now)];
        assert_eq!(combined_rate(&both), dec!(0.4));
        assert_eq!(combined_rate(&[]), Decimal::ONE);
    }

    #[test]
    fn legacy_window_is_kept_as_written() {
        let now = Utc::now();
        let running = promotion(8, now - Duration::days(1), now + Duration::days(1));
        assert!(!running.is_active_at(now, DiscountWindow::Legacy));
        assert!(running.is_active_at(now, DiscountWindow::Containing));

        let reversed = promotion(8, now + Duration::days(1), now - Duration::days(1));
        assert!(reversed.is_active_at(now, DiscountWindow::Legacy));
        assert!(!reversed.is_active_at(now, DiscountWindow::Containing));
    }

    #[test]
    fn window_parses_from_settings() {
        assert_eq!("Containing".parse::<DiscountWindow>(), Ok(DiscountWindow::Containing));
        assert_eq!(" legacy ".parse::<DiscountWindow>(), Ok(DiscountWindow::Legacy));
        assert!("between".parse::<DiscountWindow>().is_err());
        assert_eq!(DiscountWindow::default().to_string(), "legacy");
    }

    #[test]
    fn promotion_form_defaults_start_and_checks_order() {
        let now = Utc::now();
        let form = DiscountPromotionForm {
            name: "Spring".to_string(),
            description: String::new(),
            start_date: None,
            end_date: now + Duration::days(7),
            discount: 9,
        };
        let built = build_promotion(form.clone(), now).unwrap();
        assert_eq!(built.start_date, now);

        let backwards = DiscountPromotionForm {
            end_date: now - Duration::days(1),
            ..form.clone()
        };
        assert!(matches!(build_promotion(backwards, now), Err(StoreError::Validation(_))));

        let too_deep = DiscountPromotionForm { discount: 11, ..form };
        assert!(matches!(build_promotion(too_deep, now), Err(StoreError::Validation(_))));
    }
}
