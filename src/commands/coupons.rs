use crate::error::{CouponError, Result, StoreError, Violations};
use crate::models::{AppliedCoupon, Coupon, CouponInput, CouponKind, CouponResult};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};

const COUPON_COLUMNS: &str =
    "id, code, kind, value, expiry_date, min_spend, usage_limit, usage_count, is_active, is_deleted, created_at";

fn map_coupon(row: &rusqlite::Row<'_>) -> rusqlite::Result<Coupon> {
    let kind: String = row.get(2)?;
    let kind = CouponKind::parse(&kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown coupon kind {kind:?}").into(),
        )
    })?;

    Ok(Coupon {
        id: row.get(0)?,
        code: row.get(1)?,
        kind,
        value: row.get(3)?,
        expiry_date: row.get(4)?,
        min_spend: row.get(5)?,
        usage_limit: row.get(6)?,
        usage_count: row.get(7)?,
        is_active: row.get(8)?,
        is_deleted: row.get(9)?,
        created_at: row.get(10)?,
    })
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

fn validate(input: &CouponInput) -> Result<()> {
    let mut v = Violations::new();
    let code = normalize_code(&input.code);
    v.check(!code.is_empty(), "Coupon code is required");
    v.check(
        code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
        "Coupon code may only contain letters, digits, '-' and '_'",
    );

    match input.kind {
        CouponKind::Percentage => v.check(
            input.value > 0.0 && input.value <= 100.0,
            "Percentage must be between 0 and 100",
        ),
        CouponKind::Fixed => v.check(input.value > 0.0, "Discount value must be positive"),
    }

    if let Some(min) = input.min_spend {
        v.check(min >= 0.0, "Minimum spend must not be negative");
    }
    if let Some(limit) = input.usage_limit {
        v.check(limit > 0, "Usage limit must be positive");
    }
    v.finish()
}

/// Raw discount for a coupon, clamped into `[0, subtotal]`.
pub fn compute_discount(kind: CouponKind, value: f64, subtotal: f64) -> f64 {
    let subtotal = subtotal.max(0.0);
    let discount = match kind {
        CouponKind::Fixed => value,
        CouponKind::Percentage => subtotal * value / 100.0,
    };
    discount.min(subtotal).max(0.0)
}

/// Checks the coupon's gates against a cart and returns the discount.
/// Expiry is checked first and wins over every other refusal.
pub fn evaluate_coupon(coupon: &Coupon, subtotal: f64, now: DateTime<Utc>) -> Result<f64, CouponError> {
    if coupon.expiry_date < now {
        return Err(CouponError::Expired);
    }
    if !coupon.is_active || coupon.is_deleted {
        return Err(CouponError::NotFound);
    }
    if let Some(min_spend) = coupon.min_spend {
        if subtotal < min_spend {
            return Err(CouponError::MinimumSpend { min_spend });
        }
    }
    if let Some(limit) = coupon.usage_limit {
        if coupon.usage_count >= limit {
            return Err(CouponError::UsageLimitReached);
        }
    }

    Ok(compute_discount(coupon.kind, coupon.value, subtotal))
}

/// Looks up an active coupon by code and prices it against `subtotal`.
/// Has no side effects.
pub fn apply_coupon(conn: &Connection, code: &str, subtotal: f64, now: DateTime<Utc>) -> Result<AppliedCoupon> {
    let code = normalize_code(code);
    let coupon = conn
        .query_row(
            &format!(
                "SELECT {COUPON_COLUMNS} FROM coupons
                 WHERE code = ?1 AND is_active = 1 AND is_deleted = 0"
            ),
            [&code],
            map_coupon,
        )
        .optional()?
        .ok_or(CouponError::NotFound)?;

    match evaluate_coupon(&coupon, subtotal, now) {
        Ok(discount) => Ok(AppliedCoupon { coupon, discount }),
        Err(e) => {
            tracing::info!(%code, subtotal, reason = %e, "coupon refused");
            Err(e.into())
        }
    }
}

/// Flattens a coupon check into the shape the checkout page renders.
pub fn coupon_result(outcome: Result<AppliedCoupon>) -> Result<CouponResult> {
    match outcome {
        Ok(applied) => Ok(CouponResult {
            success: true,
            discount: applied.discount,
            coupon: Some(applied.coupon),
            message: None,
        }),
        Err(StoreError::Coupon(e)) => Ok(CouponResult {
            success: false,
            coupon: None,
            discount: 0.0,
            message: Some(e.to_string()),
        }),
        Err(e) => Err(e),
    }
}

pub fn record_coupon_use(conn: &Connection, coupon_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE coupons SET usage_count = usage_count + 1 WHERE id = ?1",
        [coupon_id],
    )?;
    Ok(())
}

pub fn get_coupon(conn: &Connection, id: i64) -> Result<Coupon> {
    conn.query_row(
        &format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE id = ?1"),
        [id],
        map_coupon,
    )
    .optional()?
    .ok_or(StoreError::NotFound("Coupon"))
}

pub fn list_coupons(conn: &Connection, include_deleted: bool) -> Result<Vec<Coupon>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COUPON_COLUMNS} FROM coupons
         WHERE ?1 OR is_deleted = 0
         ORDER BY created_at DESC, id DESC"
    ))?;

    let coupons = stmt
        .query_map([include_deleted], map_coupon)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(coupons)
}

pub fn create_coupon(conn: &Connection, input: CouponInput) -> Result<Coupon> {
    validate(&input)?;
    let code = normalize_code(&input.code);

    conn.execute(
        "INSERT INTO coupons (code, kind, value, expiry_date, min_spend, usage_limit, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            code,
            input.kind.as_str(),
            input.value,
            input.expiry_date,
            input.min_spend,
            input.usage_limit,
            input.is_active.unwrap_or(true),
        ],
    )
    .map_err(|e| StoreError::on_constraint(e, format!("Coupon code {code} already exists")))?;

    let id = conn.last_insert_rowid();
    tracing::info!(id, %code, kind = input.kind.as_str(), "coupon created");
    get_coupon(conn, id)
}

pub fn update_coupon(conn: &Connection, id: i64, input: CouponInput) -> Result<Coupon> {
    validate(&input)?;
    let existing = get_coupon(conn, id)?;
    let code = normalize_code(&input.code);

    conn.execute(
        "UPDATE coupons
         SET code = ?1, kind = ?2, value = ?3, expiry_date = ?4, min_spend = ?5, usage_limit = ?6, is_active = ?7
         WHERE id = ?8",
        rusqlite::params![
            code,
            input.kind.as_str(),
            input.value,
            input.expiry_date,
            input.min_spend,
            input.usage_limit,
            input.is_active.unwrap_or(existing.is_active),
            id,
        ],
    )
    .map_err(|e| StoreError::on_constraint(e, format!("Coupon code {code} already exists")))?;

    get_coupon(conn, id)
}

pub fn soft_delete_coupon(conn: &Connection, id: i64) -> Result<()> {
    let changed = conn.execute(
        "UPDATE coupons SET is_deleted = 1, is_active = 0 WHERE id = ?1",
        [id],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound("Coupon"));
    }
    tracing::info!(id, "coupon soft deleted");
    Ok(())
}

pub fn delete_coupon(conn: &Connection, id: i64) -> Result<()> {
    let changed = conn.execute("DELETE FROM coupons WHERE id = ?1", [id])?;
    if changed == 0 {
        return Err(StoreError::NotFound("Coupon"));
    }
    tracing::info!(id, "coupon deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn coupon(kind: CouponKind, value: f64) -> Coupon {
        Coupon {
            id: 1,
            code: "SAVE".into(),
            kind,
            value,
            expiry_date: Utc::now() + Duration::days(30),
            min_spend: None,
            usage_limit: None,
            usage_count: 0,
            is_active: true,
            is_deleted: false,
            created_at: String::new(),
        }
    }

    #[test]
    fn percentage_discount() {
        assert_eq!(compute_discount(CouponKind::Percentage, 20.0, 1000.0), 200.0);
    }

    #[test]
    fn fixed_discount_is_clamped_to_subtotal() {
        assert_eq!(compute_discount(CouponKind::Fixed, 500.0, 300.0), 300.0);
        assert_eq!(compute_discount(CouponKind::Fixed, 50.0, 300.0), 50.0);
    }

    #[test]
    fn expired_coupon_fails_regardless_of_other_fields() {
        let mut c = coupon(CouponKind::Fixed, 10.0);
        c.expiry_date = Utc::now() - Duration::minutes(1);
        c.min_spend = Some(1_000_000.0);
        c.usage_limit = Some(1);
        c.usage_count = 5;
        c.is_active = false;

        assert_eq!(evaluate_coupon(&c, 10.0, Utc::now()), Err(CouponError::Expired));
    }

    #[test]
    fn minimum_spend_gate() {
        let mut c = coupon(CouponKind::Percentage, 10.0);
        c.min_spend = Some(500.0);

        assert_eq!(
            evaluate_coupon(&c, 499.0, Utc::now()),
            Err(CouponError::MinimumSpend { min_spend: 500.0 })
        );
        assert_eq!(evaluate_coupon(&c, 500.0, Utc::now()), Ok(50.0));
    }

    #[test]
    fn usage_limit_gate() {
        let mut c = coupon(CouponKind::Fixed, 10.0);
        c.usage_limit = Some(2);
        c.usage_count = 2;
        assert_eq!(
            evaluate_coupon(&c, 100.0, Utc::now()),
            Err(CouponError::UsageLimitReached)
        );
    }

    #[test]
    fn codes_are_normalized() {
        assert_eq!(normalize_code("  summer10 "), "SUMMER10");
    }

    proptest! {
        #[test]
        fn discount_stays_within_subtotal(
            percentage in any::<bool>(),
            value in 0.0f64..100_000.0,
            subtotal in 0.0f64..1_000_000.0,
        ) {
            let kind = if percentage { CouponKind::Percentage } else { CouponKind::Fixed };
            let value = if percentage { value % 100.0 } else { value };
            let discount = compute_discount(kind, value, subtotal);
            prop_assert!(discount >= 0.0);
            prop_assert!(discount <= subtotal);
        }
    }
}
