use thiserror::Error;

/// Reasons a coupon code is refused at checkout.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CouponError {
    #[error("Coupon not found or inactive")]
    NotFound,

    #[error("Coupon has expired")]
    Expired,

    #[error("Minimum spend of {min_spend:.2} required for this coupon")]
    MinimumSpend { min_spend: f64 },

    #[error("Coupon usage limit reached")]
    UsageLimitReached,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Joined, human readable validation messages.
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Coupon(#[from] CouponError),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("payment gateway error: {0}")]
    Gateway(String),

    #[error("internal lock poisoned")]
    LockPoisoned,
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

impl StoreError {
    /// Maps a UNIQUE/CHECK violation to a readable conflict, passing other
    /// database errors through.
    pub fn on_constraint(err: rusqlite::Error, message: impl Into<String>) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Conflict(message.into())
            }
            _ => StoreError::Database(err),
        }
    }
}

/// Collects field errors the way a form schema would and fails with all of
/// them at once.
#[derive(Debug, Default)]
pub struct Violations(Vec<String>);

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, ok: bool, message: impl Into<String>) {
        if !ok {
            self.0.push(message.into());
        }
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.0.push(message.into());
    }

    pub fn finish(self) -> Result<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(StoreError::Validation(self.0.join(", ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn violations_join_messages() {
        let mut v = Violations::new();
        v.check(false, "Name is required");
        v.check(true, "never shown");
        v.push("Price must not be negative");

        let err = v.finish().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Name is required, Price must not be negative"
        );
    }

    #[test]
    fn minimum_spend_message_carries_amount() {
        let err = StoreError::from(CouponError::MinimumSpend { min_spend: 499.0 });
        assert_eq!(
            err.to_string(),
            "Minimum spend of 499.00 required for this coupon"
        );
    }
}
