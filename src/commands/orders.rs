use crate::commands::{coupons, products, users};
use crate::db::json_column;
use crate::error::{Result, StoreError, Violations};
use crate::models::{
    CheckoutRequest, CheckoutSession, Order, OrderItem, OrderStatus, OrderWithItems,
    ShippingAddress,
};
use crate::payment::{to_minor_units, verify_signature, GatewayOrder, PaymentGateway};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Failed => "failed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => OrderStatus::Pending,
            "paid" => OrderStatus::Paid,
            "failed" => OrderStatus::Failed,
            "processing" => OrderStatus::Processing,
            "shipped" => OrderStatus::Shipped,
            "delivered" => OrderStatus::Delivered,
            "cancelled" => OrderStatus::Cancelled,
            _ => return None,
        })
    }

    /// Moves an admin may make. Payment outcomes (paid, failed) are only
    /// ever set by payment verification.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Paid, Processing | Shipped | Delivered)
                | (Processing, Shipped | Delivered)
                | (Shipped, Delivered)
                | (Pending | Paid | Processing | Shipped, Cancelled)
        )
    }

    /// Whether stock has been taken out of inventory for this order.
    fn holds_stock(self) -> bool {
        matches!(
            self,
            OrderStatus::Paid | OrderStatus::Processing | OrderStatus::Shipped | OrderStatus::Delivered
        )
    }
}

fn round_money(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

const ORDER_SELECT: &str =
    "SELECT o.id, o.user_id, u.name, o.shipping_address, o.subtotal, o.discount, o.total, o.coupon_id,
            o.status, o.gateway_order_id, o.payment_id, o.created_at, o.updated_at
     FROM orders o
     LEFT JOIN users u ON o.user_id = u.id";

fn map_order(row: &rusqlite::Row<'_>) -> rusqlite::Result<Order> {
    let status: String = row.get(8)?;
    let status = OrderStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            8,
            rusqlite::types::Type::Text,
            format!("unknown order status {status:?}").into(),
        )
    })?;

    Ok(Order {
        id: row.get(0)?,
        user_id: row.get(1)?,
        user_name: row.get(2)?,
        shipping_address: json_column(row, 3)?,
        subtotal: row.get(4)?,
        discount: row.get(5)?,
        total: row.get(6)?,
        coupon_id: row.get(7)?,
        status,
        gateway_order_id: row.get(9)?,
        payment_id: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn load_items(conn: &Connection, order_id: i64) -> Result<Vec<OrderItem>> {
    let mut item_stmt = conn.prepare(
        "SELECT id, order_id, product_id, variant_id, name, sku, quantity, price
         FROM order_items
         WHERE order_id = ?1
         ORDER BY id",
    )?;

    let items = item_stmt
        .query_map([order_id], |row| {
            Ok(OrderItem {
                id: row.get(0)?,
                order_id: row.get(1)?,
                product_id: row.get(2)?,
                variant_id: row.get(3)?,
                name: row.get(4)?,
                sku: row.get(5)?,
                quantity: row.get(6)?,
                price: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

fn with_items(conn: &Connection, orders: Vec<Order>) -> Result<Vec<OrderWithItems>> {
    let mut result = Vec::with_capacity(orders.len());
    for order in orders {
        let items = load_items(conn, order.id)?;
        result.push(OrderWithItems { order, items });
    }
    Ok(result)
}

pub fn get_order(conn: &Connection, id: i64) -> Result<OrderWithItems> {
    let order = conn
        .query_row(&format!("{ORDER_SELECT} WHERE o.id = ?1"), [id], map_order)
        .optional()?
        .ok_or(StoreError::NotFound("Order"))?;
    let items = load_items(conn, id)?;
    Ok(OrderWithItems { order, items })
}

fn get_order_by_gateway_id(conn: &Connection, gateway_order_id: &str) -> Result<Order> {
    conn.query_row(
        &format!("{ORDER_SELECT} WHERE o.gateway_order_id = ?1"),
        [gateway_order_id],
        map_order,
    )
    .optional()?
    .ok_or(StoreError::NotFound("Order"))
}

/// Back office order table, newest first.
pub fn list_orders(conn: &Connection, status: Option<OrderStatus>) -> Result<Vec<OrderWithItems>> {
    let mut stmt = conn.prepare(&format!(
        "{ORDER_SELECT}
         WHERE ?1 IS NULL OR o.status = ?1
         ORDER BY o.created_at DESC, o.id DESC"
    ))?;

    let orders = stmt
        .query_map([status.map(OrderStatus::as_str)], map_order)?
        .collect::<Result<Vec<_>, _>>()?;
    with_items(conn, orders)
}

pub fn list_user_orders(conn: &Connection, user_id: i64) -> Result<Vec<OrderWithItems>> {
    let mut stmt = conn.prepare(&format!(
        "{ORDER_SELECT}
         WHERE o.user_id = ?1
         ORDER BY o.created_at DESC, o.id DESC"
    ))?;

    let orders = stmt
        .query_map([user_id], map_order)?
        .collect::<Result<Vec<_>, _>>()?;
    with_items(conn, orders)
}

struct PricedLine {
    product_id: i64,
    variant_id: Option<i64>,
    name: String,
    sku: Option<String>,
    quantity: i32,
    price: f64,
}

fn validate_request(request: &CheckoutRequest) -> Result<()> {
    let mut v = Violations::new();
    v.check(!request.items.is_empty(), "Cart is empty");
    v.check(
        request.items.iter().all(|i| i.quantity > 0),
        "Quantities must be at least 1",
    );

    let a = &request.shipping_address;
    v.check(!a.full_name.trim().is_empty(), "Full name is required");
    v.check(!a.line1.trim().is_empty(), "Address line is required");
    v.check(!a.city.trim().is_empty(), "City is required");
    v.check(!a.state.trim().is_empty(), "State is required");
    v.check(!a.postal_code.trim().is_empty(), "Postal code is required");
    v.check(!a.country.trim().is_empty(), "Country is required");
    v.finish()
}

/// Prices every cart line from the live catalog and checks stock.
fn price_cart(conn: &Connection, request: &CheckoutRequest) -> Result<Vec<PricedLine>> {
    let mut lines = Vec::with_capacity(request.items.len());
    let mut requested: HashMap<i64, i32> = HashMap::new();

    for item in &request.items {
        let product = match products::get_product(conn, item.product_id) {
            Ok(p) if p.is_active => p,
            Ok(_) | Err(StoreError::NotFound(_)) => {
                return Err(StoreError::Validation(format!(
                    "Product {} is not available",
                    item.product_id
                )))
            }
            Err(e) => return Err(e),
        };

        if product.variants.is_empty() {
            if item.variant_id.is_some() {
                return Err(StoreError::Validation(format!(
                    "{} has no variants",
                    product.name
                )));
            }
            lines.push(PricedLine {
                product_id: product.id,
                variant_id: None,
                name: product.name.clone(),
                sku: None,
                quantity: item.quantity,
                price: product.effective_price(),
            });
            continue;
        }

        let variant_id = item.variant_id.ok_or_else(|| {
            StoreError::Validation(format!("Choose an option for {}", product.name))
        })?;
        let variant = product
            .variants
            .iter()
            .find(|v| v.id == variant_id)
            .ok_or_else(|| {
                StoreError::Validation(format!("Option not available for {}", product.name))
            })?;

        let wanted = requested.entry(variant.id).or_insert(0);
        *wanted = wanted.checked_add(item.quantity).ok_or_else(|| {
            StoreError::Validation(format!("Quantity too large for {}", product.name))
        })?;
        if variant.stock < *wanted {
            return Err(StoreError::Validation(format!(
                "Insufficient stock for {}: requested {}, available {}",
                product.name, wanted, variant.stock
            )));
        }

        let label = variant
            .options
            .iter()
            .map(|o| o.value.as_str())
            .collect::<Vec<_>>()
            .join(" / ");
        lines.push(PricedLine {
            product_id: product.id,
            variant_id: Some(variant.id),
            name: if label.is_empty() {
                product.name.clone()
            } else {
                format!("{} ({label})", product.name)
            },
            sku: variant.sku.clone(),
            quantity: item.quantity,
            price: variant.price,
        });
    }

    Ok(lines)
}

/// Deducts stock for every item and records the coupon use. Runs when an
/// order first becomes paid.
fn settle_paid_order(conn: &Connection, order: &Order) -> Result<()> {
    conn.execute(
        "UPDATE product_variants
         SET stock = MAX(stock - (SELECT COALESCE(SUM(oi.quantity), 0) FROM order_items oi
                                  WHERE oi.order_id = ?1 AND oi.variant_id = product_variants.id), 0)
         WHERE id IN (SELECT variant_id FROM order_items WHERE order_id = ?1 AND variant_id IS NOT NULL)",
        [order.id],
    )?;

    if let Some(coupon_id) = order.coupon_id {
        coupons::record_coupon_use(conn, coupon_id)?;
    }
    Ok(())
}

fn restock_order(conn: &Connection, order_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE product_variants
         SET stock = stock + (SELECT COALESCE(SUM(oi.quantity), 0) FROM order_items oi
                              WHERE oi.order_id = ?1 AND oi.variant_id = product_variants.id)
         WHERE id IN (SELECT variant_id FROM order_items WHERE order_id = ?1 AND variant_id IS NOT NULL)",
        [order_id],
    )?;
    Ok(())
}

fn set_status(conn: &Connection, order_id: i64, status: OrderStatus) -> Result<()> {
    conn.execute(
        "UPDATE orders SET status = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
        rusqlite::params![status.as_str(), order_id],
    )?;
    Ok(())
}

/// Writes a pending order for the cart. A cart that costs nothing after
/// discounts is settled right away; otherwise the returned session still
/// needs a gateway order (see [`needs_gateway_order`]).
pub fn create_pending_order(
    conn: &Connection,
    currency: &str,
    request: CheckoutRequest,
    now: DateTime<Utc>,
) -> Result<CheckoutSession> {
    validate_request(&request)?;

    let user = users::get_user(conn, request.user_id)?;
    if !user.is_active || user.is_deleted {
        return Err(StoreError::Auth("Account is disabled".to_string()));
    }

    let lines = price_cart(conn, &request)?;
    let subtotal = round_money(lines.iter().map(|l| l.price * f64::from(l.quantity)).sum());

    let applied = match request.coupon_code.as_deref().map(str::trim) {
        Some(code) if !code.is_empty() => Some(coupons::apply_coupon(conn, code, subtotal, now)?),
        _ => None,
    };
    let discount = round_money(applied.as_ref().map_or(0.0, |a| a.discount));
    let total = round_money((subtotal - discount).max(0.0));

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO orders (user_id, shipping_address, subtotal, discount, total, coupon_id, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending')",
        rusqlite::params![
            request.user_id,
            serde_json::to_string(&request.shipping_address)?,
            subtotal,
            discount,
            total,
            applied.as_ref().map(|a| a.coupon.id),
        ],
    )?;
    let order_id = tx.last_insert_rowid();

    for line in &lines {
        tx.execute(
            "INSERT INTO order_items (order_id, product_id, variant_id, name, sku, quantity, price)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                order_id,
                line.product_id,
                line.variant_id,
                line.name,
                line.sku,
                line.quantity,
                line.price,
            ],
        )?;
    }
    tx.commit()?;

    tracing::info!(order_id, user_id = request.user_id, subtotal, discount, total, "order created");

    let amount_minor = to_minor_units(total);
    if amount_minor == 0 {
        let order = get_order(conn, order_id)?.order;
        let tx = conn.unchecked_transaction()?;
        set_status(&tx, order_id, OrderStatus::Paid)?;
        settle_paid_order(&tx, &order)?;
        tx.commit()?;
        tracing::info!(order_id, "zero total order settled without payment");
    }

    Ok(CheckoutSession {
        order: get_order(conn, order_id)?,
        gateway_order_id: None,
        amount_minor,
        currency: currency.to_string(),
    })
}

/// Whether a session from [`create_pending_order`] still has to be
/// registered with the payment gateway.
pub fn needs_gateway_order(session: &CheckoutSession) -> bool {
    session.gateway_order_id.is_none()
        && session.amount_minor > 0
        && session.order.order.status == OrderStatus::Pending
}

/// Asks the gateway for an order covering the session's amount. Touches no
/// database state, so callers run it without holding the connection.
pub fn request_gateway_order<G>(gateway: &G, session: &CheckoutSession) -> Result<GatewayOrder>
where
    G: PaymentGateway + ?Sized,
{
    gateway.create_order(
        session.amount_minor,
        &session.currency,
        &session.order.order.id.to_string(),
    )
}

/// Records the gateway's answer for a pending order: stores the gateway order
/// id, or marks the order failed and returns the gateway error.
pub fn attach_gateway_order(
    conn: &Connection,
    session: CheckoutSession,
    outcome: Result<GatewayOrder>,
) -> Result<CheckoutSession> {
    let order_id = session.order.order.id;
    let gateway_order = match outcome {
        Ok(g) => g,
        Err(e) => {
            tracing::warn!(order_id, error = %e, "gateway order creation failed");
            set_status(conn, order_id, OrderStatus::Failed)?;
            return Err(e);
        }
    };

    conn.execute(
        "UPDATE orders SET gateway_order_id = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
        rusqlite::params![gateway_order.id, order_id],
    )?;
    tracing::info!(
        order_id,
        gateway_order_id = %gateway_order.id,
        amount_minor = session.amount_minor,
        "gateway order created"
    );

    Ok(CheckoutSession {
        order: get_order(conn, order_id)?,
        gateway_order_id: Some(gateway_order.id),
        amount_minor: session.amount_minor,
        currency: session.currency,
    })
}

/// Creates the pending order and registers it with the gateway on one
/// connection. The desktop shell runs the same steps but releases the
/// connection while the gateway is called.
pub fn checkout<G>(
    conn: &Connection,
    gateway: &G,
    currency: &str,
    request: CheckoutRequest,
    now: DateTime<Utc>,
) -> Result<CheckoutSession>
where
    G: PaymentGateway + ?Sized,
{
    let session = create_pending_order(conn, currency, request, now)?;
    if !needs_gateway_order(&session) {
        return Ok(session);
    }
    let outcome = request_gateway_order(gateway, &session);
    attach_gateway_order(conn, session, outcome)
}

/// Verifies the gateway's callback signature and settles the order.
///
/// A matching signature marks the order paid (stock is deducted and the
/// coupon use recorded the first time); a mismatch marks a pending order
/// failed. Orders already past payment are left alone.
pub fn verify_payment(
    conn: &Connection,
    secret: &str,
    gateway_order_id: &str,
    payment_id: &str,
    signature: &str,
) -> Result<bool> {
    let order = get_order_by_gateway_id(conn, gateway_order_id)?;
    let verified = verify_signature(secret, gateway_order_id, payment_id, signature);

    match (verified, order.status) {
        (true, OrderStatus::Pending | OrderStatus::Failed) => {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "UPDATE orders
                 SET status = 'paid', payment_id = ?1, payment_signature = ?2, updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?3",
                rusqlite::params![payment_id, signature, order.id],
            )?;
            settle_paid_order(&tx, &order)?;
            tx.commit()?;
            tracing::info!(order_id = order.id, %gateway_order_id, "payment verified");
        }
        (true, OrderStatus::Paid) => {
            // The first recorded payment stays authoritative.
            if order.payment_id.as_deref() == Some(payment_id) {
                tracing::debug!(order_id = order.id, "payment verification repeated");
            } else {
                tracing::warn!(
                    order_id = order.id,
                    recorded = ?order.payment_id,
                    received = %payment_id,
                    "second payment callback for paid order"
                );
            }
        }
        (false, OrderStatus::Pending | OrderStatus::Failed) => {
            set_status(conn, order.id, OrderStatus::Failed)?;
            tracing::warn!(order_id = order.id, %gateway_order_id, "payment signature mismatch");
        }
        (_, status) => {
            tracing::warn!(
                order_id = order.id,
                status = status.as_str(),
                verified,
                "payment callback ignored for settled order"
            );
        }
    }

    Ok(verified)
}

/// Admin status change along the fulfilment path.
pub fn update_order_status(conn: &Connection, id: i64, next: OrderStatus) -> Result<OrderWithItems> {
    let current = get_order(conn, id)?.order.status;
    if !current.can_transition_to(next) {
        return Err(StoreError::Validation(format!(
            "Cannot change order from {} to {}",
            current.as_str(),
            next.as_str()
        )));
    }

    let tx = conn.unchecked_transaction()?;
    set_status(&tx, id, next)?;
    if next == OrderStatus::Cancelled && current.holds_stock() {
        restock_order(&tx, id)?;
    }
    tx.commit()?;

    tracing::info!(order_id = id, from = current.as_str(), to = next.as_str(), "order status changed");
    get_order(conn, id)
}

pub fn delete_order(conn: &Connection, id: i64) -> Result<()> {
    let changed = conn.execute("DELETE FROM orders WHERE id = ?1", [id])?;
    if changed == 0 {
        return Err(StoreError::NotFound("Order"));
    }
    tracing::info!(id, "order deleted");
    Ok(())
}

/// Snapshot the user's default address for a checkout form.
pub fn default_shipping_address(conn: &Connection, user_id: i64) -> Result<Option<ShippingAddress>> {
    let addresses = users::list_addresses(conn, user_id)?;
    Ok(addresses
        .iter()
        .find(|a| a.is_default)
        .map(ShippingAddress::from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    #[test]
    fn fulfilment_moves_forward_only() {
        assert!(Paid.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Shipped));
        assert!(Shipped.can_transition_to(Delivered));
        assert!(Paid.can_transition_to(Shipped));

        assert!(!Shipped.can_transition_to(Processing));
        assert!(!Delivered.can_transition_to(Shipped));
        assert!(!Pending.can_transition_to(Processing));
        assert!(!Failed.can_transition_to(Processing));
    }

    #[test]
    fn payment_states_are_not_admin_settable() {
        for from in [Pending, Paid, Failed, Processing, Shipped, Delivered, Cancelled] {
            assert!(!from.can_transition_to(Paid));
            assert!(!from.can_transition_to(Failed));
            assert!(!from.can_transition_to(Pending));
        }
    }

    #[test]
    fn cancellation_before_delivery_only() {
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Shipped.can_transition_to(Cancelled));
        assert!(!Delivered.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Cancelled));
        assert!(!Failed.can_transition_to(Cancelled));
    }

    #[test]
    fn status_strings_round_trip() {
        for s in [Pending, Paid, Failed, Processing, Shipped, Delivered, Cancelled] {
            assert_eq!(OrderStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(OrderStatus::parse("refunded"), None);
    }
}
