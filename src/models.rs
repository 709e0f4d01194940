use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ===== Settings =====

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Socials {
    pub facebook: Option<String>,
    pub instagram: Option<String>,
    pub twitter: Option<String>,
    pub youtube: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Theme {
    pub primary_color: String,
    pub secondary_color: String,
    pub accent_color: String,
    pub background_color: String,
    pub foreground_color: String,
    pub font_family: String,
    pub radius: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Setting {
    pub store_name: String,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub address: Option<String>,
    pub socials: Socials,
    pub theme: Theme,
    pub logo_url: Option<String>,
    pub currency_symbol: String,
}

// ===== Categories =====

/// One entry of a category's cached parent chain.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AncestorRef {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub image: Option<String>,
    pub description: Option<String>,
    pub parent_id: Option<i64>,
    pub ancestors: Vec<AncestorRef>,
    pub is_active: bool,
    pub is_deleted: bool,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct CategoryInput {
    pub name: String,
    pub image: Option<String>,
    pub description: Option<String>,
    pub parent_id: Option<i64>,
    pub is_active: Option<bool>,
}

// ===== Products =====

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct VariantOption {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Dimensions {
    pub length: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Variant {
    pub id: i64,
    pub sku: Option<String>,
    pub options: Vec<VariantOption>,
    pub price: f64,
    pub stock: i32,
    pub weight: Option<f64>,
    pub dimensions: Option<Dimensions>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct VariantInput {
    /// Existing variant to update; `None` adds a new one.
    pub id: Option<i64>,
    pub sku: Option<String>,
    #[serde(default)]
    pub options: Vec<VariantOption>,
    pub price: f64,
    pub stock: i32,
    pub weight: Option<f64>,
    pub dimensions: Option<Dimensions>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price: f64,
    pub sale_price: Option<f64>,
    pub category_id: Option<i64>,
    pub category_name: Option<String>,
    pub media: Vec<String>,
    pub variants: Vec<Variant>,
    pub is_active: bool,
    pub created_at: String,
}

impl Product {
    /// Price a shopper pays for the base product.
    pub fn effective_price(&self) -> f64 {
        self.sale_price.unwrap_or(self.price)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ProductInput {
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub sale_price: Option<f64>,
    pub category_id: Option<i64>,
    #[serde(default)]
    pub media: Vec<String>,
    #[serde(default)]
    pub variants: Vec<VariantInput>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ProductFilter {
    /// Matches the category itself and every descendant.
    pub category_slug: Option<String>,
    pub search: Option<String>,
    #[serde(default)]
    pub include_inactive: bool,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

// ===== Coupons =====

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CouponKind {
    Percentage,
    Fixed,
}

impl CouponKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CouponKind::Percentage => "percentage",
            CouponKind::Fixed => "fixed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "percentage" => Some(CouponKind::Percentage),
            "fixed" => Some(CouponKind::Fixed),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Coupon {
    pub id: i64,
    pub code: String,
    pub kind: CouponKind,
    pub value: f64,
    pub expiry_date: DateTime<Utc>,
    pub min_spend: Option<f64>,
    pub usage_limit: Option<i64>,
    pub usage_count: i64,
    pub is_active: bool,
    pub is_deleted: bool,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CouponInput {
    pub code: String,
    pub kind: CouponKind,
    pub value: f64,
    pub expiry_date: DateTime<Utc>,
    pub min_spend: Option<f64>,
    pub usage_limit: Option<i64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppliedCoupon {
    pub coupon: Coupon,
    pub discount: f64,
}

/// Shape handed back to the checkout page.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CouponResult {
    pub success: bool,
    pub coupon: Option<Coupon>,
    pub discount: f64,
    pub message: Option<String>,
}

// ===== Banners =====

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Banner {
    pub id: i64,
    pub title: String,
    pub subtitle: Option<String>,
    pub image: String,
    pub link: Option<String>,
    pub sort_order: i32,
    pub is_active: bool,
    pub is_deleted: bool,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct BannerInput {
    pub title: String,
    pub subtitle: Option<String>,
    pub image: String,
    pub link: Option<String>,
    pub sort_order: Option<i32>,
    pub is_active: Option<bool>,
}

// ===== Roles =====

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub permissions: Vec<String>,
    pub is_deleted: bool,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct RoleInput {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

// ===== Users =====

/// A user as seen by the rest of the system. The password hash never leaves
/// the users module.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role_id: Option<i64>,
    pub role_name: Option<String>,
    pub is_active: bool,
    pub is_deleted: bool,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct RegisterUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct UpdateUser {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct AddressInput {
    pub full_name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub phone: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Address {
    pub id: i64,
    pub user_id: i64,
    pub full_name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub phone: Option<String>,
    pub is_default: bool,
}

/// Logged in user plus the signed token for the session cookie.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Session {
    pub user: User,
    pub token: String,
}

// ===== Orders =====

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Failed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

/// Snapshot of the shipping address taken at checkout.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ShippingAddress {
    pub full_name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub phone: Option<String>,
}

impl From<&Address> for ShippingAddress {
    fn from(a: &Address) -> Self {
        ShippingAddress {
            full_name: a.full_name.clone(),
            line1: a.line1.clone(),
            line2: a.line2.clone(),
            city: a.city.clone(),
            state: a.state.clone(),
            postal_code: a.postal_code.clone(),
            country: a.country.clone(),
            phone: a.phone.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub user_name: Option<String>,
    pub shipping_address: ShippingAddress,
    pub subtotal: f64,
    pub discount: f64,
    pub total: f64,
    pub coupon_id: Option<i64>,
    pub status: OrderStatus,
    pub gateway_order_id: Option<String>,
    pub payment_id: Option<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: Option<i64>,
    pub variant_id: Option<i64>,
    pub name: String,
    pub sku: Option<String>,
    pub quantity: i32,
    pub price: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CartItem {
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub quantity: i32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CheckoutRequest {
    pub user_id: i64,
    pub items: Vec<CartItem>,
    pub shipping_address: ShippingAddress,
    pub coupon_code: Option<String>,
}

/// Everything the client needs to hand off to the gateway's checkout.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CheckoutSession {
    pub order: OrderWithItems,
    /// `None` when nothing is left to pay.
    pub gateway_order_id: Option<String>,
    pub amount_minor: i64,
    pub currency: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PaymentConfirmation {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
}
