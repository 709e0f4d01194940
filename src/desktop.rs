//! Desktop shell: every store operation exposed as an invokable command.

use crate::commands::{banners, categories, coupons, orders, products, roles, settings, users};
use crate::config::Config;
use crate::db::Database;
use crate::logging;
use crate::models::{
    Address, AddressInput, AncestorRef, Banner, BannerInput, Category, CategoryInput, CheckoutRequest,
    CheckoutSession, Coupon, CouponInput, CouponResult, OrderStatus, OrderWithItems,
    PaymentConfirmation, Product, ProductFilter, ProductInput, ProductPage, RegisterUser, Role,
    RoleInput, Session, Setting, ShippingAddress, UpdateUser, User,
};
use crate::payment::RazorpayGateway;
use chrono::{Duration, Utc};
use rusqlite::Connection;
use secrecy::ExposeSecret;
use tauri::{
    menu::{Menu, MenuItem},
    tray::{MouseButton, MouseButtonState, TrayIconBuilder, TrayIconEvent},
    AppHandle, Manager,
};
use tauri_plugin_opener::OpenerExt;

pub trait DatabaseExt {
    fn db(&self) -> &Database;
    fn store_config(&self) -> &Config;
}

impl DatabaseExt for AppHandle {
    fn db(&self) -> &Database {
        self.state::<Database>().inner()
    }

    fn store_config(&self) -> &Config {
        self.state::<Config>().inner()
    }
}

fn with_conn<T>(
    app: &AppHandle,
    f: impl FnOnce(&Connection) -> crate::error::Result<T>,
) -> Result<T, String> {
    let conn = app.db().lock().map_err(|e| e.to_string())?;
    f(&conn).map_err(|e| e.to_string())
}

// ===== Settings =====

#[tauri::command]
pub fn get_settings(app: AppHandle) -> Result<Setting, String> {
    with_conn(&app, settings::get_settings)
}

#[tauri::command]
pub fn update_settings(app: AppHandle, setting: Setting) -> Result<Setting, String> {
    with_conn(&app, |conn| settings::update_settings(conn, setting))
}

#[tauri::command]
pub fn get_theme_css(app: AppHandle) -> Result<String, String> {
    with_conn(&app, |conn| settings::get_settings(conn).map(|s| settings::theme_css(&s)))
}

#[tauri::command]
pub fn open_external(app: AppHandle, url: String) -> Result<(), String> {
    app.opener()
        .open_url(url, None::<&str>)
        .map_err(|e| e.to_string())
}

// ===== Categories =====

#[tauri::command]
pub fn get_categories(app: AppHandle, include_deleted: Option<bool>) -> Result<Vec<Category>, String> {
    with_conn(&app, |conn| {
        categories::list_categories(conn, include_deleted.unwrap_or(false))
    })
}

#[tauri::command]
pub fn get_category(app: AppHandle, slug: String) -> Result<Category, String> {
    with_conn(&app, |conn| categories::get_category_by_slug(conn, &slug))
}

#[tauri::command]
pub fn get_category_breadcrumbs(app: AppHandle, slug: String) -> Result<Vec<AncestorRef>, String> {
    with_conn(&app, |conn| {
        categories::get_category_by_slug(conn, &slug).map(|c| categories::category_breadcrumbs(&c))
    })
}

#[tauri::command]
pub fn create_category(app: AppHandle, category: CategoryInput) -> Result<Category, String> {
    with_conn(&app, |conn| categories::create_category(conn, category))
}

#[tauri::command]
pub fn update_category(app: AppHandle, id: i64, category: CategoryInput) -> Result<Category, String> {
    with_conn(&app, |conn| categories::update_category(conn, id, category))
}

#[tauri::command]
pub fn soft_delete_category(app: AppHandle, id: i64) -> Result<(), String> {
    with_conn(&app, |conn| categories::soft_delete_category(conn, id))
}

#[tauri::command]
pub fn delete_category(app: AppHandle, id: i64) -> Result<(), String> {
    with_conn(&app, |conn| categories::delete_category(conn, id))
}

// ===== Products =====

#[tauri::command]
pub fn get_products(app: AppHandle, filter: Option<ProductFilter>) -> Result<ProductPage, String> {
    with_conn(&app, |conn| {
        products::list_products(conn, &filter.unwrap_or_default())
    })
}

#[tauri::command]
pub fn get_product(app: AppHandle, slug: String) -> Result<Product, String> {
    with_conn(&app, |conn| products::get_product_by_slug(conn, &slug))
}

#[tauri::command]
pub fn create_product(app: AppHandle, product: ProductInput) -> Result<Product, String> {
    with_conn(&app, |conn| products::create_product(conn, product))
}

#[tauri::command]
pub fn update_product(app: AppHandle, id: i64, product: ProductInput) -> Result<Product, String> {
    with_conn(&app, |conn| products::update_product(conn, id, product))
}

#[tauri::command]
pub fn set_product_active(app: AppHandle, id: i64, active: bool) -> Result<Product, String> {
    with_conn(&app, |conn| products::set_product_active(conn, id, active))
}

#[tauri::command]
pub fn delete_product(app: AppHandle, id: i64) -> Result<(), String> {
    with_conn(&app, |conn| products::delete_product(conn, id))
}

#[tauri::command]
pub fn get_low_stock(app: AppHandle, threshold: Option<i32>) -> Result<Vec<Product>, String> {
    with_conn(&app, |conn| products::get_low_stock(conn, threshold.unwrap_or(5)))
}

// ===== Coupons =====

#[tauri::command]
pub fn get_coupons(app: AppHandle, include_deleted: Option<bool>) -> Result<Vec<Coupon>, String> {
    with_conn(&app, |conn| {
        coupons::list_coupons(conn, include_deleted.unwrap_or(false))
    })
}

#[tauri::command]
pub fn get_coupon(app: AppHandle, id: i64) -> Result<Coupon, String> {
    with_conn(&app, |conn| coupons::get_coupon(conn, id))
}

#[tauri::command]
pub fn create_coupon(app: AppHandle, coupon: CouponInput) -> Result<Coupon, String> {
    with_conn(&app, |conn| coupons::create_coupon(conn, coupon))
}

#[tauri::command]
pub fn update_coupon(app: AppHandle, id: i64, coupon: CouponInput) -> Result<Coupon, String> {
    with_conn(&app, |conn| coupons::update_coupon(conn, id, coupon))
}

#[tauri::command]
pub fn soft_delete_coupon(app: AppHandle, id: i64) -> Result<(), String> {
    with_conn(&app, |conn| coupons::soft_delete_coupon(conn, id))
}

#[tauri::command]
pub fn delete_coupon(app: AppHandle, id: i64) -> Result<(), String> {
    with_conn(&app, |conn| coupons::delete_coupon(conn, id))
}

#[tauri::command]
pub fn apply_coupon(app: AppHandle, code: String, subtotal: f64) -> Result<CouponResult, String> {
    with_conn(&app, |conn| {
        coupons::coupon_result(coupons::apply_coupon(conn, &code, subtotal, Utc::now()))
    })
}

// ===== Banners =====

#[tauri::command]
pub fn get_banners(app: AppHandle, include_deleted: Option<bool>) -> Result<Vec<Banner>, String> {
    with_conn(&app, |conn| {
        banners::list_banners(conn, include_deleted.unwrap_or(false))
    })
}

#[tauri::command]
pub fn get_active_banners(app: AppHandle) -> Result<Vec<Banner>, String> {
    with_conn(&app, banners::list_active_banners)
}

#[tauri::command]
pub fn get_banner(app: AppHandle, id: i64) -> Result<Banner, String> {
    with_conn(&app, |conn| banners::get_banner(conn, id))
}

#[tauri::command]
pub fn create_banner(app: AppHandle, banner: BannerInput) -> Result<Banner, String> {
    with_conn(&app, |conn| banners::create_banner(conn, banner))
}

#[tauri::command]
pub fn update_banner(app: AppHandle, id: i64, banner: BannerInput) -> Result<Banner, String> {
    with_conn(&app, |conn| banners::update_banner(conn, id, banner))
}

#[tauri::command]
pub fn soft_delete_banner(app: AppHandle, id: i64) -> Result<(), String> {
    with_conn(&app, |conn| banners::soft_delete_banner(conn, id))
}

#[tauri::command]
pub fn delete_banner(app: AppHandle, id: i64) -> Result<(), String> {
    with_conn(&app, |conn| banners::delete_banner(conn, id))
}

// ===== Roles =====

#[tauri::command]
pub fn get_permissions() -> Vec<&'static str> {
    roles::PERMISSIONS.to_vec()
}

#[tauri::command]
pub fn get_roles(app: AppHandle, include_deleted: Option<bool>) -> Result<Vec<Role>, String> {
    with_conn(&app, |conn| roles::list_roles(conn, include_deleted.unwrap_or(false)))
}

#[tauri::command]
pub fn get_role(app: AppHandle, id: i64) -> Result<Role, String> {
    with_conn(&app, |conn| roles::get_role(conn, id))
}

#[tauri::command]
pub fn create_role(app: AppHandle, role: RoleInput) -> Result<Role, String> {
    with_conn(&app, |conn| roles::create_role(conn, role))
}

#[tauri::command]
pub fn update_role(app: AppHandle, id: i64, role: RoleInput) -> Result<Role, String> {
    with_conn(&app, |conn| roles::update_role(conn, id, role))
}

#[tauri::command]
pub fn soft_delete_role(app: AppHandle, id: i64) -> Result<(), String> {
    with_conn(&app, |conn| roles::soft_delete_role(conn, id))
}

#[tauri::command]
pub fn delete_role(app: AppHandle, id: i64) -> Result<(), String> {
    with_conn(&app, |conn| roles::delete_role(conn, id))
}

#[tauri::command]
pub fn has_permission(app: AppHandle, user_id: i64, permission: String) -> Result<bool, String> {
    with_conn(&app, |conn| roles::user_has_permission(conn, user_id, &permission))
}

// ===== Users & sessions =====

#[tauri::command]
pub fn register(app: AppHandle, user: RegisterUser) -> Result<User, String> {
    with_conn(&app, |conn| users::register_user(conn, user))
}

#[tauri::command]
pub fn login(app: AppHandle, email: String, password: String) -> Result<Session, String> {
    let config = app.store_config();
    let ttl = Duration::hours(config.session_ttl_hours as i64);
    with_conn(&app, |conn| {
        users::login(
            conn,
            config.session_secret.expose_secret(),
            ttl,
            &email,
            &password,
        )
    })
}

#[tauri::command]
pub fn current_user(app: AppHandle, token: String) -> Result<User, String> {
    let secret = app.store_config().session_secret.expose_secret();
    with_conn(&app, |conn| users::current_user(conn, secret, &token))
}

#[tauri::command]
pub fn get_users(app: AppHandle, include_deleted: Option<bool>) -> Result<Vec<User>, String> {
    with_conn(&app, |conn| users::list_users(conn, include_deleted.unwrap_or(false)))
}

#[tauri::command]
pub fn get_user(app: AppHandle, id: i64) -> Result<User, String> {
    with_conn(&app, |conn| users::get_user(conn, id))
}

#[tauri::command]
pub fn update_user(app: AppHandle, id: i64, user: UpdateUser) -> Result<User, String> {
    with_conn(&app, |conn| users::update_user(conn, id, user))
}

#[tauri::command]
pub fn change_password(
    app: AppHandle,
    id: i64,
    current: String,
    new_password: String,
) -> Result<(), String> {
    with_conn(&app, |conn| users::change_password(conn, id, &current, &new_password))
}

#[tauri::command]
pub fn assign_role(app: AppHandle, user_id: i64, role_id: Option<i64>) -> Result<User, String> {
    with_conn(&app, |conn| users::assign_role(conn, user_id, role_id))
}

#[tauri::command]
pub fn soft_delete_user(app: AppHandle, id: i64) -> Result<(), String> {
    with_conn(&app, |conn| users::soft_delete_user(conn, id))
}

#[tauri::command]
pub fn delete_user(app: AppHandle, id: i64) -> Result<(), String> {
    with_conn(&app, |conn| users::delete_user(conn, id))
}

#[tauri::command]
pub fn get_addresses(app: AppHandle, user_id: i64) -> Result<Vec<Address>, String> {
    with_conn(&app, |conn| users::list_addresses(conn, user_id))
}

#[tauri::command]
pub fn get_address(app: AppHandle, id: i64) -> Result<Address, String> {
    with_conn(&app, |conn| users::get_address(conn, id))
}

#[tauri::command]
pub fn add_address(app: AppHandle, user_id: i64, address: AddressInput) -> Result<Address, String> {
    with_conn(&app, |conn| users::add_address(conn, user_id, address))
}

#[tauri::command]
pub fn update_address(app: AppHandle, id: i64, address: AddressInput) -> Result<Address, String> {
    with_conn(&app, |conn| users::update_address(conn, id, address))
}

#[tauri::command]
pub fn set_default_address(
    app: AppHandle,
    user_id: i64,
    address_id: i64,
) -> Result<Vec<Address>, String> {
    with_conn(&app, |conn| users::set_default_address(conn, user_id, address_id))
}

#[tauri::command]
pub fn delete_address(app: AppHandle, user_id: i64, address_id: i64) -> Result<(), String> {
    with_conn(&app, |conn| users::delete_address(conn, user_id, address_id))
}

// ===== Orders =====

/// Public key id the client hands to the gateway's checkout widget.
#[tauri::command]
pub fn get_payment_key(app: AppHandle) -> String {
    app.store_config().gateway.key_id.clone()
}

#[tauri::command]
pub fn get_default_shipping_address(
    app: AppHandle,
    user_id: i64,
) -> Result<Option<ShippingAddress>, String> {
    with_conn(&app, |conn| orders::default_shipping_address(conn, user_id))
}

/// The database lock is released while the gateway is called.
#[tauri::command]
pub fn checkout(app: AppHandle, request: CheckoutRequest) -> Result<CheckoutSession, String> {
    let config = app.store_config();
    let session = with_conn(&app, |conn| {
        orders::create_pending_order(conn, &config.currency, request, Utc::now())
    })?;
    if !orders::needs_gateway_order(&session) {
        return Ok(session);
    }

    let gateway = RazorpayGateway::new(&config.gateway);
    let outcome = orders::request_gateway_order(&gateway, &session);
    with_conn(&app, |conn| orders::attach_gateway_order(conn, session, outcome))
}

#[tauri::command]
pub fn verify_payment(app: AppHandle, payment: PaymentConfirmation) -> Result<bool, String> {
    let secret = app.store_config().gateway.key_secret.expose_secret();
    with_conn(&app, |conn| {
        orders::verify_payment(
            conn,
            secret,
            &payment.razorpay_order_id,
            &payment.razorpay_payment_id,
            &payment.razorpay_signature,
        )
    })
}

#[tauri::command]
pub fn get_order(app: AppHandle, id: i64) -> Result<OrderWithItems, String> {
    with_conn(&app, |conn| orders::get_order(conn, id))
}

#[tauri::command]
pub fn get_orders(app: AppHandle, status: Option<OrderStatus>) -> Result<Vec<OrderWithItems>, String> {
    with_conn(&app, |conn| orders::list_orders(conn, status))
}

#[tauri::command]
pub fn get_user_orders(app: AppHandle, user_id: i64) -> Result<Vec<OrderWithItems>, String> {
    with_conn(&app, |conn| orders::list_user_orders(conn, user_id))
}

#[tauri::command]
pub fn update_order_status(
    app: AppHandle,
    id: i64,
    status: OrderStatus,
) -> Result<OrderWithItems, String> {
    with_conn(&app, |conn| orders::update_order_status(conn, id, status))
}

#[tauri::command]
pub fn delete_order(app: AppHandle, id: i64) -> Result<(), String> {
    with_conn(&app, |conn| orders::delete_order(conn, id))
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("storefront: {e}");
            std::process::exit(1);
        }
    };
    logging::init(config.log_json);

    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .setup(move |app| {
            let db_path = config.db_path_in(&app.path().app_data_dir()?);
            let db = Database::open(db_path)?;
            db.initialize()?;
            app.manage(db);
            app.manage(config);

            let quit = MenuItem::with_id(app, "quit", "Quit", true, None::<&str>)?;
            let menu = Menu::with_items(app, &[&quit])?;

            let mut tray = TrayIconBuilder::new()
                .menu(&menu)
                .show_menu_on_left_click(false)
                .on_tray_icon_event(|tray, event| {
                    if let TrayIconEvent::Click {
                        button: MouseButton::Left,
                        button_state: MouseButtonState::Up,
                        ..
                    } = event
                    {
                        let app = tray.app_handle();
                        if let Some(window) = app.get_webview_window("main") {
                            if window.is_visible().unwrap_or(false) {
                                let _ = window.hide();
                            } else {
                                let _ = window.show();
                                let _ = window.set_focus();
                            }
                        }
                    }
                })
                .on_menu_event(|app, event| {
                    if event.id == "quit" {
                        app.exit(0);
                    }
                });
            if let Some(icon) = app.default_window_icon() {
                tray = tray.icon(icon.clone());
            }
            tray.build(app)?;

            tracing::info!("storefront back office started");
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            // Settings
            get_settings,
            update_settings,
            get_theme_css,
            open_external,
            // Categories
            get_categories,
            get_category,
            get_category_breadcrumbs,
            create_category,
            update_category,
            soft_delete_category,
            delete_category,
            // Products
            get_products,
            get_product,
            create_product,
            update_product,
            set_product_active,
            delete_product,
            get_low_stock,
            // Coupons
            get_coupons,
            get_coupon,
            create_coupon,
            update_coupon,
            soft_delete_coupon,
            delete_coupon,
            apply_coupon,
            // Banners
            get_banners,
            get_active_banners,
            get_banner,
            create_banner,
            update_banner,
            soft_delete_banner,
            delete_banner,
            // Roles
            get_permissions,
            get_roles,
            get_role,
            create_role,
            update_role,
            soft_delete_role,
            delete_role,
            has_permission,
            // Users
            register,
            login,
            current_user,
            get_users,
            get_user,
            update_user,
            change_password,
            assign_role,
            soft_delete_user,
            delete_user,
            get_addresses,
            get_address,
            add_address,
            update_address,
            set_default_address,
            delete_address,
            // Orders
            get_payment_key,
            get_default_shipping_address,
            checkout,
            verify_payment,
            get_order,
            get_orders,
            get_user_orders,
            update_order_status,
            delete_order,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
