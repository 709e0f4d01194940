pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod payment;
pub mod session;
pub mod slug;

#[cfg(feature = "desktop")]
mod desktop;


pub use config::Config;
pub use db::Database;
pub use error::{CouponError, Result, StoreError};
pub use payment::{PaymentGateway, RazorpayGateway};

#[cfg(feature = "desktop")]
pub use desktop::run;
