pub mod banners;
pub mod categories;
pub mod coupons;
pub mod orders;
pub mod products;
pub mod roles;
pub mod settings;
pub mod users;
