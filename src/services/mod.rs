pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod gateway;
pub mod orders;
pub mod payments;
pub mod promotions;
pub mod shipping;
