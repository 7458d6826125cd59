pub mod free_shipping_setting;
pub mod order;
pub mod order_item;
pub mod order_tracking_event;
pub mod product;
pub mod product_variant;
pub mod promo_code;
pub mod shipping_rate;

pub use free_shipping_setting::Entity as FreeShippingSetting;
pub use order::Entity as Order;
pub use order_item::Entity as OrderItem;
pub use order_tracking_event::Entity as OrderTrackingEvent;
pub use product::Entity as Product;
pub use product_variant::Entity as ProductVariant;
pub use promo_code::Entity as PromoCode;
pub use shipping_rate::Entity as ShippingRate;
