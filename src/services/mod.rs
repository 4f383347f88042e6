pub mod catalog;
pub mod delivery_fee;
pub mod notifications;
pub mod order_assembly;
pub mod orders;
pub mod payments;
pub mod verification_code;
