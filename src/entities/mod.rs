pub mod order;
pub mod payment_instrument;
