//! Value Objects - Immutable, identity-less domain primitives

mod idempotency_token;
mod order_id;
mod order_status;
mod product_key;

pub use idempotency_token::{IdempotencyToken, MAX_TOKEN_LEN};
pub use order_id::OrderId;
pub use order_status::OrderStatus;
pub use product_key::{MAX_PRODUCT_KEY_LEN, ProductKey};
