//! Domain entities - Objects with identity and lifecycle

mod mutation_record;
mod order;
mod stock_item;

pub use mutation_record::{
    MutationOutcome, MutationRecord, REASON_ORDER_SHIPPED, REASON_RESTOCK, StockMutation,
};
pub use order::{INVENTORY_STEP, Order};
pub use stock_item::StockItem;
