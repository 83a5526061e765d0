pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod store;

pub use common::{CustomerId, OrderId, ProductId};
pub use error::{Result, StoreError};
pub use memory::InMemoryOrderStore;
pub use model::{
    CustomerOrder, MirrorKey, MirrorKind, NewOrder, Order, OrderChanges, OrderFilter,
    OrderProduct, Product,
};
pub use postgres::PostgresOrderStore;
pub use store::OrderStore;
