pub mod cache;
pub mod handle;

pub use cache::ContractCache;
pub use handle::{ContractHandle, ContractKind, DecodedEvent};
