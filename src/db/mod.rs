pub mod entities;
pub mod memory;
pub mod sea_store;
pub mod store;

pub use memory::{InMemoryIdentityStore, InMemoryRefreshTokenStore};
pub use sea_store::{SeaIdentityStore, SeaRefreshTokenStore};
pub use store::{IdentityStore, RefreshTokenStore, StoreError, StoreResult};
