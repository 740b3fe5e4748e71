//! Storage layer for portico-daemon
//!
//! Tenant-scoped persistence for accounts, portals, auth state and portal content.

mod memory;
mod postgres;
mod traits;

pub use memory::InMemoryStorage;
pub use postgres::PostgresStorage;
#[allow(unused_imports)]
pub use traits::{
    AccountStorage, ActivityStorage, AllowlistStorage, AuthStorage, BrandProfileStorage,
    ClientStorage, ContractStorage, FileStorage, FormStorage, InvoiceStorage, MessageStorage,
    PortalStorage, PurgeCounts, ReadScope, Storage, StorageResult,
};
