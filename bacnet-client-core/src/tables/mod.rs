//! The four concurrent data stores described in §3: pending-transaction
//! table (T1), device-wait table (T2), address-entry table (T3), and the
//! IP-to-instance memoization (T4). Each owns its records exclusively and
//! serializes access under a single table-level mutex.

pub mod address_entry;
pub mod address_instance;
pub mod device_wait;
pub mod transaction;

pub use address_entry::AddressEntryTable;
pub use address_instance::AddressInstanceMap;
pub use device_wait::DeviceWaitTable;
pub use transaction::TransactionTable;
