//! Capability modules. A bridge holds one of each only when the script's
//! grants include it and the host can provide it.

mod menu;
mod network;
mod storage;
mod style;
mod tab;

pub use menu::MenuApi;
pub use network::NetworkApi;
pub(crate) use storage::ValueStore;
pub use storage::StorageApi;
pub use style::StyleApi;
pub use tab::TabApi;
