pub mod pending;

pub use pending::PendingIds;
