//! Remote device registry abstraction
//!
//! Provides a unified interface over the cloud device registry and the
//! LoRaWAN downlink API, with an in-memory backend for tests.
//!
//! # Key Components
//!
//! - **DeviceRegistry trait**: paged twin listings, module twins, gateway IDs
//! - **CommandDispatcher trait**: downlink commands to devices
//! - **collect_all_pages**: continuation-token paging

pub mod config;
pub mod paging;
pub mod traits;

#[cfg(feature = "http-backend")]
pub mod http_impl;
#[cfg(feature = "http-backend")]
pub mod lorawan;
#[cfg(feature = "http-backend")]
pub mod sas;

#[cfg(feature = "memory-backend")]
pub mod memory_impl;

// Re-exports
pub use config::{LorawanConfig, RegistryConfig};
pub use paging::{collect_all_pages, DEFAULT_PAGE_SIZE};
pub use traits::{CommandDispatcher, DeviceCountQuery, DeviceRegistry, TwinFilter};

#[cfg(feature = "http-backend")]
pub use http_impl::HttpRegistry;
#[cfg(feature = "http-backend")]
pub use lorawan::LorawanCommandClient;

#[cfg(feature = "memory-backend")]
pub use memory_impl::{DispatchedCommand, MemoryRegistry};
