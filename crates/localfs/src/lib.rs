//! ca-localfs: Local filesystem backend for cloud-access
//!
//! Exposes a directory on this machine through `ca_core::CloudProvider`, with
//! virtual paths resolved below the configured root.

mod provider;

pub use provider::LocalFsCloudProvider;
