//! Remote cloud platform capability consumed by the deployment steps.

pub mod box_client;
pub mod client;

pub use box_client::BoxPlatformClient;
pub use client::PlatformClient;
