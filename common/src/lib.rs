//! Client and normalization layer for the Govee mobile-app device API.
//!
//! [`client::DeviceClient`] fetches the account's device list through a
//! [`transport::Transport`] and turns each vendor entry into a canonical
//! [`device::Device`] via [`normalize::Normalizer`].

pub mod client;
pub mod device;
pub mod error;
pub mod normalize;
pub mod req;
pub mod transport;

pub use client::{ClientConfig, DeviceClient, DeviceList, SkippedDevice};
pub use device::{Credentials, Device};
pub use error::{ClientError, NormalizationError, TransportError};
