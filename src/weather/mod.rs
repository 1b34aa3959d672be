//! Weather provider adapters.

mod cached_client;
mod client;

pub use cached_client::{CachedWeatherClient, CityResult};
pub use client::OpenWeatherClient;
