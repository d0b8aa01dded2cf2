pub mod app;
pub mod citation;
pub mod client;
pub mod config;
pub mod documents;
pub mod error;
pub mod models;
pub mod theme;
pub mod transcript;
pub mod util;

pub use client::AtlasClient;
pub use config::Config;
pub use error::{ApiError, AtlasError, Result};
