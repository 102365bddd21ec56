//! Concrete fetchers and notifiers for DocLookout.
//!
//! The core engine only knows the `Fetcher` and `Emitter` capabilities.
//! This crate provides the implementations the daemon wires in.
//!
//! # Modules
//!
//! - [`http`] -- `HEAD`/`GET` fetcher with configurable fingerprinting.
//! - [`file`] -- Local file fetcher (BLAKE3 of contents).
//! - [`fetcher`] -- [`SourceFetcher`], routing by locator kind.
//! - [`connectivity`] -- Cached network probe and [`GatedFetcher`].
//! - [`webhook`] -- Discord-style webhook notifier.
//! - [`notifier`] -- [`LogEmitter`] and the [`NotifierEmitter`] dispatch enum.
//! - [`error`] -- Construction errors.

pub mod connectivity;
pub mod error;
pub mod fetcher;
pub mod file;
pub mod http;
pub mod notifier;
pub mod webhook;

pub use connectivity::{ConnectivityProbe, GatedFetcher};
pub use error::SourceError;
pub use fetcher::SourceFetcher;
pub use file::FileFetcher;
pub use http::HttpFetcher;
pub use notifier::{LogEmitter, NotifierEmitter};
pub use webhook::WebhookEmitter;
