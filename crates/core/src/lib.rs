//! WikiRelay Core - polling, normalization, templating and delivery.
//!
//! This crate watches wiki activity feeds and relays them to chat webhooks.
//! It knows nothing about process setup: the daemon builds [`models::Site`]s
//! from its configuration, wires them to [`source::MediaWikiClient`] and
//! [`delivery::HttpWebhookTransport`], and hands the resulting
//! [`scheduler::SitePipeline`]s to a [`scheduler::PollScheduler`].
//!
//! Logging goes through the `log` facade.

pub mod cache;
pub mod delivery;
pub mod errors;
pub mod i18n;
pub mod models;
pub mod normalizer;
pub mod scheduler;
pub mod source;
pub mod template;
pub mod watermark;

pub use cache::{CacheFile, SiteCache};
pub use errors::{RelayError, Result, RetryClass};
pub use models::{CanonicalEvent, EventMessage, RelayConfig, Site, SiteConfig, SourceKind};
pub use scheduler::{PipelineOptions, PollScheduler, SitePipeline};
pub use watermark::{Watermark, WatermarkStore};
