//! Rendering hand-off and per-sink delivery.

mod dispatcher;
mod sink;
mod transport;
mod worker;

pub use dispatcher::Dispatcher;
pub use sink::{build_sink, DesktopSink, DiscordSink, Sink, SlackSink};
pub use transport::{
    DeliveryOutcome, HttpWebhookTransport, WebhookTransport, DEFAULT_RETRY_AFTER, MAX_RETRY_AFTER,
};
pub use worker::{spawn_worker, SinkHandle};

#[cfg(test)]
pub(crate) use sink::fake;
