//! Fan-out of rendered messages to a site's sinks.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::join_all;
use log::{debug, warn};
use tokio::task::JoinHandle;

use super::sink::{build_sink, Sink};
use super::transport::WebhookTransport;
use super::worker::{spawn_worker, SinkHandle};
use crate::errors::Result;
use crate::models::{EventMessage, SinkConfig};
use crate::template::{render_message, RenderContext};

#[derive(Default)]
struct Workers {
    handles: Vec<SinkHandle>,
    joins: Vec<JoinHandle<()>>,
}

/// Owns the sink workers of one site.
pub struct Dispatcher {
    site: String,
    workers: Mutex<Workers>,
}

impl Dispatcher {
    /// Start one worker per configured sink. Must be called inside a runtime.
    pub fn from_configs(
        site: &str,
        configs: &[SinkConfig],
        transport: Arc<dyn WebhookTransport>,
    ) -> Result<Self> {
        let sinks = configs
            .iter()
            .map(|config| build_sink(config, site, transport.clone()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(site, sinks))
    }

    pub fn new(site: &str, sinks: Vec<Arc<dyn Sink>>) -> Self {
        let mut workers = Workers::default();
        for sink in sinks {
            let (handle, join) = spawn_worker(site, sink);
            workers.handles.push(handle);
            workers.joins.push(join);
        }
        Self {
            site: site.to_string(),
            workers: Mutex::new(workers),
        }
    }

    /// Render `message` for every sink and queue it.
    ///
    /// A message key missing from the string table drops the message.
    pub fn send(&self, message: &EventMessage, ctx: &RenderContext<'_>) {
        let workers = self.lock_workers();
        if workers.handles.is_empty() {
            debug!("[{}] Dispatcher is shut down, dropping '{}'", self.site, message.key);
            return;
        }

        for handle in &workers.handles {
            match render_message(message, handle.sink().renderer(), ctx) {
                Ok(text) => {
                    if !handle.enqueue(text) {
                        warn!("[{}] {} worker has stopped", self.site, handle.sink().id());
                    }
                }
                Err(e) => warn!("[{}] Dropping '{}': {}", self.site, message.key, e),
            }
        }
    }

    /// Close every queue and wait for the workers to drain.
    pub async fn shutdown(&self) {
        let joins = {
            let mut workers = self.lock_workers();
            workers.handles.clear();
            std::mem::take(&mut workers.joins)
        };

        for result in join_all(joins).await {
            if let Err(e) = result {
                warn!("[{}] Sink worker ended abnormally: {}", self.site, e);
            }
        }
    }

    fn lock_workers(&self) -> MutexGuard<'_, Workers> {
        self.workers.lock().unwrap_or_else(|poisoned| {
            warn!("Dispatcher mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}
