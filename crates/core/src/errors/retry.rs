/// Classification for how the pipeline reacts to an error.
///
/// # Behavior Summary
///
/// | Class | Pass outcome | Message outcome |
/// |-------|--------------|-----------------|
/// | `NextTick` | Skipped, watermark unchanged | n/a |
/// | `Requeue` | n/a | Sink throttled, message kept at queue head |
/// | `Drop` | n/a | Logged and discarded |
/// | `Fatal` | Site disabled | n/a |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Log the failure and let the next scheduler tick try again.
    ///
    /// The interval itself is the backoff; no extra delay is added.
    NextTick,

    /// The sink asked us to slow down. The message goes back on the queue and
    /// the sink stays throttled until the server-provided delay has elapsed.
    Requeue,

    /// Report and move on. The next message is attempted independently.
    Drop,

    /// The site cannot run with its current configuration.
    Fatal,
}
