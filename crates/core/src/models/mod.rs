//! Core data types shared by every stage of the pipeline.

mod event;
mod record;
mod site;
mod site_info;
mod source;

pub use event::{BoardRef, CanonicalEvent, EventMessage, MapAction, ThreadAction, ThreadRef};
pub use record::{
    registry_entries, AbuseRecord, ChangeRecord, LogRecord, RawRecord, RecordEntry,
    RegistryRecord,
};
pub use site::{
    RelayConfig, SinkConfig, Site, SiteConfig, DEFAULT_BOTS, DEFAULT_DIFF_THRESHOLD,
    DEFAULT_INTERVAL_MS,
};
pub use site_info::{encode_page_name, SiteInfo, ABUSE_LOG_RIGHT};
pub use source::SourceKind;
