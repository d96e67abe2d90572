//! Raw record -> canonical event mapping.
//!
//! Dispatch is on (record variant, type, action). Anything the mapping does not
//! know becomes [`CanonicalEvent::Unrecognized`] carrying the raw JSON, so new
//! log types show up in the sink instead of disappearing. A short list of
//! types is dropped on purpose (`patrol`, `templateclassification`, protection
//! moves, and activity-feed log rows that the log source reports anyway).

mod threads;

pub use threads::{
    container_key, decode_entities, ResolvedThread, ThreadCacheEntry, ThreadLookup,
    ThreadResolver,
};

use std::sync::Arc;

use crate::models::{
    AbuseRecord, BoardRef, CanonicalEvent, ChangeRecord, LogRecord, MapAction, RawRecord,
    RecordEntry, RegistryRecord, Site, ThreadAction, ThreadRef,
};

/// Message-wall thread namespace.
pub const WALL_THREAD_NS: i64 = 1201;
/// Forum-board thread namespace.
pub const BOARD_THREAD_NS: i64 = 2001;

/// Whether a namespace holds threads rather than articles.
pub fn is_thread_namespace(ns: i64) -> bool {
    ns == WALL_THREAD_NS || ns == BOARD_THREAD_NS
}

/// Board a thread page belongs to: the title with its namespace prefix and
/// any sub-pages stripped.
pub fn board_of(title: &str, ns: i64) -> BoardRef {
    let after_prefix = title.split_once(':').map_or(title, |(_, rest)| rest);
    let name = after_prefix.split('/').next().unwrap_or_default();
    BoardRef {
        namespace: ns,
        name: name.to_string(),
    }
}

pub struct EventNormalizer {
    threads: Arc<dyn ThreadLookup>,
}

impl EventNormalizer {
    pub fn new(threads: Arc<dyn ThreadLookup>) -> Self {
        Self { threads }
    }

    /// Map one record to its event. `None` means the record is not relayed.
    pub fn normalize(&self, record: &RawRecord, site: &Site) -> Option<CanonicalEvent> {
        if site.excludes(record) {
            return None;
        }

        match &record.entry {
            RecordEntry::Change(change) => self.change(change, record, site),
            RecordEntry::Log(log) => log_event(log, record),
            RecordEntry::Abuse(hit) => Some(abuse_event(hit, site)),
            RecordEntry::Registry(entry) => Some(registry_event(entry)),
            RecordEntry::Unknown { .. } => Some(unrecognized(record)),
        }
    }

    fn thread(&self, title: &str, site: &Site) -> ThreadRef {
        let resolved = self.threads.resolve(title);
        ThreadRef {
            target: resolved.target,
            title: resolved
                .title
                .unwrap_or_else(|| site.strings.label("message").to_string()),
        }
    }

    fn change(
        &self,
        change: &ChangeRecord,
        record: &RawRecord,
        site: &Site,
    ) -> Option<CanonicalEvent> {
        let user = change.user.clone();
        let summary = change.comment.clone();
        let threaded = is_thread_namespace(change.ns);

        let event = match change.change_type.as_str() {
            "new" if threaded => CanonicalEvent::ThreadCreated {
                user,
                thread: self.thread(&change.title, site),
                board: board_of(&change.title, change.ns),
                size_delta: change.size_delta(),
                summary,
            },
            "new" => CanonicalEvent::PageCreated {
                user,
                title: change.title.clone(),
                size_delta: change.size_delta(),
                summary,
            },
            "edit" if threaded => CanonicalEvent::ThreadEdited {
                user,
                board: board_of(&change.title, change.ns),
                size_delta: change.size_delta(),
                revision: change.revid,
                summary,
            },
            "edit" => CanonicalEvent::PageEdited {
                user,
                title: change.title.clone(),
                size_delta: change.size_delta(),
                revision: change.revid,
                summary,
            },
            "log" => {
                if change.logtype_str().as_deref() != Some("0") {
                    return None;
                }
                let action = match change.logaction.as_deref() {
                    Some("wall_archive") => ThreadAction::Close,
                    Some("wall_remove") => ThreadAction::Remove,
                    Some("wall_admindelete") => ThreadAction::Delete,
                    Some("wall_restore") => ThreadAction::Restore,
                    _ => return Some(unrecognized(record)),
                };
                CanonicalEvent::ThreadModerated {
                    action,
                    user,
                    thread: self.thread(&change.title, site),
                    board: board_of(&change.title, change.ns),
                    summary,
                }
            }
            _ => unrecognized(record),
        };
        Some(event)
    }
}

fn unrecognized(record: &RawRecord) -> CanonicalEvent {
    CanonicalEvent::Unrecognized {
        raw: record.to_json(),
    }
}

fn log_event(log: &LogRecord, record: &RawRecord) -> Option<CanonicalEvent> {
    let user = log.user.clone();
    let title = log.title.clone();
    let summary = log.comment.clone();

    let event = match (log.log_type.as_str(), log.action.as_str()) {
        ("patrol", _) | ("templateclassification", _) | ("protect", "move_prot") => return None,

        ("block", action @ ("block" | "reblock")) => CanonicalEvent::UserBlocked {
            reblock: action == "reblock",
            user,
            target: title,
            duration: log.detail_or_empty(&[&["block", "duration"], &["params", "duration"]]),
            flags: log.detail_or_empty(&[&["block", "flags"], &["params", "flags"]]),
            summary,
        },
        ("block", "unblock") => CanonicalEvent::UserUnblocked {
            user,
            target: title,
            summary,
        },
        ("newusers", _) => CanonicalEvent::AccountCreated { user },
        ("useravatar", "avatar_chn") => CanonicalEvent::AvatarChanged { user },
        ("useravatar", "avatar_rem") => CanonicalEvent::AvatarRemoved {
            user,
            target: title,
        },
        ("delete", "delete") => CanonicalEvent::PageDeleted {
            user,
            title,
            summary,
        },
        ("delete", "restore") => CanonicalEvent::PageRestored {
            user,
            title,
            summary,
        },
        ("move", action @ ("move" | "move_redir")) => CanonicalEvent::PageMoved {
            redirect: action == "move_redir",
            user,
            from: title,
            to: log.detail_or_empty(&[&["move", "new_title"], &["params", "target_title"]]),
            summary,
        },
        ("rights", "rights") => CanonicalEvent::RightsChanged {
            user,
            target: title,
            old: log.detail_or_empty(&[&["rights", "old"], &["params", "oldgroups"]]),
            new: log.detail_or_empty(&[&["rights", "new"], &["params", "newgroups"]]),
            summary,
        },
        ("upload", action @ ("upload" | "overwrite")) => CanonicalEvent::FileUploaded {
            overwrite: action == "overwrite",
            user,
            title,
            summary,
        },
        ("chatban", action @ ("chatbanadd" | "chatbanchange")) => CanonicalEvent::ChatBanned {
            change: action == "chatbanchange",
            user,
            target: title,
            duration: log.detail_or_empty(&[&["2"], &["params", "duration"], &["params", "2"]]),
            summary,
        },
        ("chatban", "chatbanremove") => CanonicalEvent::ChatUnbanned {
            user,
            target: title,
            summary,
        },
        ("protect", action @ ("protect" | "modify")) => CanonicalEvent::PageProtected {
            modify: action == "modify",
            user,
            title,
            detail: log.detail_or_empty(&[&["0"], &["params", "description"]]),
            summary,
        },
        ("protect", "unprotect") => CanonicalEvent::PageUnprotected {
            user,
            title,
            summary,
        },
        ("merge", _) => CanonicalEvent::PagesMerged {
            user,
            title,
            destination: log.detail_or_empty(&[
                &["0"],
                &["params", "dest_title"],
                &["params", "dest"],
            ]),
            summary,
        },
        ("abusefilter", _) => CanonicalEvent::FilterModified {
            user,
            filter: log.detail_or_empty(&[&["1"], &["params", "newId"]]),
            history: log.detail_or_empty(&[&["0"], &["params", "historyId"]]),
        },
        ("wikifeatures", _) => CanonicalEvent::FeaturesChanged { user, summary },
        ("import", "upload") => CanonicalEvent::PageImported {
            user,
            title,
            summary,
        },
        ("maps", action) => {
            let action = match action {
                "create_pin" => MapAction::CreatePin,
                "update_pin" => MapAction::UpdatePin,
                "delete_pin" => MapAction::DeletePin,
                "create_map" => MapAction::CreateMap,
                "delete_map" => MapAction::DeleteMap,
                _ => return Some(unrecognized(record)),
            };
            CanonicalEvent::MapChanged {
                action,
                user,
                title,
                summary,
            }
        }
        ("renameuser", _) => CanonicalEvent::UserRenamed { user, summary },
        _ => unrecognized(record),
    };
    Some(event)
}

fn abuse_event(hit: &AbuseRecord, site: &Site) -> CanonicalEvent {
    let result = site
        .strings
        .get(&format!("action-{}", hit.result))
        .map_or_else(|| hit.result.clone(), str::to_string);

    CanonicalEvent::FilterTriggered {
        user: hit.user.clone(),
        filter_id: hit.filter_id_str(),
        filter: hit.filter.clone(),
        action: hit.action.clone(),
        title: hit.title.clone(),
        result,
    }
}

fn registry_event(entry: &RegistryRecord) -> CanonicalEvent {
    CanonicalEvent::SiteRegistered {
        domain: entry.domain.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SiteConfig, SourceKind};
    use serde_json::{json, Value};

    /// Resolves every thread to a fixed target, or to nothing.
    struct StaticThreads(Option<(String, String)>);

    impl ThreadLookup for StaticThreads {
        fn resolve(&self, page: &str) -> ResolvedThread {
            match &self.0 {
                Some((target, title)) => ResolvedThread {
                    target: target.clone(),
                    title: Some(title.clone()),
                },
                None => ResolvedThread {
                    target: page.to_string(),
                    title: None,
                },
            }
        }
    }

    fn site() -> Site {
        let config: SiteConfig = serde_json::from_value(json!({
            "excludefilter": [13],
            "transport": {"platform": "notifications"}
        }))
        .unwrap();
        Site::from_config("dev", &config, "en").unwrap()
    }

    fn normalizer() -> EventNormalizer {
        EventNormalizer::new(Arc::new(StaticThreads(None)))
    }

    fn log(mut value: Value) -> RawRecord {
        if let Some(map) = value.as_object_mut() {
            map.entry("timestamp")
                .or_insert_with(|| json!("2024-03-01T10:00:00Z"));
        }
        RawRecord::parse(SourceKind::LogEvents, value).unwrap()
    }

    fn change(value: Value) -> RawRecord {
        RawRecord::parse(SourceKind::RecentChanges, value).unwrap()
    }

    fn args(event: Option<CanonicalEvent>) -> Vec<String> {
        event.expect("event expected").to_message().to_vec()
    }

    #[test]
    fn test_legacy_reblock() {
        let record = log(json!({
            "type": "block", "action": "reblock", "user": "Admin", "title": "User:X",
            "comment": "spam", "block": {"duration": "1 week", "flags": "noemail"}
        }));
        assert_eq!(
            args(normalizer().normalize(&record, &site())),
            vec!["reblock", "Admin", "User:X", "1 week", "noemail", "spam"]
        );
    }

    #[test]
    fn test_modern_block_params() {
        let record = log(json!({
            "type": "block", "action": "block", "user": "Admin", "title": "User:Y",
            "comment": "", "params": {"duration": "infinite", "flags": ["nocreate", "noemail"]}
        }));
        assert_eq!(
            args(normalizer().normalize(&record, &site())),
            vec!["block", "Admin", "User:Y", "infinite", "nocreate, noemail", ""]
        );
    }

    #[test]
    fn test_move_with_redirect() {
        let record = log(json!({
            "type": "move", "action": "move_redir", "user": "Mover", "title": "Old",
            "comment": "rename", "params": {"target_title": "New"}
        }));
        assert_eq!(
            args(normalizer().normalize(&record, &site())),
            vec!["moveredir", "Mover", "Old", "New", "rename"]
        );
    }

    #[test]
    fn test_rights_legacy() {
        let record = log(json!({
            "type": "rights", "action": "rights", "user": "B", "title": "User:C",
            "comment": "", "rights": {"old": "", "new": "sysop"}
        }));
        assert_eq!(
            args(normalizer().normalize(&record, &site())),
            vec!["rights", "B", "User:C", "", "sysop", ""]
        );
    }

    #[test]
    fn test_abusefilter_positional_details() {
        let record = log(json!({
            "type": "abusefilter", "action": "modify", "user": "F", "title": "Special:AbuseFilter/4",
            "0": 120, "1": "4"
        }));
        assert_eq!(
            args(normalizer().normalize(&record, &site())),
            vec!["abusefilter", "F", "4", "120"]
        );
    }

    #[test]
    fn test_ignored_types() {
        for (log_type, action) in [
            ("patrol", "patrol"),
            ("templateclassification", "tc"),
            ("protect", "move_prot"),
        ] {
            let record = log(json!({"type": log_type, "action": action, "user": "U", "title": "T"}));
            assert!(normalizer().normalize(&record, &site()).is_none());
        }
    }

    #[test]
    fn test_unknown_action_passes_through() {
        let record = log(json!({"type": "delete", "action": "revision", "user": "U", "title": "T"}));
        match normalizer().normalize(&record, &site()) {
            Some(CanonicalEvent::Unrecognized { raw }) => {
                let parsed: Value = serde_json::from_str(&raw).unwrap();
                assert_eq!(parsed, record.raw);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_bot_actions_dropped() {
        let record = log(json!({"type": "newusers", "action": "create", "user": "FandomBot", "title": "User:FandomBot"}));
        assert!(normalizer().normalize(&record, &site()).is_none());
    }

    #[test]
    fn test_new_thread_with_placeholder_title() {
        let record = change(json!({
            "type": "new", "user": "Bob", "ns": 1201,
            "title": "Message Wall:Alice/@comment-Bob-20240301",
            "oldlen": 0, "newlen": 300, "revid": 9, "comment": "hi",
            "timestamp": "2024-03-01T10:00:00Z"
        }));
        assert_eq!(
            args(normalizer().normalize(&record, &site())),
            vec![
                "newthread",
                "Bob",
                "Message Wall:Alice/@comment-Bob-20240301",
                "a message",
                "1201",
                "Alice",
                "300",
                "hi"
            ]
        );
    }

    #[test]
    fn test_wall_log_actions() {
        let normalizer = EventNormalizer::new(Arc::new(StaticThreads(Some((
            "Thread:5".to_string(),
            "Hello".to_string(),
        )))));
        for (action, key) in [
            ("wall_archive", "threadclose"),
            ("wall_remove", "threadremove"),
            ("wall_admindelete", "threaddelete"),
            ("wall_restore", "threadrestore"),
        ] {
            let record = change(json!({
                "type": "log", "logtype": "0", "logaction": action, "user": "Mod", "ns": 2001,
                "title": "Board Thread:Help/@comment-X-1", "comment": "",
                "timestamp": "2024-03-01T10:00:00Z"
            }));
            assert_eq!(
                args(normalizer.normalize(&record, &site())),
                vec![key, "Mod", "Thread:5", "Hello", "2001", "Help", ""]
            );
        }
    }

    #[test]
    fn test_feed_log_rows_ignored() {
        let record = change(json!({
            "type": "log", "logtype": "block", "logaction": "block", "user": "Mod",
            "title": "User:X", "timestamp": "2024-03-01T10:00:00Z"
        }));
        assert!(normalizer().normalize(&record, &site()).is_none());
    }

    #[test]
    fn test_abuse_result_localized() {
        let record = RawRecord::parse(
            SourceKind::AbuseLog,
            json!({"filter_id": "3", "filter": "Caps", "user": "Y", "title": "P",
                   "action": "edit", "result": "disallow", "timestamp": "2024-03-01T10:00:00Z"}),
        )
        .unwrap();
        assert_eq!(
            args(normalizer().normalize(&record, &site())),
            vec!["abuselog", "Y", "3", "Caps", "edit", "P", "disallowed"]
        );

        let excluded = RawRecord::parse(
            SourceKind::AbuseLog,
            json!({"filter_id": 13, "result": "warn", "timestamp": "2024-03-01T10:00:00Z"}),
        )
        .unwrap();
        assert!(normalizer().normalize(&excluded, &site()).is_none());
    }

    #[test]
    fn test_board_of() {
        assert_eq!(
            board_of("Message Wall:Alice/@comment-Bob", 1201),
            BoardRef {
                namespace: 1201,
                name: "Alice".to_string()
            }
        );
    }
}
