//! Canonical events and their message form.

use serde::Serialize;

/// A thread reference as it should be linked: the target page and its display title.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadRef {
    pub target: String,
    pub title: String,
}

/// A discussion board: its namespace code and name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoardRef {
    pub namespace: i64,
    pub name: String,
}

/// Moderation actions on message-wall and forum threads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadAction {
    Close,
    Remove,
    Delete,
    Restore,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MapAction {
    CreatePin,
    UpdatePin,
    DeletePin,
    CreateMap,
    DeleteMap,
}

/// The destination-agnostic form of one activity record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CanonicalEvent {
    PageCreated {
        user: String,
        title: String,
        size_delta: i64,
        summary: String,
    },
    PageEdited {
        user: String,
        title: String,
        size_delta: i64,
        revision: u64,
        summary: String,
    },
    ThreadCreated {
        user: String,
        thread: ThreadRef,
        board: BoardRef,
        size_delta: i64,
        summary: String,
    },
    ThreadEdited {
        user: String,
        board: BoardRef,
        size_delta: i64,
        revision: u64,
        summary: String,
    },
    ThreadModerated {
        action: ThreadAction,
        user: String,
        thread: ThreadRef,
        board: BoardRef,
        summary: String,
    },
    UserBlocked {
        reblock: bool,
        user: String,
        target: String,
        duration: String,
        flags: String,
        summary: String,
    },
    UserUnblocked {
        user: String,
        target: String,
        summary: String,
    },
    AccountCreated {
        user: String,
    },
    AvatarChanged {
        user: String,
    },
    AvatarRemoved {
        user: String,
        target: String,
    },
    PageDeleted {
        user: String,
        title: String,
        summary: String,
    },
    PageRestored {
        user: String,
        title: String,
        summary: String,
    },
    PageMoved {
        redirect: bool,
        user: String,
        from: String,
        to: String,
        summary: String,
    },
    RightsChanged {
        user: String,
        target: String,
        old: String,
        new: String,
        summary: String,
    },
    FileUploaded {
        overwrite: bool,
        user: String,
        title: String,
        summary: String,
    },
    ChatBanned {
        change: bool,
        user: String,
        target: String,
        duration: String,
        summary: String,
    },
    ChatUnbanned {
        user: String,
        target: String,
        summary: String,
    },
    PageProtected {
        modify: bool,
        user: String,
        title: String,
        detail: String,
        summary: String,
    },
    PageUnprotected {
        user: String,
        title: String,
        summary: String,
    },
    PagesMerged {
        user: String,
        title: String,
        destination: String,
        summary: String,
    },
    FilterModified {
        user: String,
        filter: String,
        history: String,
    },
    FeaturesChanged {
        user: String,
        summary: String,
    },
    PageImported {
        user: String,
        title: String,
        summary: String,
    },
    MapChanged {
        action: MapAction,
        user: String,
        title: String,
        summary: String,
    },
    UserRenamed {
        user: String,
        summary: String,
    },
    SiteRegistered {
        domain: String,
    },
    FilterTriggered {
        user: String,
        filter_id: String,
        filter: String,
        action: String,
        title: String,
        result: String,
    },
    RelayStarted {
        name: String,
        version: String,
    },
    /// A record the normalizer has no mapping for, carried as serialized JSON.
    Unrecognized {
        raw: String,
    },
}

/// Wire shape consumed by the templater: a message key followed by the
/// positional arguments of its localized string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EventMessage {
    pub key: &'static str,
    pub args: Vec<String>,
}

impl EventMessage {
    fn new(key: &'static str, args: Vec<String>) -> Self {
        Self { key, args }
    }

    /// `[key, arg1, arg2, ...]`
    pub fn to_vec(&self) -> Vec<String> {
        std::iter::once(self.key.to_string())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

impl CanonicalEvent {
    /// The string-table key this event renders with.
    pub fn message_key(&self) -> &'static str {
        self.to_message().key
    }

    pub fn to_message(&self) -> EventMessage {
        use CanonicalEvent::*;

        match self {
            PageCreated {
                user,
                title,
                size_delta,
                summary,
            } => EventMessage::new(
                "new",
                vec![user.clone(), title.clone(), size_delta.to_string(), summary.clone()],
            ),
            PageEdited {
                user,
                title,
                size_delta,
                revision,
                summary,
            } => EventMessage::new(
                "edit",
                vec![
                    user.clone(),
                    title.clone(),
                    size_delta.to_string(),
                    revision.to_string(),
                    summary.clone(),
                ],
            ),
            ThreadCreated {
                user,
                thread,
                board,
                size_delta,
                summary,
            } => EventMessage::new(
                "newthread",
                vec![
                    user.clone(),
                    thread.target.clone(),
                    thread.title.clone(),
                    board.namespace.to_string(),
                    board.name.clone(),
                    size_delta.to_string(),
                    summary.clone(),
                ],
            ),
            ThreadEdited {
                user,
                board,
                size_delta,
                revision,
                summary,
            } => EventMessage::new(
                "editthread",
                vec![
                    user.clone(),
                    board.namespace.to_string(),
                    board.name.clone(),
                    size_delta.to_string(),
                    revision.to_string(),
                    summary.clone(),
                ],
            ),
            ThreadModerated {
                action,
                user,
                thread,
                board,
                summary,
            } => {
                let key = match action {
                    ThreadAction::Close => "threadclose",
                    ThreadAction::Remove => "threadremove",
                    ThreadAction::Delete => "threaddelete",
                    ThreadAction::Restore => "threadrestore",
                };
                EventMessage::new(
                    key,
                    vec![
                        user.clone(),
                        thread.target.clone(),
                        thread.title.clone(),
                        board.namespace.to_string(),
                        board.name.clone(),
                        summary.clone(),
                    ],
                )
            }
            UserBlocked {
                reblock,
                user,
                target,
                duration,
                flags,
                summary,
            } => EventMessage::new(
                if *reblock { "reblock" } else { "block" },
                vec![
                    user.clone(),
                    target.clone(),
                    duration.clone(),
                    flags.clone(),
                    summary.clone(),
                ],
            ),
            UserUnblocked {
                user,
                target,
                summary,
            } => EventMessage::new("unblock", vec![user.clone(), target.clone(), summary.clone()]),
            AccountCreated { user } => EventMessage::new("newusers", vec![user.clone()]),
            AvatarChanged { user } => EventMessage::new("avatar", vec![user.clone()]),
            AvatarRemoved { user, target } => {
                EventMessage::new("remavatar", vec![user.clone(), target.clone()])
            }
            PageDeleted {
                user,
                title,
                summary,
            } => EventMessage::new("delete", vec![user.clone(), title.clone(), summary.clone()]),
            PageRestored {
                user,
                title,
                summary,
            } => EventMessage::new("restore", vec![user.clone(), title.clone(), summary.clone()]),
            PageMoved {
                redirect,
                user,
                from,
                to,
                summary,
            } => EventMessage::new(
                if *redirect { "moveredir" } else { "move" },
                vec![user.clone(), from.clone(), to.clone(), summary.clone()],
            ),
            RightsChanged {
                user,
                target,
                old,
                new,
                summary,
            } => EventMessage::new(
                "rights",
                vec![
                    user.clone(),
                    target.clone(),
                    old.clone(),
                    new.clone(),
                    summary.clone(),
                ],
            ),
            FileUploaded {
                overwrite,
                user,
                title,
                summary,
            } => EventMessage::new(
                if *overwrite { "reupload" } else { "upload" },
                vec![user.clone(), title.clone(), summary.clone()],
            ),
            ChatBanned {
                change,
                user,
                target,
                duration,
                summary,
            } => EventMessage::new(
                if *change { "chatbanchange" } else { "chatbanadd" },
                vec![user.clone(), target.clone(), duration.clone(), summary.clone()],
            ),
            ChatUnbanned {
                user,
                target,
                summary,
            } => EventMessage::new(
                "chatbanremove",
                vec![user.clone(), target.clone(), summary.clone()],
            ),
            PageProtected {
                modify,
                user,
                title,
                detail,
                summary,
            } => EventMessage::new(
                if *modify { "reprotect" } else { "protect" },
                vec![user.clone(), title.clone(), detail.clone(), summary.clone()],
            ),
            PageUnprotected {
                user,
                title,
                summary,
            } => EventMessage::new("unprotect", vec![user.clone(), title.clone(), summary.clone()]),
            PagesMerged {
                user,
                title,
                destination,
                summary,
            } => EventMessage::new(
                "merge",
                vec![user.clone(), title.clone(), destination.clone(), summary.clone()],
            ),
            FilterModified {
                user,
                filter,
                history,
            } => EventMessage::new(
                "abusefilter",
                vec![user.clone(), filter.clone(), history.clone()],
            ),
            FeaturesChanged { user, summary } => {
                EventMessage::new("wikifeatures", vec![user.clone(), summary.clone()])
            }
            PageImported {
                user,
                title,
                summary,
            } => EventMessage::new("import", vec![user.clone(), title.clone(), summary.clone()]),
            MapChanged {
                action,
                user,
                title,
                summary,
            } => match action {
                MapAction::CreatePin => EventMessage::new(
                    "createpin",
                    vec![user.clone(), title.clone(), summary.clone()],
                ),
                MapAction::UpdatePin => EventMessage::new(
                    "updatepin",
                    vec![user.clone(), title.clone(), summary.clone()],
                ),
                MapAction::DeletePin => {
                    EventMessage::new("deletepin", vec![user.clone(), title.clone()])
                }
                MapAction::CreateMap => EventMessage::new(
                    "createmap",
                    vec![user.clone(), title.clone(), summary.clone()],
                ),
                MapAction::DeleteMap => EventMessage::new("deletemap", vec![user.clone()]),
            },
            UserRenamed { user, summary } => {
                EventMessage::new("renameuser", vec![user.clone(), summary.clone()])
            }
            SiteRegistered { domain } => EventMessage::new("newwikis", vec![domain.clone()]),
            FilterTriggered {
                user,
                filter_id,
                filter,
                action,
                title,
                result,
            } => EventMessage::new(
                "abuselog",
                vec![
                    user.clone(),
                    filter_id.clone(),
                    filter.clone(),
                    action.clone(),
                    title.clone(),
                    result.clone(),
                ],
            ),
            RelayStarted { name, version } => {
                EventMessage::new("start", vec![name.clone(), version.clone()])
            }
            Unrecognized { raw } => EventMessage::new("debug", vec![raw.clone()]),
        }
    }
}
