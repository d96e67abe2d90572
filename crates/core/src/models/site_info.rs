//! Server-side facts about a site, fetched once at bootstrap.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::errors::{RelayError, Result};

/// Namespace names used when the server does not report them.
const FALLBACK_NAMESPACES: [(i64, &str); 2] = [(1200, "Message Wall"), (2000, "Board")];

/// Right required to read `list=abuselog`.
pub const ABUSE_LOG_RIGHT: &str = "abusefilter-log";

/// Link-building facts and account rights of a site.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SiteInfo {
    /// `https://host`, no trailing slash.
    pub server: String,
    /// Article path with a `$1` placeholder, e.g. `/wiki/$1`.
    pub article_path: String,
    /// Path of `index.php` and friends, may be empty.
    pub script_path: String,
    pub namespaces: HashMap<i64, String>,
    pub rights: HashSet<String>,
}

impl SiteInfo {
    /// Defaults for a host, used until (or instead of) the siteinfo query.
    pub fn for_host(host: &str) -> Self {
        Self {
            server: format!("https://{}", host),
            article_path: "/wiki/$1".to_string(),
            script_path: String::new(),
            namespaces: FALLBACK_NAMESPACES
                .iter()
                .map(|(id, name)| (*id, name.to_string()))
                .collect(),
            rights: HashSet::new(),
        }
    }

    /// Parse the `query` object of a `meta=siteinfo|userinfo` request.
    pub fn from_query(query: &Value) -> Result<Self> {
        let general = query
            .get("general")
            .ok_or_else(|| RelayError::malformed("siteinfo", "missing 'general'"))?;

        let server = general
            .get("server")
            .and_then(Value::as_str)
            .ok_or_else(|| RelayError::malformed("siteinfo", "missing 'server'"))?;
        let server = if server.starts_with("//") {
            format!("https:{}", server)
        } else {
            server.to_string()
        };

        let mut info = Self {
            server: server.trim_end_matches('/').to_string(),
            ..Self::for_host("")
        };
        if let Some(path) = general.get("articlepath").and_then(Value::as_str) {
            info.article_path = path.to_string();
        }
        if let Some(path) = general.get("scriptpath").and_then(Value::as_str) {
            info.script_path = path.to_string();
        }

        if let Some(namespaces) = query.get("namespaces").and_then(Value::as_object) {
            for (id, ns) in namespaces {
                let Ok(id) = id.parse::<i64>() else { continue };
                let name = ns
                    .get("*")
                    .or_else(|| ns.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if !name.is_empty() {
                    info.namespaces.insert(id, name.to_string());
                }
            }
        }

        if let Some(rights) = query
            .get("userinfo")
            .and_then(|u| u.get("rights"))
            .and_then(Value::as_array)
        {
            info.rights = rights
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
        }

        Ok(info)
    }

    pub fn has_right(&self, right: &str) -> bool {
        self.rights.contains(right)
    }

    pub fn namespace_name(&self, id: i64) -> Option<&str> {
        self.namespaces.get(&id).map(String::as_str)
    }

    /// Absolute URL of a page.
    pub fn article_url(&self, page: &str) -> String {
        format!(
            "{}{}",
            self.server,
            self.article_path.replace("$1", &encode_page_name(page))
        )
    }

    /// Absolute URL of a revision diff.
    pub fn diff_url(&self, revision: &str) -> String {
        format!("{}{}/?diff={}", self.server, self.script_path, revision)
    }
}

/// Percent-encode a page name, keeping the characters readers expect to see
/// (`:`, `/`, `@`) and turning spaces into underscores.
pub fn encode_page_name(page: &str) -> String {
    urlencoding::encode(page)
        .replace("%3A", ":")
        .replace("%2F", "/")
        .replace("%40", "@")
        .replace("%20", "_")
}
