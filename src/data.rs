use chrono::{DateTime, FixedOffset};
use gloo_net::http::Request;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Fid {
    Number(u64),
    Text(String),
}

impl Default for Fid {
    fn default() -> Self {
        Self::Number(0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    #[serde(default)]
    pub fid: Fid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fname: Option<String>,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, alias = "pfp_url")]
    pub avatar_url: String,
    #[serde(default)]
    pub custody_address: String,
}

impl Author {
    /// Handle shown next to the display name, preferring the fname.
    pub fn handle(&self) -> &str {
        non_empty(self.fname.as_deref())
            .or_else(|| non_empty(self.username.as_deref()))
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reactions {
    #[serde(default)]
    pub likes_count: u64,
    #[serde(default)]
    pub recasts_count: u64,
}

/// A single post in a thread. Questions and answers share this shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cast {
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_hash: Option<String>,
    #[serde(default)]
    pub author: Author,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub reactions: Reactions,
}

impl Cast {
    pub fn posted_at(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.timestamp).ok()
    }

    pub fn posted_on(&self) -> String {
        self.posted_at()
            .map(|at| at.format("%b %-d, %Y").to_string())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootCast {
    #[serde(flatten)]
    pub cast: Cast,
    #[serde(default)]
    pub mentioned_profiles: Vec<Author>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_hash: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThreadResponse {
    pub cast: RootCast,
    #[serde(default)]
    pub casts: Vec<Cast>,
}

/// Seed data for one AMA page: the root post, the guest answering questions,
/// and the two reply tiers sorted oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedData {
    pub root: RootCast,
    pub answerer: Author,
    pub second_tier: Vec<Cast>,
    pub third_tier: Vec<Cast>,
}

#[derive(Debug, Error)]
pub enum DataError {
    #[error("thread not found: {0}")]
    NotFound(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("please provide a valid thread URL (got '{0}')")]
    InvalidUrl(String),
}

impl DataError {
    fn network<E: std::fmt::Display>(err: E) -> Self {
        Self::Network(err.to_string())
    }

    fn parse<E: std::fmt::Display>(err: E) -> Self {
        Self::Parse(err.to_string())
    }
}

pub async fn fetch_thread(endpoint: &str, source_url: &str) -> Result<SeedData, DataError> {
    let source_url = validate_source_url(source_url)?;

    let response = Request::get(endpoint)
        .query([("url", source_url)])
        .send()
        .await
        .map_err(DataError::network)?;

    if response.status() == 404 {
        return Err(DataError::NotFound(source_url.to_owned()));
    }

    if !response.ok() {
        return Err(DataError::Network(format!(
            "HTTP {} while fetching thread for {}",
            response.status(),
            source_url
        )));
    }

    let text = response.text().await.map_err(DataError::network)?;
    let thread: ThreadResponse = serde_json::from_str(&text).map_err(DataError::parse)?;

    debug!(
        "fetched thread {} with {} casts",
        thread.cast.cast.hash,
        thread.casts.len()
    );

    Ok(classify_thread(thread.cast, thread.casts))
}

pub fn validate_source_url(source_url: &str) -> Result<&str, DataError> {
    let trimmed = source_url.trim();
    if trimmed.starts_with("https://") || trimmed.starts_with("http://") {
        Ok(trimmed)
    } else {
        Err(DataError::InvalidUrl(trimmed.to_owned()))
    }
}

/// The guest of an AMA is the first profile mentioned by the root post, or
/// the root author when nobody is mentioned.
pub fn answering_identity(root: &RootCast) -> Author {
    root.mentioned_profiles
        .first()
        .cloned()
        .unwrap_or_else(|| root.cast.author.clone())
}

pub fn is_authored_by(cast: &Cast, identity: &Author) -> bool {
    let same = |left: Option<&str>, right: Option<&str>| match (non_empty(left), non_empty(right)) {
        (Some(left), Some(right)) => left == right,
        _ => false,
    };

    same(identity.username.as_deref(), cast.author.username.as_deref())
        || same(identity.fname.as_deref(), cast.author.fname.as_deref())
}

pub fn classify_thread(root: RootCast, casts: Vec<Cast>) -> SeedData {
    let answerer = answering_identity(&root);
    let mut second_tier = Vec::new();
    let mut third_tier = Vec::new();

    for cast in casts {
        if cast.hash == root.cast.hash {
            continue;
        }

        if is_authored_by(&cast, &answerer) {
            third_tier.push(cast);
        } else if replies_to_root(&cast, &root) {
            second_tier.push(cast);
        }
    }

    sort_by_timestamp(&mut second_tier);
    sort_by_timestamp(&mut third_tier);

    SeedData {
        root,
        answerer,
        second_tier,
        third_tier,
    }
}

fn replies_to_root(cast: &Cast, root: &RootCast) -> bool {
    match cast.parent_hash.as_deref() {
        None => true,
        Some(parent) => parent == root.cast.hash,
    }
}

/// Oldest first. Casts with an unreadable timestamp sort ahead of dated ones,
/// ties are broken by hash so the order is stable across fetches.
pub fn sort_by_timestamp(casts: &mut [Cast]) {
    let unreadable = casts.iter().filter(|cast| cast.posted_at().is_none()).count();
    if unreadable > 0 {
        warn!("{} casts have unreadable timestamps", unreadable);
    }

    casts.sort_by(|a, b| match (a.posted_at(), b.posted_at()) {
        (Some(left), Some(right)) => left.cmp(&right).then_with(|| a.hash.cmp(&b.hash)),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => a.hash.cmp(&b.hash),
    });
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.is_empty())
}
