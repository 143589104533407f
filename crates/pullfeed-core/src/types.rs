//! Domain types: releases, feeds and keyword rules.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{PullFeedError, Result};
use crate::publisher::Publisher;

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                s.trim().parse().map($name)
            }
        }
    };
}

snowflake!(
    /// A tenant is one chat server (guild).
    TenantId
);
snowflake!(
    /// Output channel within a tenant.
    ChannelId
);
snowflake!(RoleId);
snowflake!(MessageId);
snowflake!(UserId);

// ─── Publishers ───────────────────────────────────────────

/// Fixed set of publishers the catalog knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublisherId {
    Marvel,
    Dc,
    DarkHorse,
    Idw,
    Image,
}

impl PublisherId {
    pub const ALL: [PublisherId; 5] = [
        PublisherId::Marvel,
        PublisherId::Dc,
        PublisherId::DarkHorse,
        PublisherId::Idw,
        PublisherId::Image,
    ];

    /// Stable storage key.
    pub fn as_str(&self) -> &'static str {
        match self {
            PublisherId::Marvel => "MARVEL",
            PublisherId::Dc => "DC",
            PublisherId::DarkHorse => "DARK_HORSE",
            PublisherId::Idw => "IDW",
            PublisherId::Image => "IMAGE",
        }
    }
}

impl fmt::Display for PublisherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PublisherId {
    type Err = PullFeedError;

    fn from_str(s: &str) -> Result<Self> {
        let norm: String = s
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_uppercase();
        match norm.as_str() {
            "MARVEL" => Ok(PublisherId::Marvel),
            "DC" => Ok(PublisherId::Dc),
            "DARKHORSE" => Ok(PublisherId::DarkHorse),
            "IDW" => Ok(PublisherId::Idw),
            "IMAGE" => Ok(PublisherId::Image),
            _ => Err(PullFeedError::UnknownPublisher(s.to_string())),
        }
    }
}

// ─── Releases ─────────────────────────────────────────────

/// Physical format of a release.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReleaseFormat {
    Issue,
    TradePaperback,
    Hardcover,
    Other(String),
}

impl ReleaseFormat {
    /// Map the upstream format label.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "comic" | "issue" => ReleaseFormat::Issue,
            "trade paperback" | "tpb" | "trade" => ReleaseFormat::TradePaperback,
            "hardcover" | "hc" => ReleaseFormat::Hardcover,
            _ => ReleaseFormat::Other(label.trim().to_string()),
        }
    }

    /// Display ordering: issues first, unknown formats last.
    pub fn precedence(&self) -> u8 {
        match self {
            ReleaseFormat::Issue => 0,
            ReleaseFormat::TradePaperback => 1,
            ReleaseFormat::Hardcover => 2,
            ReleaseFormat::Other(_) => 3,
        }
    }

    pub fn is_single_issue(&self) -> bool {
        matches!(self, ReleaseFormat::Issue)
    }
}

/// Display order for creator roles; anything else sorts after, alphabetically.
const ROLE_PRIORITY: [&str; 7] = [
    "Writer", "Artist", "Penciler", "Inker", "Colorist", "Letterer", "Editor",
];

/// Primary roles shown in compact renders.
pub const PRIMARY_ROLES: [&str; 3] = ["Writer", "Penciler", "Artist"];

/// One catalog item. Immutable once built; a refresh replaces whole snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub id: u64,
    pub publisher: PublisherId,
    pub title: String,
    pub description: Option<String>,
    /// Role → names.
    pub creators: BTreeMap<String, BTreeSet<String>>,
    pub format: ReleaseFormat,
    pub release_date: NaiveDate,
    pub price: Option<f64>,
    pub page_count: Option<u32>,
    pub cover_image_url: Option<String>,
    pub detail_url: Option<String>,
}

impl Release {
    /// Writers joined and sorted by surname.
    pub fn writer(&self) -> Option<String> {
        let names = self.creators.get("Writer")?;
        if names.is_empty() {
            return None;
        }
        Some(by_surname(names.iter()).join(", "))
    }

    /// Every creator name, for keyword matching.
    pub fn creator_names(&self) -> impl Iterator<Item = &str> {
        self.creators.values().flatten().map(String::as_str)
    }

    /// Roles in display order, paired with surname-sorted names.
    pub fn ordered_roles(&self) -> Vec<(&str, Vec<&str>)> {
        let mut roles: Vec<&str> = self.creators.keys().map(String::as_str).collect();
        roles.sort_by_key(|r| {
            let rank = ROLE_PRIORITY
                .iter()
                .position(|p| p == r)
                .unwrap_or(ROLE_PRIORITY.len());
            (rank, r.to_string())
        });
        roles
            .into_iter()
            .map(|r| (r, by_surname(self.creators[r].iter())))
            .collect()
    }

    pub fn price_label(&self) -> Option<String> {
        self.price.map(|p| format!("${p:.2} USD"))
    }

    pub fn pages_label(&self) -> Option<String> {
        self.page_count
            .filter(|&n| n > 0)
            .map(|n| format!("{n} pages"))
    }

    pub fn is_single_issue(&self) -> bool {
        self.format.is_single_issue()
    }
}

fn by_surname<'a>(names: impl Iterator<Item = &'a String>) -> Vec<&'a str> {
    let mut v: Vec<&str> = names.map(String::as_str).collect();
    v.sort_by(|a, b| {
        let sa = a.rsplit(' ').next().unwrap_or(a);
        let sb = b.rsplit(' ').next().unwrap_or(b);
        sa.cmp(sb).then_with(|| a.cmp(b))
    });
    v
}

// ─── Feeds ────────────────────────────────────────────────

/// How a feed renders each occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DisplayFormat {
    /// One embed per release with a full-size cover, then the summary.
    Full,
    /// One embed per release with a thumbnail and primary creators, then the summary.
    Compact,
    /// Summary only.
    #[default]
    Summary,
}

impl DisplayFormat {
    /// Lower sorts first when spreading trigger offsets.
    pub fn priority(&self) -> u8 {
        match self {
            DisplayFormat::Compact => 0,
            DisplayFormat::Summary => 1,
            DisplayFormat::Full => 2,
        }
    }

    pub fn sends_details(&self) -> bool {
        matches!(self, DisplayFormat::Full | DisplayFormat::Compact)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayFormat::Full => "Full",
            DisplayFormat::Compact => "Compact",
            DisplayFormat::Summary => "Summary",
        }
    }
}

impl fmt::Display for DisplayFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DisplayFormat {
    type Err = PullFeedError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(DisplayFormat::Full),
            "compact" => Ok(DisplayFormat::Compact),
            "summary" => Ok(DisplayFormat::Summary),
            other => Err(PullFeedError::InvalidUpdate(format!("unknown format '{other}'"))),
        }
    }
}

/// Identity of a feed: one per (tenant, publisher).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeedKey {
    pub tenant: TenantId,
    pub publisher: PublisherId,
}

impl fmt::Display for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.tenant, self.publisher)
    }
}

/// Per-(tenant, publisher) delivery configuration. Owned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    pub tenant: TenantId,
    pub publisher: PublisherId,
    pub channel: ChannelId,
    pub format: DisplayFormat,
    pub weekday: Weekday,
    pub mention_role: Option<RoleId>,
    pub pin: bool,
    pub check_keywords: bool,
}

impl FeedConfig {
    /// New feed with the publisher's default weekday and Summary format.
    pub fn new(tenant: TenantId, channel: ChannelId, publisher: &Publisher) -> Self {
        Self {
            tenant,
            publisher: publisher.id,
            channel,
            format: DisplayFormat::Summary,
            weekday: publisher.default_weekday,
            mention_role: None,
            pin: false,
            check_keywords: false,
        }
    }

    pub fn key(&self) -> FeedKey {
        FeedKey {
            tenant: self.tenant,
            publisher: self.publisher,
        }
    }
}

/// A single field edit. The variant set is the closed list of editable fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedUpdate {
    Channel(ChannelId),
    Format(DisplayFormat),
    Weekday(Weekday),
    MentionRole(Option<RoleId>),
    Pin(bool),
    CheckKeywords(bool),
}

impl FeedUpdate {
    /// Parse `field=value`, e.g. `weekday=wed`, `pin=true`, `mention=none`.
    pub fn parse(s: &str) -> Result<Self> {
        let (field, value) = s
            .split_once('=')
            .ok_or_else(|| PullFeedError::InvalidUpdate(format!("expected field=value, got '{s}'")))?;
        let value = value.trim();
        let bad = |what: &str| PullFeedError::InvalidUpdate(format!("invalid {what} '{value}'"));
        match field.trim().to_ascii_lowercase().as_str() {
            "channel" => value
                .parse()
                .map(FeedUpdate::Channel)
                .map_err(|_| bad("channel")),
            "format" => value.parse().map(FeedUpdate::Format),
            "weekday" | "day" => parse_weekday(value).map(FeedUpdate::Weekday),
            "mention" | "ping" | "role" => match value.to_ascii_lowercase().as_str() {
                "" | "none" | "off" => Ok(FeedUpdate::MentionRole(None)),
                v => v
                    .parse()
                    .map(|r| FeedUpdate::MentionRole(Some(r)))
                    .map_err(|_| bad("role")),
            },
            "pin" => parse_bool(value).map(FeedUpdate::Pin).ok_or_else(|| bad("pin flag")),
            "keywords" | "check_keywords" | "check-keywords" => parse_bool(value)
                .map(FeedUpdate::CheckKeywords)
                .ok_or_else(|| bad("keywords flag")),
            other => Err(PullFeedError::InvalidUpdate(format!("unknown field '{other}'"))),
        }
    }

    /// Whether this edit moves the feed's timer.
    pub fn affects_schedule(&self) -> bool {
        matches!(self, FeedUpdate::Weekday(_))
    }
}

/// Apply edits in order.
pub fn apply_update(config: &mut FeedConfig, updates: &[FeedUpdate]) {
    for update in updates {
        match *update {
            FeedUpdate::Channel(c) => config.channel = c,
            FeedUpdate::Format(f) => config.format = f,
            FeedUpdate::Weekday(d) => config.weekday = d,
            FeedUpdate::MentionRole(r) => config.mention_role = r,
            FeedUpdate::Pin(p) => config.pin = p,
            FeedUpdate::CheckKeywords(k) => config.check_keywords = k,
        }
    }
}

/// Accepts `0`–`6` (Monday = 0) or a weekday name.
pub fn parse_weekday(s: &str) -> Result<Weekday> {
    if let Ok(n) = s.trim().parse::<u8>() {
        return weekday_from_index(n);
    }
    s.trim()
        .parse::<Weekday>()
        .map_err(|_| PullFeedError::InvalidUpdate(format!("invalid weekday '{s}'")))
}

/// Monday = 0 … Sunday = 6.
pub fn weekday_from_index(n: u8) -> Result<Weekday> {
    if n > 6 {
        return Err(PullFeedError::InvalidUpdate(format!("weekday index {n} out of range 0-6")));
    }
    let mut day = Weekday::Mon;
    for _ in 0..n {
        day = day.succ();
    }
    Ok(day)
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

// ─── Keywords ─────────────────────────────────────────────

/// Which part of a release a keyword is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeywordKind {
    /// Title and description.
    Title,
    /// Creator names.
    Creator,
}

impl KeywordKind {
    pub fn code(&self) -> i64 {
        match self {
            KeywordKind::Title => 0,
            KeywordKind::Creator => 1,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(KeywordKind::Title),
            1 => Some(KeywordKind::Creator),
            _ => None,
        }
    }
}

/// A tenant's keyword rules. Terms are stored normalized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRuleSet {
    pub title_terms: BTreeSet<String>,
    pub creator_terms: BTreeSet<String>,
}

impl KeywordRuleSet {
    /// Uppercased, trimmed form used for storage and comparison.
    pub fn normalize(term: &str) -> String {
        term.trim().to_uppercase()
    }

    /// Returns false if the term was already present or normalizes to nothing.
    pub fn add(&mut self, kind: KeywordKind, term: &str) -> bool {
        let term = Self::normalize(term);
        if term.is_empty() {
            return false;
        }
        self.terms_mut(kind).insert(term)
    }

    /// Returns false if the term was not present.
    pub fn remove(&mut self, kind: KeywordKind, term: &str) -> bool {
        let term = Self::normalize(term);
        self.terms_mut(kind).remove(&term)
    }

    pub fn terms(&self, kind: KeywordKind) -> &BTreeSet<String> {
        match kind {
            KeywordKind::Title => &self.title_terms,
            KeywordKind::Creator => &self.creator_terms,
        }
    }

    fn terms_mut(&mut self, kind: KeywordKind) -> &mut BTreeSet<String> {
        match kind {
            KeywordKind::Title => &mut self.title_terms,
            KeywordKind::Creator => &mut self.creator_terms,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title_terms.is_empty() && self.creator_terms.is_empty()
    }
}
