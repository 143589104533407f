//! Message rendering: detail embeds, summary pages and send packing.
//!
//! Every embed leaving this module is within the platform limits in
//! [`pullfeed_core::message`]; every packed send stays under
//! [`MESSAGE_CHAR_LIMIT`] aggregate characters and [`MAX_EMBEDS_PER_MESSAGE`].

use chrono::NaiveDate;
use pullfeed_core::message::{
    DESCRIPTION_LIMIT, MAX_EMBEDS_PER_MESSAGE, MAX_FIELDS_PER_EMBED, MESSAGE_CHAR_LIMIT,
    TITLE_LIMIT, truncate,
};
use pullfeed_core::types::PRIMARY_ROLES;
use pullfeed_core::{DisplayFormat, Embed, OutgoingMessage, Publisher, Release, RoleId};

const SOURCE_NAME: &str = "League of Comic Geeks";
const EMPTY_INFO: &str = "···";
const SEPARATOR: &str = " · ";

/// `14 October 2026`.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%-d %B %Y").to_string()
}

/// Lead message for Full/Compact occurrences.
pub fn lead_header(publisher: &Publisher, date: NaiveDate) -> String {
    format!("## {} Comics - {}", publisher.name, format_date(date))
}

pub fn empty_notice(publisher: &Publisher) -> String {
    format!("There are no {} comics this week.", publisher.name)
}

pub fn mention(role: RoleId) -> String {
    format!("<@&{role}>")
}

pub fn summary_title(publisher: &Publisher, date: NaiveDate) -> String {
    format!("{} Comics Releases Summary - {}", publisher.name, format_date(date))
}

// ─── Detail embeds ────────────────────────────────────────

/// One release. Full gets a large cover and every creator role, Compact a
/// thumbnail and the primary roles.
pub fn detail_embed(release: &Release, publisher: &Publisher, format: DisplayFormat) -> Embed {
    let compact = format == DisplayFormat::Compact;
    let mut embed = Embed::colored(publisher.color);
    embed.title = Some(truncate(&release.title, TITLE_LIMIT));
    embed.url = release.detail_url.clone();
    embed.description = release
        .description
        .as_deref()
        .map(|d| truncate(d, DESCRIPTION_LIMIT));

    let creators = format_creators(release, compact);
    if !creators.is_empty() {
        embed.add_field("Creators", creators, true);
    }

    let mut info = [release.price_label(), release.pages_label()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(SEPARATOR);
    if let Some(url) = &release.detail_url {
        if !info.is_empty() {
            info.push('\n');
        }
        info.push_str(&format!("-# More details on [{SOURCE_NAME}]({url})"));
    }
    if !info.is_empty() {
        embed.add_field("Info", info, true);
    }

    embed.footer = Some(truncate(
        &format!("{} · {}", release.title, publisher.name),
        TITLE_LIMIT,
    ));

    if compact {
        embed.thumbnail_url = release.cover_image_url.clone();
    } else {
        embed.image_url = release.cover_image_url.clone();
    }

    fit_to_limit(&mut embed);
    embed
}

/// `-# **Role**\n**Names**` per role, cover credits left out.
fn format_creators(release: &Release, compact: bool) -> String {
    release
        .ordered_roles()
        .into_iter()
        .filter(|(role, _)| !compact || PRIMARY_ROLES.contains(role))
        .filter(|(role, _)| !role.ends_with("(Cover)") && !role.starts_with("Cover"))
        .map(|(role, names)| format!("-# **{role}**\n**{}**", names.join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Trim the description until the embed fits in one send.
fn fit_to_limit(embed: &mut Embed) {
    let len = embed.char_len();
    if len <= MESSAGE_CHAR_LIMIT {
        return;
    }
    let excess = len - MESSAGE_CHAR_LIMIT;
    if let Some(desc) = embed.description.take() {
        let keep = desc.chars().count().saturating_sub(excess);
        if keep > 0 {
            embed.description = Some(truncate(&desc, keep));
        }
    }
}

// ─── Summary ──────────────────────────────────────────────

/// One summary line: a release plus where "More" should point.
#[derive(Debug, Clone)]
pub struct SummaryEntry<'a> {
    pub release: &'a Release,
    /// Jump URL of the detail message if one was sent, else the catalog page.
    pub link: Option<String>,
}

impl<'a> SummaryEntry<'a> {
    pub fn new(release: &'a Release, link: Option<String>) -> Self {
        Self { release, link }
    }

    fn info(&self) -> String {
        let mut parts = Vec::with_capacity(2);
        if let Some(writer) = self.release.writer() {
            parts.push(writer);
        }
        if let Some(link) = &self.link {
            parts.push(format!("[More]({link})"));
        }
        if parts.is_empty() {
            EMPTY_INFO.to_string()
        } else {
            parts.join(SEPARATOR)
        }
    }
}

/// Split entries into summary pages and append the attribution embed.
///
/// A page closes when it holds [`MAX_FIELDS_PER_EMBED`] entries, when the next
/// entry would push it past [`MESSAGE_CHAR_LIMIT`], or at the first collected
/// edition after single issues. An entry too large for any page gets a page of
/// its own, truncated.
pub fn summary_pages(
    entries: &[SummaryEntry<'_>],
    publisher: &Publisher,
    date: NaiveDate,
    jump_to: Option<&str>,
) -> Vec<Embed> {
    let blank = Embed::colored(publisher.color);
    let mut first = blank.clone();
    first.title = Some(summary_title(publisher, date));

    let mut pages: Vec<Embed> = Vec::new();
    let mut page = first;
    let mut in_issues = true;

    for entry in entries {
        let name = &entry.release.title;
        let info = entry.info();
        let raw_len = name.chars().count() + info.chars().count();

        let mut close = page.fields.len() >= MAX_FIELDS_PER_EMBED
            || page.char_len() + raw_len > MESSAGE_CHAR_LIMIT;
        if in_issues && !entry.release.is_single_issue() {
            close = true;
            in_issues = false;
        }
        let oversized = raw_len > MESSAGE_CHAR_LIMIT;
        if (close || oversized) && !page.fields.is_empty() {
            pages.push(std::mem::replace(&mut page, blank.clone()));
        }

        page.add_field(name.as_str(), info, true);

        if oversized {
            pages.push(std::mem::replace(&mut page, blank.clone()));
        }
    }
    if !page.fields.is_empty() || pages.is_empty() {
        pages.push(page);
    }

    let mut closing = blank;
    let mut lines = Vec::with_capacity(2);
    if let Some(url) = jump_to {
        lines.push(format!("*Jump to the [beginning]({url}).*"));
    }
    lines.push(publisher.attribution.to_string());
    closing.description = Some(lines.join("\n"));
    pages.push(closing);

    pages
}

/// Greedily pack embeds into sends of at most [`MESSAGE_CHAR_LIMIT`] characters
/// and [`MAX_EMBEDS_PER_MESSAGE`] embeds.
pub fn pack(embeds: Vec<Embed>) -> Vec<OutgoingMessage> {
    let mut sends = Vec::new();
    let mut current: Vec<Embed> = Vec::new();
    let mut current_len = 0;

    for embed in embeds {
        let len = embed.char_len();
        if !current.is_empty()
            && (current_len + len > MESSAGE_CHAR_LIMIT || current.len() >= MAX_EMBEDS_PER_MESSAGE)
        {
            sends.push(OutgoingMessage::embeds(std::mem::take(&mut current)));
            current_len = 0;
        }
        current_len += len;
        current.push(embed);
    }
    if !current.is_empty() {
        sends.push(OutgoingMessage::embeds(current));
    }
    sends
}
