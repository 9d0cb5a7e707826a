// src/services/profile.rs

//! Profile page field extraction.
//!
//! Each field owns an ordered list of [`Strategy`] objects. Strategies that
//! locate content by a heading ("Milestones", "Team", ...) come first,
//! positional or class-based guesses after. The first strategy returning a
//! non-empty value wins; every field records exactly one attempt in the
//! extraction report whether or not anything was found.

use std::collections::BTreeMap;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::parse_selector;
use crate::error::Result;
use crate::models::{ExtractionReport, Milestones, ProfileFields, SourceConfig, TeamMember};
use crate::utils::{clean_text, url as url_utils};

/// Fields recorded in the extraction report, in report order.
pub const REPORTED_FIELDS: [&str; 8] = [
    "categories",
    "description",
    "milestones",
    "partners",
    "socials",
    "team",
    "website",
    "why_partnered",
];

/// Platform name and the hosts that identify it.
const SOCIAL_PLATFORMS: &[(&str, &[&str])] = &[
    ("twitter", &["twitter.com", "x.com"]),
    ("linkedin", &["linkedin.com"]),
    ("instagram", &["instagram.com"]),
    ("facebook", &["facebook.com"]),
    ("youtube", &["youtube.com"]),
    ("github", &["github.com"]),
];

/// Compiled selectors and patterns shared by all strategies.
struct Toolkit {
    anchor_headings: Selector,
    links: Selector,
    scripts: Selector,
    images: Selector,
    title: Selector,
    meta_description: Selector,
    og_description: Selector,
    rich_text: Selector,
    milestone_blocks: Selector,
    team_blocks: Selector,
    people_links: Selector,
    analytics: Regex,
    year: Regex,
    ipo: Regex,
}

impl Toolkit {
    fn new() -> Result<Self> {
        Ok(Self {
            anchor_headings: parse_selector("h2, h3, h4")?,
            links: parse_selector("a[href]")?,
            scripts: parse_selector("script")?,
            images: parse_selector("img[alt]")?,
            title: parse_selector("title")?,
            meta_description: parse_selector(r#"meta[name="description"]"#)?,
            og_description: parse_selector(r#"meta[property="og:description"]"#)?,
            rich_text: parse_selector("div.wysiwyg.wysiwyg--fs-lg p")?,
            milestone_blocks: parse_selector(r#"[class*="milestone"]"#)?,
            team_blocks: parse_selector(r#"[class*="team-member"]"#)?,
            people_links: parse_selector(r#"a[href*="/people/"]"#)?,
            analytics: Regex::new(
                r#"(?s)analytics\.track\(\s*['"]Viewed Company['"]\s*,\s*(\{.*?\})\s*\)"#,
            )?,
            year: Regex::new(r"\b(\d{4})\b")?,
            ipo: Regex::new(r"\bipo\b|went public")?,
        })
    }
}

/// A parsed profile page plus the context strategies need.
struct ProfilePage<'a> {
    document: Html,
    url: &'a str,
    source_host: Option<&'a str>,
    kit: &'a Toolkit,
}

/// Content between an anchor heading and the next heading of the same or
/// higher rank, in document order.
struct Section<'a> {
    body: Vec<ElementRef<'a>>,
}

fn heading_rank(name: &str) -> Option<u8> {
    match name {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

/// Inside site-wide header, navigation or footer.
fn in_chrome(el: &ElementRef) -> bool {
    std::iter::once(*el)
        .chain(el.ancestors().filter_map(ElementRef::wrap))
        .any(|e| matches!(e.value().name(), "header" | "nav" | "footer"))
}

fn text_of(el: &ElementRef) -> String {
    clean_text(&el.text().collect::<String>())
}

fn is_leaf(el: &ElementRef) -> bool {
    el.children().all(|c| !c.value().is_element())
}

impl<'a> ProfilePage<'a> {
    fn heading_key(el: &ElementRef) -> String {
        text_of(el).trim_end_matches(':').trim().to_lowercase()
    }

    /// Section under the first non-chrome h2-h4 whose text satisfies `matches`.
    fn section(&self, matches: impl Fn(&str) -> bool) -> Option<Section<'_>> {
        let heading = self
            .document
            .select(&self.kit.anchor_headings)
            .filter(|h| !in_chrome(h))
            .find(|h| matches(&Self::heading_key(h)))?;
        let rank = heading_rank(heading.value().name())?;

        let mut body = Vec::new();
        let mut started = false;
        for node in self.document.root_element().descendants() {
            if node.id() == heading.id() {
                started = true;
                continue;
            }
            if !started {
                continue;
            }
            let Some(el) = ElementRef::wrap(node) else {
                continue;
            };
            if el.ancestors().any(|a| a.id() == heading.id()) {
                continue;
            }
            if heading_rank(el.value().name()).is_some_and(|r| r <= rank) {
                break;
            }
            if matches!(el.value().name(), "script" | "style" | "noscript") || in_chrome(&el) {
                continue;
            }
            body.push(el);
        }
        Some(Section { body })
    }

    fn anchored(&self, anchors: &[&str]) -> Option<Section<'_>> {
        self.section(|key| anchors.iter().any(|a| a.eq_ignore_ascii_case(key)))
    }

    /// Absolute http(s) links outside chrome, with their visible text.
    fn content_links(&self) -> Vec<(String, String)> {
        self.document
            .select(&self.kit.links)
            .filter(|a| !in_chrome(a))
            .filter_map(|a| {
                let href = a.value().attr("href")?;
                Some((url_utils::resolve(self.url, href)?, text_of(&a)))
            })
            .collect()
    }

    fn is_source_host(&self, url: &str) -> bool {
        self.source_host
            .is_some_and(|host| url_utils::host_matches(url, host))
    }
}

impl<'a> Section<'a> {
    fn list_items(&self) -> Vec<ElementRef<'a>> {
        self.body
            .iter()
            .copied()
            .filter(|e| e.value().name() == "li")
            .collect()
    }

    /// List item texts, or leaf block texts when the section has no list.
    fn entries(&self) -> Vec<String> {
        let items: Vec<String> = self
            .list_items()
            .iter()
            .map(text_of)
            .filter(|t| !t.is_empty())
            .collect();
        if !items.is_empty() {
            return items;
        }
        self.body
            .iter()
            .filter(|e| is_leaf(e))
            .map(text_of)
            .filter(|t| !t.is_empty())
            .collect()
    }

    fn first_paragraph(&self) -> Option<String> {
        self.body
            .iter()
            .filter(|e| e.value().name() == "p")
            .map(text_of)
            .find(|t| !t.is_empty())
            .or_else(|| self.entries().into_iter().next())
    }

    fn first_link(&self) -> Option<&'a str> {
        self.body
            .iter()
            .filter(|e| e.value().name() == "a")
            .find_map(|e| e.value().attr("href"))
    }
}

/// One way of finding a field's value on a page.
trait Strategy<T>: Send + Sync {
    fn extract(&self, page: &ProfilePage) -> Option<T>;
}

/// A field and its strategies, highest priority first.
struct FieldExtractor<T> {
    field: &'static str,
    strategies: Vec<Box<dyn Strategy<T>>>,
}

impl<T> FieldExtractor<T> {
    fn new(field: &'static str, strategies: Vec<Box<dyn Strategy<T>>>) -> Self {
        Self { field, strategies }
    }

    fn run(&self, page: &ProfilePage, report: &mut ExtractionReport) -> Option<T> {
        let value = self.strategies.iter().find_map(|s| s.extract(page));
        report.record(self.field, value.is_some());
        value
    }
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    (!items.is_empty()).then_some(items)
}

fn dedupe(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

// --- Name ---

struct AnalyticsTitle;

impl Strategy<String> for AnalyticsTitle {
    fn extract(&self, page: &ProfilePage) -> Option<String> {
        page.document.select(&page.kit.scripts).find_map(|script| {
            let source: String = script.text().collect();
            let caps = page.kit.analytics.captures(&source)?;
            let payload: serde_json::Value = serde_json::from_str(&caps[1]).ok()?;
            let title = clean_text(payload.get("title")?.as_str()?);
            (!title.is_empty()).then_some(title)
        })
    }
}

struct ImageAlt;

impl Strategy<String> for ImageAlt {
    fn extract(&self, page: &ProfilePage) -> Option<String> {
        page.document
            .select(&page.kit.images)
            .filter(|img| !in_chrome(img))
            .filter_map(|img| img.value().attr("alt"))
            .map(clean_text)
            .find(|alt| !alt.is_empty())
    }
}

struct TitleTag;

impl Strategy<String> for TitleTag {
    fn extract(&self, page: &ProfilePage) -> Option<String> {
        let title = text_of(&page.document.select(&page.kit.title).next()?);
        let name = title.split('|').next()?.trim().to_string();
        (!name.is_empty()).then_some(name)
    }
}

// --- Description ---

struct RichTextParagraph;

impl Strategy<String> for RichTextParagraph {
    fn extract(&self, page: &ProfilePage) -> Option<String> {
        page.document
            .select(&page.kit.rich_text)
            .map(|p| text_of(&p))
            .find(|t| !t.is_empty())
    }
}

/// Content of the first matching `<meta>` tag.
struct MetaContent(fn(&Toolkit) -> &Selector);

impl Strategy<String> for MetaContent {
    fn extract(&self, page: &ProfilePage) -> Option<String> {
        page.document
            .select((self.0)(page.kit))
            .filter_map(|m| m.value().attr("content"))
            .map(clean_text)
            .find(|t| !t.is_empty())
    }
}

// --- Website ---

struct AnchoredLink(&'static [&'static str]);

impl Strategy<String> for AnchoredLink {
    fn extract(&self, page: &ProfilePage) -> Option<String> {
        let href = page.anchored(self.0)?.first_link()?;
        url_utils::resolve(page.url, href)
    }
}

/// First outbound link whose text looks like a domain name.
struct OutboundDomainLink;

impl Strategy<String> for OutboundDomainLink {
    fn extract(&self, page: &ProfilePage) -> Option<String> {
        page.content_links().into_iter().find_map(|(href, text)| {
            let looks_like_domain = text.contains('.') && text.len() < 60 && !text.contains("View");
            let is_social = SOCIAL_PLATFORMS
                .iter()
                .flat_map(|(_, hosts)| hosts.iter())
                .any(|host| url_utils::host_matches(&href, host));
            (looks_like_domain && !is_social && !page.is_source_host(&href)).then_some(href)
        })
    }
}

// --- Socials ---

struct SocialLinks;

impl Strategy<BTreeMap<String, String>> for SocialLinks {
    fn extract(&self, page: &ProfilePage) -> Option<BTreeMap<String, String>> {
        let mut socials = BTreeMap::new();
        for (href, _) in page.content_links() {
            let platform = SOCIAL_PLATFORMS.iter().find(|(_, hosts)| {
                hosts.iter().any(|host| url_utils::host_matches(&href, host))
            });
            if let Some((name, _)) = platform {
                socials.entry(name.to_string()).or_insert(href);
            }
        }
        (!socials.is_empty()).then_some(socials)
    }
}

// --- Lists (categories, partners) ---

/// Item labels under a heading. For linked items the link text is used.
struct AnchoredList(&'static [&'static str]);

impl Strategy<Vec<String>> for AnchoredList {
    fn extract(&self, page: &ProfilePage) -> Option<Vec<String>> {
        let section = page.anchored(self.0)?;
        let items = section.list_items();
        let labels = if items.is_empty() {
            section.entries()
        } else {
            items
                .iter()
                .map(|li| {
                    li.select(&page.kit.links)
                        .map(|a| text_of(&a))
                        .find(|t| !t.is_empty())
                        .unwrap_or_else(|| text_of(li))
                })
                .filter(|t| !t.is_empty())
                .collect()
        };
        non_empty(dedupe(labels))
    }
}

/// Text of links whose href contains `needle` (e.g. listing filter links).
struct LinkTextsWithHref(&'static str);

impl Strategy<Vec<String>> for LinkTextsWithHref {
    fn extract(&self, page: &ProfilePage) -> Option<Vec<String>> {
        let labels = page
            .document
            .select(&page.kit.links)
            .filter(|a| !in_chrome(a))
            .filter(|a| a.value().attr("href").is_some_and(|h| h.contains(self.0)))
            .map(|a| text_of(&a))
            .filter(|t| !t.is_empty())
            .collect();
        non_empty(dedupe(labels))
    }
}

struct PeopleLinks;

impl Strategy<Vec<String>> for PeopleLinks {
    fn extract(&self, page: &ProfilePage) -> Option<Vec<String>> {
        let labels = page
            .document
            .select(&page.kit.people_links)
            .filter(|a| !in_chrome(a))
            .map(|a| text_of(&a))
            .filter(|t| !t.is_empty())
            .collect();
        non_empty(dedupe(labels))
    }
}

// --- Milestones ---

fn milestones_from(lines: &[String], kit: &Toolkit) -> Option<Milestones> {
    let mut milestones = Milestones::default();
    for line in lines {
        let Some(year) = kit
            .year
            .captures(line)
            .and_then(|c| c[1].parse::<i32>().ok())
        else {
            continue;
        };
        let lower = line.to_lowercase();
        let slot = if lower.contains("founded") {
            &mut milestones.founded_year
        } else if lower.contains("partnered") {
            &mut milestones.partnered_year
        } else if kit.ipo.is_match(&lower) {
            &mut milestones.ipo_year
        } else if lower.contains("acquired") || lower.contains("acquisition") {
            &mut milestones.acquired_year
        } else {
            continue;
        };
        slot.get_or_insert(year);
    }
    (!milestones.is_empty()).then_some(milestones)
}

struct AnchoredMilestones(&'static [&'static str]);

impl Strategy<Milestones> for AnchoredMilestones {
    fn extract(&self, page: &ProfilePage) -> Option<Milestones> {
        milestones_from(&page.anchored(self.0)?.entries(), page.kit)
    }
}

struct MilestoneBlocks;

impl Strategy<Milestones> for MilestoneBlocks {
    fn extract(&self, page: &ProfilePage) -> Option<Milestones> {
        let lines: Vec<String> = page
            .document
            .select(&page.kit.milestone_blocks)
            .filter(|e| !in_chrome(e))
            .map(|e| text_of(&e))
            .collect();
        milestones_from(&lines, page.kit)
    }
}

// --- Team ---

/// Name and optional role from one team entry.
fn team_member(el: &ElementRef) -> Option<TeamMember> {
    let parts: Vec<String> = el
        .text()
        .map(clean_text)
        .filter(|t| !t.is_empty())
        .collect();
    match parts.as_slice() {
        [] => None,
        [single] => {
            let (name, role) = split_role(single);
            Some(TeamMember { name, role })
        }
        [name, rest @ ..] => Some(TeamMember {
            name: name.trim_end_matches([',', '-']).trim().to_string(),
            role: Some(rest.join(" ")).filter(|r| !r.is_empty()),
        }),
    }
}

/// Split "Name, Role" or "Name - Role".
fn split_role(text: &str) -> (String, Option<String>) {
    for sep in [", ", " - ", " – ", " — "] {
        if let Some((name, role)) = text.split_once(sep) {
            let role = role.trim();
            return (
                name.trim().to_string(),
                (!role.is_empty()).then(|| role.to_string()),
            );
        }
    }
    (text.trim().to_string(), None)
}

struct AnchoredTeam(&'static [&'static str]);

impl Strategy<Vec<TeamMember>> for AnchoredTeam {
    fn extract(&self, page: &ProfilePage) -> Option<Vec<TeamMember>> {
        let section = page.anchored(self.0)?;
        let items = section.list_items();
        let members = if items.is_empty() {
            section
                .entries()
                .iter()
                .map(|t| split_role(t))
                .map(|(name, role)| TeamMember { name, role })
                .collect()
        } else {
            items.iter().filter_map(team_member).collect()
        };
        non_empty(members)
    }
}

struct TeamBlocks;

impl Strategy<Vec<TeamMember>> for TeamBlocks {
    fn extract(&self, page: &ProfilePage) -> Option<Vec<TeamMember>> {
        let members = page
            .document
            .select(&page.kit.team_blocks)
            .filter(|e| !in_chrome(e))
            .filter_map(|e| team_member(&e))
            .collect();
        non_empty(members)
    }
}

// --- Why partnered ---

struct WhyPartnered;

impl Strategy<String> for WhyPartnered {
    fn extract(&self, page: &ProfilePage) -> Option<String> {
        page.section(|key| key.starts_with("why") && key.contains("partnered"))?
            .first_paragraph()
    }
}

/// Extracts [`ProfileFields`] from profile page HTML.
pub struct ProfileParser {
    kit: Toolkit,
    source_host: Option<String>,
    name: FieldExtractor<String>,
    description: FieldExtractor<String>,
    website: FieldExtractor<String>,
    socials: FieldExtractor<BTreeMap<String, String>>,
    categories: FieldExtractor<Vec<String>>,
    milestones: FieldExtractor<Milestones>,
    partners: FieldExtractor<Vec<String>>,
    team: FieldExtractor<Vec<TeamMember>>,
    why_partnered: FieldExtractor<String>,
}

impl ProfileParser {
    pub fn new(source: &SourceConfig) -> Result<Self> {
        Ok(Self {
            kit: Toolkit::new()?,
            source_host: url_utils::get_domain(&source.base_url),
            name: FieldExtractor::new(
                "name",
                vec![Box::new(AnalyticsTitle), Box::new(ImageAlt), Box::new(TitleTag)],
            ),
            description: FieldExtractor::new(
                "description",
                vec![
                    Box::new(RichTextParagraph),
                    Box::new(MetaContent(|k| &k.meta_description)),
                    Box::new(MetaContent(|k| &k.og_description)),
                ],
            ),
            website: FieldExtractor::new(
                "website",
                vec![
                    Box::new(AnchoredLink(&["website"])),
                    Box::new(OutboundDomainLink),
                ],
            ),
            socials: FieldExtractor::new("socials", vec![Box::new(SocialLinks)]),
            categories: FieldExtractor::new(
                "categories",
                vec![
                    Box::new(AnchoredList(&["categories", "category", "sectors", "sector"])),
                    Box::new(LinkTextsWithHref("_categories=")),
                ],
            ),
            milestones: FieldExtractor::new(
                "milestones",
                vec![
                    Box::new(AnchoredMilestones(&["milestones"])),
                    Box::new(MilestoneBlocks),
                ],
            ),
            partners: FieldExtractor::new(
                "partners",
                vec![
                    Box::new(AnchoredList(&["partners", "partner"])),
                    Box::new(PeopleLinks),
                ],
            ),
            team: FieldExtractor::new(
                "team",
                vec![
                    Box::new(AnchoredTeam(&["team", "founders", "leadership"])),
                    Box::new(TeamBlocks),
                ],
            ),
            why_partnered: FieldExtractor::new("why_partnered", vec![Box::new(WhyPartnered)]),
        })
    }

    /// Extract every field from `html`. Never fails: missing content yields
    /// `None`/empty values and a failed attempt in the returned report.
    pub fn parse(&self, html: &str, page_url: &str) -> (ProfileFields, ExtractionReport) {
        let page = ProfilePage {
            document: Html::parse_document(html),
            url: page_url,
            source_host: self.source_host.as_deref(),
            kit: &self.kit,
        };
        let mut report = ExtractionReport::new();
        // Name is a fallback for an empty directory name, not a reported field.
        let mut scratch = ExtractionReport::new();

        let fields = ProfileFields {
            name: self.name.run(&page, &mut scratch),
            description: self.description.run(&page, &mut report),
            website: self.website.run(&page, &mut report),
            socials: self.socials.run(&page, &mut report).unwrap_or_default(),
            categories: self.categories.run(&page, &mut report).unwrap_or_default(),
            milestones: self.milestones.run(&page, &mut report).unwrap_or_default(),
            partners: self.partners.run(&page, &mut report).unwrap_or_default(),
            team: self.team.run(&page, &mut report).unwrap_or_default(),
            why_partnered: self.why_partnered.run(&page, &mut report),
        };

        (fields, report)
    }
}
