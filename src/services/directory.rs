// src/services/directory.rs

//! Directory listing parser.
//!
//! Walks the paginated listing table and yields one [`DirectoryEntry`] per
//! entity that links to a profile page.

use std::collections::HashSet;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::cache::{CachedParse, ChangeDetectionCache};
use super::fetcher::RateLimitedFetcher;
use super::parse_selector;
use crate::error::{AppError, Result};
use crate::models::{DirectoryConfig, DirectoryEntry, InlineFields, SourceConfig};
use crate::utils::{clean_text, url as url_utils};

/// Result of parsing one listing page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectoryPage {
    pub entries: Vec<DirectoryEntry>,
    /// Page count announced by the pager, 1 when absent
    pub total_pages: u32,
    /// Entity rows dropped for lack of a profile link
    pub dropped: usize,
}

/// Outcome of walking every listing page.
#[derive(Debug, Clone, Default)]
pub struct DirectoryCrawl {
    pub entries: Vec<DirectoryEntry>,
    pub pages: usize,
    pub dropped: usize,
    pub reparsed: usize,
    pub reused: usize,
}

pub struct DirectoryParser {
    layout: DirectoryConfig,
    profile_prefix: String,
    page_param: String,
    max_pages: u32,
    container: Selector,
    row: Selector,
    cell: Selector,
    link: Selector,
    list_item: Selector,
    total_pages: Regex,
    year: Regex,
}

impl DirectoryParser {
    pub fn new(layout: &DirectoryConfig, source: &SourceConfig) -> Result<Self> {
        Ok(Self {
            layout: layout.clone(),
            profile_prefix: source.profile_path_prefix.clone(),
            page_param: source.page_param.clone(),
            max_pages: source.max_directory_pages.max(1),
            container: parse_selector(&layout.container_selector)?,
            row: parse_selector(&layout.row_selector)?,
            cell: parse_selector("td, th")?,
            link: parse_selector("a[href]")?,
            list_item: parse_selector("a, li")?,
            total_pages: Regex::new(r#""total_pages"\s*:\s*(\d+)"#)?,
            year: Regex::new(r"\b(\d{4})\b")?,
        })
    }

    /// URL of listing page `page` (1-based).
    pub fn page_url(&self, first: &Url, page: u32) -> Url {
        if page <= 1 {
            first.clone()
        } else {
            url_utils::with_query_param(first, &self.page_param, &page.to_string())
        }
    }

    /// Parse a set of already-fetched listing pages, `(url, html)` pairs in
    /// page order. Entries repeating an earlier profile URL are skipped.
    pub fn parse(&self, pages: &[(String, String)]) -> Vec<DirectoryEntry> {
        let mut seen = HashSet::new();
        pages
            .iter()
            .flat_map(|(url, html)| self.parse_page(html, url).entries)
            .filter(|entry| seen.insert(entry.profile_url.clone()))
            .collect()
    }

    /// Parse a single listing page.
    pub fn parse_page(&self, html: &str, page_url: &str) -> DirectoryPage {
        let total_pages = self
            .total_pages
            .captures(html)
            .and_then(|c| c[1].parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(1);

        let document = Html::parse_document(html);
        let Some(container) = document.select(&self.container).next() else {
            log::warn!(
                "No '{}' container on {}",
                self.layout.container_selector,
                page_url
            );
            return DirectoryPage {
                total_pages,
                ..DirectoryPage::default()
            };
        };

        let mut page = DirectoryPage {
            total_pages,
            ..DirectoryPage::default()
        };

        for row in container.select(&self.row) {
            if self.is_skipped_row(&row) {
                continue;
            }
            match self.parse_row(&row, page_url) {
                RowOutcome::Entry(entry) => page.entries.push(entry),
                RowOutcome::NoProfileLink(name) => {
                    log::warn!("Dropping '{}' on {}: no profile link", name, page_url);
                    page.dropped += 1;
                }
                RowOutcome::NotAnEntity => {}
            }
        }

        page
    }

    fn is_skipped_row(&self, row: &ElementRef) -> bool {
        let skip = self.layout.skip_row_class.as_str();
        !skip.is_empty() && row.value().classes().any(|c| c == skip)
    }

    fn parse_row(&self, row: &ElementRef, page_url: &str) -> RowOutcome {
        let cells: Vec<ElementRef> = row.select(&self.cell).collect();
        if cells.len() < self.layout.required_cells()
            || cells.iter().all(|c| c.value().name() == "th")
        {
            return RowOutcome::NotAnEntity;
        }

        let text = |idx: usize| clean_text(&cells[idx].text().collect::<String>());

        let name = text(self.layout.name_column);
        if name.is_empty() {
            return RowOutcome::NotAnEntity;
        }

        let Some(profile_url) = self.profile_link(row, page_url) else {
            return RowOutcome::NoProfileLink(name);
        };

        let non_empty = |s: String| (!s.is_empty()).then_some(s);

        RowOutcome::Entry(DirectoryEntry {
            name,
            profile_url,
            source_id: non_empty(text(self.layout.id_column)),
            directory_url: page_url.to_string(),
            inline: InlineFields {
                stage: non_empty(text(self.layout.stage_column)),
                categories: self.list_cell(&cells[self.layout.category_column]),
                partners: self.list_cell(&cells[self.layout.partners_column]),
                first_partnered_year: self
                    .year
                    .captures(&text(self.layout.first_partnered_column))
                    .and_then(|c| c[1].parse().ok()),
            },
        })
    }

    /// First link in the row that points under the profile prefix.
    fn profile_link(&self, row: &ElementRef, page_url: &str) -> Option<String> {
        row.select(&self.link)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| url_utils::resolve(page_url, href))
            .find(|resolved| {
                Url::parse(resolved).is_ok_and(|u| {
                    u.path()
                        .strip_prefix(self.profile_prefix.as_str())
                        .is_some_and(|rest| !rest.trim_matches('/').is_empty())
                })
            })
    }

    /// Multi-valued cell: linked/listed items if any, else comma-separated text.
    fn list_cell(&self, cell: &ElementRef) -> Vec<String> {
        let items: Vec<String> = cell
            .select(&self.list_item)
            .map(|e| clean_text(&e.text().collect::<String>()))
            .filter(|s| !s.is_empty())
            .collect();
        let items = if items.is_empty() {
            clean_text(&cell.text().collect::<String>())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        } else {
            items
        };

        let mut seen = HashSet::new();
        items.into_iter().filter(|s| seen.insert(s.clone())).collect()
    }

    /// Fetch and parse every listing page starting at `first`.
    ///
    /// Any page that cannot be fetched aborts the walk with
    /// [`AppError::DirectoryUnavailable`]: a partial directory would silently
    /// shrink the dataset.
    pub async fn crawl(
        &self,
        fetcher: &RateLimitedFetcher,
        cache: &ChangeDetectionCache,
        first: &Url,
    ) -> Result<DirectoryCrawl> {
        let mut crawl = DirectoryCrawl::default();
        let mut seen = HashSet::new();
        let mut total_pages = 1u32;
        let mut page_no = 1u32;

        loop {
            let url = self.page_url(first, page_no);
            log::info!("Fetching directory page {}: {}", page_no, url);

            let fetched = fetcher
                .fetch(url.as_str())
                .await
                .map_err(|e| AppError::directory(url.as_str(), e))?;

            let page = match cache.cached(url.as_str(), &fetched.content_hash) {
                Some(CachedParse::Directory {
                    entries,
                    total_pages,
                    dropped,
                }) => {
                    crawl.reused += 1;
                    DirectoryPage {
                        entries,
                        total_pages,
                        dropped,
                    }
                }
                _ => {
                    crawl.reparsed += 1;
                    let page = self.parse_page(&fetched.text(), url.as_str());
                    cache.store(
                        url.as_str(),
                        &fetched.content_hash,
                        CachedParse::Directory {
                            entries: page.entries.clone(),
                            total_pages: page.total_pages,
                            dropped: page.dropped,
                        },
                    );
                    page
                }
            };

            crawl.pages += 1;
            crawl.dropped += page.dropped;
            total_pages = total_pages.max(page.total_pages);
            let found = page.entries.len();
            for entry in page.entries {
                if seen.insert(entry.profile_url.clone()) {
                    crawl.entries.push(entry);
                }
            }
            log::info!(
                "Directory page {}: {} entries (total so far: {})",
                page_no,
                found,
                crawl.entries.len()
            );

            if found == 0 || page_no >= total_pages {
                break;
            }
            if page_no >= self.max_pages {
                log::warn!(
                    "Stopping directory walk at {} pages (pager reports {})",
                    self.max_pages,
                    total_pages
                );
                break;
            }
            page_no += 1;
        }

        Ok(crawl)
    }
}

enum RowOutcome {
    Entry(DirectoryEntry),
    NoProfileLink(String),
    NotAnEntity,
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<html><body>
<script>var FWP_JSON = {"pager":{"page":1,"total_pages":2}};</script>
<div class="facetwp-template"><table>
  <tr><th>#</th><th>Company</th><th>Category</th><th>Stage</th><th>Partners</th><th>First Partnered</th></tr>
  <tr>
    <td>101</td><td><a href="/companies/acme-inc/">Acme Inc</a></td>
    <td>Fintech, Data &amp; Analytics</td><td>Growth</td>
    <td>Jane Roe, John Doe</td><td>2015</td>
  </tr>
  <tr class="child"><td colspan="6">Expanded details <a href="/companies/acme-inc/">more</a></td></tr>
  <tr>
    <td></td><td>Ghost Corp</td><td></td><td>Early</td><td></td><td></td>
  </tr>
  <tr>
    <td>102</td><td><a href="https://example.com/companies/beta-co/">Beta Co</a></td>
    <td><a href="?_categories=ai">AI</a></td><td>Pre-Seed/Seed</td>
    <td><ul><li>Jane Roe</li></ul></td><td>Partnered 2021</td>
  </tr>
</table></div>
</body></html>"#;

    fn parser() -> DirectoryParser {
        DirectoryParser::new(&DirectoryConfig::default(), &SourceConfig::default()).unwrap()
    }

    #[test]
    fn parses_entity_rows() {
        let page = parser().parse_page(PAGE, "https://example.com/our-companies/");

        assert_eq!(page.total_pages, 2);
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.dropped, 1);

        let acme = &page.entries[0];
        assert_eq!(acme.name, "Acme Inc");
        assert_eq!(acme.profile_url, "https://example.com/companies/acme-inc/");
        assert_eq!(acme.source_id.as_deref(), Some("101"));
        assert_eq!(acme.inline.stage.as_deref(), Some("Growth"));
        assert_eq!(acme.inline.categories, vec!["Fintech", "Data & Analytics"]);
        assert_eq!(acme.inline.partners, vec!["Jane Roe", "John Doe"]);
        assert_eq!(acme.inline.first_partnered_year, Some(2015));

        let beta = &page.entries[1];
        assert_eq!(beta.profile_url, "https://example.com/companies/beta-co/");
        assert_eq!(beta.inline.categories, vec!["AI"]);
        assert_eq!(beta.inline.partners, vec!["Jane Roe"]);
        assert_eq!(beta.inline.first_partnered_year, Some(2021));
    }

    #[test]
    fn missing_container_yields_nothing() {
        let page = parser().parse_page("<html><body><p>down</p></body></html>", "https://x/");
        assert!(page.entries.is_empty());
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn parse_dedupes_across_pages() {
        let pages = vec![
            ("https://example.com/our-companies/".to_string(), PAGE.to_string()),
            (
                "https://example.com/our-companies/?_paged=2".to_string(),
                PAGE.to_string(),
            ),
        ];
        assert_eq!(parser().parse(&pages).len(), 2);
    }

    #[test]
    fn page_urls() {
        let p = parser();
        let first = Url::parse("https://example.com/our-companies/").unwrap();
        assert_eq!(p.page_url(&first, 1), first);
        assert_eq!(
            p.page_url(&first, 3).as_str(),
            "https://example.com/our-companies/?_paged=3"
        );
    }
}
