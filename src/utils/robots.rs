// src/utils/robots.rs

//! Minimal robots.txt support: grouping by user agent, allow/disallow
//! prefixes with longest-match precedence, and crawl-delay.

use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
struct Group {
    allow: Vec<String>,
    disallow: Vec<String>,
    crawl_delay: Option<f64>,
}

/// Parsed robots.txt rules.
#[derive(Debug, Clone, Default)]
pub struct RobotsTxt {
    /// Groups keyed by lowercase user-agent token
    groups: HashMap<String, Group>,
    /// The `*` group
    fallback: Group,
}

impl RobotsTxt {
    /// Rules that allow everything (missing or unreadable robots.txt).
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Parse robots.txt content. Unknown directives are ignored.
    pub fn parse(content: &str) -> Self {
        let mut robots = Self::default();
        let mut agents: Vec<String> = Vec::new();
        let mut group = Group::default();
        let mut in_rules = false;

        for raw in content.lines() {
            let line = raw.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();

            match key.trim().to_lowercase().as_str() {
                "user-agent" => {
                    // A user-agent line after rules starts a new group.
                    if in_rules {
                        robots.store(&agents, &group);
                        agents.clear();
                        group = Group::default();
                        in_rules = false;
                    }
                    agents.push(value.to_lowercase());
                }
                "allow" => {
                    in_rules = true;
                    if !value.is_empty() {
                        group.allow.push(value.to_string());
                    }
                }
                "disallow" => {
                    in_rules = true;
                    if !value.is_empty() {
                        group.disallow.push(value.to_string());
                    }
                }
                "crawl-delay" => {
                    in_rules = true;
                    group.crawl_delay = value.parse::<f64>().ok().filter(|d| *d >= 0.0);
                }
                _ => {}
            }
        }
        robots.store(&agents, &group);
        robots
    }

    fn store(&mut self, agents: &[String], group: &Group) {
        for agent in agents {
            if agent == "*" {
                self.fallback = group.clone();
            } else {
                self.groups.insert(agent.clone(), group.clone());
            }
        }
    }

    fn group_for(&self, user_agent: &str) -> &Group {
        let ua = user_agent.to_lowercase();
        // Product token is the part before '/', e.g. "portfolio-crawler/0.1".
        let token = ua.split(['/', ' ']).next().unwrap_or(&ua);
        self.groups
            .get(token)
            .or_else(|| {
                self.groups
                    .iter()
                    .filter(|(name, _)| ua.contains(name.as_str()))
                    .max_by_key(|(name, _)| name.len())
                    .map(|(_, g)| g)
            })
            .unwrap_or(&self.fallback)
    }

    /// Check whether `path` may be fetched. The longest matching rule wins;
    /// on a tie, allow wins.
    pub fn is_allowed(&self, user_agent: &str, path: &str) -> bool {
        let group = self.group_for(user_agent);
        let longest = |rules: &[String]| {
            rules
                .iter()
                .filter(|rule| path.starts_with(rule.as_str()))
                .map(String::len)
                .max()
        };
        match (longest(&group.allow), longest(&group.disallow)) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(a), Some(d)) => a >= d,
        }
    }

    /// Crawl delay requested for `user_agent`, if any.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        self.group_for(user_agent)
            .crawl_delay
            .map(Duration::from_secs_f64)
    }
}
