//! Minimal robots.txt support: user-agent groups with allow/disallow rules.

use url::Url;

use super::fetch::Fetch;

#[derive(Debug, Clone)]
struct RobotsRule {
    path: String,
    allow: bool,
}

/// Rules for the one user-agent group that applies to us. The most specific
/// matching group wins (longest agent token), falling back to `*`; no group
/// at all means everything is allowed.
#[derive(Debug, Clone, Default)]
pub struct RobotsPolicy {
    rules: Vec<RobotsRule>,
}

impl RobotsPolicy {
    /// The policy used when robots.txt cannot be fetched.
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn parse(content: &str, user_agent: &str) -> Self {
        let mut groups: Vec<(Vec<String>, Vec<RobotsRule>)> = Vec::new();
        let mut agents: Vec<String> = Vec::new();
        let mut rules: Vec<RobotsRule> = Vec::new();
        let mut in_agent_run = false;

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((field, value)) = line.split_once(':') else {
                continue;
            };
            let field = field.trim().to_ascii_lowercase();
            let value = value.trim();
            match field.as_str() {
                "user-agent" => {
                    // A user-agent line after rules starts the next group.
                    if !in_agent_run && !agents.is_empty() {
                        groups.push((std::mem::take(&mut agents), std::mem::take(&mut rules)));
                    }
                    agents.push(value.to_ascii_lowercase());
                    in_agent_run = true;
                }
                "allow" | "disallow" => {
                    in_agent_run = false;
                    if agents.is_empty() || value.is_empty() {
                        continue;
                    }
                    rules.push(RobotsRule {
                        path: value.to_string(),
                        allow: field == "allow",
                    });
                }
                _ => {
                    in_agent_run = false;
                }
            }
        }
        if !agents.is_empty() {
            groups.push((agents, rules));
        }

        let ua = user_agent.to_ascii_lowercase();
        let mut best: Option<(usize, usize)> = None;
        let mut fallback: Option<usize> = None;
        for (index, (group_agents, _)) in groups.iter().enumerate() {
            for agent in group_agents {
                if agent == "*" {
                    fallback.get_or_insert(index);
                } else if ua.contains(agent.as_str())
                    && best.is_none_or(|(len, _)| agent.len() > len)
                {
                    best = Some((agent.len(), index));
                }
            }
        }

        let chosen = best.map(|(_, index)| index).or(fallback);
        let rules = match chosen {
            Some(index) => groups.swap_remove(index).1,
            None => Vec::new(),
        };
        Self { rules }
    }

    /// Longest matching rule decides; allow wins a same-length tie, and an
    /// unmatched path is allowed.
    pub fn is_allowed(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return true;
        };
        let mut target = parsed.path().to_string();
        if let Some(query) = parsed.query() {
            target.push('?');
            target.push_str(query);
        }

        let mut best_len = 0;
        let mut allowed = true;
        for rule in &self.rules {
            if !target.starts_with(&rule.path) {
                continue;
            }
            if rule.path.len() > best_len {
                best_len = rule.path.len();
                allowed = rule.allow;
            } else if rule.path.len() == best_len && rule.allow {
                allowed = true;
            }
        }
        allowed
    }
}

/// `<origin>/robots.txt` for the site, e.g. `https://example.com:8443`.
pub fn robots_url(site_url: &str) -> crate::error::Result<String> {
    let parsed = Url::parse(site_url)?;
    Ok(format!("{}/robots.txt", parsed.origin().ascii_serialization()))
}

/// Fetch and parse the site's robots.txt; any failure yields a permissive
/// policy rather than blocking the crawl.
pub async fn load_robots(fetcher: &dyn Fetch, site_url: &str, user_agent: &str) -> RobotsPolicy {
    let url = match robots_url(site_url) {
        Ok(url) => url,
        Err(err) => {
            tracing::debug!(site = %site_url, %err, "robots.txt url could not be built");
            return RobotsPolicy::allow_all();
        }
    };
    match fetcher.fetch(&url).await {
        Ok(page) if (200..300).contains(&page.status) => {
            RobotsPolicy::parse(&page.body, user_agent)
        }
        Ok(page) => {
            tracing::debug!(site = %site_url, status = page.status, "robots.txt unavailable");
            RobotsPolicy::allow_all()
        }
        Err(err) => {
            tracing::debug!(site = %site_url, %err, "robots.txt fetch failed");
            RobotsPolicy::allow_all()
        }
    }
}
