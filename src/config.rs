use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Refresh interval in minutes
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Posts per page when the request does not ask for a size
    #[serde(default = "default_page_size")]
    pub page_size: i64,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: i64,
    #[serde(default)]
    pub admin: Option<AdminConfig>,
    pub sites: Vec<SiteConfig>,
}

fn default_refresh_interval() -> u64 {
    15
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_page_size() -> i64 {
    20
}

fn default_max_page_size() -> i64 {
    100
}

fn default_session_ttl() -> i64 {
    720
}

/// One week
pub const MAX_REFRESH_INTERVAL: u64 = 7 * 24 * 60;
/// One year
pub const MAX_SESSION_TTL: i64 = 365 * 24 * 60;

#[derive(Debug, Deserialize, Clone)]
pub struct AdminConfig {
    pub password: String,
    /// Admin session lifetime in minutes
    #[serde(default = "default_session_ttl")]
    pub session_ttl_minutes: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SiteConfig {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub homepage_url: Option<String>,
    /// Crawler export returning a JSON array of posts
    #[serde(default)]
    pub source_url: Option<String>,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(1..=MAX_REFRESH_INTERVAL).contains(&self.refresh_interval) {
            anyhow::bail!(
                "refresh_interval must be between 1 and {} minutes, got {}",
                MAX_REFRESH_INTERVAL,
                self.refresh_interval
            );
        }
        if let Some(admin) = &self.admin {
            if !(1..=MAX_SESSION_TTL).contains(&admin.session_ttl_minutes) {
                anyhow::bail!(
                    "session_ttl_minutes must be between 1 and {}, got {}",
                    MAX_SESSION_TTL,
                    admin.session_ttl_minutes
                );
            }
        }
        if self.page_size < 1 {
            anyhow::bail!("page_size must be at least 1");
        }
        if self.page_size > self.max_page_size {
            anyhow::bail!(
                "page_size ({}) exceeds max_page_size ({})",
                self.page_size,
                self.max_page_size
            );
        }

        let mut slugs = HashSet::new();
        for site in &self.sites {
            if site.slug.trim().is_empty() {
                anyhow::bail!("site '{}' has an empty slug", site.name);
            }
            if !slugs.insert(site.slug.as_str()) {
                anyhow::bail!("duplicate site slug '{}'", site.slug);
            }
        }
        Ok(())
    }
}
