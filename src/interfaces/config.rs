use std::time::Duration;

use serde::Deserialize;

use crate::application::PoolSettings;
use crate::domain::{ExternalHandle, NewTarget, RetryPolicy, RoleId, UserId};
use crate::infrastructure::chromium_session::BrowserSettings;
use crate::infrastructure::profile_page::{LayoutSelectors, ProfileLayout};

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub poll_interval_seconds: u64,
    pub shutdown_grace_seconds: u64,
    pub fetch: FetchCfg,
    pub pool: PoolCfg,
    pub site: LayoutSelectors,
    pub api: ApiCfg,
    pub targets: Vec<TargetCfg>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 120,
            shutdown_grace_seconds: 30,
            fetch: FetchCfg::default(),
            pool: PoolCfg::default(),
            site: LayoutSelectors::default(),
            api: ApiCfg::default(),
            targets: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FetchCfg {
    pub render_timeout_ms: u64,
    pub retry_ceiling: u32,
    pub retry_delay_ms: u64,
    pub challenge_strikes: u32,
}

impl Default for FetchCfg {
    fn default() -> Self {
        Self {
            render_timeout_ms: 10_000,
            retry_ceiling: 10,
            retry_delay_ms: 5_000,
            challenge_strikes: 2,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PoolCfg {
    pub size: usize,
    pub queue_depth: usize,
    pub acquire_timeout_seconds: u64,
    pub headless: bool,
    pub chrome_executable: Option<String>,
}

impl Default for PoolCfg {
    fn default() -> Self {
        Self {
            size: 1,
            queue_depth: 32,
            acquire_timeout_seconds: 60,
            headless: true,
            chrome_executable: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ApiCfg {
    pub listen: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TargetCfg {
    pub owner_id: u64,
    pub handle: String,
    pub role_id: u64,
}

impl Config {
    pub fn load_from_file(path: &str) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> anyhow::Result<Self> {
        let raw = expand_env(raw);
        let cfg: Config = serde_yaml::from_str(&raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval_seconds == 0 {
            anyhow::bail!("poll_interval_seconds must be greater than zero");
        }
        if self.fetch.render_timeout_ms == 0 {
            anyhow::bail!("fetch.render_timeout_ms must be greater than zero");
        }
        if self.pool.size == 0 {
            anyhow::bail!("pool.size must be at least 1");
        }
        if self.pool.acquire_timeout_seconds == 0 {
            anyhow::bail!("pool.acquire_timeout_seconds must be greater than zero");
        }
        ProfileLayout::new(self.site.clone()).map_err(|e| anyhow::anyhow!("site: {e}"))?;
        for t in &self.targets {
            ExternalHandle::parse(&t.handle)
                .map_err(|e| anyhow::anyhow!("target {:?}: {e}", t.handle))?;
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch.render_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.fetch.retry_ceiling,
            delay: Duration::from_millis(self.fetch.retry_delay_ms),
            challenge_strikes: self.fetch.challenge_strikes,
        }
    }

    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            size: self.pool.size,
            queue_depth: self.pool.queue_depth,
            acquire_timeout: Duration::from_secs(self.pool.acquire_timeout_seconds),
        }
    }

    pub fn browser_settings(&self) -> BrowserSettings {
        BrowserSettings {
            headless: self.pool.headless,
            chrome_executable: self.pool.chrome_executable.clone(),
            ..BrowserSettings::default()
        }
    }

    pub fn layout(&self) -> anyhow::Result<ProfileLayout> {
        ProfileLayout::new(self.site.clone()).map_err(|e| anyhow::anyhow!("site: {e}"))
    }

    pub fn seed_targets(&self) -> anyhow::Result<Vec<NewTarget>> {
        self.targets
            .iter()
            .map(|t| {
                Ok(NewTarget {
                    external_handle: ExternalHandle::parse(&t.handle)?,
                    owner_id: UserId(t.owner_id),
                    notify_role_id: RoleId(t.role_id),
                })
            })
            .collect()
    }
}

/// very small ${VAR} expansion to keep config simple
fn expand_env(s: &str) -> String {
    expand_vars(s, std::env::vars())
}

fn expand_vars(s: &str, vars: impl IntoIterator<Item = (String, String)>) -> String {
    let mut out = s.to_string();
    for (k, v) in vars {
        out = out.replace(&format!("${{{}}}", k), &v);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = Config::from_yaml("{}").unwrap();
        assert_eq!(cfg.poll_interval(), Duration::from_secs(120));
        assert_eq!(cfg.retry_policy(), RetryPolicy::default());
        assert_eq!(cfg.pool_settings().size, 1);
        assert!(cfg.pool.headless);
        assert!(cfg.api.listen.is_none());
    }

    #[test]
    fn parses_targets_and_overrides() {
        let cfg = Config::from_yaml(
            r#"
poll_interval_seconds: 60
fetch:
  retry_ceiling: 3
  retry_delay_ms: 250
pool:
  size: 2
  headless: false
targets:
  - owner_id: 1311571732405948476
    handle: "@creator"
    role_id: 42
"#,
        )
        .unwrap();
        assert_eq!(cfg.poll_interval(), Duration::from_secs(60));
        assert_eq!(cfg.retry_policy().max_attempts, 3);
        assert_eq!(cfg.retry_policy().delay, Duration::from_millis(250));
        assert_eq!(cfg.pool_settings().size, 2);
        assert!(!cfg.browser_settings().headless);

        let seeds = cfg.seed_targets().unwrap();
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].external_handle.as_str(), "creator");
        assert_eq!(seeds[0].owner_id, UserId(1_311_571_732_405_948_476));
    }

    #[test]
    fn rejects_invalid_settings() {
        assert!(Config::from_yaml("poll_interval_seconds: 0").is_err());
        assert!(Config::from_yaml("pool: { size: 0 }").is_err());
        assert!(Config::from_yaml("site: { item_selector: 'div[' }").is_err());
        assert!(
            Config::from_yaml("targets: [{ owner_id: 1, handle: 'bad handle', role_id: 2 }]")
                .is_err()
        );
    }

    #[test]
    fn expands_env_vars() {
        let vars = vec![("API_TOKEN".to_string(), "s3cret".to_string())];
        let raw = expand_vars("api:\n  token: \"${API_TOKEN}\"\n", vars);
        let cfg = Config::from_yaml(&raw).unwrap();
        assert_eq!(cfg.api.token.as_deref(), Some("s3cret"));
        assert_eq!(expand_vars("${UNSET_VAR}", Vec::new()), "${UNSET_VAR}");
    }
}
