use std::path::PathBuf;

// ---------------------------------------------------------------------------
// ScoutConfig — file-based config loader (rednote-scout.json) with env-var
// fallbacks. Resolved once at startup and passed into the orchestrator as an
// immutable value; nothing reads tuning parameters from process-wide state.
// ---------------------------------------------------------------------------

/// Immutable run configuration: keyword list plus tuning parameters.
#[derive(serde::Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ScoutConfig {
    /// Search keywords, scraped in order. Empty → explore-feed fallback.
    pub keywords: Vec<String>,
    /// Maximum scroll iterations per keyword.
    pub scrolls: u32,
    /// Pause after each scroll gesture, letting lazy-load settle.
    pub scroll_pause_ms: u64,
    /// Visible browser window. Required for the manual-login wait to be useful.
    pub headful: bool,
    /// Seconds granted for manual login/captcha in headful mode. 0 = skip.
    pub login_wait_secs: u64,
    /// Persistent browser profile directory (keeps login state across runs).
    /// `None` → `~/.rednote-scout/profile`.
    pub profile_dir: Option<PathBuf>,
    /// Artifact path, fully overwritten each run.
    pub out_path: PathBuf,
    /// Navigation timeout. Never infinite.
    pub nav_timeout_secs: u64,
    /// Post-navigation settle pause before the first extraction.
    pub settle_ms: u64,
    /// Enrich the first N cards per keyword from their detail pages. 0 = off.
    pub detail_limit: usize,
    /// Delay between detail-page visits during enrichment.
    pub detail_delay_ms: u64,
}

impl Default for ScoutConfig {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            scrolls: 10,
            scroll_pause_ms: 900,
            headful: false,
            login_wait_secs: 35,
            profile_dir: None,
            out_path: PathBuf::from("res_docs/xhs_search.json"),
            nav_timeout_secs: 60,
            settle_ms: 1200,
            detail_limit: 0,
            detail_delay_ms: 1200,
        }
    }
}

impl ScoutConfig {
    /// Keywords with surrounding whitespace stripped, empties dropped, and
    /// duplicates collapsed to their first occurrence. A keyword owns exactly
    /// one key in the artifact, so a repeated entry must not run twice.
    pub fn normalized_keywords(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.keywords
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty() && seen.insert(k.clone()))
            .collect()
    }

    /// Profile directory with the home-dir default applied.
    pub fn resolved_profile_dir(&self) -> Option<PathBuf> {
        match &self.profile_dir {
            Some(p) => Some(p.clone()),
            None => dirs::home_dir().map(|h| h.join(".rednote-scout").join("profile")),
        }
    }
}

pub const ENV_CONFIG_PATH: &str = "REDNOTE_SCOUT_CONFIG";
pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";

/// Load `rednote-scout.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `REDNOTE_SCOUT_CONFIG` env var path
/// 2. `./rednote-scout.json`  (process cwd)
/// 3. `../rednote-scout.json` (one level up)
///
/// Missing file → `ScoutConfig::default()` (silent, env-var fallbacks apply).
/// Parse error → log a warning, return `ScoutConfig::default()`.
pub fn load_config() -> ScoutConfig {
    let candidates: Vec<PathBuf> = {
        let mut v = vec![
            PathBuf::from("rednote-scout.json"),
            PathBuf::from("../rednote-scout.json"),
        ];
        if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
            v.insert(0, PathBuf::from(env_path));
        }
        v
    };

    for path in &candidates {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<ScoutConfig>(&contents) {
                Ok(cfg) => {
                    tracing::info!("rednote-scout.json loaded from {}", path.display());
                    return apply_env_overrides(cfg);
                }
                Err(e) => {
                    tracing::warn!(
                        "rednote-scout.json parse error at {}: {} — using defaults",
                        path.display(),
                        e
                    );
                    return apply_env_overrides(ScoutConfig::default());
                }
            },
            Err(_) => continue, // file not found at this path — try next
        }
    }

    apply_env_overrides(ScoutConfig::default())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_truthy(key: &str) -> Option<bool> {
    let v = std::env::var(key).ok()?;
    let v = v.trim().to_ascii_lowercase();
    if v.is_empty() {
        return None;
    }
    Some(matches!(v.as_str(), "1" | "true" | "yes" | "on"))
}

/// Env-var fallbacks, applied on top of whatever the file provided. Every
/// config field has one; `REDNOTE_SCOUT_KEYWORDS` is comma-separated.
fn apply_env_overrides(mut cfg: ScoutConfig) -> ScoutConfig {
    if let Ok(kw) = std::env::var("REDNOTE_SCOUT_KEYWORDS") {
        let keywords: Vec<String> = kw
            .split(',')
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if !keywords.is_empty() {
            cfg.keywords = keywords;
        }
    }
    if let Some(n) = env_parse::<u32>("REDNOTE_SCOUT_SCROLLS") {
        cfg.scrolls = n;
    }
    if let Some(n) = env_parse::<u64>("REDNOTE_SCOUT_SCROLL_PAUSE_MS") {
        cfg.scroll_pause_ms = n;
    }
    if let Some(b) = env_truthy("REDNOTE_SCOUT_HEADFUL") {
        cfg.headful = b;
    }
    if let Some(n) = env_parse::<u64>("REDNOTE_SCOUT_LOGIN_WAIT_SECS") {
        cfg.login_wait_secs = n;
    }
    if let Ok(p) = std::env::var("REDNOTE_SCOUT_PROFILE_DIR") {
        if !p.trim().is_empty() {
            cfg.profile_dir = Some(PathBuf::from(p.trim()));
        }
    }
    if let Ok(p) = std::env::var("REDNOTE_SCOUT_OUT_PATH") {
        if !p.trim().is_empty() {
            cfg.out_path = PathBuf::from(p.trim());
        }
    }
    if let Some(n) = env_parse::<u64>("REDNOTE_SCOUT_NAV_TIMEOUT_SECS") {
        cfg.nav_timeout_secs = n;
    }
    if let Some(n) = env_parse::<u64>("REDNOTE_SCOUT_SETTLE_MS") {
        cfg.settle_ms = n;
    }
    if let Some(n) = env_parse::<usize>("REDNOTE_SCOUT_DETAIL_LIMIT") {
        cfg.detail_limit = n;
    }
    if let Some(n) = env_parse::<u64>("REDNOTE_SCOUT_DETAIL_DELAY_MS") {
        cfg.detail_delay_ms = n;
    }
    cfg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = ScoutConfig::default();
        assert_eq!(cfg.scrolls, 10);
        assert_eq!(cfg.scroll_pause_ms, 900);
        assert!(!cfg.headful);
        assert_eq!(cfg.out_path, PathBuf::from("res_docs/xhs_search.json"));
    }

    #[test]
    fn keywords_are_trimmed_and_filtered() {
        let cfg = ScoutConfig {
            keywords: vec![
                "  口红 ".to_string(),
                "".to_string(),
                "   ".to_string(),
                "穿搭".to_string(),
            ],
            ..Default::default()
        };
        assert_eq!(cfg.normalized_keywords(), vec!["口红", "穿搭"]);
    }

    #[test]
    fn duplicate_keywords_collapse_to_first_occurrence() {
        let cfg = ScoutConfig {
            keywords: vec![
                "口红".to_string(),
                "穿搭".to_string(),
                " 口红 ".to_string(),
                "口红".to_string(),
            ],
            ..Default::default()
        };
        assert_eq!(cfg.normalized_keywords(), vec!["口红", "穿搭"]);
    }

    #[test]
    fn env_overrides_cover_timing_and_detail_fields() {
        // Keys unique to this test, so parallel test runs don't interfere.
        std::env::set_var("REDNOTE_SCOUT_NAV_TIMEOUT_SECS", "25");
        std::env::set_var("REDNOTE_SCOUT_SETTLE_MS", "300");
        std::env::set_var("REDNOTE_SCOUT_DETAIL_LIMIT", "5");
        std::env::set_var("REDNOTE_SCOUT_DETAIL_DELAY_MS", "2500");
        std::env::set_var("REDNOTE_SCOUT_KEYWORDS", "口红, 穿搭,");

        let cfg = apply_env_overrides(ScoutConfig::default());
        assert_eq!(cfg.nav_timeout_secs, 25);
        assert_eq!(cfg.settle_ms, 300);
        assert_eq!(cfg.detail_limit, 5);
        assert_eq!(cfg.detail_delay_ms, 2500);
        assert_eq!(cfg.keywords, vec!["口红", "穿搭"]);

        std::env::remove_var("REDNOTE_SCOUT_NAV_TIMEOUT_SECS");
        std::env::remove_var("REDNOTE_SCOUT_SETTLE_MS");
        std::env::remove_var("REDNOTE_SCOUT_DETAIL_LIMIT");
        std::env::remove_var("REDNOTE_SCOUT_DETAIL_DELAY_MS");
        std::env::remove_var("REDNOTE_SCOUT_KEYWORDS");
    }

    #[test]
    fn partial_json_keeps_defaults_for_missing_fields() {
        let cfg: ScoutConfig =
            serde_json::from_str(r#"{"keywords": ["武功山"], "scrolls": 3}"#).unwrap();
        assert_eq!(cfg.keywords, vec!["武功山"]);
        assert_eq!(cfg.scrolls, 3);
        assert_eq!(cfg.scroll_pause_ms, 900);
        assert_eq!(cfg.login_wait_secs, 35);
    }
}
