//! Native browser session management using `chromiumoxide`.
//!
//! This module is the single source of truth for:
//! * Finding a usable Chromium-family executable (env → PATH → well-known paths).
//! * `BrowserSession` — the one browser instance + page a run owns.
//! * The bounded manual-login wait (human completes login/captcha in headful mode).
//! * HTML snapshots of the rendered document for the extractor.
//!
//! The session is a strictly exclusive resource: one run, one session, one
//! page, sequential keyword processing. `close()` must run on every exit
//! path; a `Drop` fallback spawns a close task so an early return or panic
//! never orphans a Chromium process.

use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use rand::seq::IndexedRandom;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::core::config::{ScoutConfig, ENV_CHROME_EXECUTABLE};
use crate::core::error::ScoutError;

const DESKTOP_USER_AGENTS: &[&str] = &[
    // Chrome 132 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 132 – macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 131 – Linux
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
];

/// Returns a randomly-chosen realistic desktop User-Agent string.
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::rng();
    DESKTOP_USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(DESKTOP_USER_AGENTS[0])
}

/// Page text fragments that suggest a login wall / verification gate.
const LOGIN_WALL_NEEDLES: &[&str] = &["登录", "手机号", "验证码"];

// ── Browser executable discovery ─────────────────────────────────────────────

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `CHROME_EXECUTABLE` env var (explicit override)
/// 2. PATH scan — finds package-manager installs on all platforms.
/// 3. OS-specific well-known install paths.
pub fn find_chrome_executable() -> Option<String> {
    if let Ok(p) = std::env::var(ENV_CHROME_EXECUTABLE) {
        if Path::new(&p).exists() {
            return Some(p);
        }
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "google-chrome",
            "chromium",
            "chromium-browser",
            "chrome",
            "brave-browser",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/brave-browser",
            "/usr/local/bin/chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

/// Build a `BrowserConfig` for this run.
///
/// Defaults mirror a desktop zh-CN browsing profile (1280×800 viewport,
/// Chinese locale). `--disable-blink-features=AutomationControlled` hides the
/// `navigator.webdriver` flag so the list page renders the normal feed.
fn build_browser_config(
    exe: &str,
    headful: bool,
    profile_dir: Option<&Path>,
) -> Result<BrowserConfig, ScoutError> {
    let ua = random_user_agent();

    let mut builder = BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width: 1280,
            height: 800,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(1280, 800)
        .arg("--disable-gpu")
        .arg("--no-sandbox") // often required in CI / restricted environments
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--disable-background-networking")
        .arg("--disable-sync")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--mute-audio")
        .arg("--lang=zh-CN")
        .arg("--accept-lang=zh-CN,zh;q=0.9")
        .arg("--disable-blink-features=AutomationControlled")
        .arg(format!("--user-agent={}", ua));

    if headful {
        builder = builder.with_head();
    }

    if let Some(dir) = profile_dir {
        std::fs::create_dir_all(dir)
            .map_err(|e| ScoutError::Launch(format!("profile dir {}: {}", dir.display(), e)))?;
        builder = builder.user_data_dir(dir);
    }

    builder
        .build()
        .map_err(|e| ScoutError::Launch(format!("browser config: {}", e)))
}

// ── Browser session ──────────────────────────────────────────────────────────

/// The single browser instance and page a run owns.
pub struct BrowserSession {
    browser: Option<Browser>,
    page: Page,
    nav_timeout: Duration,
}

impl BrowserSession {
    /// Launch the browser and open the run's page.
    ///
    /// Fails with `ScoutError::Launch` when no executable is found, the
    /// profile directory is unusable, or the engine does not come up.
    pub async fn launch(cfg: &ScoutConfig) -> Result<Self, ScoutError> {
        let exe = find_chrome_executable().ok_or_else(|| {
            ScoutError::Launch(
                "no browser found — install Chrome/Chromium, or set CHROME_EXECUTABLE".to_string(),
            )
        })?;

        let profile_dir = cfg.resolved_profile_dir();
        info!(
            "🚀 launching browser ({}, headful={}, profile={:?})",
            exe, cfg.headful, profile_dir
        );

        let config = build_browser_config(&exe, cfg.headful, profile_dir.as_deref())?;
        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ScoutError::Launch(format!("{}: {}", exe, e)))?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("CDP handler error: {}", e);
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(p) => p,
            Err(e) => {
                let _ = browser.close().await;
                return Err(ScoutError::Launch(format!("failed to open page: {}", e)));
            }
        };

        Ok(Self {
            browser: Some(browser),
            page,
            nav_timeout: Duration::from_secs(cfg.nav_timeout_secs),
        })
    }

    /// Navigate the session page. Bounded by the configured timeout — a stuck
    /// navigation is a `ScoutError::Navigation`, never an infinite wait.
    pub async fn navigate(&self, url: &str) -> Result<(), ScoutError> {
        match tokio::time::timeout(self.nav_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(ScoutError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(ScoutError::Navigation {
                url: url.to_string(),
                reason: format!("timeout after {}s", self.nav_timeout.as_secs()),
            }),
        }
    }

    /// Best-effort gate for manual login/captcha in a visible window.
    ///
    /// Suspends for up to `wait_secs`, then resumes regardless of login state
    /// — there is no success signal to verify against, so this is a bounded
    /// pause, not a check, and it never fails.
    pub async fn await_manual_login(&self, wait_secs: u64) {
        if wait_secs == 0 {
            return;
        }

        info!(
            "⏳ manual-login window: complete login/captcha in the browser if prompted ({}s)",
            wait_secs
        );

        if self.login_wall_visible().await {
            info!("detected a likely login/verification gate — finish it before the wait ends");
        }

        for remaining in (1..=wait_secs).rev() {
            if remaining % 5 == 0 || remaining <= 3 {
                info!("  ...{}s", remaining);
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    /// Heuristic probe: does the visible body text look like a login wall?
    async fn login_wall_visible(&self) -> bool {
        let body: Option<String> = self
            .page
            .evaluate("document.body ? document.body.innerText.slice(0, 4000) : ''")
            .await
            .ok()
            .and_then(|v| v.into_value::<String>().ok());

        match body {
            Some(text) => LOGIN_WALL_NEEDLES.iter().any(|n| text.contains(n)),
            None => false,
        }
    }

    /// Simulate one scroll-to-bottom gesture to trigger lazy loading.
    pub async fn scroll_by(&self, pixels: u32) -> Result<(), ScoutError> {
        self.page
            .evaluate(format!("window.scrollBy(0, {});", pixels))
            .await
            .map(|_| ())
            .map_err(|e| ScoutError::Extraction(format!("scroll gesture failed: {}", e)))
    }

    /// Snapshot the rendered document.
    ///
    /// JS snapshot first (more reliable after manual interaction), then
    /// `Page::content` with backoff, then one last JS attempt.
    pub async fn html_snapshot(&self) -> Result<String, ScoutError> {
        if let Ok(val) = self.page.evaluate("document.documentElement.outerHTML").await {
            if let Ok(html) = val.into_value::<String>() {
                if !html.is_empty() {
                    return Ok(html);
                }
            }
        }

        let delays = [200u64, 500, 1200];
        for (i, delay_ms) in delays.iter().enumerate() {
            match self.page.content().await {
                Ok(html) => return Ok(html),
                Err(e) => {
                    warn!("page content attempt {} failed: {}", i + 1, e);
                    tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                }
            }
        }

        let val = self
            .page
            .evaluate("document.documentElement.outerHTML")
            .await
            .map_err(|e| ScoutError::Extraction(format!("html snapshot failed: {}", e)))?;
        val.into_value::<String>()
            .map_err(|e| ScoutError::Extraction(format!("html snapshot decode failed: {}", e)))
    }

    /// Release all browser resources. Idempotent; safe on every exit path.
    pub async fn close(&mut self) {
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!("browser close error (non-fatal): {}", e);
            }
            info!("🛑 browser session closed");
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        // Best-effort cleanup. Drop cannot await; if we're inside a tokio
        // runtime, spawn a task to close the browser so no Chromium process
        // outlives the run.
        let Some(mut browser) = self.browser.take() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        handle.spawn(async move {
            let _ = browser.close().await;
        });
    }
}
