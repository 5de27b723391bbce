//! Run orchestration.
//!
//! Sequences keywords over the single browser session, contains per-keyword
//! failures, and writes the aggregate artifact once at the end. Only a
//! session-launch failure or an artifact-write failure is fatal; a keyword
//! whose navigation or extraction fails is recorded and the run moves on,
//! keeping whatever partial result had already accumulated.
//!
//! Ctrl-C is raced against the keyword loop; on abort the session is still
//! closed before the error surfaces — teardown runs on every exit path.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};
use url::Url;

use crate::browser::manager::BrowserSession;
use crate::browser::scroll::{PageFeed, ScrollDriver};
use crate::core::config::ScoutConfig;
use crate::core::error::ScoutError;
use crate::core::types::AggregateOutput;
use crate::dedup::KeywordResult;
use crate::enrich;
use crate::extract::XHS_BASE_URL;

/// What one pass of the pipeline targets: a keyword's search page, or the
/// explore feed when no keywords were configured (fallback from the original
/// workflow — an empty run still produces a useful artifact).
#[derive(Debug, Clone)]
pub enum KeywordPlan {
    Search(String),
    Explore,
}

impl KeywordPlan {
    pub fn url(&self) -> String {
        match self {
            KeywordPlan::Search(kw) => {
                Url::parse_with_params(
                    &format!("{}/search_result", XHS_BASE_URL),
                    &[("keyword", kw.as_str())],
                )
                .map(|u| u.to_string())
                // Base URL and param encoding are static; parse cannot fail here.
                .unwrap_or_else(|_| format!("{}/search_result", XHS_BASE_URL))
            }
            KeywordPlan::Explore => format!("{}/explore", XHS_BASE_URL),
        }
    }

    /// Top-level key this pass owns in the output artifact.
    pub fn output_key(&self) -> &str {
        match self {
            KeywordPlan::Search(kw) => kw,
            KeywordPlan::Explore => "explore",
        }
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub keywords: usize,
    pub total_cards: usize,
    pub failed_keywords: Vec<String>,
    pub out_path: PathBuf,
}

pub struct Orchestrator {
    cfg: ScoutConfig,
}

impl Orchestrator {
    pub fn new(cfg: ScoutConfig) -> Self {
        Self { cfg }
    }

    /// Execute the full run: launch → per-keyword pipelines → artifact write.
    pub async fn run(&self) -> Result<RunSummary, ScoutError> {
        let mut session = BrowserSession::launch(&self.cfg).await?;

        let outcome = tokio::select! {
            r = self.run_keywords(&session) => r,
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupt received — shutting the session down");
                Err(ScoutError::Aborted)
            }
        };

        // Scoped release spans the whole run, independent of outcome.
        session.close().await;

        let output = outcome?;
        write_artifact(&self.cfg.out_path, &output).await?;

        let summary = RunSummary {
            keywords: output.meta.keyword_order.len(),
            total_cards: output.meta.total_unique_cards,
            failed_keywords: output
                .meta
                .failed_keywords
                .iter()
                .map(|f| f.keyword.clone())
                .collect(),
            out_path: self.cfg.out_path.clone(),
        };
        Ok(summary)
    }

    async fn run_keywords(&self, session: &BrowserSession) -> Result<AggregateOutput, ScoutError> {
        let keywords = self.cfg.normalized_keywords();
        let plans: Vec<KeywordPlan> = if keywords.is_empty() {
            info!("no keywords configured — falling back to the explore feed");
            vec![KeywordPlan::Explore]
        } else {
            keywords.into_iter().map(KeywordPlan::Search).collect()
        };

        let mut output = AggregateOutput::new();

        for plan in &plans {
            let mut result = KeywordResult::new();

            match self.scrape_one(session, plan, &mut result).await {
                Ok(scrolls) => {
                    info!(
                        "✅ '{}': {} unique cards after {} scroll iterations",
                        plan.output_key(),
                        result.card_count(),
                        scrolls
                    );
                }
                Err(e) if e.is_keyword_scoped() => {
                    // Keyword boundary: record, keep the partial result, move on.
                    error!(
                        "'{}' failed ({}); keeping {} cards collected so far",
                        plan.output_key(),
                        e,
                        result.card_count()
                    );
                    output.record_failure(plan.output_key(), &e);
                }
                Err(e) => return Err(e),
            }

            // Every keyword gets its entry, empty or partial included.
            output.push_keyword(plan.output_key(), result.cards())?;
        }

        Ok(output)
    }

    /// One keyword pipeline: navigate → optional manual-login wait →
    /// scroll/extract/accumulate loop → optional detail enrichment.
    async fn scrape_one(
        &self,
        session: &BrowserSession,
        plan: &KeywordPlan,
        result: &mut KeywordResult,
    ) -> Result<u32, ScoutError> {
        let url = plan.url();
        info!("🌐 opening {}", url);
        session.navigate(&url).await?;
        tokio::time::sleep(Duration::from_millis(self.cfg.settle_ms)).await;

        // Only meaningful with a visible window; headless gets no wait.
        if self.cfg.headful {
            session.await_manual_login(self.cfg.login_wait_secs).await;
        }

        let driver = ScrollDriver::new(
            self.cfg.scrolls,
            Duration::from_millis(self.cfg.scroll_pause_ms),
        );
        let mut feed = PageFeed::new(session);
        let scrolls = driver.run(&mut feed, result).await?;

        if result.is_empty() {
            warn!(
                "'{}': zero cards — likely a login/verification wall or a DOM change; \
                 try headful mode with a longer login wait",
                plan.output_key()
            );
        }

        enrich::enrich_cards(
            session,
            result,
            self.cfg.detail_limit,
            Duration::from_millis(self.cfg.detail_delay_ms),
        )
        .await;

        Ok(scrolls)
    }
}

/// Write the artifact atomically: serialize, write a sibling temp file, then
/// rename over the target. The old artifact is fully replaced or untouched,
/// never half-written.
pub async fn write_artifact(path: &Path, output: &AggregateOutput) -> Result<(), ScoutError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| ScoutError::Write(format!("serialize artifact: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ScoutError::Write(format!("create {}: {}", parent.display(), e)))?;
        }
    }

    let file_name = path
        .file_name()
        .ok_or_else(|| ScoutError::Write(format!("artifact path has no file name: {}", path.display())))?;
    let tmp = path.with_file_name(format!("{}.tmp", file_name.to_string_lossy()));

    tokio::fs::write(&tmp, json)
        .await
        .map_err(|e| ScoutError::Write(format!("write {}: {}", tmp.display(), e)))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| ScoutError::Write(format!("rename {} -> {}: {}", tmp.display(), path.display(), e)))?;

    info!("📦 artifact written: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_url_percent_encodes_keywords() {
        let url = KeywordPlan::Search("口红".to_string()).url();
        assert_eq!(
            url,
            "https://www.xiaohongshu.com/search_result?keyword=%E5%8F%A3%E7%BA%A2"
        );
    }

    #[test]
    fn explore_plan_has_fixed_url_and_key() {
        let plan = KeywordPlan::Explore;
        assert_eq!(plan.url(), "https://www.xiaohongshu.com/explore");
        assert_eq!(plan.output_key(), "explore");
    }
}
