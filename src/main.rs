use std::path::PathBuf;
use tracing::{error, info, warn};

use rednote_scout::{load_config, Orchestrator, ScoutConfig, ScoutError};

/// CLI overrides on top of the file/env configuration. Flags mirror the
/// config fields; `--keyword` may be repeated.
fn apply_cli_overrides(cfg: &mut ScoutConfig) {
    let mut cli_keywords: Vec<String> = Vec::new();
    let mut args = std::env::args().skip(1).peekable();

    while let Some(a) = args.next() {
        match a.as_str() {
            "--headful" => cfg.headful = true,
            "--keyword" => {
                if let Some(v) = args.next() {
                    cli_keywords.push(v);
                }
            }
            "--out" => {
                if let Some(v) = args.next() {
                    cfg.out_path = PathBuf::from(v);
                }
            }
            "--scrolls" => {
                if let Some(v) = args.next() {
                    match v.parse::<u32>() {
                        Ok(n) => cfg.scrolls = n,
                        Err(_) => warn!("--scrolls: ignoring non-numeric value '{}'", v),
                    }
                }
            }
            "--login-wait" => {
                if let Some(v) = args.next() {
                    match v.parse::<u64>() {
                        Ok(n) => cfg.login_wait_secs = n,
                        Err(_) => warn!("--login-wait: ignoring non-numeric value '{}'", v),
                    }
                }
            }
            "--detail-limit" => {
                if let Some(v) = args.next() {
                    match v.parse::<usize>() {
                        Ok(n) => cfg.detail_limit = n,
                        Err(_) => warn!("--detail-limit: ignoring non-numeric value '{}'", v),
                    }
                }
            }
            other => warn!("ignoring unknown argument '{}'", other),
        }
    }

    // CLI keywords replace the configured list entirely.
    if !cli_keywords.is_empty() {
        cfg.keywords = cli_keywords;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let mut cfg = load_config();
    apply_cli_overrides(&mut cfg);

    let keywords = cfg.normalized_keywords();
    if keywords.is_empty() {
        info!("no keywords set (config `keywords` or --keyword) — will scrape the explore feed");
    } else {
        info!("keywords ({}): {}", keywords.len(), keywords.join(", "));
    }
    if cfg.login_wait_secs > 0 && !cfg.headful {
        info!("login wait is configured but only applies with --headful");
    }

    let orchestrator = Orchestrator::new(cfg);
    match orchestrator.run().await {
        Ok(summary) => {
            info!(
                "done: {} keyword(s), {} unique cards → {}",
                summary.keywords,
                summary.total_cards,
                summary.out_path.display()
            );
            if !summary.failed_keywords.is_empty() {
                warn!(
                    "{} keyword(s) failed and carry empty/partial results: {}",
                    summary.failed_keywords.len(),
                    summary.failed_keywords.join(", ")
                );
            }
            if summary.total_cards == 0 {
                info!(
                    "zero cards overall — the page may require login/captcha \
                     (run with --headful and finish it manually) or the DOM changed"
                );
            }
            Ok(())
        }
        Err(e @ ScoutError::Aborted) => {
            warn!("{}", e);
            std::process::exit(130);
        }
        Err(e) => {
            error!("run failed: {}", e);
            std::process::exit(2);
        }
    }
}
