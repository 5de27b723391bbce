//! Scroll-pagination driver.
//!
//! Repeatedly triggers lazy-load by simulating scroll gestures, pausing
//! between attempts, and re-extracting the full visible card set after each
//! gesture. Every extraction pass is folded into the keyword's result
//! immediately, so a later iteration failing never loses earlier progress.
//!
//! Idle termination: two consecutive iterations that add zero new card ids
//! stop the loop early. That is a heuristic for an exhausted result set, not
//! a guarantee the server has no more pages — and reaching `max_scrolls`
//! without new content is a normal terminal case, not a failure.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

use crate::browser::manager::BrowserSession;
use crate::core::error::ScoutError;
use crate::core::types::Card;
use crate::dedup::KeywordResult;
use crate::extract;

/// Consecutive no-new-card iterations before the driver gives up.
const IDLE_ITERATION_LIMIT: u32 = 2;

/// One scroll-to-bottom gesture in pixels. Matches roughly three card rows
/// so each iteration reveals a fresh batch.
const SCROLL_STEP_PX: u32 = 2400;

/// The seam between the pagination loop and the live page. The driver is
/// written against this trait so the loop's termination and accumulation
/// behavior can be exercised with a scripted feed, no browser attached.
#[async_trait]
pub trait CardFeed {
    /// Simulate one scroll gesture.
    async fn scroll_once(&mut self) -> Result<(), ScoutError>;

    /// The current full set of cards visible in the rendered document —
    /// not just newly revealed ones.
    async fn visible_cards(&mut self) -> Result<Vec<Card>, ScoutError>;
}

/// Live feed over the run's browser page.
pub struct PageFeed<'a> {
    session: &'a BrowserSession,
}

impl<'a> PageFeed<'a> {
    pub fn new(session: &'a BrowserSession) -> Self {
        Self { session }
    }
}

#[async_trait]
impl CardFeed for PageFeed<'_> {
    async fn scroll_once(&mut self) -> Result<(), ScoutError> {
        self.session.scroll_by(SCROLL_STEP_PX).await
    }

    async fn visible_cards(&mut self) -> Result<Vec<Card>, ScoutError> {
        let html = self.session.html_snapshot().await?;
        Ok(extract::parse_cards(&html))
    }
}

pub struct ScrollDriver {
    max_scrolls: u32,
    pause: Duration,
}

impl ScrollDriver {
    pub fn new(max_scrolls: u32, pause: Duration) -> Self {
        Self { max_scrolls, pause }
    }

    /// Run the pagination loop, accumulating into `out` after every pass.
    /// Returns the number of scroll iterations actually performed.
    pub async fn run<F>(&self, feed: &mut F, out: &mut KeywordResult) -> Result<u32, ScoutError>
    where
        F: CardFeed + Send,
    {
        // Bank whatever is already visible before the first gesture.
        let initial = feed.visible_cards().await?;
        let seeded = out.accumulate(initial);
        debug!("pagination: {} cards visible before scrolling", seeded);

        let mut idle_streak = 0u32;
        let mut performed = 0u32;

        for i in 0..self.max_scrolls {
            feed.scroll_once().await?;
            performed += 1;

            // Every third iteration waits half again as long — lazy loading
            // on the list page often lags a plain scroll pause.
            let mut pause = self.pause;
            if (i + 1) % 3 == 0 {
                pause = pause + pause / 2;
            }
            tokio::time::sleep(pause).await;

            let cards = feed.visible_cards().await?;
            let added = out.accumulate(cards);
            debug!(
                "pagination: iteration {} added {} cards ({} total)",
                performed,
                added,
                out.card_count()
            );

            if added == 0 {
                idle_streak += 1;
                if idle_streak >= IDLE_ITERATION_LIMIT {
                    info!(
                        "pagination: no new cards for {} iterations — stopping at {}/{}",
                        idle_streak, performed, self.max_scrolls
                    );
                    break;
                }
            } else {
                idle_streak = 0;
            }
        }

        Ok(performed)
    }
}
