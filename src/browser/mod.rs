pub mod manager;
pub mod scroll;

pub use manager::{find_chrome_executable, BrowserSession};
pub use scroll::{CardFeed, PageFeed, ScrollDriver};
