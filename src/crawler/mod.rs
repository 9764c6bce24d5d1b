//! Multi-site crawler: fetching, robots rules, link discovery and the
//! manager that runs one coordinator task per site.

mod extract;
mod fetch;
mod manager;
mod robots;
mod site;

pub use extract::{page_body_text, page_title};
pub use fetch::{Fetch, FetchedPage, HttpFetcher};
pub use manager::CrawlManager;
