//! Page Fetcher
//!
//! Resolves a `key=url` annotation value into a set of pages and fetches
//! them concurrently, tolerating partial failure.
//!
//! # Example
//!
//! ```no_run
//! use page_fetcher::{HttpTransport, PageFetcher};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = HttpTransport::new(Duration::from_secs(30))?;
//!
//! let mut fetcher = PageFetcher::parse("joke=curl-a-joke.herokuapp.com home=https://example.com")?;
//! // Keys that are already known are never fetched again
//! fetcher.exclude(["home"]);
//!
//! let (pages, failures) = fetcher.fetch(&transport).await;
//! if let Some(failures) = failures {
//!     eprintln!("some pages failed: {}", failures);
//! }
//! for (key, body) in &pages {
//!     println!("{}: {} bytes", key, body.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Annotation Parsing**: whitespace-separated `key=url` couples, last key wins
//! - **Exclusion**: drop keys the target already holds
//! - **Best-effort Fetch**: every page is requested independently; failures are aggregated per key
//! - **Mock Transport**: `test-util` feature for socket-free tests

pub mod error;
pub mod fetcher;
pub mod transport;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use error::{FetchError, ParseError, TransportError};
pub use fetcher::{with_scheme, PageFetcher, Pages, DEFAULT_SCHEME};
pub use transport::{HttpTransport, PageTransport};
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockTransport;
