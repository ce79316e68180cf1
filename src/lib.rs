//! Rate-limit aware GitHub client.
//!
//! The core is two layers: [`retry::RetryExecutor`] runs one remote call until
//! it succeeds, fails fatally or runs out of attempts, and
//! [`paginate::Depaginator`] drives it once per page to assemble a complete
//! listing. [`github::GithubClient`] wires both to the GitHub REST API.

pub mod config;
pub mod error;
pub mod github;
pub mod http;
pub mod paginate;
pub mod retry;
pub mod types;

pub use error::{CallError, ConfigError, Error, PartialFailure};
pub use paginate::{depaginate, Depaginator, PageRequest, PageResult};
pub use retry::{retry, CallOutcome, RateLimitStatus, RetryExecutor, RetryPolicy};
