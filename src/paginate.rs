//! Depagination on top of [`RetryExecutor`].
//!
//! Pages are fetched strictly in order, one at a time, each as its own retried
//! call. The upper bound is whatever the most recent page reported, so a
//! listing that grows while it is being read is still followed to the end.

use crate::error::{Error, PartialFailure};
use crate::retry::{CallOutcome, RetryExecutor};
use log::debug;
use std::future::Future;

pub const DEFAULT_PER_PAGE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based page index.
    pub page: u32,
    pub per_page: u32,
}

/// One page of results plus the last page number the server reported, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub last_page: Option<u32>,
}

impl<T> PageResult<T> {
    pub fn new(items: Vec<T>, last_page: Option<u32>) -> Self {
        Self { items, last_page }
    }
}

#[derive(Debug)]
pub enum PageState {
    Fetching(u32),
    Done,
    Failed(Error),
}

#[derive(Debug, Clone)]
pub struct Depaginator {
    executor: RetryExecutor,
    per_page: u32,
}

impl Default for Depaginator {
    fn default() -> Self {
        Self::new(RetryExecutor::default(), DEFAULT_PER_PAGE)
    }
}

impl Depaginator {
    pub fn new(executor: RetryExecutor, per_page: u32) -> Self {
        Self { executor, per_page }
    }

    pub fn executor(&self) -> &RetryExecutor {
        &self.executor
    }

    /// Fetch every page. Any page failure discards what was aggregated.
    pub async fn fetch_all<T, F, Fut>(
        &self,
        description: &str,
        max_attempts: u32,
        fetch_page: F,
    ) -> Result<Vec<T>, Error>
    where
        F: FnMut(PageRequest) -> Fut,
        Fut: Future<Output = CallOutcome<PageResult<T>>>,
    {
        self.fetch_all_partial(description, max_attempts, fetch_page)
            .await
            .map_err(PartialFailure::into_error)
    }

    /// Like [`fetch_all`](Self::fetch_all) but hands back the items gathered
    /// before a failing page alongside the error.
    pub async fn fetch_all_partial<T, F, Fut>(
        &self,
        description: &str,
        max_attempts: u32,
        mut fetch_page: F,
    ) -> Result<Vec<T>, PartialFailure<T>>
    where
        F: FnMut(PageRequest) -> Fut,
        Fut: Future<Output = CallOutcome<PageResult<T>>>,
    {
        let mut items = Vec::new();
        let mut last_page: u32 = 1;
        let mut state = PageState::Fetching(1);
        loop {
            state = match state {
                PageState::Done => return Ok(items),
                PageState::Failed(error) => return Err(PartialFailure { items, error }),
                PageState::Fetching(page) => {
                    if let Err(error) = self.executor.check_cancelled(description) {
                        PageState::Failed(Error::DepaginationFailed {
                            page,
                            last_page,
                            source: Box::new(error),
                        })
                    } else {
                        let request = PageRequest {
                            page,
                            per_page: self.per_page,
                        };
                        let fetched = self
                            .executor
                            .execute(description, max_attempts, || fetch_page(request))
                            .await;
                        match fetched {
                            Err(source) => PageState::Failed(Error::DepaginationFailed {
                                page,
                                last_page,
                                source: Box::new(source),
                            }),
                            Ok(result) => {
                                if let Some(reported) = result.last_page.filter(|n| *n > 0) {
                                    last_page = reported;
                                }
                                debug!(
                                    "{}: page {}/{} returned {} items",
                                    description,
                                    page,
                                    last_page,
                                    result.items.len()
                                );
                                items.extend(result.items);
                                if page < last_page {
                                    PageState::Fetching(page + 1)
                                } else {
                                    PageState::Done
                                }
                            }
                        }
                    }
                }
            };
        }
    }
}

/// Depaginate with the default retry policy and page size.
pub async fn depaginate<T, F, Fut>(
    description: &str,
    max_attempts: u32,
    fetch_page: F,
) -> Result<Vec<T>, Error>
where
    F: FnMut(PageRequest) -> Fut,
    Fut: Future<Output = CallOutcome<PageResult<T>>>,
{
    Depaginator::default()
        .fetch_all(description, max_attempts, fetch_page)
        .await
}
