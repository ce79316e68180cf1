//! GitHub operations built on the retry and depagination layers.
//!
//! Single-resource calls are wrapped by [`RetryExecutor::execute`]; listings
//! go through [`Depaginator::fetch_all`] so callers always see the complete
//! collection or an error.

use crate::config::Config;
use crate::error::{CallError, Error};
use crate::http::{encode_path_segment, RestClient};
use crate::paginate::{Depaginator, PageRequest, PageResult};
use crate::retry::RetryExecutor;
use crate::types::{Issue, IssueComment, IssueState, Repository, User};
use reqwest::Method;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct GithubClient {
    rest: RestClient,
    retry: RetryExecutor,
    pages: Depaginator,
    max_attempts: u32,
}

impl GithubClient {
    pub fn new(cfg: Config) -> Result<Self, Error> {
        let settings = cfg.retry;
        let rest = RestClient::new(cfg).map_err(|e| Error::Fatal {
            description: "building http client".into(),
            source: CallError::new("transport", e.to_string()),
        })?;
        let retry = RetryExecutor::new(settings.policy());
        Ok(Self {
            pages: Depaginator::new(retry.clone(), settings.per_page),
            retry,
            rest,
            max_attempts: settings.max_attempts,
        })
    }

    /// Abort in-flight and future calls, including rate-limit waits, when `token` fires.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.retry = self.retry.with_cancellation(token);
        self.pages = Depaginator::new(self.retry.clone(), self.rest.config().retry.per_page);
        self
    }

    async fn call<T: DeserializeOwned>(
        &self,
        description: &str,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T, Error> {
        let rest = &self.rest;
        self.retry
            .execute(description, self.max_attempts, move || {
                let method = method.clone();
                async move {
                    rest.send::<T, Value>(method, path, &[], body)
                        .await
                        .map(|r| r.value)
                }
            })
            .await
    }

    async fn list<T: DeserializeOwned>(
        &self,
        description: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, Error> {
        let rest = &self.rest;
        self.pages
            .fetch_all(description, self.max_attempts, move |req: PageRequest| {
                let mut q = query.to_vec();
                q.push(("page", req.page.to_string()));
                q.push(("per_page", req.per_page.to_string()));
                async move {
                    rest.get::<Vec<T>>(path, &q)
                        .await
                        .map(|r| PageResult::new(r.value, r.last_page))
                }
            })
            .await
    }

    /// Current authenticated user.
    pub async fn get_user(&self) -> Result<User, Error> {
        self.call("getting current user", Method::GET, "/user", None)
            .await
    }

    /// Names of the repositories under `org`.
    pub async fn list_repos(&self, org: &str) -> Result<Vec<String>, Error> {
        let path = format!("/users/{}/repos", encode_path_segment(org));
        let repos: Vec<Repository> = self
            .list(&format!("listing repos for '{}'", org), &path, &[])
            .await?;
        Ok(repos.into_iter().map(|r| r.name).collect())
    }

    /// Issues in any state, optionally restricted to those carrying all `labels`.
    pub async fn list_issues_by_repo(
        &self,
        org: &str,
        repo: &str,
        labels: &[String],
    ) -> Result<Vec<Issue>, Error> {
        let path = format!(
            "/repos/{}/{}/issues",
            encode_path_segment(org),
            encode_path_segment(repo)
        );
        let mut query = vec![("state", IssueState::All.as_str().to_string())];
        if !labels.is_empty() {
            query.push(("labels", labels.join(",")));
        }
        self.list(
            &format!("listing issues with label '{:?}'", labels),
            &path,
            &query,
        )
        .await
    }

    pub async fn create_issue(
        &self,
        org: &str,
        repo: &str,
        title: &str,
        body: &str,
    ) -> Result<Issue, Error> {
        let path = format!(
            "/repos/{}/{}/issues",
            encode_path_segment(org),
            encode_path_segment(repo)
        );
        let payload = json!({ "title": title, "body": body });
        self.call(
            &format!("creating issue '{} {}' '{}'", org, repo, title),
            Method::POST,
            &path,
            Some(&payload),
        )
        .await
    }

    pub async fn close_issue(&self, org: &str, repo: &str, number: u64) -> Result<(), Error> {
        self.update_issue_state(org, repo, IssueState::Closed, number)
            .await
    }

    pub async fn reopen_issue(&self, org: &str, repo: &str, number: u64) -> Result<(), Error> {
        self.update_issue_state(org, repo, IssueState::Open, number)
            .await
    }

    async fn update_issue_state(
        &self,
        org: &str,
        repo: &str,
        state: IssueState,
        number: u64,
    ) -> Result<(), Error> {
        let path = format!(
            "/repos/{}/{}/issues/{}",
            encode_path_segment(org),
            encode_path_segment(repo),
            number
        );
        let payload = json!({ "state": state.as_str() });
        let _: IgnoredAny = self
            .call(
                &format!(
                    "applying '{}' action on issue '{} {} {}'",
                    state.as_str(),
                    org,
                    repo,
                    number
                ),
                Method::PATCH,
                &path,
                Some(&payload),
            )
            .await?;
        Ok(())
    }

    pub async fn add_labels_to_issue(
        &self,
        org: &str,
        repo: &str,
        number: u64,
        labels: &[String],
    ) -> Result<(), Error> {
        let path = format!(
            "/repos/{}/{}/issues/{}/labels",
            encode_path_segment(org),
            encode_path_segment(repo),
            number
        );
        let payload = json!({ "labels": labels });
        let _: IgnoredAny = self
            .call(
                &format!("add labels '{:?}' to '{} {} {}'", labels, org, repo, number),
                Method::POST,
                &path,
                Some(&payload),
            )
            .await?;
        Ok(())
    }

    pub async fn remove_label_for_issue(
        &self,
        org: &str,
        repo: &str,
        number: u64,
        label: &str,
    ) -> Result<(), Error> {
        let path = format!(
            "/repos/{}/{}/issues/{}/labels/{}",
            encode_path_segment(org),
            encode_path_segment(repo),
            number,
            encode_path_segment(label)
        );
        let _: IgnoredAny = self
            .call(
                &format!("remove label '{}' from '{} {} {}'", label, org, repo, number),
                Method::DELETE,
                &path,
                None,
            )
            .await?;
        Ok(())
    }

    /// All comments on an issue, oldest first.
    pub async fn list_comments(
        &self,
        org: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<IssueComment>, Error> {
        let path = format!(
            "/repos/{}/{}/issues/{}/comments",
            encode_path_segment(org),
            encode_path_segment(repo),
            number
        );
        self.list(
            &format!("listing comments for issue '{} {} {}'", org, repo, number),
            &path,
            &[],
        )
        .await
    }

    pub async fn get_comment(
        &self,
        org: &str,
        repo: &str,
        comment_id: u64,
    ) -> Result<IssueComment, Error> {
        let path = format!(
            "/repos/{}/{}/issues/comments/{}",
            encode_path_segment(org),
            encode_path_segment(repo),
            comment_id
        );
        self.call(
            &format!("getting comment '{} {} {}'", org, repo, comment_id),
            Method::GET,
            &path,
            None,
        )
        .await
    }

    pub async fn create_comment(
        &self,
        org: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<IssueComment, Error> {
        let path = format!(
            "/repos/{}/{}/issues/{}/comments",
            encode_path_segment(org),
            encode_path_segment(repo),
            number
        );
        let payload = json!({ "body": body });
        self.call(
            &format!("commenting issue '{} {} {}'", org, repo, number),
            Method::POST,
            &path,
            Some(&payload),
        )
        .await
    }

    pub async fn edit_comment(
        &self,
        org: &str,
        repo: &str,
        comment_id: u64,
        body: &str,
    ) -> Result<(), Error> {
        let path = format!(
            "/repos/{}/{}/issues/comments/{}",
            encode_path_segment(org),
            encode_path_segment(repo),
            comment_id
        );
        let payload = json!({ "body": body });
        let _: IgnoredAny = self
            .call(
                &format!("editing comment '{} {} {}'", org, repo, comment_id),
                Method::PATCH,
                &path,
                Some(&payload),
            )
            .await?;
        Ok(())
    }
}
