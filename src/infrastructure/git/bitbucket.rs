//! Bitbucket Cloud REST API(2.0) 연동 구현.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::application::ports::GitProvider;
use crate::domain::provider::ProviderKind;
use crate::domain::pull_request::{
    NormalizedPullRequest, ReviewEvent, ReviewState, merge_reviewers, summarize_reviews,
};
use crate::infrastructure::http::{ApiClient, MAX_PAGES, PAGE_SIZE, api_base};

const DEFAULT_API_BASE: &str = "https://api.bitbucket.org/2.0";
/// Bitbucket의 pullrequests 목록 pagelen 상한.
const PR_PAGE_SIZE: u32 = 50;

pub struct BitbucketAdapter {
    http: ApiClient,
    api_base: String,
    pr_concurrency: usize,
}

impl BitbucketAdapter {
    pub fn new(http: ApiClient, base: Option<&str>, pr_concurrency: usize) -> Self {
        Self {
            http,
            api_base: api_base(base, DEFAULT_API_BASE),
            pr_concurrency: pr_concurrency.max(1),
        }
    }

    fn request(&self, token: &str, url: &str) -> RequestBuilder {
        self.http.request(Method::GET, url).bearer_auth(token)
    }

    /// 응답의 `next` 링크를 따라 순회한다.
    async fn paged<T: DeserializeOwned>(&self, token: &str, operation: &str, first: String) -> Result<Vec<T>> {
        let mut out = Vec::new();
        let mut next = Some(first);
        let mut pages = 0;
        while let Some(url) = next.take() {
            pages += 1;
            let page: Page<T> = self
                .http
                .get_json(operation, || self.request(token, &url))
                .await?;
            out.extend(page.values);
            if pages >= MAX_PAGES {
                break;
            }
            next = page.next;
        }
        Ok(out)
    }

    async fn normalize(
        &self,
        token: &str,
        repository: &str,
        summary: PullSummary,
    ) -> Result<NormalizedPullRequest> {
        let base = format!(
            "{}/repositories/{repository}/pullrequests/{}",
            self.api_base, summary.id
        );
        let diffstat_url = format!("{base}/diffstat?pagelen={PAGE_SIZE}");

        let (detail, stats) = futures::try_join!(
            self.http
                .get_json::<PullDetail, _>("get pull request", || self.request(token, &base)),
            self.paged::<DiffStat>(token, "get diffstat", diffstat_url),
        )?;

        // participants에는 최종 상태만 있으므로 그 상태를 사용자별 마지막 리뷰로 본다.
        let events: Vec<ReviewEvent> = detail
            .participants
            .iter()
            .filter_map(|p| {
                let state = match p.state.as_deref() {
                    Some(raw) => ReviewState::from_provider(raw),
                    None if p.approved => ReviewState::Approved,
                    None => ReviewState::Commented,
                };
                Some(ReviewEvent {
                    reviewer: p.user.as_ref()?.handle(),
                    state,
                })
            })
            .collect();
        let review = summarize_reviews(&events);
        let requested: Vec<String> = detail.reviewers.iter().map(Account::handle).collect();
        let author = summary.author.as_ref().map(Account::handle).unwrap_or_default();
        let (additions, deletions) = stats.iter().fold((0, 0), |(a, d), s| {
            (a + s.lines_added.unwrap_or(0), d + s.lines_removed.unwrap_or(0))
        });

        Ok(NormalizedPullRequest {
            id: format!("{repository}#{}", summary.id),
            number: summary.id,
            title: summary.title,
            reviewers: merge_reviewers(&author, &requested, &review.reviewers),
            author,
            url: summary.links.html.href,
            created_at: summary.created_on,
            repository: repository.to_string(),
            labels: Vec::new(),
            has_approvals: review.has_approvals,
            has_changes_requested: review.has_changes_requested,
            additions: Some(additions),
            deletions: Some(deletions),
        })
    }
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    values: Vec<T>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Repository {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct Account {
    #[serde(default)]
    nickname: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
}

impl Account {
    fn handle(&self) -> String {
        self.nickname
            .clone()
            .or_else(|| self.display_name.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
}

#[derive(Debug, Deserialize)]
struct Links {
    html: Link,
}

#[derive(Debug, Deserialize)]
struct PullSummary {
    id: u64,
    title: String,
    created_on: DateTime<Utc>,
    #[serde(default)]
    author: Option<Account>,
    links: Links,
}

#[derive(Debug, Deserialize)]
struct PullDetail {
    #[serde(default)]
    participants: Vec<Participant>,
    #[serde(default)]
    reviewers: Vec<Account>,
}

#[derive(Debug, Deserialize)]
struct Participant {
    #[serde(default)]
    user: Option<Account>,
    #[serde(default)]
    approved: bool,
    /// approved / changes_requested / null
    #[serde(default)]
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DiffStat {
    #[serde(default)]
    lines_added: Option<u64>,
    #[serde(default)]
    lines_removed: Option<u64>,
}

#[async_trait]
impl GitProvider for BitbucketAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Bitbucket
    }

    async fn get_repositories(&self, token: &str) -> Result<Vec<String>> {
        let url = format!(
            "{}/repositories?role=member&sort=full_name&pagelen={PAGE_SIZE}",
            self.api_base
        );
        let repos: Vec<Repository> = self.paged(token, "list repositories", url).await?;
        Ok(repos.into_iter().map(|r| r.full_name).collect())
    }

    async fn get_pull_requests(
        &self,
        token: &str,
        repositories: &[String],
    ) -> Result<Vec<NormalizedPullRequest>> {
        let repositories = if repositories.is_empty() {
            self.get_repositories(token).await?
        } else {
            repositories.to_vec()
        };

        let mut out = Vec::new();
        for repository in &repositories {
            let url = format!(
                "{}/repositories/{repository}/pullrequests?state=OPEN&pagelen={PR_PAGE_SIZE}",
                self.api_base
            );
            let pulls: Vec<PullSummary> = self.paged(token, "list pull requests", url).await?;
            debug!(repository = %repository, count = pulls.len(), "bitbucket pull requests listed");
            let normalized: Vec<NormalizedPullRequest> = stream::iter(pulls)
                .map(|pull| self.normalize(token, repository, pull))
                .buffered(self.pr_concurrency)
                .try_collect()
                .await?;
            out.extend(normalized);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::http::test_support::api_client;
    use httpmock::prelude::*;
    use serde_json::json;

    fn adapter(server: &MockServer) -> BitbucketAdapter {
        BitbucketAdapter::new(api_client(ProviderKind::Bitbucket), Some(&server.base_url()), 2)
    }

    #[tokio::test]
    async fn repositories_follow_next_links() {
        let server = MockServer::start();
        let second_url = format!("{}/repositories/page2", server.base_url());
        let first = server.mock(|when, then| {
            when.method(GET)
                .path("/repositories")
                .query_param("role", "member");
            then.status(200).json_body(json!({
                "values": [{ "full_name": "acme/api" }],
                "next": second_url
            }));
        });
        let second = server.mock(|when, then| {
            when.method(GET).path("/repositories/page2");
            then.status(200)
                .json_body(json!({ "values": [{ "full_name": "acme/web" }] }));
        });

        let repos = adapter(&server).get_repositories("tok").await.unwrap();
        first.assert();
        second.assert();
        assert_eq!(repos, vec!["acme/api", "acme/web"]);
    }

    #[tokio::test]
    async fn participants_drive_review_flags() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET)
                .path("/repositories/acme/api/pullrequests")
                .query_param("state", "OPEN");
            then.status(200).json_body(json!({
                "values": [{
                    "id": 3,
                    "title": "Tidy build",
                    "created_on": "2026-05-02T10:00:00+00:00",
                    "author": { "nickname": "dev", "display_name": "Dev" },
                    "links": { "html": { "href": "https://bitbucket.org/acme/api/pull-requests/3" } }
                }]
            }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/repositories/acme/api/pullrequests/3");
            then.status(200).json_body(json!({
                "reviewers": [{ "nickname": "ana" }],
                "participants": [
                    { "user": { "nickname": "ana" }, "role": "REVIEWER", "approved": true, "state": "approved" },
                    { "user": { "nickname": "bo" }, "role": "PARTICIPANT", "approved": false, "state": null }
                ]
            }));
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/repositories/acme/api/pullrequests/3/diffstat");
            then.status(200).json_body(json!({
                "values": [
                    { "lines_added": 10, "lines_removed": 1 },
                    { "lines_added": 2, "lines_removed": 0 }
                ]
            }));
        });

        let prs = adapter(&server)
            .get_pull_requests("tok", &["acme/api".to_string()])
            .await
            .unwrap();
        let pr = &prs[0];
        assert_eq!(pr.id, "acme/api#3");
        assert!(pr.has_approvals);
        assert!(!pr.has_changes_requested);
        assert_eq!(pr.reviewers, vec!["ana", "bo"]);
        assert_eq!((pr.additions, pr.deletions), (Some(12), Some(1)));
        assert!(pr.labels.is_empty());
    }
}
