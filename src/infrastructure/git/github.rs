//! GitHub REST API 연동 구현.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use tracing::debug;

use crate::application::ports::GitProvider;
use crate::domain::provider::ProviderKind;
use crate::domain::pull_request::{
    NormalizedPullRequest, ReviewEvent, ReviewState, merge_reviewers, summarize_reviews,
};
use crate::infrastructure::http::{ApiClient, MAX_PAGES, PAGE_SIZE, api_base};

const DEFAULT_API_BASE: &str = "https://api.github.com";

pub struct GitHubAdapter {
    http: ApiClient,
    api_base: String,
    pr_concurrency: usize,
}

impl GitHubAdapter {
    pub fn new(http: ApiClient, base: Option<&str>, pr_concurrency: usize) -> Self {
        Self {
            http,
            api_base: api_base(base, DEFAULT_API_BASE),
            pr_concurrency: pr_concurrency.max(1),
        }
    }

    fn request(&self, token: &str, url: &str) -> RequestBuilder {
        // 공통 헤더/인증 적용.
        self.http
            .request(Method::GET, url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .bearer_auth(token)
    }

    /// 빈 페이지나 마지막(덜 찬) 페이지까지 순회한다.
    async fn paged<T: serde::de::DeserializeOwned>(
        &self,
        token: &str,
        operation: &str,
        url: &str,
    ) -> Result<Vec<T>> {
        let mut out = Vec::new();
        for page in 1..=MAX_PAGES {
            let page_url = format!("{url}per_page={PAGE_SIZE}&page={page}");
            let items: Vec<T> = self
                .http
                .get_json(operation, || self.request(token, &page_url))
                .await?;
            let last = items.len() < PAGE_SIZE as usize;
            out.extend(items);
            if last {
                break;
            }
        }
        Ok(out)
    }

    async fn open_pulls(&self, token: &str, repository: &str) -> Result<Vec<PullSummary>> {
        let url = format!("{}/repos/{repository}/pulls?state=open&", self.api_base);
        self.paged(token, "list pull requests", &url).await
    }

    async fn normalize(
        &self,
        token: &str,
        repository: &str,
        pull: PullSummary,
    ) -> Result<NormalizedPullRequest> {
        let reviews_url = format!(
            "{}/repos/{repository}/pulls/{}/reviews?",
            self.api_base, pull.number
        );
        let detail_url = format!("{}/repos/{repository}/pulls/{}", self.api_base, pull.number);

        let (reviews, detail) = futures::try_join!(
            self.paged::<Review>(token, "list reviews", &reviews_url),
            self.http
                .get_json::<PullDetail, _>("get pull request", || self.request(token, &detail_url)),
        )?;

        // 제출 순서대로 정렬해야 "마지막 상태"가 의미를 가진다.
        let mut reviews = reviews;
        reviews.sort_by_key(|r| r.submitted_at);
        let events: Vec<ReviewEvent> = reviews
            .into_iter()
            .filter_map(|r| {
                Some(ReviewEvent {
                    reviewer: r.user?.login,
                    state: ReviewState::from_provider(&r.state),
                })
            })
            .collect();
        let summary = summarize_reviews(&events);
        let requested: Vec<String> = pull
            .requested_reviewers
            .into_iter()
            .map(|u| u.login)
            .collect();
        let author = pull.user.map(|u| u.login).unwrap_or_default();

        Ok(NormalizedPullRequest {
            id: pull.id.to_string(),
            number: pull.number,
            title: pull.title,
            reviewers: merge_reviewers(&author, &requested, &summary.reviewers),
            author,
            url: pull.html_url,
            created_at: pull.created_at,
            repository: repository.to_string(),
            labels: pull.labels.into_iter().map(|l| l.name).collect(),
            has_approvals: summary.has_approvals,
            has_changes_requested: summary.has_changes_requested,
            additions: detail.additions,
            deletions: detail.deletions,
        })
    }
}

#[derive(Debug, Deserialize)]
struct Repository {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct User {
    login: String,
}

#[derive(Debug, Deserialize)]
struct Label {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PullSummary {
    id: u64,
    number: u64,
    title: String,
    html_url: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    user: Option<User>,
    #[serde(default)]
    labels: Vec<Label>,
    #[serde(default)]
    requested_reviewers: Vec<User>,
}

#[derive(Debug, Deserialize)]
struct PullDetail {
    #[serde(default)]
    additions: Option<u64>,
    #[serde(default)]
    deletions: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Review {
    #[serde(default)]
    user: Option<User>,
    state: String,
    #[serde(default)]
    submitted_at: Option<DateTime<Utc>>,
}

#[async_trait]
impl GitProvider for GitHubAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GitHub
    }

    async fn get_repositories(&self, token: &str) -> Result<Vec<String>> {
        let url = format!(
            "{}/user/repos?affiliation=owner,collaborator,organization_member&sort=full_name&",
            self.api_base
        );
        let repos: Vec<Repository> = self.paged(token, "list repositories", &url).await?;
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
            let pulls = self.open_pulls(token, repository).await?;
            debug!(repository = %repository, count = pulls.len(), "github pull requests listed");
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
