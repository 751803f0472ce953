//! GitLab REST API(v4) 연동 구현.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use tracing::debug;

use crate::application::ports::GitProvider;
use crate::domain::provider::ProviderKind;
use crate::domain::pull_request::{NormalizedPullRequest, merge_reviewers};
use crate::infrastructure::http::{ApiClient, MAX_PAGES, PAGE_SIZE, api_base};

const DEFAULT_API_BASE: &str = "https://gitlab.com/api/v4";

pub struct GitLabAdapter {
    http: ApiClient,
    api_base: String,
    pr_concurrency: usize,
}

impl GitLabAdapter {
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

    fn project_endpoint(&self, project: &str) -> String {
        // 프로젝트 경로(group/sub/name)는 통째로 percent-encode 해야 한다.
        format!(
            "{}/projects/{}",
            self.api_base,
            utf8_percent_encode(project, NON_ALPHANUMERIC)
        )
    }

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

    async fn normalize(
        &self,
        token: &str,
        project: &str,
        mr: MergeRequest,
    ) -> Result<NormalizedPullRequest> {
        let base = format!("{}/merge_requests/{}", self.project_endpoint(project), mr.iid);
        let approvals_url = format!("{base}/approvals");
        let reviewers_url = format!("{base}/reviewers");
        let diffs_url = format!("{base}/diffs?");

        let (approvals, reviewers, diffs) = futures::try_join!(
            self.http
                .get_json::<Approvals, _>("get approvals", || self.request(token, &approvals_url)),
            self.http
                .get_json::<Vec<ReviewerState>, _>("list reviewers", || self
                    .request(token, &reviewers_url)),
            self.paged::<Diff>(token, "list diffs", &diffs_url),
        )?;

        let approved_by: Vec<String> = approvals
            .approved_by
            .into_iter()
            .map(|a| a.user.username)
            .collect();
        let has_changes_requested = reviewers
            .iter()
            .any(|r| r.state.as_deref() == Some("requested_changes"));
        let requested: Vec<String> = reviewers.into_iter().map(|r| r.user.username).collect();
        let (additions, deletions) = count_diff_lines(&diffs);
        let author = mr.author.map(|a| a.username).unwrap_or_default();

        Ok(NormalizedPullRequest {
            id: mr.id.to_string(),
            number: mr.iid,
            title: mr.title,
            reviewers: merge_reviewers(&author, &requested, &approved_by),
            author,
            url: mr.web_url,
            created_at: mr.created_at,
            repository: project.to_string(),
            labels: mr.labels,
            has_approvals: !approved_by.is_empty(),
            has_changes_requested,
            additions: Some(additions),
            deletions: Some(deletions),
        })
    }
}

/// unified diff 본문에서 추가/삭제 라인 수를 센다.
/// 첫 `@@` hunk 이전(파일 헤더)만 건너뛴다. GitLab은 보통 `@@`부터 준다.
fn count_diff_lines(diffs: &[Diff]) -> (u64, u64) {
    let mut additions = 0;
    let mut deletions = 0;
    for diff in diffs {
        let hunks = diff
            .diff
            .lines()
            .skip_while(|line| !line.starts_with("@@"));
        for line in hunks {
            if line.starts_with('+') {
                additions += 1;
            } else if line.starts_with('-') {
                deletions += 1;
            }
        }
    }
    (additions, deletions)
}

#[derive(Debug, Deserialize)]
struct Project {
    path_with_namespace: String,
}

#[derive(Debug, Deserialize)]
struct Account {
    username: String,
}

#[derive(Debug, Deserialize)]
struct MergeRequest {
    id: u64,
    iid: u64,
    title: String,
    web_url: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    author: Option<Account>,
    #[serde(default)]
    labels: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Approvals {
    #[serde(default)]
    approved_by: Vec<Approver>,
}

#[derive(Debug, Deserialize)]
struct Approver {
    user: Account,
}

#[derive(Debug, Deserialize)]
struct ReviewerState {
    user: Account,
    /// unreviewed / reviewed / requested_changes / approved
    #[serde(default)]
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Diff {
    #[serde(default)]
    diff: String,
}

#[async_trait]
impl GitProvider for GitLabAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GitLab
    }

    async fn get_repositories(&self, token: &str) -> Result<Vec<String>> {
        let url = format!(
            "{}/projects?membership=true&archived=false&simple=true&order_by=path&sort=asc&",
            self.api_base
        );
        let projects: Vec<Project> = self.paged(token, "list projects", &url).await?;
        Ok(projects.into_iter().map(|p| p.path_with_namespace).collect())
    }

    async fn get_pull_requests(
        &self,
        token: &str,
        repositories: &[String],
    ) -> Result<Vec<NormalizedPullRequest>> {
        let projects = if repositories.is_empty() {
            self.get_repositories(token).await?
        } else {
            repositories.to_vec()
        };

        let mut out = Vec::new();
        for project in &projects {
            let url = format!("{}/merge_requests?state=opened&", self.project_endpoint(project));
            let mrs: Vec<MergeRequest> = self.paged(token, "list merge requests", &url).await?;
            debug!(project = %project, count = mrs.len(), "gitlab merge requests listed");
            let normalized: Vec<NormalizedPullRequest> = stream::iter(mrs)
                .map(|mr| self.normalize(token, project, mr))
                .buffered(self.pr_concurrency)
                .try_collect()
                .await?;
            out.extend(normalized);
        }
        Ok(out)
    }
}
