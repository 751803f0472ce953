//! 제공자와 무관한 PR/MR 표현과 리뷰 상태 도출 규칙.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 분류 엔진이 공통으로 다루는 PR 형태. 매 디스패치마다 새로 만든다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPullRequest {
    pub id: String,
    pub number: u64,
    pub title: String,
    pub author: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub repository: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub reviewers: Vec<String>,
    pub has_approvals: bool,
    pub has_changes_requested: bool,
    pub additions: Option<u64>,
    pub deletions: Option<u64>,
}

impl NormalizedPullRequest {
    /// `floor((now - created_at) / 1일)`. 미래 시각은 0일로 본다.
    pub fn age_in_days(&self, now: DateTime<Utc>) -> i64 {
        age_in_days(self.created_at, now)
    }
}

pub fn age_in_days(created_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (now - created_at).num_milliseconds();
    if millis <= 0 {
        return 0;
    }
    millis / 86_400_000
}

/// 리뷰어 한 명이 남긴 리뷰 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewState {
    Approved,
    ChangesRequested,
    Commented,
    Dismissed,
    Pending,
}

impl ReviewState {
    /// 제공자 원문 상태 문자열을 해석한다(GitHub/GitLab/Bitbucket 표기 공통).
    pub fn from_provider(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "APPROVED" => Self::Approved,
            "CHANGES_REQUESTED" | "REQUESTED_CHANGES" => Self::ChangesRequested,
            "DISMISSED" | "UNAPPROVED" => Self::Dismissed,
            "PENDING" | "UNREVIEWED" => Self::Pending,
            _ => Self::Commented,
        }
    }
}

/// 제출 순서대로 정렬된 리뷰 한 건.
#[derive(Debug, Clone)]
pub struct ReviewEvent {
    pub reviewer: String,
    pub state: ReviewState,
}

/// 리뷰 이벤트에서 도출한 요약.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewSummary {
    pub has_approvals: bool,
    pub has_changes_requested: bool,
    /// 리뷰를 남긴 사용자(코멘트 포함), 처음 등장한 순서.
    pub reviewers: Vec<String>,
}

/// 리뷰어별 마지막 "코멘트가 아닌" 상태만 남겨 승인/변경요청 여부를 계산한다.
/// 리뷰어끼리 의견이 갈리면 두 플래그가 동시에 true일 수 있다.
pub fn summarize_reviews(events: &[ReviewEvent]) -> ReviewSummary {
    let mut latest: BTreeMap<&str, ReviewState> = BTreeMap::new();
    let mut reviewers: Vec<String> = Vec::new();

    for event in events {
        if !reviewers.iter().any(|r| r == &event.reviewer) {
            reviewers.push(event.reviewer.clone());
        }
        if matches!(event.state, ReviewState::Commented | ReviewState::Pending) {
            continue;
        }
        latest.insert(event.reviewer.as_str(), event.state);
    }

    ReviewSummary {
        has_approvals: latest.values().any(|s| *s == ReviewState::Approved),
        has_changes_requested: latest
            .values()
            .any(|s| *s == ReviewState::ChangesRequested),
        reviewers,
    }
}

/// 요청된 리뷰어와 실제 리뷰어를 순서 유지하며 합친다. 작성자는 제외한다.
pub fn merge_reviewers(author: &str, requested: &[String], reviewed: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in requested.iter().chain(reviewed.iter()) {
        if name != author && !out.contains(name) {
            out.push(name.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn event(reviewer: &str, state: &str) -> ReviewEvent {
        ReviewEvent {
            reviewer: reviewer.to_string(),
            state: ReviewState::from_provider(state),
        }
    }

    #[test]
    fn latest_non_comment_state_wins_per_reviewer() {
        let summary = summarize_reviews(&[
            event("ana", "CHANGES_REQUESTED"),
            event("ana", "COMMENTED"),
            event("ana", "APPROVED"),
        ]);
        assert!(summary.has_approvals);
        assert!(!summary.has_changes_requested);
        assert_eq!(summary.reviewers, vec!["ana".to_string()]);
    }

    #[test]
    fn disagreeing_reviewers_set_both_flags() {
        let summary = summarize_reviews(&[
            event("ana", "APPROVED"),
            event("bo", "CHANGES_REQUESTED"),
        ]);
        assert!(summary.has_approvals);
        assert!(summary.has_changes_requested);
    }

    #[test]
    fn dismissed_review_clears_previous_approval() {
        let summary = summarize_reviews(&[event("ana", "APPROVED"), event("ana", "DISMISSED")]);
        assert!(!summary.has_approvals);
    }

    #[test]
    fn age_is_floored_whole_days() {
        let created = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(age_in_days(created, created + Duration::hours(23)), 0);
        assert_eq!(age_in_days(created, created + Duration::hours(49)), 2);
        assert_eq!(age_in_days(created, created - Duration::hours(1)), 0);
    }

    #[test]
    fn merged_reviewers_skip_author_and_duplicates() {
        let merged = merge_reviewers(
            "me",
            &["ana".to_string(), "me".to_string()],
            &["bo".to_string(), "ana".to_string()],
        );
        assert_eq!(merged, vec!["ana".to_string(), "bo".to_string()]);
    }
}
