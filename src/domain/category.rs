//! PR 우선순위 분류. 각 PR은 정확히 하나의 카테고리에 속한다.

use chrono::{DateTime, Utc};

use crate::domain::pull_request::NormalizedPullRequest;

/// 이 일수 이상 리뷰 신호가 없으면 Stale.
pub const STALE_AFTER_DAYS: i64 = 7;

/// 출력 순서대로 나열한 카테고리.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrCategory {
    ReadyToMerge,
    NeedsChanges,
    UnderReview,
    Stale,
    AwaitingReview,
}

impl PrCategory {
    pub const ALL: [PrCategory; 5] = [
        PrCategory::ReadyToMerge,
        PrCategory::NeedsChanges,
        PrCategory::UnderReview,
        PrCategory::Stale,
        PrCategory::AwaitingReview,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Self::ReadyToMerge => "Ready to Merge",
            Self::NeedsChanges => "Needs Changes",
            Self::UnderReview => "Under Review",
            Self::Stale => "Stale",
            Self::AwaitingReview => "Awaiting Review",
        }
    }

    /// 요약 줄에 쓰는 짧은 라벨.
    pub fn short_label(self) -> &'static str {
        match self {
            Self::ReadyToMerge => "ready",
            Self::NeedsChanges => "changes",
            Self::UnderReview => "review",
            Self::Stale => "stale",
            Self::AwaitingReview => "waiting",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Self::ReadyToMerge => "✅",
            Self::NeedsChanges => "🔧",
            Self::UnderReview => "👀",
            Self::Stale => "⏰",
            Self::AwaitingReview => "⏳",
        }
    }

    /// 평가 순서: Ready → Needs Changes → Stale → Under Review → Awaiting.
    /// 승인과 변경요청이 동시에 있으면 Needs Changes로 간다.
    pub fn of(pr: &NormalizedPullRequest, now: DateTime<Utc>) -> Self {
        if pr.has_approvals && !pr.has_changes_requested {
            return Self::ReadyToMerge;
        }
        if pr.has_changes_requested {
            return Self::NeedsChanges;
        }
        if pr.age_in_days(now) >= STALE_AFTER_DAYS {
            return Self::Stale;
        }
        if !pr.reviewers.is_empty() {
            return Self::UnderReview;
        }
        Self::AwaitingReview
    }
}

impl std::fmt::Display for PrCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.title())
    }
}

/// 카테고리별 PR 묶음. 입력 순서를 보존한다.
#[derive(Debug, Clone, Default)]
pub struct Categorized<'a> {
    buckets: [Vec<&'a NormalizedPullRequest>; 5],
}

impl<'a> Categorized<'a> {
    pub fn get(&self, category: PrCategory) -> &[&'a NormalizedPullRequest] {
        &self.buckets[index(category)]
    }

    pub fn count(&self, category: PrCategory) -> usize {
        self.get(category).len()
    }

    pub fn total(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// 비어 있지 않은 카테고리를 출력 순서대로.
    pub fn non_empty(&self) -> impl Iterator<Item = (PrCategory, &[&'a NormalizedPullRequest])> {
        PrCategory::ALL
            .into_iter()
            .map(|c| (c, self.get(c)))
            .filter(|(_, prs)| !prs.is_empty())
    }
}

fn index(category: PrCategory) -> usize {
    match category {
        PrCategory::ReadyToMerge => 0,
        PrCategory::NeedsChanges => 1,
        PrCategory::UnderReview => 2,
        PrCategory::Stale => 3,
        PrCategory::AwaitingReview => 4,
    }
}

pub fn categorize(prs: &[NormalizedPullRequest], now: DateTime<Utc>) -> Categorized<'_> {
    let mut out = Categorized::default();
    for pr in prs {
        out.buckets[index(PrCategory::of(pr, now))].push(pr);
    }
    out
}
