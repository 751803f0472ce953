//! git 제공자(GitHub/GitLab/Bitbucket) 어댑터.
//!
//! 저장소는 순서대로, 저장소 안의 PR 상세(리뷰/변경 라인)는 `pr_concurrency`만큼
//! 동시에 조회한다. 모든 호출은 제공자별 공유 레이트 리미터를 거친다.

mod bitbucket;
mod github;
mod gitlab;

pub use bitbucket::BitbucketAdapter;
pub use github::GitHubAdapter;
pub use gitlab::GitLabAdapter;
