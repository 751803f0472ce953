//! PR 필터 평가.

use chrono::{DateTime, Utc};

use crate::domain::pull_request::NormalizedPullRequest;
use crate::domain::schedule::PrFilters;

/// 필터를 적용한다. 필터가 없으면 입력을 그대로 돌려준다.
pub fn apply_filters(
    prs: Vec<NormalizedPullRequest>,
    filters: Option<&PrFilters>,
    now: DateTime<Utc>,
) -> Vec<NormalizedPullRequest> {
    let Some(filters) = filters else {
        return prs;
    };
    prs.into_iter()
        .filter(|pr| matches_filters(pr, filters, now))
        .collect()
}

/// 모든 설정된 차원을 독립적으로 만족해야 통과한다.
pub fn matches_filters(pr: &NormalizedPullRequest, filters: &PrFilters, now: DateTime<Utc>) -> bool {
    if !filters.labels.is_empty()
        && !pr
            .labels
            .iter()
            .any(|label| contains_any_ignore_case(label, &filters.labels))
    {
        return false;
    }

    if !filters.title_keywords.is_empty()
        && !contains_any_ignore_case(&pr.title, &filters.title_keywords)
    {
        return false;
    }

    if filters.excluded_authors.iter().any(|a| a == &pr.author) {
        return false;
    }

    let age = pr.age_in_days(now);
    if filters.min_age_days.is_some_and(|min| age < min) {
        return false;
    }
    if filters.max_age_days.is_some_and(|max| age > max) {
        return false;
    }

    true
}

fn contains_any_ignore_case(haystack: &str, needles: &[String]) -> bool {
    let haystack = haystack.to_lowercase();
    needles
        .iter()
        .map(|n| n.trim().to_lowercase())
        .filter(|n| !n.is_empty())
        .any(|n| haystack.contains(&n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 20, 12, 0, 0).unwrap()
    }

    fn pr(id: &str, title: &str, author: &str, labels: &[&str], age_days: i64) -> NormalizedPullRequest {
        NormalizedPullRequest {
            id: id.to_string(),
            number: 1,
            title: title.to_string(),
            author: author.to_string(),
            url: format!("https://example.test/{id}"),
            created_at: now() - Duration::days(age_days) - Duration::minutes(1),
            repository: "acme/api".to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            reviewers: Vec::new(),
            has_approvals: false,
            has_changes_requested: false,
            additions: None,
            deletions: None,
        }
    }

    fn ids(prs: &[NormalizedPullRequest]) -> Vec<&str> {
        prs.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn no_filters_is_identity() {
        let input = vec![pr("a", "Fix", "ana", &[], 1), pr("b", "Add", "bo", &[], 9)];
        assert_eq!(apply_filters(input.clone(), None, now()), input);
    }

    #[test]
    fn labels_are_or_matched_by_case_insensitive_substring() {
        let filters = PrFilters {
            labels: vec!["BUG".to_string(), "urgent".to_string()],
            ..PrFilters::default()
        };
        let input = vec![
            pr("a", "x", "ana", &["bugfix"], 1),
            pr("b", "x", "ana", &["Urgent-Review"], 1),
            pr("c", "x", "ana", &["docs"], 1),
            pr("d", "x", "ana", &[], 1),
        ];
        assert_eq!(ids(&apply_filters(input, Some(&filters), now())), vec!["a", "b"]);
    }

    #[test]
    fn excluded_authors_match_exactly() {
        let filters = PrFilters {
            excluded_authors: vec!["dependabot[bot]".to_string()],
            ..PrFilters::default()
        };
        let input = vec![
            pr("a", "bump", "dependabot[bot]", &[], 1),
            pr("b", "bump", "Dependabot[bot]", &[], 1),
        ];
        assert_eq!(ids(&apply_filters(input, Some(&filters), now())), vec!["b"]);
    }

    #[test]
    fn dimensions_are_conjunctive() {
        let filters = PrFilters {
            title_keywords: vec!["api".to_string()],
            min_age_days: Some(2),
            max_age_days: Some(5),
            ..PrFilters::default()
        };
        let input = vec![
            pr("young", "API change", "ana", &[], 1),
            pr("ok", "new api route", "ana", &[], 2),
            pr("edge", "API", "ana", &[], 5),
            pr("old", "API", "ana", &[], 6),
            pr("other", "docs", "ana", &[], 3),
        ];
        let kept = apply_filters(input.clone(), Some(&filters), now());
        assert_eq!(ids(&kept), vec!["ok", "edge"]);
        for p in &input {
            let independent = p.title.to_lowercase().contains("api")
                && (2..=5).contains(&p.age_in_days(now()));
            assert_eq!(matches_filters(p, &filters, now()), independent, "{}", p.id);
        }
    }
}
