use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;

use super::escalate::escalation_candidates;
use super::*;
use crate::application::fakes::{
    FakeGit, FakeMessenger, FakeOAuth, FakeReporter, FakeSchedules, FakeTokens, TestStyle, now,
    token,
};
use crate::application::ports::GitProvider;
use crate::application::retry::RetryPolicy;
use crate::domain::digest::empty_state;
use crate::domain::provider::{ProviderKind, ProviderRef};
use crate::domain::pull_request::NormalizedPullRequest;
use crate::domain::schedule::EscalationConfig;
use crate::infrastructure::store::InMemoryStateStore;

fn schedule(id: &str, user_id: &str) -> Schedule {
    Schedule {
        id: id.to_string(),
        user_id: user_id.to_string(),
        name: String::new(),
        cron_utc: "0 9 * * 1-5".to_string(),
        timezone: "UTC".to_string(),
        git: ProviderRef::new(ProviderKind::GitHub, "default"),
        repositories: vec!["acme/api".to_string()],
        messaging: ProviderRef::new(ProviderKind::Slack, "default"),
        channel_id: "C-main".to_string(),
        escalation: None,
        filters: None,
        send_when_empty: false,
        active: true,
        last_checked_at: None,
        created_at: now() - ChronoDuration::days(30),
        updated_at: now() - ChronoDuration::days(30),
    }
}

fn pr(id: &str, approved: bool, changes: bool, reviewers: &[&str], age_days: i64) -> NormalizedPullRequest {
    NormalizedPullRequest {
        id: id.to_string(),
        number: 1,
        title: format!("PR-{id}"),
        author: "dev".to_string(),
        url: format!("https://github.test/acme/api/pull/{id}"),
        created_at: now() - ChronoDuration::days(age_days) - ChronoDuration::hours(1),
        repository: "acme/api".to_string(),
        labels: Vec::new(),
        reviewers: reviewers.iter().map(|r| r.to_string()).collect(),
        has_approvals: approved,
        has_changes_requested: changes,
        additions: None,
        deletions: None,
    }
}

struct Harness {
    schedules: FakeSchedules,
    tokens: FakeTokens,
    oauth: FakeOAuth,
    states: InMemoryStateStore,
    git: Arc<FakeGit>,
    slack: Arc<FakeMessenger>,
    reporter: FakeReporter,
    registry: ProviderRegistry,
    timeout: Duration,
}

impl Harness {
    fn new(schedules: Vec<Schedule>) -> Self {
        let tokens = FakeTokens::default();
        for user in ["u1", "u2"] {
            tokens.insert(token(user, ProviderKind::GitHub));
            tokens.insert(token(user, ProviderKind::Slack));
        }
        let git = Arc::new(FakeGit::new(ProviderKind::GitHub));
        let slack = Arc::new(FakeMessenger::new(ProviderKind::Slack));
        let registry = ProviderRegistry::new()
            .with_git(git.clone())
            .with_messaging(slack.clone());
        Self {
            schedules: FakeSchedules::with(schedules),
            tokens,
            oauth: FakeOAuth::default(),
            states: InMemoryStateStore::default(),
            git,
            slack,
            reporter: FakeReporter::default(),
            registry,
            timeout: Duration::from_secs(5),
        }
    }

    fn usecase(&self) -> DispatchUseCase<'_> {
        DispatchUseCase {
            schedules: &self.schedules,
            tokens: TokenManager {
                tokens: &self.tokens,
                oauth: &self.oauth,
                states: &self.states,
                retry: RetryPolicy::immediate(0),
            },
            registry: &self.registry,
            reporter: &self.reporter,
            settings: DispatchSettings {
                lookback: ChronoDuration::minutes(15),
                schedule_timeout: self.timeout,
                schedule_concurrency: 1,
            },
        }
    }

    async fn run(&self) -> BatchReport {
        self.usecase().execute(&options()).await.unwrap()
    }
}

fn options() -> RunOptions {
    RunOptions {
        now: now(),
        dry_run: false,
        force: false,
        schedule_id: None,
    }
}

#[tokio::test]
async fn due_schedule_delivers_categorized_digest() {
    let h = Harness::new(vec![schedule("s1", "u1")]);
    h.git.add_repo(
        "acme/api",
        vec![
            pr("A", true, false, &["rev"], 1),
            pr("B", false, true, &["rev"], 1),
            pr("C", false, false, &[], 10),
        ],
    );

    let batch = h.run().await;
    assert_eq!(batch.schedules[0].stage, Stage::Delivered);
    assert!(batch.schedules[0].primary_sent);

    let sent = h.slack.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].channel_id, "C-main");
    assert_eq!(sent[0].credential, "slack-token");
    let body = &sent[0].body;
    assert!(body.starts_with("**DAILY REMINDER FOR OPEN PULL REQUESTS**"));
    assert!(body.contains("✅1 ready 🔧1 changes ⏰1 stale"));
    let ready = body.find("Ready to Merge (1)").unwrap();
    let changes = body.find("Needs Changes (1)").unwrap();
    let stale = body.find("Stale (1)").unwrap();
    assert!(ready < changes && changes < stale);
    assert!(body[ready..changes].contains("PR-A"));
    assert!(body[changes..stale].contains("PR-B"));
    assert!(body[stale..].contains("PR-C"));
}

#[tokio::test]
async fn empty_result_with_send_when_empty_posts_only_the_empty_state() {
    let mut s = schedule("s1", "u1");
    s.send_when_empty = true;
    s.name = "Backend".to_string();
    let h = Harness::new(vec![s]);
    h.git.add_repo("acme/api", Vec::new());

    h.run().await;
    let sent = h.slack.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].body,
        empty_state(&TestStyle, "Backend", &["acme/api".to_string()])
    );
}

#[tokio::test]
async fn empty_result_without_send_when_empty_posts_nothing() {
    let h = Harness::new(vec![schedule("s1", "u1")]);
    h.git.add_repo("acme/api", Vec::new());

    let batch = h.run().await;
    assert_eq!(batch.schedules[0].stage, Stage::Delivered);
    assert!(!batch.schedules[0].primary_sent);
    assert!(h.slack.sent().is_empty());
}

#[tokio::test]
async fn filters_are_applied_before_formatting() {
    let mut s = schedule("s1", "u1");
    s.filters = Some(crate::domain::schedule::PrFilters {
        excluded_authors: vec!["dev".to_string()],
        ..Default::default()
    });
    let h = Harness::new(vec![s]);
    h.git.add_repo("acme/api", vec![pr("A", true, false, &[], 1)]);

    let batch = h.run().await;
    assert_eq!(batch.schedules[0].pull_requests, 0);
    assert!(h.slack.sent().is_empty());
}

#[tokio::test]
async fn old_pr_triggers_separate_escalation_message() {
    let mut s = schedule("s1", "u1");
    s.escalation = Some(EscalationConfig {
        messaging: ProviderRef::new(ProviderKind::Slack, "default"),
        channel_id: "C-escalate".to_string(),
        threshold_days: 3,
        mentions: vec!["U-lead".to_string()],
    });
    let h = Harness::new(vec![s]);
    h.git.add_repo(
        "acme/api",
        vec![pr("old", false, false, &["rev"], 5), pr("ready", true, false, &[], 9)],
    );

    let batch = h.run().await;
    assert_eq!(batch.schedules[0].stage, Stage::Escalated);
    assert_eq!(batch.schedules[0].escalated, 1);

    let sent = h.slack.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].channel_id, "C-main");
    assert_eq!(sent[1].channel_id, "C-escalate");
    assert!(sent[1].body.contains("<@U-lead>"));
    assert!(sent[1].body.contains("PR-old"));
    assert!(!sent[1].body.contains("PR-ready"));
}

#[tokio::test]
async fn escalation_failure_keeps_primary_delivery() {
    let mut s = schedule("s1", "u1");
    s.escalation = Some(EscalationConfig {
        messaging: ProviderRef::new(ProviderKind::Slack, "default"),
        channel_id: "C-escalate".to_string(),
        threshold_days: 3,
        mentions: Vec::new(),
    });
    let h = Harness::new(vec![s]);
    h.slack.fail_channel("C-escalate");
    h.git.add_repo("acme/api", vec![pr("old", false, false, &[], 5)]);

    let batch = h.run().await;
    let report = &batch.schedules[0];
    assert_eq!(report.stage, Stage::Delivered);
    assert!(report.primary_sent);
    assert!(report.escalation_error.is_some());
    assert_eq!(h.slack.sent().len(), 1);
}

#[tokio::test]
async fn primary_failure_still_attempts_escalation() {
    let mut s = schedule("s1", "u1");
    s.escalation = Some(EscalationConfig {
        messaging: ProviderRef::new(ProviderKind::Slack, "default"),
        channel_id: "C-escalate".to_string(),
        threshold_days: 3,
        mentions: Vec::new(),
    });
    let h = Harness::new(vec![s]);
    h.slack.fail_channel("C-main");
    h.git.add_repo("acme/api", vec![pr("old", false, false, &[], 5)]);

    let batch = h.run().await;
    let report = &batch.schedules[0];
    assert_eq!(report.stage, Stage::Failed);
    assert_eq!(report.failed_at, Some(Stage::Sending));
    assert_eq!(report.escalated, 1);
    assert_eq!(h.slack.sent()[0].channel_id, "C-escalate");
}

#[tokio::test]
async fn not_due_schedule_is_skipped_but_check_is_recorded() {
    let mut s = schedule("s1", "u1");
    s.cron_utc = "0 18 * * *".to_string();
    let h = Harness::new(vec![s]);

    let batch = h.run().await;
    assert_eq!(batch.schedules[0].stage, Stage::Skipped);
    assert_eq!(h.schedules.last_checked("s1"), Some(now()));
    assert!(h.git.seen_tokens.lock().unwrap().is_empty());
}

#[tokio::test]
async fn force_bypasses_due_check() {
    let mut s = schedule("s1", "u1");
    s.cron_utc = "0 18 * * *".to_string();
    s.send_when_empty = true;
    let h = Harness::new(vec![s]);

    let batch = h
        .usecase()
        .execute(&RunOptions {
            force: true,
            ..options()
        })
        .await
        .unwrap();
    assert_eq!(batch.schedules[0].stage, Stage::Delivered);
    assert_eq!(h.slack.sent().len(), 1);
}

#[tokio::test]
async fn one_failing_schedule_does_not_stop_the_batch() {
    let mut broken = schedule("broken", "u3");
    broken.send_when_empty = true;
    let mut healthy = schedule("healthy", "u2");
    healthy.send_when_empty = true;
    let h = Harness::new(vec![broken, healthy]);

    let batch = h.run().await;
    assert_eq!(batch.schedules.len(), 2);
    assert_eq!(batch.schedules[0].stage, Stage::Failed);
    assert_eq!(batch.schedules[0].failed_at, Some(Stage::Fetching));
    assert!(batch.schedules[0].error.as_deref().unwrap().contains("no token stored"));
    assert_eq!(batch.schedules[1].stage, Stage::Delivered);
    assert_eq!(batch.failed(), 1);
    assert_eq!(batch.delivered(), 1);
}

#[tokio::test]
async fn rejected_git_token_is_refreshed_once_and_retried() {
    let mut s = schedule("s1", "u1");
    s.send_when_empty = true;
    let h = Harness::new(vec![s]);
    h.git
        .rejected_tokens
        .lock()
        .unwrap()
        .insert("github-token".to_string());

    let batch = h.run().await;
    assert_eq!(batch.schedules[0].stage, Stage::Delivered);
    assert_eq!(h.oauth.refresh_calls(), 1);
    assert_eq!(
        *h.git.seen_tokens.lock().unwrap(),
        vec!["github-token".to_string(), "refreshed-1".to_string()]
    );
}

#[tokio::test]
async fn provider_server_error_fails_only_that_schedule() {
    let h = Harness::new(vec![schedule("s1", "u1")]);
    *h.git.fail_with.lock().unwrap() = Some(503);

    let batch = h.run().await;
    assert_eq!(batch.schedules[0].failed_at, Some(Stage::Fetching));
    assert!(h.slack.sent().is_empty());
}

#[tokio::test]
async fn schedule_list_failure_fails_the_batch() {
    let mut h = Harness::new(Vec::new());
    h.schedules.fail_listing = true;
    assert!(h.usecase().execute(&options()).await.is_err());
}

#[tokio::test]
async fn dry_run_prints_without_sending_or_recording() {
    let mut s = schedule("s1", "u1");
    s.send_when_empty = true;
    let h = Harness::new(vec![s]);

    h.usecase()
        .execute(&RunOptions {
            dry_run: true,
            ..options()
        })
        .await
        .unwrap();
    assert!(h.slack.sent().is_empty());
    assert_eq!(h.schedules.last_checked("s1"), None);
    let lines = h.reporter.lines.lock().unwrap();
    assert!(lines.iter().any(|l| l.contains("All clear")));
}

#[tokio::test]
async fn schedule_filter_limits_batch_to_one_schedule() {
    let h = Harness::new(vec![schedule("s1", "u1"), schedule("s2", "u2")]);
    let batch = h
        .usecase()
        .execute(&RunOptions {
            schedule_id: Some("s2".to_string()),
            ..options()
        })
        .await
        .unwrap();
    assert_eq!(batch.schedules.len(), 1);
    assert_eq!(batch.schedules[0].schedule_id, "s2");
}

struct HangingGit;

#[async_trait]
impl GitProvider for HangingGit {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GitHub
    }

    async fn get_repositories(&self, _token: &str) -> anyhow::Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn get_pull_requests(
        &self,
        _token: &str,
        _repositories: &[String],
    ) -> anyhow::Result<Vec<NormalizedPullRequest>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn hung_schedule_times_out_at_stage_reached() {
    let mut h = Harness::new(vec![schedule("s1", "u1")]);
    h.registry = ProviderRegistry::new()
        .with_git(Arc::new(HangingGit))
        .with_messaging(h.slack.clone());
    h.timeout = Duration::from_millis(50);

    let batch = h.run().await;
    let report = &batch.schedules[0];
    assert_eq!(report.failed_at, Some(Stage::Fetching));
    assert!(report.error.as_deref().unwrap().contains("timed out"));
}

#[test]
fn escalation_candidates_skip_ready_and_young_prs() {
    let prs = vec![
        pr("young", false, false, &[], 2),
        pr("edge", false, true, &[], 3),
        pr("ready", true, false, &[], 10),
    ];
    let ids: Vec<&str> = escalation_candidates(&prs, 3, now())
        .into_iter()
        .map(|p| p.id.as_str())
        .collect();
    assert_eq!(ids, vec!["edge"]);
}
