//! 다이제스트 메시지 조립.
//!
//! 분류/잘라내기 알고리즘은 하나이고, 제공자별 차이(마크다운 방언, 링크/멘션
//! 표기, 길이 한도)는 `MessageStyle` 구현이 맡는다.

use chrono::{DateTime, Utc};

use crate::domain::category::categorize;
use crate::domain::pull_request::NormalizedPullRequest;

pub const MAX_LINES_PER_CATEGORY: usize = 15;
pub const MAX_TITLE_CHARS: usize = 60;
pub const MAX_LABELS_PER_LINE: usize = 3;

/// 제공자별 표기 규칙.
pub trait MessageStyle: Send + Sync {
    /// 본문 글자 수가 이 값을 넘으면 더 이상 카테고리를 붙이지 않는다.
    fn soft_cap(&self) -> usize;

    /// 플랫폼이 받아주는 본문 최대 글자 수. 잘림 안내까지 포함해 이 값을 넘지 않는다.
    fn hard_limit(&self) -> usize {
        usize::MAX
    }

    fn escape(&self, text: &str) -> String {
        text.to_string()
    }

    fn bold(&self, text: &str) -> String;

    fn link(&self, text: &str, url: &str) -> String;

    fn mention(&self, handle: &str) -> String;

    fn newline(&self) -> &'static str {
        "\n"
    }

    fn bullet(&self, line: &str) -> String {
        format!("• {line}")
    }

    /// PR 한 줄. 기본 구현은 대부분의 방언에 그대로 맞는다.
    fn pr_line(&self, pr: &NormalizedPullRequest, now: DateTime<Utc>) -> String {
        let mut line = self.link(&self.escape(&truncate_title(&pr.title)), &pr.url);
        if !pr.labels.is_empty() {
            let labels = pr
                .labels
                .iter()
                .take(MAX_LABELS_PER_LINE)
                .map(|l| self.escape(l))
                .collect::<Vec<_>>()
                .join(", ");
            line.push_str(&format!(" [{labels}]"));
        }
        if let (Some(adds), Some(dels)) = (pr.additions, pr.deletions) {
            line.push_str(&format!(" (+{adds}/-{dels})"));
        }
        line.push_str(&format!(
            " by {} · {}",
            self.escape(&pr.author),
            relative_age(pr.age_in_days(now))
        ));
        self.bullet(&line)
    }
}

/// 렌더링 결과와 잘라낸 양.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    pub body: String,
    /// 본문에 실제로 나열된 PR 수
    pub listed: usize,
    /// 글자 수 한도 때문에 빠진 PR 수(카테고리 통째 또는 중간부터)
    pub not_shown: usize,
}

/// 60자를 넘는 제목은 57자 + "..."로 줄인다.
pub fn truncate_title(title: &str) -> String {
    if title.chars().count() <= MAX_TITLE_CHARS {
        return title.to_string();
    }
    let mut out: String = title.chars().take(MAX_TITLE_CHARS - 3).collect();
    out.push_str("...");
    out
}

pub fn relative_age(days: i64) -> String {
    match days {
        d if d <= 0 => "today".to_string(),
        d => format!("{d}d"),
    }
}

/// `✅1 ready 🔧1 changes ⏰1 stale` 형태. 빈 카테고리는 생략한다.
pub fn summary_line(prs: &[NormalizedPullRequest], now: DateTime<Utc>) -> String {
    categorize(prs, now)
        .non_empty()
        .map(|(category, bucket)| {
            format!("{}{} {}", category.emoji(), bucket.len(), category.short_label())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// PR이 하나도 없을 때의 메시지: 헤더 + All clear.
pub fn empty_state(style: &dyn MessageStyle, title: &str, repositories: &[String]) -> String {
    let nl = style.newline();
    let scope = match repositories {
        [single] => format!(" in {}", style.escape(single)),
        _ => String::new(),
    };
    format!(
        "{}{nl}🎉 All clear! No open pull requests{scope}.",
        style.bold(&style.escape(title))
    )
}

pub fn format_digest(
    style: &dyn MessageStyle,
    title: &str,
    repositories: &[String],
    prs: &[NormalizedPullRequest],
    now: DateTime<Utc>,
) -> Digest {
    if prs.is_empty() {
        return Digest {
            body: empty_state(style, title, repositories),
            listed: 0,
            not_shown: 0,
        };
    }

    let nl = style.newline();
    let categorized = categorize(prs, now);
    let mut body = Body::new(format!(
        "{}{nl}{}",
        style.bold(&style.escape(title)),
        summary_line(prs, now)
    ));
    // 잘림 안내가 들어갈 자리는 미리 비워 둔다
    let notice_room = chars(&format!("{nl}{nl}{}", not_shown_notice(prs.len())));
    let budget = style.hard_limit().saturating_sub(notice_room);
    let mut listed = 0;
    let mut not_shown = 0;
    let mut truncated = false;

    for (category, bucket) in categorized.non_empty() {
        if truncated || body.chars > style.soft_cap() {
            truncated = true;
            not_shown += bucket.len();
            continue;
        }
        let header = style.bold(&format!(
            "{} {} ({})",
            category.emoji(),
            category.title(),
            bucket.len()
        ));
        if !body.try_push(&format!("{nl}{nl}{header}"), budget) {
            truncated = true;
            not_shown += bucket.len();
            continue;
        }

        let mut emitted = 0;
        for pr in bucket.iter().take(MAX_LINES_PER_CATEGORY) {
            if !body.try_push(&format!("{nl}{}", style.pr_line(pr, now)), budget) {
                truncated = true;
                break;
            }
            emitted += 1;
        }
        listed += emitted;
        if truncated {
            not_shown += bucket.len() - emitted;
            continue;
        }

        if bucket.len() > MAX_LINES_PER_CATEGORY {
            let rest = bucket.len() - MAX_LINES_PER_CATEGORY;
            let note = format!("{nl}... and {rest} more in {}", category.title());
            if !body.try_push(&note, budget) {
                truncated = true;
                not_shown += rest;
            }
        }
    }

    let mut body = body.text;
    if not_shown > 0 {
        body.push_str(nl);
        body.push_str(nl);
        body.push_str(&not_shown_notice(not_shown));
    }

    Digest {
        body,
        listed,
        not_shown,
    }
}

fn not_shown_notice(count: usize) -> String {
    format!("⚠️ {count} more PRs not shown")
}

fn chars(text: &str) -> usize {
    text.chars().count()
}

/// 글자 수를 따로 세어 두는 본문 버퍼.
struct Body {
    text: String,
    chars: usize,
}

impl Body {
    fn new(text: String) -> Self {
        Self {
            chars: chars(&text),
            text,
        }
    }

    /// 한도 안에 들어갈 때만 붙인다.
    fn try_push(&mut self, piece: &str, limit: usize) -> bool {
        let len = chars(piece);
        if self.chars + len > limit {
            return false;
        }
        self.text.push_str(piece);
        self.chars += len;
        true
    }
}

/// 에스컬레이션 메시지. 기준 일수 이상 기다린 PR과 호출 대상을 담는다.
pub fn format_escalation(
    style: &dyn MessageStyle,
    title: &str,
    threshold_days: u32,
    prs: &[&NormalizedPullRequest],
    mentions: &[String],
    now: DateTime<Utc>,
) -> String {
    let nl = style.newline();
    let mut lines = vec![
        style.bold(&format!(
            "🚨 {} PR{} waiting {}+ days",
            prs.len(),
            if prs.len() == 1 { "" } else { "s" },
            threshold_days
        )),
        style.escape(title),
    ];
    if !mentions.is_empty() {
        let tagged = mentions
            .iter()
            .map(|m| style.mention(m))
            .collect::<Vec<_>>()
            .join(" ");
        lines.push(format!("cc {tagged}"));
    }
    lines.push(String::new());
    lines.extend(
        prs.iter()
            .take(MAX_LINES_PER_CATEGORY)
            .map(|pr| style.pr_line(pr, now)),
    );
    if prs.len() > MAX_LINES_PER_CATEGORY {
        lines.push(format!(
            "... and {} more waiting",
            prs.len() - MAX_LINES_PER_CATEGORY
        ));
    }
    lines.join(nl)
}
