//! 메신저별 메시지 표기 규칙(`MessageStyle`) 구현.

use crate::domain::digest::MessageStyle;

pub const SLACK_SOFT_CAP: usize = 3500;
/// Slack section text 한도.
pub const SLACK_HARD_LIMIT: usize = 4000;
pub const DISCORD_SOFT_CAP: usize = 1500;
/// Discord 메시지 content 최대 길이.
pub const DISCORD_HARD_LIMIT: usize = 2000;
pub const TEAMS_SOFT_CAP: usize = 20_000;
/// Graph 채널 메시지 본문 한도(약 28KB).
pub const TEAMS_HARD_LIMIT: usize = 28_000;

/// Slack mrkdwn.
pub struct SlackStyle;

impl MessageStyle for SlackStyle {
    fn soft_cap(&self) -> usize {
        SLACK_SOFT_CAP
    }

    fn hard_limit(&self) -> usize {
        SLACK_HARD_LIMIT
    }

    fn escape(&self, text: &str) -> String {
        text.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
    }

    fn bold(&self, text: &str) -> String {
        format!("*{text}*")
    }

    fn link(&self, text: &str, url: &str) -> String {
        format!("<{url}|{}>", text.replace('|', "¦"))
    }

    /// 사용자 id(U…)는 `<@id>`, 그룹/특수 멘션은 `<!name>` 표기를 쓴다.
    fn mention(&self, handle: &str) -> String {
        let handle = handle.trim_start_matches('@');
        match handle {
            "here" | "channel" | "everyone" => format!("<!{handle}>"),
            h if h.starts_with("subteam^") => format!("<!{h}>"),
            h => format!("<@{h}>"),
        }
    }
}

/// Discord markdown. 링크 미리보기를 막기 위해 URL을 `<>`로 감싼다.
pub struct DiscordStyle;

impl MessageStyle for DiscordStyle {
    fn soft_cap(&self) -> usize {
        DISCORD_SOFT_CAP
    }

    fn hard_limit(&self) -> usize {
        DISCORD_HARD_LIMIT
    }

    fn escape(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for ch in text.chars() {
            if matches!(ch, '*' | '_' | '~' | '`' | '|' | '[' | ']') {
                out.push('\\');
            }
            out.push(ch);
        }
        out
    }

    fn bold(&self, text: &str) -> String {
        format!("**{text}**")
    }

    fn link(&self, text: &str, url: &str) -> String {
        format!("[{text}](<{url}>)")
    }

    fn mention(&self, handle: &str) -> String {
        let handle = handle.trim_start_matches('@');
        match handle {
            "here" | "everyone" => format!("@{handle}"),
            // 역할 멘션은 `&` 접두사까지 그대로 둔다
            h => format!("<@{h}>"),
        }
    }
}

/// Teams 채널 메시지(HTML 본문).
pub struct TeamsStyle;

impl MessageStyle for TeamsStyle {
    fn soft_cap(&self) -> usize {
        TEAMS_SOFT_CAP
    }

    fn hard_limit(&self) -> usize {
        TEAMS_HARD_LIMIT
    }

    fn escape(&self, text: &str) -> String {
        html_escape(text)
    }

    fn bold(&self, text: &str) -> String {
        format!("<b>{text}</b>")
    }

    fn link(&self, text: &str, url: &str) -> String {
        format!("<a href=\"{}\">{text}</a>", html_escape(url))
    }

    fn mention(&self, handle: &str) -> String {
        format!("<at>{}</at>", html_escape(handle.trim_start_matches('@')))
    }

    fn newline(&self) -> &'static str {
        "<br>\n"
    }
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// 글자 수 기준으로 자르고 잘렸으면 말줄임표를 붙인다.
pub fn clamp_chars(body: &str, limit: usize) -> String {
    if body.chars().count() <= limit {
        return body.to_string();
    }
    let mut out: String = body.chars().take(limit.saturating_sub(1)).collect();
    out.push('…');
    out
}
