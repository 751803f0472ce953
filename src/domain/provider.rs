//! 외부 제공자(git/메신저) 식별 값 객체.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 제공자가 파이프라인에서 맡는 역할.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderRole {
    Git,
    Messaging,
}

/// 지원하는 제공자 종류. 문자열 비교 대신 이 enum으로 분기한다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    GitHub,
    GitLab,
    Bitbucket,
    Slack,
    Discord,
    Teams,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 6] = [
        ProviderKind::GitHub,
        ProviderKind::GitLab,
        ProviderKind::Bitbucket,
        ProviderKind::Slack,
        ProviderKind::Discord,
        ProviderKind::Teams,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::GitLab => "gitlab",
            Self::Bitbucket => "bitbucket",
            Self::Slack => "slack",
            Self::Discord => "discord",
            Self::Teams => "teams",
        }
    }

    pub fn role(self) -> ProviderRole {
        match self {
            Self::GitHub | Self::GitLab | Self::Bitbucket => ProviderRole::Git,
            Self::Slack | Self::Discord | Self::Teams => ProviderRole::Messaging,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "github" => Ok(Self::GitHub),
            "gitlab" => Ok(Self::GitLab),
            "bitbucket" => Ok(Self::Bitbucket),
            "slack" => Ok(Self::Slack),
            "discord" => Ok(Self::Discord),
            "teams" | "msteams" => Ok(Self::Teams),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// 특정 사용자에 연결된 제공자 인스턴스 참조(종류 + 인스턴스 id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderRef {
    pub kind: ProviderKind,
    #[serde(default = "default_provider_id")]
    pub id: String,
}

impl ProviderRef {
    pub fn new(kind: ProviderKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for ProviderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

pub fn default_provider_id() -> String {
    "default".to_string()
}
