//! CLI 명령 파싱 모듈.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};

use crate::application::usecases::dispatch::RunOptions;
use crate::domain::provider::{ProviderKind, ProviderRef, default_provider_id};

#[derive(Debug, Parser)]
#[command(name = "prdigest")]
#[command(about = "Scheduled pull request digests for Slack, Discord and Teams")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Owning user id (defaults to `defaults.user_id` in config)
    #[arg(long, global = true)]
    user: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run every due schedule once
    Dispatch {
        /// Print formatted messages instead of sending them
        #[arg(long)]
        dry_run: bool,

        /// Ignore the cron due check
        #[arg(long)]
        force: bool,

        /// Only run this schedule id
        #[arg(long)]
        schedule: Option<String>,

        /// Evaluate as of this RFC 3339 instant instead of the current time
        #[arg(long)]
        now: Option<DateTime<Utc>>,

        /// Print the batch report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show effective merged config and provider credential resolution
    Config,
    /// Manage digest schedules
    Schedules {
        #[command(subcommand)]
        command: ScheduleCommand,
    },
    /// Connect git and messaging providers via OAuth
    Auth {
        #[command(subcommand)]
        command: AuthCommand,
    },
    /// List repositories or channels available to a connected provider
    Catalog {
        #[command(subcommand)]
        command: CatalogCommand,
    },
    /// Convert cron expressions between local time and UTC
    Cron {
        #[command(subcommand)]
        command: CronCommand,
    },
}

#[derive(Debug, Subcommand)]
enum ScheduleCommand {
    /// List schedules
    List,
    /// Show one schedule
    Show { id: String },
    /// Create a schedule from a JSON draft file
    Add {
        #[arg(long)]
        file: PathBuf,
    },
    /// Replace a schedule with a JSON draft file
    Update {
        id: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// Pause or resume a schedule
    Toggle { id: String },
    /// Delete a schedule
    Remove { id: String },
}

#[derive(Debug, Args)]
struct ProviderArgs {
    /// github, gitlab, bitbucket, slack, discord, teams
    provider: ProviderKind,

    /// Connection id when one user links several accounts of the same provider
    #[arg(long, default_value_t = default_provider_id())]
    id: String,
}

impl ProviderArgs {
    fn into_ref(self) -> ProviderRef {
        ProviderRef::new(self.provider, self.id)
    }
}

#[derive(Debug, Subcommand)]
enum AuthCommand {
    /// Print the authorization URL for a provider
    Start {
        #[command(flatten)]
        provider: ProviderArgs,

        /// Override `defaults.redirect_uri`
        #[arg(long)]
        redirect_uri: Option<String>,
    },
    /// Exchange the code from the redirect for a token
    Finish {
        /// Full redirect URL (contains both `state` and `code`)
        #[arg(long, conflicts_with_all = ["state", "code"])]
        url: Option<String>,

        #[arg(long, requires = "code")]
        state: Option<String>,

        #[arg(long, requires = "state")]
        code: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
enum CatalogCommand {
    /// Repositories visible to a git provider connection
    Repos(ProviderArgs),
    /// Channels visible to a messaging provider connection
    Channels(ProviderArgs),
}

#[derive(Debug, Subcommand)]
enum CronCommand {
    /// Shift a local-time cron expression to UTC
    ToUtc {
        cron: String,
        #[arg(long, short = 'z')]
        timezone: String,
    },
    /// Shift a UTC cron expression to local time
    FromUtc {
        cron: String,
        #[arg(long, short = 'z')]
        timezone: String,
    },
    /// List supported timezone ids and offsets
    Zones,
}

pub enum CliAction {
    Dispatch { options: RunOptions, json: bool },
    InspectConfig,
    ListSchedules { user: Option<String> },
    ShowSchedule { user: Option<String>, id: String },
    AddSchedule { user: Option<String>, file: PathBuf },
    UpdateSchedule { user: Option<String>, id: String, file: PathBuf },
    ToggleSchedule { user: Option<String>, id: String },
    RemoveSchedule { user: Option<String>, id: String },
    AuthStart { user: Option<String>, provider: ProviderRef, redirect_uri: Option<String> },
    AuthFinish { state: String, code: String },
    ListRepositories { user: Option<String>, provider: ProviderRef },
    ListChannels { user: Option<String>, provider: ProviderRef },
    CronToUtc { cron: String, timezone: String },
    CronFromUtc { cron: String, timezone: String },
    ListTimezones,
}

impl Cli {
    pub fn parse_action() -> Result<CliAction, String> {
        Cli::parse().into_action(Utc::now())
    }

    fn into_action(self, now: DateTime<Utc>) -> Result<CliAction, String> {
        let user = self.user;
        let action = match self.command {
            Commands::Dispatch {
                dry_run,
                force,
                schedule,
                now: at,
                json,
            } => CliAction::Dispatch {
                options: RunOptions {
                    now: at.unwrap_or(now),
                    dry_run,
                    force,
                    schedule_id: schedule,
                },
                json,
            },
            Commands::Config => CliAction::InspectConfig,
            Commands::Schedules { command } => match command {
                ScheduleCommand::List => CliAction::ListSchedules { user },
                ScheduleCommand::Show { id } => CliAction::ShowSchedule { user, id },
                ScheduleCommand::Add { file } => CliAction::AddSchedule { user, file },
                ScheduleCommand::Update { id, file } => {
                    CliAction::UpdateSchedule { user, id, file }
                }
                ScheduleCommand::Toggle { id } => CliAction::ToggleSchedule { user, id },
                ScheduleCommand::Remove { id } => CliAction::RemoveSchedule { user, id },
            },
            Commands::Auth { command } => command.into_action(user)?,
            Commands::Catalog { command } => match command {
                CatalogCommand::Repos(provider) => CliAction::ListRepositories {
                    user,
                    provider: provider.into_ref(),
                },
                CatalogCommand::Channels(provider) => CliAction::ListChannels {
                    user,
                    provider: provider.into_ref(),
                },
            },
            Commands::Cron { command } => match command {
                CronCommand::ToUtc { cron, timezone } => CliAction::CronToUtc { cron, timezone },
                CronCommand::FromUtc { cron, timezone } => {
                    CliAction::CronFromUtc { cron, timezone }
                }
                CronCommand::Zones => CliAction::ListTimezones,
            },
        };
        Ok(action)
    }
}

impl AuthCommand {
    fn into_action(self, user: Option<String>) -> Result<CliAction, String> {
        match self {
            Self::Start {
                provider,
                redirect_uri,
            } => Ok(CliAction::AuthStart {
                user,
                provider: provider.into_ref(),
                redirect_uri,
            }),
            Self::Finish { url, state, code } => {
                let (state, code) = match (url, state, code) {
                    (Some(url), _, _) => parse_callback_url(&url)?,
                    (None, Some(state), Some(code)) => (state, code),
                    _ => return Err("auth finish needs --url or both --state and --code".into()),
                };
                Ok(CliAction::AuthFinish { state, code })
            }
        }
    }
}

/// 리다이렉트 URL 쿼리에서 `state`/`code`를 꺼낸다. 제공자가 `error`를 돌려줬으면 그대로 알린다.
fn parse_callback_url(raw: &str) -> Result<(String, String), String> {
    let url = url::Url::parse(raw).map_err(|e| format!("invalid redirect url: {e}"))?;
    let mut state = None;
    let mut code = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "state" => state = Some(value.into_owned()),
            "code" => code = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }
    if let Some(error) = error {
        return Err(format!("provider denied authorization: {error}"));
    }
    match (state, code) {
        (Some(state), Some(code)) => Ok((state, code)),
        _ => Err("redirect url is missing state or code".into()),
    }
}
