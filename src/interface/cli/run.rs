//! 파싱된 CLI 동작을 유스케이스 호출과 콘솔 출력으로 연결한다.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use crate::application::usecases::dispatch::{BatchReport, Stage};
use crate::domain::cron::{convert_cron_from_utc, convert_cron_to_utc, supported_timezones};
use crate::domain::schedule::{Schedule, ScheduleDraft};
use crate::interface::cli::{AppComposition, CliAction};

/// 조립이 필요 없는 명령은 설정을 읽지 않고 바로 처리한다.
pub async fn execute(action: CliAction) -> Result<()> {
    match action {
        CliAction::CronToUtc { .. } | CliAction::CronFromUtc { .. } | CliAction::ListTimezones => {
            cron_command(action)
        }
        action => {
            let composition = AppComposition::load()?;
            execute_with(&composition, action).await
        }
    }
}

fn cron_command(action: CliAction) -> Result<()> {
    match action {
        CliAction::CronToUtc { cron, timezone } => {
            println!("{}", convert_cron_to_utc(&cron, &timezone)?);
        }
        CliAction::CronFromUtc { cron, timezone } => {
            println!("{}", convert_cron_from_utc(&cron, &timezone)?);
        }
        _ => {
            for zone in supported_timezones() {
                println!("{:<24} {:+}", zone.id, zone.offset_minutes);
            }
        }
    }
    Ok(())
}

async fn execute_with(composition: &AppComposition, action: CliAction) -> Result<()> {
    let reporter = composition.reporter();
    let now = Utc::now();
    match action {
        CliAction::Dispatch { options, json } => {
            let batch = composition.dispatch_usecase().execute(&options).await?;
            if json {
                println!("{}", to_pretty_json(&batch)?);
            } else {
                report_batch(composition, &batch);
            }
            Ok(())
        }
        CliAction::InspectConfig => {
            println!("{}", composition.inspect_config_usecase().execute()?);
            Ok(())
        }
        CliAction::ListSchedules { user } => {
            let user_id = composition.user_id(user);
            let schedules = composition.schedules_usecase().list(&user_id).await?;
            if schedules.is_empty() {
                reporter.status("schedules", &format!("no schedules for {user_id}"));
            }
            for schedule in &schedules {
                let state = if schedule.active { "active" } else { "paused" };
                reporter.status(
                    state,
                    &format!(
                        "{}  {}  '{}' ({})  {} -> {}:{}",
                        schedule.id,
                        schedule.digest_title(),
                        schedule.display_cron(),
                        schedule.timezone,
                        schedule.git,
                        schedule.messaging,
                        schedule.channel_id
                    ),
                );
            }
            Ok(())
        }
        CliAction::ShowSchedule { user, id } => {
            let user_id = composition.user_id(user);
            let schedule = composition.schedules_usecase().get(&user_id, &id).await?;
            println!("{}", schedule_json(&schedule)?);
            Ok(())
        }
        CliAction::AddSchedule { user, file } => {
            let user_id = composition.user_id(user);
            let draft = read_draft(&file)?;
            let schedule = composition
                .schedules_usecase()
                .create(&user_id, &draft, now)
                .await?;
            reporter.status("ok", &format!("schedule created: {}", schedule.id));
            println!("{}", schedule_json(&schedule)?);
            Ok(())
        }
        CliAction::UpdateSchedule { user, id, file } => {
            let user_id = composition.user_id(user);
            let draft = read_draft(&file)?;
            let schedule = composition
                .schedules_usecase()
                .update(&user_id, &id, &draft, now)
                .await?;
            reporter.status("ok", &format!("schedule updated: {}", schedule.id));
            Ok(())
        }
        CliAction::ToggleSchedule { user, id } => {
            let user_id = composition.user_id(user);
            let schedule = composition
                .schedules_usecase()
                .toggle(&user_id, &id, now)
                .await?;
            let state = if schedule.active { "resumed" } else { "paused" };
            reporter.status("ok", &format!("schedule {state}: {id}"));
            Ok(())
        }
        CliAction::RemoveSchedule { user, id } => {
            let user_id = composition.user_id(user);
            composition.schedules_usecase().delete(&user_id, &id).await?;
            reporter.status("ok", &format!("schedule removed: {id}"));
            Ok(())
        }
        CliAction::AuthStart {
            user,
            provider,
            redirect_uri,
        } => {
            let user_id = composition.user_id(user);
            let redirect_uri = redirect_uri.unwrap_or_else(|| composition.config().redirect_uri());
            let start = composition.token_manager().begin_authorization(
                &user_id,
                &provider,
                &redirect_uri,
                now,
            )?;
            reporter.section(&format!("Connect {provider}"));
            reporter.kv("Open", &start.url);
            reporter.kv("State", &start.state);
            reporter.raw("");
            reporter.raw("Then run: prdigest auth finish --url '<redirect url>'");
            Ok(())
        }
        CliAction::AuthFinish { state, code } => {
            let record = composition
                .token_manager()
                .complete_authorization(&state, &code, now)
                .await?;
            reporter.status(
                "ok",
                &format!("{} connected for {}", record.provider, record.user_id),
            );
            Ok(())
        }
        CliAction::ListRepositories { user, provider } => {
            let user_id = composition.user_id(user);
            let repos = composition
                .catalog_usecase()
                .repositories(&user_id, &provider, now)
                .await?;
            for repo in repos {
                reporter.raw(&repo);
            }
            Ok(())
        }
        CliAction::ListChannels { user, provider } => {
            let user_id = composition.user_id(user);
            let channels = composition
                .catalog_usecase()
                .channels(&user_id, &provider, now)
                .await?;
            for channel in channels {
                reporter.raw(&format!("{:<32} {}", channel.id, channel.name));
            }
            Ok(())
        }
        CliAction::CronToUtc { .. } | CliAction::CronFromUtc { .. } | CliAction::ListTimezones => {
            cron_command(action)
        }
    }
}

fn read_draft(path: &Path) -> Result<ScheduleDraft> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read draft: {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid draft json: {}", path.display()))
}

/// 저장된 UTC 크론과 함께 현지 시간 크론도 보여준다.
fn schedule_json(schedule: &Schedule) -> Result<String> {
    let mut value = serde_json::to_value(schedule).context("failed to serialize schedule")?;
    if let Some(object) = value.as_object_mut() {
        object.insert("cron_local".to_string(), json!(schedule.display_cron()));
    }
    to_pretty_json(&value)
}

fn to_pretty_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("failed to serialize output")
}

fn report_batch(composition: &AppComposition, batch: &BatchReport) {
    let reporter = composition.reporter();
    reporter.section("Dispatch");
    for report in &batch.schedules {
        let detail = match (report.stage, &report.error) {
            (Stage::Failed, Some(error)) => {
                let at = report.failed_at.map(|s| s.to_string()).unwrap_or_default();
                format!("{} at {at}: {error}", report.schedule_id)
            }
            (Stage::Skipped, _) => format!("{} not due", report.schedule_id),
            _ => {
                let mut line = format!("{} ({} PRs)", report.schedule_id, report.pull_requests);
                if report.escalated > 0 {
                    line.push_str(&format!(", {} escalated", report.escalated));
                }
                if let Some(error) = &report.escalation_error {
                    line.push_str(&format!(", escalation failed: {error}"));
                }
                line
            }
        };
        reporter.status(&report.stage.to_string(), &detail);
    }
    reporter.kv("delivered", &batch.delivered().to_string());
    reporter.kv("skipped", &batch.skipped().to_string());
    reporter.kv("failed", &batch.failed().to_string());
}
