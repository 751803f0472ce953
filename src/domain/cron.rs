//! 5필드 크론 표현식(분 시 일 월 요일) 해석과 시간대 변환.
//!
//! 실행 경로는 항상 UTC 크론만 평가한다. 시간대는 편집 경계에서만 다루며,
//! 고정 오프셋 표(UTC±N, UTC+5:30)로 분/시 필드만 이동시킨다.
//! DST는 반영하지 않고, 자정을 넘는 이동에도 일/월/요일 필드는 그대로 둔다.

use chrono::{DateTime, Datelike, Duration, DurationRound, Timelike, Utc};

use crate::domain::error::ValidationErrors;

/// 한 번의 due 판정에서 거슬러 올라가 검사하는 최대 구간.
const MAX_SCAN_MINUTES: i64 = 7 * 24 * 60;

const FIELD_NAMES: [&str; 5] = ["minute", "hour", "day_of_month", "month", "day_of_week"];
const FIELD_BOUNDS: [(u32, u32); 5] = [(0, 59), (0, 23), (1, 31), (1, 12), (0, 7)];

/// 검증을 마친 크론 표현식.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    source: String,
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronExpr {
    /// 문자열을 해석한다. 실패 시 `cron.<field>` 단위 오류를 돌려준다.
    pub fn parse(expression: &str) -> Result<Self, ValidationErrors> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(ValidationErrors::single(
                "cron",
                format!(
                    "expected 5 space-separated fields (minute hour day-of-month month day-of-week), got {}",
                    fields.len()
                ),
            ));
        }

        let mut errors = ValidationErrors::new();
        let mut sets = [0u64; 5];
        for (idx, raw) in fields.iter().enumerate() {
            let (min, max) = FIELD_BOUNDS[idx];
            match parse_field(raw, min, max) {
                Ok(bits) => sets[idx] = bits,
                Err(message) => errors.push(&format!("cron.{}", FIELD_NAMES[idx]), message),
            }
        }
        errors.into_result()?;

        // 요일 7은 일요일(0)과 같다.
        let mut days_of_week = sets[4];
        if days_of_week & (1 << 7) != 0 {
            days_of_week = (days_of_week & !(1 << 7)) | 1;
        }

        Ok(Self {
            source: fields.join(" "),
            minutes: sets[0],
            hours: sets[1],
            days_of_month: sets[2],
            months: sets[3],
            days_of_week,
            dom_restricted: !fields[2].starts_with('*'),
            dow_restricted: !fields[4].starts_with('*'),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// 주어진 UTC 시각(분 단위)이 표현식과 일치하는지.
    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        if !has(self.minutes, at.minute())
            || !has(self.hours, at.hour())
            || !has(self.months, at.month())
        {
            return false;
        }

        let dom = has(self.days_of_month, at.day());
        let dow = has(self.days_of_week, at.weekday().num_days_from_sunday());
        // 일/요일이 모두 제한되면 둘 중 하나만 맞아도 실행한다(고전 cron 규칙).
        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }

    /// `(since, now]` 구간에 일치하는 분이 하나라도 있으면 due.
    pub fn is_due(&self, since: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let end = floor_minute(now);
        let mut cursor = floor_minute(since) + Duration::minutes(1);
        if end - cursor > Duration::minutes(MAX_SCAN_MINUTES) {
            cursor = end - Duration::minutes(MAX_SCAN_MINUTES);
        }

        while cursor <= end {
            if self.matches(cursor) {
                return true;
            }
            cursor += Duration::minutes(1);
        }
        false
    }
}

/// 편집 경계 검증용 단축 함수.
pub fn validate_cron(expression: &str) -> Result<(), ValidationErrors> {
    CronExpr::parse(expression).map(|_| ())
}

/// 저장된 UTC 크론이 지금 실행되어야 하는지 판단한다.
/// `last_checked_at`이 없으면 `now - lookback` 이후만 본다.
pub fn is_due(
    cron_utc: &str,
    last_checked_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    lookback: Duration,
) -> Result<bool, ValidationErrors> {
    let expr = CronExpr::parse(cron_utc)?;
    let since = last_checked_at.unwrap_or(now - lookback);
    Ok(expr.is_due(since, now))
}

fn floor_minute(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_trunc(Duration::minutes(1)).unwrap_or(at)
}

fn has(bits: u64, value: u32) -> bool {
    bits & (1u64 << value) != 0
}

/// 단일 필드를 비트셋으로 해석한다.
/// 지원: `*`, `N`, `A-B`, `*/S`, `A-B/S`, `N/S`, 쉼표 목록. `A > B` 범위는 최대값에서 감아 돈다.
fn parse_field(raw: &str, min: u32, max: u32) -> Result<u64, String> {
    if raw.is_empty() {
        return Err("empty field".to_string());
    }

    let mut bits = 0u64;
    for item in raw.split(',') {
        let (base, step) = match item.split_once('/') {
            Some((base, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| format!("invalid step '{step}' in '{item}'"))?;
                if step == 0 {
                    return Err(format!("step must be at least 1 in '{item}'"));
                }
                (base, Some(step))
            }
            None => (item, None),
        };

        let (start, end) = if base == "*" {
            (min, max)
        } else if let Some((a, b)) = base.split_once('-') {
            (parse_value(a, min, max)?, parse_value(b, min, max)?)
        } else {
            let value = parse_value(base, min, max)?;
            if step.is_some() { (value, max) } else { (value, value) }
        };

        let span = max - min + 1;
        let distance = (end + span - start) % span;
        let step = step.unwrap_or(1);
        let mut offset = 0;
        while offset <= distance {
            let value = min + (start - min + offset) % span;
            bits |= 1u64 << value;
            offset += step;
        }
    }
    Ok(bits)
}

fn parse_value(raw: &str, min: u32, max: u32) -> Result<u32, String> {
    let value: u32 = raw
        .trim()
        .parse()
        .map_err(|_| format!("'{raw}' is not a number"))?;
    if value < min || value > max {
        return Err(format!("{value} is outside {min}-{max}"));
    }
    Ok(value)
}

/// 지원 시간대 하나(고정 오프셋).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimezoneOffset {
    pub id: String,
    pub offset_minutes: i32,
}

/// 자주 쓰는 IANA 이름의 표준시(비 DST) 오프셋.
const TIMEZONE_ALIASES: &[(&str, i32)] = &[
    ("America/Los_Angeles", -8 * 60),
    ("America/Denver", -7 * 60),
    ("America/Chicago", -6 * 60),
    ("America/New_York", -5 * 60),
    ("America/Sao_Paulo", -3 * 60),
    ("Europe/London", 0),
    ("Europe/Paris", 60),
    ("Europe/Berlin", 60),
    ("Europe/Kyiv", 2 * 60),
    ("Asia/Dubai", 4 * 60),
    ("Asia/Kolkata", 5 * 60 + 30),
    ("Asia/Singapore", 8 * 60),
    ("Asia/Seoul", 9 * 60),
    ("Asia/Tokyo", 9 * 60),
    ("Australia/Sydney", 10 * 60),
];

/// 편집 UI에 노출하는 전체 시간대 표.
pub fn supported_timezones() -> Vec<TimezoneOffset> {
    let mut out = vec![TimezoneOffset {
        id: "UTC".to_string(),
        offset_minutes: 0,
    }];
    for hours in -12..=14 {
        if hours != 0 {
            out.push(TimezoneOffset {
                id: format!("UTC{hours:+}"),
                offset_minutes: hours * 60,
            });
        }
    }
    out.push(TimezoneOffset {
        id: "UTC+5:30".to_string(),
        offset_minutes: 5 * 60 + 30,
    });
    out.extend(TIMEZONE_ALIASES.iter().map(|(id, offset)| TimezoneOffset {
        id: id.to_string(),
        offset_minutes: *offset,
    }));
    out
}

/// 시간대 id로 오프셋(분)을 찾는다. 대소문자는 구분하지 않는다.
pub fn timezone_offset(id: &str) -> Option<i32> {
    let needle = id.trim();
    supported_timezones()
        .into_iter()
        .find(|tz| tz.id.eq_ignore_ascii_case(needle))
        .map(|tz| tz.offset_minutes)
}

/// 사용자 현지 크론을 저장용 UTC 크론으로 바꾼다.
pub fn convert_cron_to_utc(cron: &str, timezone: &str) -> Result<String, ValidationErrors> {
    let offset = lookup_offset(timezone)?;
    shift_cron(cron, -offset)
}

/// 저장된 UTC 크론을 표시용 현지 크론으로 되돌린다.
pub fn convert_cron_from_utc(cron: &str, timezone: &str) -> Result<String, ValidationErrors> {
    let offset = lookup_offset(timezone)?;
    shift_cron(cron, offset)
}

fn lookup_offset(timezone: &str) -> Result<i32, ValidationErrors> {
    timezone_offset(timezone).ok_or_else(|| {
        ValidationErrors::single("timezone", format!("unsupported timezone '{timezone}'"))
    })
}

fn shift_cron(cron: &str, delta_minutes: i32) -> Result<String, ValidationErrors> {
    CronExpr::parse(cron)?;
    let mut fields: Vec<String> = cron.split_whitespace().map(str::to_string).collect();

    let hour_delta = match fields[0].parse::<i32>() {
        Ok(minute) => {
            let total = minute + delta_minutes;
            fields[0] = total.rem_euclid(60).to_string();
            total.div_euclid(60)
        }
        // 분 필드가 목록/와일드카드면 분은 그대로 두고 시간만 정수 시간만큼 옮긴다.
        Err(_) if delta_minutes % 60 == 0 => delta_minutes / 60,
        Err(_) => {
            return Err(ValidationErrors::single(
                "cron.minute",
                format!(
                    "minute field '{}' must be a single number for a timezone with a non-whole-hour offset",
                    fields[0]
                ),
            ));
        }
    };

    if hour_delta.rem_euclid(24) != 0 {
        fields[1] = shift_hour_field(&fields[1], hour_delta);
    }

    Ok(fields.join(" "))
}

fn shift_hour_field(field: &str, hour_delta: i32) -> String {
    let shift = |raw: &str| -> String {
        match raw.parse::<i32>() {
            Ok(hour) => (hour + hour_delta).rem_euclid(24).to_string(),
            Err(_) => raw.to_string(),
        }
    };

    field
        .split(',')
        .map(|item| {
            let (base, step) = match item.split_once('/') {
                Some((base, step)) => (base, Some(step)),
                None => (item, None),
            };
            let shifted = if base == "*" {
                base.to_string()
            } else if let Some((a, b)) = base.split_once('-') {
                format!("{}-{}", shift(a), shift(b))
            } else {
                shift(base)
            };
            match step {
                Some(step) => format!("{shifted}/{step}"),
                None => shifted,
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}
