use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use std::str::FromStr;
use thiserror::Error;

use crate::constants::cron::{CRON_FIELDS_COUNT, MAX_LOOKAHEAD_YEARS};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct CronParseError(pub String);

const MONTH_NAMES: &[&str] = &[
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const DAY_NAMES: &[&str] = &["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// 单个字段允许的取值集合
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
    /// 名称对应的起始数值
    name_base: u32,
}

const MINUTE: FieldSpec = FieldSpec { name: "minute", min: 0, max: 59, names: &[], name_base: 0 };
const HOUR: FieldSpec = FieldSpec { name: "hour", min: 0, max: 23, names: &[], name_base: 0 };
const DAY_OF_MONTH: FieldSpec =
    FieldSpec { name: "day-of-month", min: 1, max: 31, names: &[], name_base: 0 };
const MONTH: FieldSpec = FieldSpec { name: "month", min: 1, max: 12, names: MONTH_NAMES, name_base: 1 };
// 7 也表示周日，解析后折叠到 0
const DAY_OF_WEEK: FieldSpec =
    FieldSpec { name: "day-of-week", min: 0, max: 7, names: DAY_NAMES, name_base: 0 };

/// 解析后的字段，位图表示
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CronField {
    bits: u64,
    /// 字段不以 `*` 开头
    restricted: bool,
}

impl CronField {
    fn contains(&self, value: u32) -> bool {
        self.bits & (1u64 << value) != 0
    }
}

fn parse_value(text: &str, spec: &FieldSpec) -> Result<u32, CronParseError> {
    let lower = text.to_ascii_lowercase();
    if let Some(pos) = spec.names.iter().position(|n| *n == lower) {
        return Ok(spec.name_base + pos as u32);
    }

    let value: u32 = text
        .parse()
        .map_err(|_| CronParseError(format!("invalid {} value `{}`", spec.name, text)))?;
    if value < spec.min || value > spec.max {
        return Err(CronParseError(format!(
            "{} value {} out of range {}-{}",
            spec.name, value, spec.min, spec.max
        )));
    }
    Ok(value)
}

fn parse_field(text: &str, spec: &FieldSpec) -> Result<CronField, CronParseError> {
    let mut bits = 0u64;

    for item in text.split(',') {
        if item.is_empty() {
            return Err(CronParseError(format!("empty list item in {} field", spec.name)));
        }

        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step.parse().map_err(|_| {
                    CronParseError(format!("invalid step `{}` in {} field", step, spec.name))
                })?;
                if step == 0 {
                    return Err(CronParseError(format!("zero step in {} field", spec.name)));
                }
                (range, Some(step))
            }
            None => (item, None),
        };

        let (start, end) = if range == "*" {
            (spec.min, spec.max)
        } else if let Some((lo, hi)) = range.split_once('-') {
            let lo = parse_value(lo, spec)?;
            let hi = parse_value(hi, spec)?;
            if lo > hi {
                return Err(CronParseError(format!(
                    "descending range `{}` in {} field",
                    range, spec.name
                )));
            }
            (lo, hi)
        } else {
            let value = parse_value(range, spec)?;
            // `5/15` 表示从 5 开始到最大值
            if step.is_some() { (value, spec.max) } else { (value, value) }
        };

        let step = step.unwrap_or(1);
        let mut value = start;
        while value <= end {
            bits |= 1u64 << value;
            value += step;
        }
    }

    Ok(CronField {
        bits,
        restricted: !text.starts_with('*'),
    })
}

fn expand_descriptor(expression: &str) -> Result<&str, CronParseError> {
    match expression {
        "@yearly" | "@annually" => Ok("0 0 1 1 *"),
        "@monthly" => Ok("0 0 1 * *"),
        "@weekly" => Ok("0 0 * * 0"),
        "@daily" | "@midnight" => Ok("0 0 * * *"),
        "@hourly" => Ok("0 * * * *"),
        other => Err(CronParseError(format!("unknown descriptor `{other}`"))),
    }
}

/// 五字段 cron 表达式，按 UTC 计算
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    minute: CronField,
    hour: CronField,
    day_of_month: CronField,
    month: CronField,
    day_of_week: CronField,
}

impl FromStr for CronSchedule {
    type Err = CronParseError;

    fn from_str(expression: &str) -> Result<Self, Self::Err> {
        let trimmed = expression.trim();
        let expanded = if trimmed.starts_with('@') {
            expand_descriptor(trimmed)?
        } else {
            trimmed
        };

        let fields: Vec<&str> = expanded.split_whitespace().collect();
        if fields.len() != CRON_FIELDS_COUNT {
            return Err(CronParseError(format!(
                "expected {} fields, found {}",
                CRON_FIELDS_COUNT,
                fields.len()
            )));
        }

        let mut day_of_week = parse_field(fields[4], &DAY_OF_WEEK)?;
        if day_of_week.contains(7) {
            day_of_week.bits = (day_of_week.bits & !(1u64 << 7)) | 1;
        }

        Ok(Self {
            minute: parse_field(fields[0], &MINUTE)?,
            hour: parse_field(fields[1], &HOUR)?,
            day_of_month: parse_field(fields[2], &DAY_OF_MONTH)?,
            month: parse_field(fields[3], &MONTH)?,
            day_of_week,
        })
    }
}

impl CronSchedule {
    /// 日与星期都受限时任一匹配即可
    fn day_matches(&self, time: &DateTime<Utc>) -> bool {
        let dom = self.day_of_month.contains(time.day());
        let dow = self.day_of_week.contains(time.weekday().num_days_from_sunday());
        if self.day_of_month.restricted && self.day_of_week.restricted {
            dom || dow
        } else {
            dom && dow
        }
    }

    pub fn matches(&self, time: &DateTime<Utc>) -> bool {
        self.month.contains(time.month())
            && self.day_matches(time)
            && self.hour.contains(time.hour())
            && self.minute.contains(time.minute())
    }

    /// 严格晚于 `after` 的下一次触发时间
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let truncated = after.with_second(0)?.with_nanosecond(0)?;
        let mut time = truncated + Duration::minutes(1);
        let limit = time + Duration::days(366 * i64::from(MAX_LOOKAHEAD_YEARS));

        while time <= limit {
            if !self.month.contains(time.month()) {
                let (year, month) = if time.month() == 12 {
                    (time.year() + 1, 1)
                } else {
                    (time.year(), time.month() + 1)
                };
                time = Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()?;
                continue;
            }
            if !self.day_matches(&time) {
                let next_day = time.date_naive().succ_opt()?;
                time = next_day.and_hms_opt(0, 0, 0)?.and_utc();
                continue;
            }
            if !self.hour.contains(time.hour()) {
                time = time.with_minute(0)? + Duration::hours(1);
                continue;
            }
            if !self.minute.contains(time.minute()) {
                time += Duration::minutes(1);
                continue;
            }
            return Some(time);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn next(expr: &str, after: DateTime<Utc>) -> DateTime<Utc> {
        expr.parse::<CronSchedule>().unwrap().next_after(after).unwrap()
    }

    #[test]
    fn test_next_fire_basic_fields() {
        assert_eq!(next("* * * * *", at(2024, 1, 1, 0, 0)), at(2024, 1, 1, 0, 1));
        assert_eq!(next("0 2 * * *", at(2024, 1, 1, 2, 0)), at(2024, 1, 2, 2, 0));
        assert_eq!(next("*/15 * * * *", at(2024, 1, 1, 0, 16)), at(2024, 1, 1, 0, 30));
        assert_eq!(next("30 9 1 jan,jul *", at(2024, 2, 1, 0, 0)), at(2024, 7, 1, 9, 30));
    }

    #[test]
    fn test_day_of_week_and_sunday_alias() {
        // 2024-01-01 是周一
        assert_eq!(next("0 0 * * 7", at(2024, 1, 1, 0, 0)), at(2024, 1, 7, 0, 0));
        assert_eq!(next("0 0 * * sun", at(2024, 1, 1, 0, 0)), at(2024, 1, 7, 0, 0));
        assert_eq!(next("0 8 * * mon-fri", at(2024, 1, 5, 9, 0)), at(2024, 1, 8, 8, 0));
    }

    #[test]
    fn test_day_of_month_or_day_of_week() {
        // 每月 15 号或每周五
        let schedule: CronSchedule = "0 0 15 * 5".parse().unwrap();
        assert_eq!(schedule.next_after(at(2024, 1, 1, 0, 0)), Some(at(2024, 1, 5, 0, 0)));
        assert_eq!(schedule.next_after(at(2024, 1, 12, 0, 0)), Some(at(2024, 1, 15, 0, 0)));
    }

    #[test]
    fn test_descriptors_and_leap_day() {
        assert_eq!(next("@hourly", at(2024, 1, 1, 0, 30)), at(2024, 1, 1, 1, 0));
        assert_eq!(next("@yearly", at(2024, 3, 1, 0, 0)), at(2025, 1, 1, 0, 0));
        assert_eq!(next("0 0 29 2 *", at(2024, 3, 1, 0, 0)), at(2028, 2, 29, 0, 0));
    }

    #[test]
    fn test_invalid_expressions() {
        for expr in ["", "* * * *", "60 * * * *", "* * * * * *", "*/0 * * * *", "5-1 * * * *", "@often", "a b c d e"] {
            assert!(expr.parse::<CronSchedule>().is_err(), "{expr} should be rejected");
        }
        // 2 月 30 日永远不会出现
        let never: CronSchedule = "0 0 30 2 *".parse().unwrap();
        assert_eq!(never.next_after(at(2024, 1, 1, 0, 0)), None);
    }
}
