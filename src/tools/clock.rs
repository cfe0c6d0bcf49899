//! Current date and time, so schedule questions can be answered relative to now

use super::Tool;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, FixedOffset, Utc, Weekday};
use serde_json::{json, Value};

/// Vietnam has no daylight saving; UTC+7 all year
const VIETNAM_OFFSET_SECS: i32 = 7 * 3600;

#[derive(Debug, Default)]
pub struct CurrentTimeTool;

fn weekday_vi(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Thứ Hai",
        Weekday::Tue => "Thứ Ba",
        Weekday::Wed => "Thứ Tư",
        Weekday::Thu => "Thứ Năm",
        Weekday::Fri => "Thứ Sáu",
        Weekday::Sat => "Thứ Bảy",
        Weekday::Sun => "Chủ Nhật",
    }
}

impl CurrentTimeTool {
    fn describe(now: DateTime<Utc>) -> Value {
        let local = match FixedOffset::east_opt(VIETNAM_OFFSET_SECS) {
            Some(offset) => now.with_timezone(&offset),
            None => now.fixed_offset(),
        };
        json!({
            "datetime": local.to_rfc3339(),
            "weekday": weekday_vi(local.weekday()),
        })
    }
}

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &'static str {
        "get_current_time"
    }

    fn description(&self) -> String {
        "Get the current local date, time and weekday at the school. Use it for questions about today's or the next class.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn run(&self, _input: Value) -> String {
        Self::describe(Utc::now()).to_string()
    }
}
