use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;

const NOW: &str = "1771425000"; // 2026-02-18 14:30:00 UTC

fn timeperiod() -> Command {
    let mut cmd = Command::cargo_bin("timeperiod").unwrap();
    cmd.env_remove("TIMEPERIOD_CONFIG")
        .env_remove("TIMEPERIOD_TZ")
        .args(["--now", NOW]);
    cmd
}

fn stdout_json(cmd: &mut Command) -> Value {
    let output = cmd.output().unwrap();
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_resolve_single_expression() {
    timeperiod()
        .args(["resolve", "now-1d/d"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"timestamp\": 1771286400"))
        .stdout(predicate::str::contains("2026-02-17 00:00:00"));
}

#[test]
fn test_resolve_range_with_label() {
    let json = stdout_json(timeperiod().args(["resolve", "now/d", "now/d"]));
    assert_eq!(json["label"], "Today");
    assert_eq!(json["from_date"], "2026-02-18 00:00:00");
    assert_eq!(json["to_date"], "2026-02-18 23:59:59");
}

#[test]
fn test_resolve_in_timezone() {
    let json = stdout_json(timeperiod().args(["--timezone", "Asia/Tokyo", "resolve", "now/d", "now/d"]));
    assert_eq!(json["from_ts"], 1_771_340_400);
}

#[test]
fn test_resolve_malformed_reports_field_errors() {
    timeperiod()
        .args(["resolve", "now-1x"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Malformed time expression"));
}

#[test]
fn test_navigate_decrement() {
    let json = stdout_json(timeperiod().args([
        "navigate", "--method", "decrement", "--from", "now-1h", "--to", "now",
    ]));
    assert_eq!(json["from"], "2026-02-18 12:30:00");
    assert_eq!(json["to"], "2026-02-18 13:30:00");
    assert_eq!(json["can_increment"], true);
}

#[test]
fn test_navigate_rangeoffset_without_offsets() {
    timeperiod()
        .args([
            "navigate", "--method", "rangeoffset", "--from", "now-1h", "--to", "now",
            "--from-offset", "60",
        ])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("to_offset"));
}

#[test]
fn test_navigate_unknown_method() {
    timeperiod()
        .args(["navigate", "--method", "zoomin", "--from", "now-1h", "--to", "now"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Unknown method: zoomin"));
}

#[test]
fn test_navigate_persists_profile() {
    let path = std::env::temp_dir().join(format!("timeperiod-profile-{}.json", std::process::id()));
    let _ = std::fs::remove_file(&path);
    let profile = path.to_str().unwrap();

    timeperiod()
        .args(["navigate", "--method", "zoomout", "--from", "now-1h", "--to", "now", "--profile", profile])
        .assert()
        .success();

    // second call reads the stored range
    let json = stdout_json(timeperiod().args(["navigate", "--method", "zoomout", "--profile", profile]));
    assert_eq!(json["from"], "now-4h");

    let stored: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(stored["0"]["web.dashboard.filter.from"], "now-4h");
    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_schedule_business_hours() {
    let json = stdout_json(timeperiod().args([
        "schedule", "--day", "mon=8:00-17:00", "--day", "tue=8:00-17:00", "--day", "fri=8:00-17:00",
    ]));
    let intervals = json["intervals"].as_array().unwrap();
    assert_eq!(intervals.len(), 3);
    assert_eq!(intervals[0]["period_from"], 86_400 + 28_800);
    assert_eq!(json["weekly_seconds"], 3 * 32_400);
    assert_eq!(json["always"], false);
}

#[test]
fn test_schedule_rejects_overlap() {
    timeperiod()
        .args(["schedule", "--day", "wed=8:00-12:00,11:00-13:00"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("schedule.wednesday"));
}

#[test]
fn test_recurrence_decode_last_friday() {
    let json = stdout_json(timeperiod().args([
        "recurrence", "decode", "-f", "timeperiod_type=4", "-f", "every=5", "-f", "month=4095",
        "-f", "dayofweek=16", "-f", "day=0", "-f", "start_time=0", "-f", "period=3600",
    ]));
    assert_eq!(json["pattern"]["type"], "monthly");
    assert_eq!(json["pattern"]["on"]["weekdays"]["week"], "last");
    assert_eq!(json["record"]["day"], "0");
}

#[test]
fn test_recurrence_decode_missing_field() {
    timeperiod()
        .args(["recurrence", "decode", "-f", "timeperiod_type=2", "-f", "every=1"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Missing required field"));
}

#[test]
fn test_recurrence_next_daily() {
    let json = stdout_json(timeperiod().args([
        "recurrence", "next", "-f", "timeperiod_type=2", "-f", "every=1", "-f", "start_time=03:00",
        "-f", "period=3600", "-n", "3",
    ]));
    let occurrences = json["occurrences"].as_array().unwrap();
    assert_eq!(occurrences.len(), 3);
    assert_eq!(occurrences[0]["start_date"], "2026-02-19 03:00:00");
    assert_eq!(occurrences[2]["start_date"], "2026-02-21 03:00:00");
    assert_eq!(json["next"], 1_771_470_000);
}

#[test]
fn test_invalid_config_file() {
    timeperiod()
        .args(["--config", "/nonexistent/timeperiod.json", "resolve", "now"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Failed to read config file"));
}
