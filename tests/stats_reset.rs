use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_comedord");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn comedord");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    serde_json::from_str(line.trim()).expect("parse response json")
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

#[test]
fn dashboard_aggregates_and_factory_reset() {
    let workspace = temp_dir("comedor-stats");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "store.open",
        json!({ "path": workspace.to_string_lossy() }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "grades.create",
        json!({
            "name": "5A",
            "category": "primaria",
            "scheduleStart": "12:00",
            "scheduleEnd": "12:20"
        }),
    );
    let grade = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "grades.create",
        json!({
            "name": "Once A",
            "category": "media",
            "scheduleStart": "12:30",
            "scheduleEnd": "13:00"
        }),
    );
    let grade_id = grade["grade"]["id"].as_str().expect("grade id").to_string();

    let ana = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "teachers.register",
        json!({ "name": "Ana", "email": "ana@x.com", "password": "secreto1" }),
    );
    let ana_id = ana["teacher"]["id"].as_str().expect("id").to_string();
    let berta = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "teachers.register",
        json!({ "name": "Berta", "email": "berta@x.com", "password": "secreto2" }),
    );
    let berta_id = berta["teacher"]["id"].as_str().expect("id").to_string();

    request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "meals.checkIn",
        json!({ "teacherId": ana_id, "group": "5A" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "meals.checkIn",
        json!({ "teacherId": ana_id, "group": "Once A" }),
    );
    let b_record = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "meals.checkIn",
        json!({ "teacherId": berta_id, "group": "5A" }),
    );
    let b_record_id = b_record["record"]["id"].as_str().expect("id").to_string();
    request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "meals.startMeal",
        json!({ "recordId": b_record_id }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "attendance.saveCounts",
        json!({
            "teacherId": ana_id,
            "gradeId": grade_id,
            "studentsPresent": 30,
            "studentsEating": 28,
            "studentsNotEating": 2
        }),
    );

    let dashboard = request_ok(&mut stdin, &mut reader, "11", "stats.dashboard", json!({}));
    assert_eq!(dashboard["checkIns"], 3);
    assert_eq!(dashboard["byStatus"]["registered"], 2);
    assert_eq!(dashboard["byStatus"]["eating"], 1);
    assert_eq!(dashboard["byStatus"]["finished"], 0);
    assert_eq!(dashboard["byCategory"]["primaria"], 2);
    assert_eq!(dashboard["byCategory"]["media"], 1);
    assert_eq!(dashboard["students"]["present"], 30);
    assert_eq!(dashboard["students"]["eating"], 28);

    let history = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "stats.teacherHistory",
        json!({ "teacherId": ana_id }),
    );
    assert_eq!(history["history"]["total"], 2);
    assert_eq!(history["history"]["today"], 2);
    assert_eq!(history["history"]["streakDays"], 1);
    assert!(history["history"]["busiestSlot"].is_string());

    let export = request_ok(&mut stdin, &mut reader, "13", "stats.export", json!({}));
    assert_eq!(export["totals"]["teachers"], 2);
    assert_eq!(export["totals"]["grades"], 2);
    assert_eq!(export["totals"]["meal_records"], 3);
    assert_eq!(export["totals"]["student_attendance"], 1);
    assert!(export["generatedAt"].is_string());

    // Everything above produced change events; a second drain is empty.
    let drained = request_ok(&mut stdin, &mut reader, "14", "events.drain", json!({}));
    let events = drained["events"].as_array().expect("events");
    assert!(events
        .iter()
        .any(|e| e["collection"] == "meal_records" && e["kind"] == "inserted"));
    assert!(events
        .iter()
        .any(|e| e["collection"] == "meal_records" && e["kind"] == "updated"));
    assert!(events
        .iter()
        .any(|e| e["collection"] == "teachers" && e["kind"] == "inserted"));
    let drained = request_ok(&mut stdin, &mut reader, "15", "events.drain", json!({}));
    assert!(drained["events"].as_array().expect("events").is_empty());

    // Factory reset: one administrative action, everything gone, store
    // usable again.
    let reset = request_ok(&mut stdin, &mut reader, "16", "store.factoryReset", json!({}));
    assert_eq!(reset["reset"], true);

    let listed = request_ok(&mut stdin, &mut reader, "17", "teachers.list", json!({}));
    assert!(listed["teachers"].as_array().expect("array").is_empty());

    let export = request_ok(&mut stdin, &mut reader, "18", "stats.export", json!({}));
    assert_eq!(export["totals"]["teachers"], 0);
    assert_eq!(export["totals"]["meal_records"], 0);

    let drained = request_ok(&mut stdin, &mut reader, "19", "events.drain", json!({}));
    let events = drained["events"].as_array().expect("events");
    assert_eq!(events.len(), 5);
    assert!(events.iter().all(|e| e["kind"] == "reset"));

    request_ok(
        &mut stdin,
        &mut reader,
        "20",
        "teachers.register",
        json!({ "name": "Ana", "email": "ana@x.com", "password": "secreto1" }),
    );
}
