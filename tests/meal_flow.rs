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

fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        !value.get("ok").and_then(|v| v.as_bool()).unwrap_or(true),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value.get("error").cloned().expect("error object")
}

fn setup(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &PathBuf,
) -> String {
    request_ok(
        stdin,
        reader,
        "s1",
        "store.open",
        json!({ "path": workspace.to_string_lossy() }),
    );
    request_ok(
        stdin,
        reader,
        "s2",
        "grades.create",
        json!({
            "name": "5A",
            "category": "primaria",
            "scheduleStart": "12:00",
            "scheduleEnd": "12:20"
        }),
    );
    request_ok(
        stdin,
        reader,
        "s3",
        "grades.create",
        json!({
            "name": "6B",
            "category": "secundaria",
            "scheduleStart": "12:30",
            "scheduleEnd": "13:00"
        }),
    );
    let registered = request_ok(
        stdin,
        reader,
        "s4",
        "teachers.register",
        json!({ "name": "Ana", "email": "ana@x.com", "password": "secreto1", "assignedGroup": "5A" }),
    );
    registered["teacher"]["id"].as_str().expect("id").to_string()
}

#[test]
fn check_in_is_guarded_per_group_and_day() {
    let workspace = temp_dir("comedor-guard");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let teacher_id = setup(&mut stdin, &mut reader, &workspace);

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "meals.checkIn",
        json!({ "teacherId": teacher_id, "group": "5A" }),
    );
    let record_id = first["record"]["id"].as_str().expect("record id").to_string();
    assert_eq!(first["record"]["status"], "registered");
    assert_eq!(first["record"]["remainingMinutes"], 0);
    assert!(first["record"].get("enteredAt").is_none());

    // Second attempt for the same group and day: rejected, with the
    // existing record's details so the surface can explain why.
    let error = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "meals.checkIn",
        json!({ "teacherId": teacher_id, "group": "5A" }),
    );
    assert_eq!(error["code"], "duplicate_registration");
    assert_eq!(error["details"]["recordId"], record_id.as_str());
    assert_eq!(error["details"]["group"], "5A");
    assert!(error["details"]["registeredAt"].is_string());

    // Covering another group the same day is a different key.
    let covering = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "meals.checkIn",
        json!({ "teacherId": teacher_id, "group": "6B" }),
    );
    assert_ne!(covering["record"]["id"], record_id.as_str());

    let listed = request_ok(&mut stdin, &mut reader, "4", "meals.listForDate", json!({}));
    assert_eq!(listed["records"].as_array().expect("array").len(), 2);

    let mine = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "meals.forTeacher",
        json!({ "teacherId": teacher_id }),
    );
    assert_eq!(mine["records"].as_array().expect("array").len(), 2);

    // The rejected attempt did not replace the original record.
    let still_there = listed["records"]
        .as_array()
        .expect("array")
        .iter()
        .any(|r| r["id"] == record_id.as_str() && r["group"] == "5A");
    assert!(still_there);
}

#[test]
fn meal_start_happens_once_and_drives_the_clock() {
    let workspace = temp_dir("comedor-start");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let teacher_id = setup(&mut stdin, &mut reader, &workspace);

    let checked_in = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "meals.checkIn",
        json!({ "teacherId": teacher_id, "group": "5A" }),
    );
    let record_id = checked_in["record"]["id"].as_str().expect("id").to_string();

    let started = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "meals.startMeal",
        json!({ "recordId": record_id }),
    );
    assert_eq!(started["record"]["status"], "eating");
    assert!(started["record"]["enteredAt"].is_string());
    // 20-minute window (12:00-12:20), meal just started.
    assert_eq!(started["record"]["remainingMinutes"], 20);

    let error = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "meals.startMeal",
        json!({ "recordId": record_id }),
    );
    assert_eq!(error["code"], "already_started");
    assert!(error["details"]["enteredAt"].is_string());

    let error = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "meals.startMeal",
        json!({ "recordId": "no-such-record" }),
    );
    assert_eq!(error["code"], "not_found");
}

#[test]
fn check_in_requires_known_teacher_and_group() {
    let workspace = temp_dir("comedor-checks");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let teacher_id = setup(&mut stdin, &mut reader, &workspace);

    let error = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "meals.checkIn",
        json!({ "teacherId": "no-such-teacher", "group": "5A" }),
    );
    assert_eq!(error["code"], "not_found");

    let error = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "meals.checkIn",
        json!({ "teacherId": teacher_id, "group": "9Z" }),
    );
    assert_eq!(error["code"], "not_found");

    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "teachers.setActive",
        json!({ "teacherId": teacher_id, "isActive": false }),
    );
    let error = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "meals.checkIn",
        json!({ "teacherId": teacher_id, "group": "5A" }),
    );
    assert_eq!(error["code"], "account_inactive");
}

#[test]
fn grade_maintenance_validates_window_and_name() {
    let workspace = temp_dir("comedor-grades");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    setup(&mut stdin, &mut reader, &workspace);

    let error = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "grades.create",
        json!({
            "name": "Tarde",
            "category": "media",
            "scheduleStart": "13:00",
            "scheduleEnd": "12:00"
        }),
    );
    assert_eq!(error["code"], "invalid_schedule");

    let error = request_err(
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
    assert_eq!(error["code"], "constraint_violation");
    assert_eq!(error["details"]["field"], "name");

    let listed = request_ok(&mut stdin, &mut reader, "3", "grades.list", json!({}));
    let grades = listed["grades"].as_array().expect("array");
    assert_eq!(grades.len(), 2);
    let five_a = grades.iter().find(|g| g["name"] == "5A").expect("5A");
    assert_eq!(five_a["durationMinutes"], 20);
}
