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
    let exe = env!("CARGO_BIN_EXE_attendanced");
    let mut child = Command::new(exe)
        .env_remove("ATTENDANCE_WORKSPACE")
        .env_remove("ATTENDANCE_WORKING_DAYS_SCOPE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn attendanced");
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
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
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
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

fn setup(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &std::path::Path,
) -> (i64, Vec<i64>) {
    let _ = request_ok(
        stdin,
        reader,
        "s1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class_id = request_ok(stdin, reader, "s2", "classes.create", json!({ "name": "10th" }))
        ["classId"]
        .as_i64()
        .expect("classId");
    let section_id = request_ok(
        stdin,
        reader,
        "s3",
        "sections.create",
        json!({ "classId": class_id, "name": "A" }),
    )["sectionId"]
        .as_i64()
        .expect("sectionId");
    let mut students = Vec::new();
    for (i, name) in ["Asha", "Bela", "Chet"].iter().enumerate() {
        let created = request_ok(
            stdin,
            reader,
            &format!("s4-{}", i),
            "students.create",
            json!({ "name": name, "classId": class_id, "sectionId": section_id }),
        );
        students.push(created["studentId"].as_i64().expect("studentId"));
    }
    (section_id, students)
}

fn records(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
) -> Vec<serde_json::Value> {
    request_ok(stdin, reader, id, "attendance.list", json!({}))["records"]
        .as_array()
        .cloned()
        .expect("records")
}

#[test]
fn resaving_a_date_updates_instead_of_duplicating() {
    let workspace = temp_dir("attendance-upsert");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let (section_id, students) = setup(&mut stdin, &mut reader, &workspace);
    let asha = students[0];

    let roster = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.roster",
        json!({ "sectionId": section_id, "date": "2024-05-01" }),
    );
    let rows = roster["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r["status"] == "Present" && r["saved"] == false));

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.save",
        json!({
            "date": "2024-05-01",
            "entries": [{ "studentId": asha, "status": "Present" }]
        }),
    );
    assert_eq!(first["inserted"], 1);

    let second = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.save",
        json!({
            "date": "2024-05-01",
            "entries": [{ "studentId": asha, "status": "Absent" }]
        }),
    );
    assert_eq!(second["inserted"], 0);
    assert_eq!(second["updated"], 1);

    let all = records(&mut stdin, &mut reader, "4");
    assert_eq!(all.len(), 1);
    assert_eq!(all[0]["studentId"], asha);
    assert_eq!(all[0]["date"], "2024-05-01");
    assert_eq!(all[0]["status"], "Absent");
}

#[test]
fn apply_status_then_save_whole_section_is_idempotent() {
    let workspace = temp_dir("attendance-batch");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let (section_id, students) = setup(&mut stdin, &mut reader, &workspace);

    let roster = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.roster",
        json!({ "sectionId": section_id, "date": "2024-05-02" }),
    );
    let applied = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.applyStatus",
        json!({ "rows": roster["rows"], "studentIds": [students[1]], "status": "Absent" }),
    );
    let entries: Vec<serde_json::Value> = applied["rows"]
        .as_array()
        .expect("rows")
        .iter()
        .map(|r| json!({ "studentId": r["studentId"], "status": r["status"] }))
        .collect();

    for id in ["3", "4"] {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            id,
            "attendance.save",
            json!({ "date": "2024-05-02", "entries": entries }),
        );
    }

    let all = records(&mut stdin, &mut reader, "5");
    assert_eq!(all.len(), 3);
    let bela = all
        .iter()
        .find(|r| r["studentId"] == students[1])
        .expect("bela record");
    assert_eq!(bela["status"], "Absent");
    assert_eq!(
        all.iter().filter(|r| r["status"] == "Present").count(),
        2
    );

    let reloaded = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "attendance.roster",
        json!({ "sectionId": section_id, "date": "2024-05-02" }),
    );
    assert!(reloaded["rows"]
        .as_array()
        .expect("rows")
        .iter()
        .all(|r| r["saved"] == true));
}

#[test]
fn batch_with_unknown_student_saves_nothing() {
    let workspace = temp_dir("attendance-rollback");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let (_section_id, students) = setup(&mut stdin, &mut reader, &workspace);

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.save",
        json!({
            "date": "2024-05-03",
            "entries": [
                { "studentId": students[0], "status": "Present" },
                { "studentId": 987654, "status": "Present" }
            ]
        }),
    );
    assert_eq!(error_code(&resp), Some("not_found"));
    assert!(records(&mut stdin, &mut reader, "2").is_empty());

    let bad_status = request(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.save",
        json!({
            "date": "2024-05-03",
            "entries": [{ "studentId": students[0], "status": "Late" }]
        }),
    );
    assert_eq!(error_code(&bad_status), Some("bad_params"));

    let bad_date = request(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.save",
        json!({ "date": "03/05/2024", "entries": [] }),
    );
    assert_eq!(error_code(&bad_date), Some("bad_params"));

    let signed_year = request(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.save",
        json!({
            "date": "-0001-01-01",
            "entries": [{ "studentId": students[0], "status": "Present" }]
        }),
    );
    assert_eq!(error_code(&signed_year), Some("bad_params"));
    assert!(records(&mut stdin, &mut reader, "6").is_empty());
}

#[test]
fn apply_status_reads_ids_and_statuses_like_other_params() {
    let workspace = temp_dir("attendance-apply-ids");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let (_section_id, students) = setup(&mut stdin, &mut reader, &workspace);
    let rows = json!([
        { "studentId": students[0], "name": "Asha", "status": "Present", "saved": false },
        { "studentId": students[1], "name": "Bela", "status": "absent", "saved": false }
    ]);

    let applied = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.applyStatus",
        json!({
            "rows": rows,
            "studentIds": [students[0].to_string()],
            "status": "Absent"
        }),
    );
    let out = applied["rows"].as_array().expect("rows");
    assert_eq!(out[0]["status"], "Absent");
    assert_eq!(out[1]["status"], "Absent");

    for (id, bad) in [("2", json!(["x"])), ("3", json!([true])), ("4", json!(null))] {
        let resp = request(
            &mut stdin,
            &mut reader,
            id,
            "attendance.applyStatus",
            json!({ "rows": rows, "studentIds": bad, "status": "Absent" }),
        );
        assert_eq!(error_code(&resp), Some("bad_params"), "studentIds {}", bad);
    }

    let late = request(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.applyStatus",
        json!({
            "rows": [{ "studentId": students[0], "name": "Asha", "status": "Late", "saved": false }],
            "studentIds": [students[0]],
            "status": "Absent"
        }),
    );
    assert_eq!(error_code(&late), Some("bad_params"));
}

#[test]
fn toggle_flips_only_the_named_row() {
    let workspace = temp_dir("attendance-toggle");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let (section_id, students) = setup(&mut stdin, &mut reader, &workspace);

    let roster = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.roster",
        json!({ "sectionId": section_id, "date": "2024-05-07" }),
    );
    let toggled = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.toggle",
        json!({ "rows": roster["rows"], "studentId": students[2].to_string() }),
    );
    let rows = toggled["rows"].as_array().expect("rows");
    let status_of = |sid: i64| {
        rows.iter()
            .find(|r| r["studentId"] == sid)
            .map(|r| r["status"].clone())
            .expect("row")
    };
    assert_eq!(status_of(students[2]), "Absent");
    assert_eq!(status_of(students[0]), "Present");
    assert_eq!(status_of(students[1]), "Present");

    let back = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.toggle",
        json!({ "rows": toggled["rows"], "studentId": students[2] }),
    );
    assert_eq!(back["rows"], roster["rows"]);

    let missing = request(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.toggle",
        json!({ "rows": roster["rows"] }),
    );
    assert_eq!(error_code(&missing), Some("bad_params"));
}

#[test]
fn single_record_edit_and_delete() {
    let workspace = temp_dir("attendance-record-edit");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let (_section_id, students) = setup(&mut stdin, &mut reader, &workspace);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.save",
        json!({
            "date": "2024-05-06",
            "entries": [{ "studentId": students[2], "status": "Present" }]
        }),
    );
    let record_id = records(&mut stdin, &mut reader, "2")[0]["id"]
        .as_i64()
        .expect("record id");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.setStatus",
        json!({ "recordId": record_id, "status": "absent" }),
    );
    assert_eq!(records(&mut stdin, &mut reader, "4")[0]["status"], "Absent");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.delete",
        json!({ "recordId": record_id }),
    );
    assert!(records(&mut stdin, &mut reader, "6").is_empty());

    let again = request(
        &mut stdin,
        &mut reader,
        "7",
        "attendance.delete",
        json!({ "recordId": record_id }),
    );
    assert_eq!(error_code(&again), Some("not_found"));
}
