use assert_cmd::Command;
use mockito::{Matcher, Server};
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;
use serde_json::{Value, json};
use std::fs;
use std::path::Path;

fn breachchat_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("breachchat"));
    cmd.current_dir(dir)
        .env_remove("OPENAI_API_KEY")
        .env_remove("DEHASHED_API_KEY")
        .env_remove("DEHASHED_EMAIL")
        .env_remove("BC_CONFIG")
        .env_remove("BC_MODEL")
        .env_remove("BC_SYSTEM")
        .env_remove("BC_TEMPERATURE")
        .env_remove("BC_MAX_TOKENS")
        .env_remove("BC_TIMEOUT")
        .env_remove("BC_SEARCH_TIMEOUT")
        .env_remove("BC_RETRIES")
        .env_remove("BC_RETRY_DELAY")
        .env_remove("BC_SESSION")
        .env_remove("BC_SESSION_FILE")
        .env_remove("BC_HISTORY_LIMIT")
        .env_remove("BC_RESULT_LIMIT")
        .env_remove("BC_OPENAI_BASE_URL")
        .env_remove("BC_DEHASHED_BASE_URL")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}

fn with_backends(cmd: &mut Command, server: &Server) {
    cmd.env("OPENAI_API_KEY", "sk-test")
        .env("DEHASHED_API_KEY", "dh-test")
        .env("BC_OPENAI_BASE_URL", format!("{}/v1", server.url()))
        .env("BC_DEHASHED_BASE_URL", server.url());
}

fn completion_body(message: Value) -> String {
    json!({
        "choices": [{"message": message}],
        "usage": {"prompt_tokens": 12, "completion_tokens": 5, "total_tokens": 17}
    })
    .to_string()
}

fn read_sessions(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).expect("session file exists"))
        .expect("session file is JSON")
}

#[test]
fn chat_requires_api_keys() {
    let dir = tempfile::tempdir().expect("temp dir");
    breachchat_cmd(dir.path())
        .arg("chat")
        .write_stdin("exit\n")
        .assert()
        .failure()
        .stderr(contains("OPENAI_API_KEY is not set in the environment"));

    breachchat_cmd(dir.path())
        .env("OPENAI_API_KEY", "sk-test")
        .arg("chat")
        .write_stdin("exit\n")
        .assert()
        .failure()
        .stderr(contains("DEHASHED_API_KEY is not set in the environment"));
}

#[test]
fn invalid_env_value_is_reported() {
    let dir = tempfile::tempdir().expect("temp dir");
    breachchat_cmd(dir.path())
        .env("BC_RETRIES", "lots")
        .arg("chat")
        .assert()
        .failure()
        .stderr(contains("Invalid BC_RETRIES 'lots'."));
}

#[test]
fn password_question_runs_search_and_persists_turn() {
    let mut server = Server::new();
    let first = server
        .mock("POST", "/v1/chat/completions")
        .match_header("authorization", "Bearer sk-test")
        .match_body(Matcher::Regex(r#""tools""#.into()))
        .with_status(200)
        .with_body(completion_body(json!({
            "content": null,
            "tool_calls": [{
                "id": "call_1",
                "type": "function",
                "function": {
                    "name": "search_dehashed",
                    "arguments": "{\"query\":\"password:hunter2\"}"
                }
            }]
        })))
        .expect(1)
        .create();
    let search = server
        .mock("GET", "/search")
        .match_header("authorization", "Bearer dh-test")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("query".into(), "password:hunter2".into()),
            Matcher::UrlEncoded("size".into(), "10".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"success":true,"results_found":3}"#)
        .expect(1)
        .create();
    let second = server
        .mock("POST", "/v1/chat/completions")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#""role":"tool""#.into()),
            Matcher::Regex("Password found in 3 breaches".into()),
        ]))
        .with_status(200)
        .with_body(completion_body(json!({
            "content": "hunter2 has appeared in 3 breaches. Change it everywhere."
        })))
        .expect(1)
        .create();

    let dir = tempfile::tempdir().expect("temp dir");
    let session_file = dir.path().join("chat_sessions.json");
    let mut cmd = breachchat_cmd(dir.path());
    with_backends(&mut cmd, &server);
    cmd.args(["--quiet", "chat", "--session", "alice", "--session-file"])
        .arg(&session_file)
        .write_stdin("is hunter2 leaked?\nexit\n")
        .assert()
        .success()
        .stdout(contains(
            "assistant> hunter2 has appeared in 3 breaches. Change it everywhere.",
        ))
        .stderr(contains("breachchat: session").not());

    first.assert();
    search.assert();
    second.assert();

    let sessions = read_sessions(&session_file);
    let alice = sessions["alice"].as_array().expect("alice session");
    let roles = alice
        .iter()
        .map(|message| message["role"].as_str().unwrap_or_default())
        .collect::<Vec<_>>();
    assert_eq!(roles, vec!["system", "user", "assistant", "tool", "assistant"]);
    assert_eq!(alice[1]["content"], "is hunter2 leaked?");
    assert_eq!(alice[2]["tool_call"]["name"], "search_dehashed");
}

#[test]
fn corrupt_session_file_starts_fresh_and_is_rewritten() {
    let mut server = Server::new();
    let reply = server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_body(completion_body(json!({"content": "Hello there."})))
        .expect(1)
        .create();

    let dir = tempfile::tempdir().expect("temp dir");
    let session_file = dir.path().join("chat_sessions.json");
    fs::write(&session_file, "{not json").expect("write corrupt file");

    let mut cmd = breachchat_cmd(dir.path());
    with_backends(&mut cmd, &server);
    cmd.env("BC_SESSION_FILE", &session_file)
        .args(["chat", "--show-usage"])
        .write_stdin("hi\n")
        .assert()
        .success()
        .stdout(contains("assistant> Hello there."))
        .stderr(contains("usage: prompt=12 completion=5 total=17"));

    reply.assert();
    let sessions = read_sessions(&session_file);
    assert_eq!(sessions["default"].as_array().map(Vec::len), Some(3));
}

#[test]
fn model_failure_is_reported_in_band() {
    let mut server = Server::new();
    server
        .mock("POST", "/v1/chat/completions")
        .with_status(401)
        .with_body(r#"{"error":{"message":"bad key"}}"#)
        .create();

    let dir = tempfile::tempdir().expect("temp dir");
    let session_file = dir.path().join("chat_sessions.json");
    let mut cmd = breachchat_cmd(dir.path());
    with_backends(&mut cmd, &server);
    cmd.args(["chat", "--session-file"])
        .arg(&session_file)
        .write_stdin("hi\nEXIT\n")
        .assert()
        .success()
        .stdout(contains("error> model request failed"));

    let sessions = read_sessions(&session_file);
    let stored = sessions["default"].as_array().expect("default session");
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[1]["role"], "user");
}

#[test]
fn sessions_list_show_and_clear() {
    let dir = tempfile::tempdir().expect("temp dir");
    let session_file = dir.path().join("chat_sessions.json");
    fs::write(
        &session_file,
        json!({
            "alice": [
                {"role": "system", "content": "persona"},
                {"role": "user", "content": "am I pwned?"},
                {"role": "assistant", "content": "No."}
            ],
            "bob": [{"role": "system", "content": "persona"}]
        })
        .to_string(),
    )
    .expect("seed sessions");

    breachchat_cmd(dir.path())
        .args(["sessions", "list", "--session-file"])
        .arg(&session_file)
        .assert()
        .success()
        .stdout(contains("alice\t3 messages").and(contains("bob\t1 messages")));

    breachchat_cmd(dir.path())
        .env("BC_SESSION_FILE", &session_file)
        .args(["sessions", "show", "alice"])
        .assert()
        .success()
        .stdout(contains("user: am I pwned?").and(contains("assistant: No.")));

    breachchat_cmd(dir.path())
        .env("BC_SESSION_FILE", &session_file)
        .args(["sessions", "clear", "alice"])
        .assert()
        .success()
        .stdout(contains("cleared session 'alice'"));

    let sessions = read_sessions(&session_file);
    assert!(sessions.get("alice").is_none());
    assert!(sessions.get("bob").is_some());

    breachchat_cmd(dir.path())
        .env("BC_SESSION_FILE", &session_file)
        .args(["sessions", "show", "alice"])
        .assert()
        .failure()
        .stderr(contains("Session 'alice' not found."));
}

#[test]
fn config_check_validates_profiles() {
    let dir = tempfile::tempdir().expect("temp dir");
    let config_path = dir.path().join("config.toml");
    fs::write(
        &config_path,
        "[profiles.work]\nmodel = \"gpt-4o\"\nhistory_limit = 10\n",
    )
    .expect("write config");

    breachchat_cmd(dir.path())
        .env("BC_CONFIG", &config_path)
        .args(["config", "check", "--profile", "work"])
        .assert()
        .success()
        .stdout(contains("config OK:"));

    breachchat_cmd(dir.path())
        .env("BC_CONFIG", &config_path)
        .args(["config", "check", "--profile", "home"])
        .assert()
        .failure()
        .stderr(contains("Profile 'home' not found"));

    fs::write(&config_path, "[profiles.hot]\ntemperature = 5.0\n").expect("rewrite config");
    breachchat_cmd(dir.path())
        .env("BC_CONFIG", &config_path)
        .args(["config", "check"])
        .assert()
        .failure()
        .stderr(contains("Invalid profile temperature in 'hot'"));
}

#[test]
fn completion_scripts_are_generated() {
    let dir = tempfile::tempdir().expect("temp dir");
    breachchat_cmd(dir.path())
        .args(["completion", "bash"])
        .assert()
        .success()
        .stdout(contains("_breachchat()"));

    breachchat_cmd(dir.path())
        .args(["completion", "fish"])
        .assert()
        .success()
        .stdout(contains("complete -c breachchat"));
}

#[test]
fn version_and_help_describe_the_build() {
    let dir = tempfile::tempdir().expect("temp dir");
    breachchat_cmd(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(contains("commit:").and(contains("built:")));

    breachchat_cmd(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("breachchat sessions list"));
}
