use assert_cmd::Command;
use httpmock::prelude::*;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;

fn esctl_cmd(server: &MockServer) -> Command {
    let mut cmd = Command::cargo_bin("esctl").expect("esctl binary");
    cmd.env_remove("ESCTL_ELASTIC")
        .env_remove("ESCTL_USERNAME")
        .env_remove("ESCTL_PASSWORD")
        .env_remove("ESCTL_API_KEY")
        .arg("--config")
        .arg("/nonexistent/esctl/config.toml")
        .arg("--elastic")
        .arg(server.base_url());
    cmd
}

#[test]
fn shell_runs_commands_until_exit() {
    let server = MockServer::start();
    let health = server.mock(|when, then| {
        when.method(GET).path("/_cat/health");
        then.status(200).body("epoch status\n1700000000 green\n");
    });
    let nodes = server.mock(|when, then| {
        when.method(GET).path("/_cat/nodes");
        then.status(200).body("name\nnode-1\n");
    });

    esctl_cmd(&server)
        .write_stdin("cat health\nexit\ncat nodes\n")
        .assert()
        .success()
        .stdout(contains("1700000000 green"))
        .stdout(contains("Exiting REPL..."));

    health.assert_hits(1);
    nodes.assert_hits(0);
}

#[test]
fn shell_subcommand_starts_the_shell() {
    let server = MockServer::start();

    esctl_cmd(&server)
        .arg("shell")
        .write_stdin("exit\n")
        .assert()
        .success()
        .stdout(contains("Exiting REPL..."));
}

#[test]
fn command_errors_are_printed_and_the_shell_continues() {
    let server = MockServer::start();
    let missing = server.mock(|when, then| {
        when.method(GET).path("/missing");
        then.status(404).json_body_obj(&serde_json::json!({
            "error": {"type": "index_not_found_exception"}
        }));
    });
    let health = server.mock(|when, then| {
        when.method(GET).path("/_cat/health");
        then.status(200).body("status\ngreen\n");
    });

    esctl_cmd(&server)
        .write_stdin("index get missing\nexitfoo\nshell\ncat health\nexit\n")
        .assert()
        .success()
        .stdout(contains("status=404"))
        .stdout(contains("exitfoo"))
        .stdout(contains("already inside the esctl shell"))
        .stdout(contains("green"));

    missing.assert_hits(1);
    health.assert_hits(1);
}

#[test]
fn apply_errors_inside_the_shell_do_not_change_the_exit_code() {
    let server = MockServer::start();
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("bad.json");
    std::fs::write(&path, r#"{"kind": "Snapshot", "body": {}}"#).expect("write");

    esctl_cmd(&server)
        .write_stdin(format!("apply -f {}\nexit\n", path.display()))
        .assert()
        .success()
        .stdout(contains("unsupported manifest kind `Snapshot`"));
}

#[test]
fn end_of_input_leaves_the_shell_cleanly() {
    let server = MockServer::start();
    let health = server.mock(|when, then| {
        when.method(GET).path("/_cat/health");
        then.status(200).body("status\ngreen\n");
    });

    esctl_cmd(&server)
        .write_stdin("cat health\n")
        .assert()
        .success()
        .stdout(contains("green").and(contains("Exiting REPL...")));

    health.assert_hits(1);
}
