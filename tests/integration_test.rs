// SPDX-License-Identifier: AGPL-3.0-or-later
//! Integration tests for Outpost

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::{tempdir, TempDir};

const LOG_LINE: &str = r"^\d{4} [A-Z][a-z]{2} \d{2} \d{2}:\d{2}: ";

fn outpost(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("outpost").unwrap();
    cmd.current_dir(dir).env_remove("RUST_LOG");
    cmd
}

/// Workspace whose orchestration and engine programs are `program`
fn workspace(program: &str) -> TempDir {
    let temp_dir = tempdir().unwrap();
    let config = format!(
        r#"name = "test"

[compose]
program = "{program}"

[engine]
program = "{program}"
"#
    );
    std::fs::write(temp_dir.path().join("outpost.toml"), config).unwrap();
    temp_dir
}

fn log_lines(dir: &Path) -> Vec<String> {
    match std::fs::read_to_string(dir.join("VPNclients.log")) {
        Ok(contents) => contents.lines().map(str::to_string).collect(),
        Err(_) => Vec::new(),
    }
}

fn sample_descriptors() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("deploy")
}

/// Test the version command
#[test]
fn test_version_command() {
    let temp_dir = tempdir().unwrap();
    outpost(temp_dir.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("Outpost v"));
}

/// Test the help output
#[test]
fn test_help_command() {
    let temp_dir = tempdir().unwrap();
    outpost(temp_dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("create-client"))
        .stdout(predicate::str::contains("revoke-client"))
        .stdout(predicate::str::contains("validate"));
}

/// Test init command
#[test]
fn test_init_command() {
    let temp_dir = tempdir().unwrap();
    outpost(temp_dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created configuration file"));

    let contents = std::fs::read_to_string(temp_dir.path().join("outpost.toml")).unwrap();
    assert!(contents.contains("[compose]"));

    outpost(temp_dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    outpost(temp_dir.path()).args(["init", "--force"]).assert().success();
}

/// Test config display without a config file
#[test]
fn test_config_defaults() {
    let temp_dir = tempdir().unwrap();
    outpost(temp_dir.path())
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("Using defaults"))
        .stdout(predicate::str::contains("docker-compose"));
}

#[test]
fn test_invalid_config_file() {
    let temp_dir = tempdir().unwrap();
    std::fs::write(temp_dir.path().join("outpost.toml"), "name = \n").unwrap();
    outpost(temp_dir.path()).arg("config").assert().failure();
}

#[test]
fn test_create_client_without_name() {
    let temp_dir = workspace("echo");
    outpost(temp_dir.path())
        .arg("create-client")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Usage: outpost create-client <client_name>"))
        .stdout(predicate::str::contains("easyrsa").not());

    assert!(log_lines(temp_dir.path()).is_empty());
}

#[test]
fn test_revoke_client_without_name() {
    let temp_dir = workspace("echo");
    outpost(temp_dir.path())
        .args(["revoke-client", ""])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Usage: outpost revoke-client <client_name>"));

    assert!(log_lines(temp_dir.path()).is_empty());
}

#[test]
fn test_create_client_logs_once() {
    let temp_dir = workspace("echo");
    outpost(temp_dir.path())
        .args(["create-client", "alice"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "run --rm openvpn easyrsa build-client-full alice nopass",
        ))
        .stdout(predicate::str::contains("Client created"));

    let conf = temp_dir.path().join("client-confs").join("alice.ovpn");
    let exported = std::fs::read_to_string(conf).unwrap();
    assert!(exported.contains("ovpn_getclient alice"));

    let lines = log_lines(temp_dir.path());
    assert_eq!(lines.len(), 1);
    let format = predicate::str::is_match(format!("{}created alice$", LOG_LINE)).unwrap();
    assert!(format.eval(lines[0].as_str()), "unexpected log line: {}", lines[0]);
}

#[test]
fn test_revoke_client_removes_conf() {
    let temp_dir = workspace("echo");
    outpost(temp_dir.path())
        .args(["create-client", "bob"])
        .assert()
        .success();

    let conf = temp_dir.path().join("client-confs").join("bob.ovpn");
    assert!(conf.exists());

    outpost(temp_dir.path())
        .args(["revoke-client", "bob"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ovpn_revokeclient bob remove"));
    assert!(!conf.exists());

    let lines = log_lines(temp_dir.path());
    assert_eq!(lines.len(), 2);
    let format = predicate::str::is_match(format!("{}revoked bob$", LOG_LINE)).unwrap();
    assert!(format.eval(lines[1].as_str()));
}

#[test]
fn test_revoke_client_without_conf() {
    let temp_dir = workspace("echo");
    outpost(temp_dir.path())
        .args(["revoke-client", "carol"])
        .assert()
        .success();

    let lines = log_lines(temp_dir.path());
    assert_eq!(lines.len(), 1);
    assert!(lines[0].ends_with(": revoked carol"));
}

#[test]
fn test_failed_commands_continue_by_default() {
    let temp_dir = workspace("false");
    outpost(temp_dir.path())
        .args(["create-client", "dave"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Completed with 2 failed command(s) of 2"));

    assert!(!temp_dir.path().join("client-confs").join("dave.ovpn").exists());
    assert_eq!(log_lines(temp_dir.path()).len(), 1);
}

#[test]
fn test_strict_stops_at_first_failure() {
    let temp_dir = workspace("false");
    outpost(temp_dir.path())
        .args(["--strict", "create-client", "erin"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("build-client-full erin"));

    assert!(log_lines(temp_dir.path()).is_empty());
}

#[test]
fn test_create_client_dry_run() {
    let temp_dir = workspace("echo");
    outpost(temp_dir.path())
        .args(["--dry-run", "create-client", "frank"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "[DRY RUN] Would execute: echo run --rm openvpn ovpn_getclient frank",
        ));

    assert!(!temp_dir.path().join("client-confs").exists());
    assert!(log_lines(temp_dir.path()).is_empty());
}

#[test]
fn test_init_pki_without_env_file() {
    let temp_dir = workspace("echo");
    outpost(temp_dir.path())
        .arg("init-pki")
        .assert()
        .code(1)
        .stderr(predicate::str::contains(".env"))
        .stdout(predicate::str::contains("ovpn_genconfig").not());
}

#[test]
fn test_init_pki_missing_hostname() {
    let temp_dir = workspace("echo");
    std::fs::write(temp_dir.path().join(".env"), "PROTO=udp\n").unwrap();
    outpost(temp_dir.path())
        .arg("init-pki")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("HOSTNAME"));
}

#[test]
fn test_init_pki() {
    let temp_dir = workspace("echo");
    std::fs::write(
        temp_dir.path().join(".env"),
        "# server\nexport PROTO=udp\nHOSTNAME=\"vpn.example.com\"\n",
    )
    .unwrap();

    outpost(temp_dir.path())
        .arg("init-pki")
        .assert()
        .success()
        .stdout(predicate::str::contains("ovpn_genconfig -u udp://vpn.example.com"))
        .stdout(predicate::str::contains("ovpn_initpki"));
}

#[test]
fn test_validate_sample_descriptors() {
    let temp_dir = tempdir().unwrap();
    outpost(temp_dir.path())
        .arg("validate")
        .arg(sample_descriptors())
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid"))
        .stdout(predicate::str::contains("Declarations: 7"));
}

#[test]
fn test_order_puts_targets_first() {
    let temp_dir = tempdir().unwrap();
    let output = outpost(temp_dir.path())
        .arg("order")
        .arg(sample_descriptors())
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let position = |address: &str| stdout.find(address).unwrap();
    assert!(position("disk_image.vpn_base") < position("compute_instance.vpn"));
    assert!(position("container_image.openvpn") < position("container.openvpn"));
    assert!(position("object_storage_bucket.assets") < position("object_storage_key.assets"));
}

#[test]
fn test_validate_rejects_dangling_reference() {
    let temp_dir = tempdir().unwrap();
    let descriptor = temp_dir.path().join("broken.toml");
    std::fs::write(
        &descriptor,
        r#"
[[provider]]
namespace = "container"
provider = "docker"
source = "kreuzwerker/docker"

[[resource]]
type = "container"
name = "openvpn"

[resource.attributes]
image = { ref = "container_image.missing.image_id" }
"#,
    )
    .unwrap();

    outpost(temp_dir.path())
        .arg("validate")
        .arg(&descriptor)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("is invalid"))
        .stderr(predicate::str::contains("container_image.missing"));
}

#[test]
fn test_render_to_file() {
    let temp_dir = tempdir().unwrap();
    let out = temp_dir.path().join("main.tf.json");

    outpost(temp_dir.path())
        .arg("render")
        .arg(sample_descriptors())
        .arg("--out")
        .arg(&out)
        .assert()
        .success();

    let rendered: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(
        rendered["resource"]["linode_instance"]["vpn"]["image"],
        "${linode_image.vpn_base.id}"
    );
    assert_eq!(
        rendered["resource"]["linode_object_storage_bucket"]["assets"]["cluster"],
        "${data.linode_object_storage_cluster.primary.id}"
    );
    assert!(rendered["terraform"]["required_providers"]["docker"].is_object());
}

#[test]
fn test_plan_requires_token() {
    let temp_dir = workspace("echo");
    outpost(temp_dir.path())
        .arg("plan")
        .arg(sample_descriptors())
        .env_remove("LINODE_TOKEN")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("LINODE_TOKEN"));
}

#[test]
fn test_plan_runs_engine() {
    let temp_dir = workspace("echo");
    outpost(temp_dir.path())
        .arg("plan")
        .arg(sample_descriptors())
        .env("LINODE_TOKEN", "test-token")
        .assert()
        .success()
        .stdout(predicate::str::contains("init -input=false"))
        .stdout(predicate::str::contains("Engine plan completed"));

    let rendered = temp_dir.path().join(".outpost/engine/main.tf.json");
    let contents = std::fs::read_to_string(rendered).unwrap();
    assert!(contents.contains("linode_instance"));
    assert!(!contents.contains("test-token"));
}

#[test]
fn test_dry_run_plan_prints_commands_only() {
    let temp_dir = workspace("echo");
    outpost(temp_dir.path())
        .args(["--dry-run", "plan"])
        .arg(sample_descriptors())
        .env_remove("LINODE_TOKEN")
        .assert()
        .success()
        .stdout(predicate::str::contains("[DRY RUN] Would execute: echo init -input=false"))
        .stdout(predicate::str::contains("[DRY RUN] Would execute: echo plan"))
        .stdout(predicate::str::contains("Engine plan completed").not());

    assert!(!temp_dir.path().join(".outpost").exists());
}

#[test]
fn test_configured_log_level_applies_without_flags() {
    let temp_dir = tempdir().unwrap();
    std::fs::write(
        temp_dir.path().join("outpost.toml"),
        "name = \"test\"\n\n[logging]\nlevel = \"info\"\n",
    )
    .unwrap();

    outpost(temp_dir.path())
        .arg("validate")
        .arg(sample_descriptors())
        .assert()
        .success()
        .stderr(predicate::str::contains("Loading descriptors"));

    outpost(temp_dir.path())
        .arg("validate")
        .arg(sample_descriptors())
        .env("RUST_LOG", "error")
        .assert()
        .success()
        .stderr(predicate::str::contains("Loading descriptors").not());
}

#[test]
fn test_bucket_requires_target() {
    let temp_dir = workspace("echo");
    outpost(temp_dir.path())
        .args(["bucket", "ssl-status"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--cluster/--bucket"));
}

#[test]
fn test_bucket_requires_token() {
    let temp_dir = workspace("echo");
    outpost(temp_dir.path())
        .args(["bucket", "ssl-status", "--cluster", "us-east-1", "--bucket", "assets"])
        .env_remove("LINODE_BUCKET_ACCESS_KEY")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("LINODE_BUCKET_ACCESS_KEY is not set"));
}
