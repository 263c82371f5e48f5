use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;

fn config_hash_line(stdout: &[u8]) -> String {
    String::from_utf8_lossy(stdout)
        .lines()
        .find(|l| l.starts_with("config_hash="))
        .unwrap_or_default()
        .to_string()
}

/// Layered files hash identically across invocations, and an overlay
/// changes both the hash and the canonical JSON.
#[test]
fn config_hash_is_stable_and_layered() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let base = dir.path().join("base.yaml");
    let overlay = dir.path().join("overlay.yaml");
    fs::write(&base, "autopilot:\n  batch_size: 5\n  queue_field: author\n")?;
    fs::write(&overlay, "autopilot:\n  batch_size: 50\n")?;
    let base_s = base.to_string_lossy().to_string();
    let overlay_s = overlay.to_string_lossy().to_string();

    let first = Command::cargo_bin("sqc")?
        .args(["config-hash", &base_s])
        .output()?;
    let second = Command::cargo_bin("sqc")?
        .args(["config-hash", &base_s])
        .output()?;
    assert!(first.status.success());
    assert_eq!(config_hash_line(&first.stdout), config_hash_line(&second.stdout));

    let mut layered = Command::cargo_bin("sqc")?;
    layered.args(["config-hash", &base_s, &overlay_s]);
    let out = layered.output()?;
    assert!(out.status.success());
    assert_ne!(config_hash_line(&first.stdout), config_hash_line(&out.stdout));
    assert!(String::from_utf8_lossy(&out.stdout).contains("\"batch_size\":50"));
    assert!(String::from_utf8_lossy(&out.stdout).contains("\"queue_field\":\"author\""));
    Ok(())
}

#[test]
fn config_hash_refuses_literal_secrets() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("leaky.yaml");
    fs::write(&path, "notes:\n  token: \"ghp_abcdefghijklmnop\"\n")?;

    let mut cmd = Command::cargo_bin("sqc")?;
    cmd.args(["config-hash", &path.to_string_lossy()]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_SECRET_DETECTED"));
    Ok(())
}
