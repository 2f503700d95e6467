mod common;

use std::process::{Command, Output};

use common::{cloudassess_cmd, make_temp_home, write_file};

fn show_config(cmd: &mut Command) -> (Output, serde_json::Value) {
    let out = cmd
        .args(["--json", "config", "--show"])
        .output()
        .expect("run cloudassess");
    let v = serde_json::from_slice(&out.stdout).unwrap_or(serde_json::Value::Null);
    (out, v)
}

#[test]
fn defaults_apply_without_a_config_file() {
    let home = make_temp_home("config");
    let (out, v) = show_config(&mut cloudassess_cmd(&home));
    assert!(out.status.success());
    assert_eq!(v["cloud"]["cli"], "gcloud");
    assert_eq!(v["cloud"]["target_flag"], "--project");
    assert_eq!(v["dispatch"]["timeout_secs"], 60);
    assert_eq!(v["gate"]["soft_threshold"], 70);
    assert_eq!(v["gate"]["hard_minimum"], 0);
    assert!(v.get("config_path").is_none());
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn env_overrides_config_file() {
    let home = make_temp_home("config");
    write_file(
        &home.join(".config/cloudassess/config.toml"),
        "[dispatch]\ntimeout_secs = 5\n\n[gate]\nsoft_threshold = 80\n",
    );

    let mut cmd = cloudassess_cmd(&home);
    cmd.env("CLOUDASSESS_DISPATCH_TIMEOUT_SECS", "7");
    let (out, v) = show_config(&mut cmd);
    assert!(out.status.success());
    assert_eq!(v["dispatch"]["timeout_secs"], 7);
    assert_eq!(v["gate"]["soft_threshold"], 80);
    assert!(
        v["config_path"]
            .as_str()
            .unwrap_or_default()
            .ends_with("config.toml")
    );
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn explicit_config_flag_wins_over_env_path() {
    let home = make_temp_home("config");
    let from_env = home.join("env.toml");
    let from_flag = home.join("flag.toml");
    write_file(&from_env, "[gate]\nsoft_threshold = 60\n");
    write_file(&from_flag, "[gate]\nsoft_threshold = 90\n");

    let mut cmd = cloudassess_cmd(&home);
    cmd.env("CLOUDASSESS_CONFIG", &from_env);
    cmd.arg("--config").arg(&from_flag);
    let (out, v) = show_config(&mut cmd);
    assert!(out.status.success());
    assert_eq!(v["gate"]["soft_threshold"], 90);
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn invalid_config_exits_2() {
    let home = make_temp_home("config");
    write_file(
        &home.join(".config/cloudassess/config.toml"),
        "[gate]\nsoft_threshold = 50\nhard_minimum = 60\n",
    );
    let (out, _) = show_config(&mut cloudassess_cmd(&home));
    assert_eq!(out.status.code(), Some(2));

    write_file(
        &home.join(".config/cloudassess/config.toml"),
        "[nope]\nx = 1\n",
    );
    let (out, _) = show_config(&mut cloudassess_cmd(&home));
    assert_eq!(out.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn missing_explicit_config_exits_2() {
    let home = make_temp_home("config");
    let mut cmd = cloudassess_cmd(&home);
    cmd.arg("--config").arg(home.join("absent.toml"));
    let (out, _) = show_config(&mut cmd);
    assert_eq!(out.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn invalid_env_value_exits_2() {
    let home = make_temp_home("config");
    let mut cmd = cloudassess_cmd(&home);
    cmd.env("CLOUDASSESS_UI_COLOR", "maybe");
    let (out, _) = show_config(&mut cmd);
    assert_eq!(out.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&home);
}
