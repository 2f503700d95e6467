#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

const ENV_KEYS: &[&str] = &[
    "CLOUDASSESS_CONFIG",
    "CLOUDASSESS_CLOUD_CLI",
    "CLOUDASSESS_CLOUD_TARGET_FLAG",
    "CLOUDASSESS_DISPATCH_TIMEOUT_SECS",
    "CLOUDASSESS_GATE_SOFT_THRESHOLD",
    "CLOUDASSESS_GATE_HARD_MINIMUM",
    "CLOUDASSESS_UI_COLOR",
    "CLOUDASSESS_UI_MAX_TABLE_ROWS",
    "CLOUDASSESS_LOGS_ENABLED",
];

/// The binary with HOME pointed at `home` and no inherited overrides.
pub fn cloudassess_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_cloudassess"));
    cmd.env("HOME", home);
    for key in ENV_KEYS {
        cmd.env_remove(key);
    }
    cmd
}

pub fn make_temp_home(label: &str) -> PathBuf {
    static HOME_SEQ: AtomicU64 = AtomicU64::new(0);
    let seq = HOME_SEQ.fetch_add(1, Ordering::Relaxed);
    let home = std::env::temp_dir().join(format!(
        "cloudassess-{label}-{}-{seq}",
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&home);
    std::fs::create_dir_all(&home).expect("create home");
    home
}

pub fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("mkdirs");
    }
    std::fs::write(path, contents).expect("write");
}
