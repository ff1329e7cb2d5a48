use std::process::Command;

const CONFIG: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/strategy.toml");

fn ratio_spread(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_ratio-spread"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run ratio-spread")
}

#[test]
fn check_config_accepts_shipped_config() {
    let output = ratio_spread(&["check-config", "--config", CONFIG]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"instrument\": \"NIFTY\""));
    assert!(stdout.contains("OK: 3 legs, quantities [50, 150, 100], INTRADAY product"));
}

#[test]
fn check_config_rejects_contradictory_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("strategy.toml");
    let shipped = std::fs::read_to_string(CONFIG).unwrap();
    std::fs::write(&path, shipped.replace("ratio = [1, 3, 2]", "ratio = [1, 3]")).unwrap();

    let output = ratio_spread(&["check-config", "--config", path.to_str().unwrap()]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("same length"));
}

#[test]
fn ladder_preview_prints_weekly_symbols() {
    let output = ratio_spread(&[
        "ladder", "--config", CONFIG, "--spot", "26015", "--date", "2026-10-12",
    ]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ATM 26000 expiry 2026-10-20"));
    assert!(stdout.contains("LEG2_SELL_26400CE"));
    assert!(stdout.contains("NSE:NIFTY26O2026400CE"));
}

#[test]
fn ladder_preview_fails_without_matching_expiry() {
    let output = ratio_spread(&[
        "ladder", "--config", CONFIG, "--spot", "26015", "--date", "2026-10-13",
    ]);

    assert!(!output.status.success());
}
