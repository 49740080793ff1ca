use std::fs;
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_data: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_data = base.join("xdg-data");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_data).expect("failed to create XDG_DATA_HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_data,
            xdg_config,
            xdg_state,
        }
    }
}

fn run_riffwatch(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("riffwatch"));

    Command::new(bin_path)
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_DATA_HOME", &env.xdg_data)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute riffwatch: {e}"))
}

#[test]
fn test_startup_aborts_when_query_port_is_taken() {
    let env = CliTestEnv::new();
    let occupied = TcpListener::bind("127.0.0.1:0").expect("failed to bind occupied port");
    let port = occupied.local_addr().unwrap().port().to_string();

    let output = run_riffwatch(&env, &["--port", &port]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "riffwatch should refuse to start");
    assert!(
        stderr.contains("already in use"),
        "missing port diagnostic in stderr:\n{stderr}"
    );
    assert!(
        !env.xdg_data.join("riffwatch/song_tips.json").exists(),
        "nothing should be written when startup aborts"
    );
}

#[test]
fn test_invalid_config_is_rejected() {
    let env = CliTestEnv::new();
    let config_dir = env.xdg_config.join("riffwatch");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(
        config_dir.join("config.toml"),
        "[telemetry]\nbackoff_base_ms = 5000\nbackoff_max_ms = 100\n",
    )
    .unwrap();

    let output = run_riffwatch(&env, &[]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("backoff_base_ms"), "stderr:\n{stderr}");
}

#[test]
fn test_zero_interval_flag_is_rejected() {
    let env = CliTestEnv::new();

    let output = run_riffwatch(&env, &["--interval-ms", "0", "--port", "0"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("interval_ms"), "stderr:\n{stderr}");
}

#[test]
fn test_unknown_mode_is_rejected() {
    let env = CliTestEnv::new();

    let output = run_riffwatch(&env, &["--mode", "carrier-pigeon"]);

    assert!(!output.status.success());
    assert!(!output.stderr.is_empty());
}
