use std::{env, fs, path::PathBuf, process::Command};

fn run_bin(args: &[&str]) -> bool {
    let bin = PathBuf::from(env!("CARGO_BIN_EXE_tabstat"));

    let output = Command::new(bin)
        .args(args)
        .output()
        .expect("failed to execute command");

    let stdout_str =
        std::str::from_utf8(&output.stdout).expect("failed to convert stdout to string");
    let stderr_str =
        std::str::from_utf8(&output.stderr).expect("failed to convert stderr to string");
    if !output.status.success() {
        eprintln!("{args:?} failed\nstdout:\n{stdout_str}\nstderr:\n{stderr_str}\n");
    }
    output.status.success()
}

fn fresh_dir(name: &str) -> PathBuf {
    let test_dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join(name);
    fs::remove_dir_all(&test_dir).ok();
    fs::create_dir(&test_dir).expect("failed to create test directory");
    test_dir
}

#[test]
fn passengers_workflow() {
    let test_dir = fresh_dir("passengers_workflow");
    let test_dir_str = test_dir
        .to_str()
        .expect("failed to convert test directory to string");

    let args = ["--work-dir", test_dir_str, "generate", "--dataset", "passengers"];
    assert!(run_bin(&args));
    assert!(test_dir.join("data.csv").exists());
    assert!(test_dir.join("config.toml").exists());

    assert!(run_bin(&["--work-dir", test_dir_str, "decompose"]));
    assert!(test_dir.join("out-decomposition.csv").exists());

    assert!(run_bin(&["--work-dir", test_dir_str, "run"]));
    let forecast = fs::read_to_string(test_dir.join("out-forecast.csv"))
        .expect("failed to read forecast file");
    assert!(forecast.starts_with("index,Passengers\n1961-01-01,"));
    assert_eq!(forecast.lines().count(), 13);

    assert!(run_bin(&["--work-dir", test_dir_str, "purge"]));
    assert!(!test_dir.join("out-forecast.csv").exists());
    assert!(test_dir.join("data.csv").exists());

    fs::remove_dir_all(&test_dir).ok();
}

#[test]
fn income_workflow() {
    let test_dir = fresh_dir("income_workflow");
    let test_dir_str = test_dir
        .to_str()
        .expect("failed to convert test directory to string");

    let args = ["--work-dir", test_dir_str, "generate", "--dataset", "income", "--seed", "42"];
    assert!(run_bin(&args));
    assert!(run_bin(&["--work-dir", test_dir_str, "clean"]));
    let cleaned = fs::read_to_string(test_dir.join("out-cleaned.csv"))
        .expect("failed to read cleaned file");
    assert!(cleaned.starts_with("Age,Income,AgeGroup\n"));
    assert!(cleaned.lines().count() < 101);
    for name in ["out-train.csv", "out-test.csv"] {
        let part = fs::read_to_string(test_dir.join(name)).expect("failed to read split file");
        assert!(part.starts_with("Age,Income,AgeGroup\n"));
    }

    assert!(run_bin(&["--work-dir", test_dir_str, "describe"]));
    assert!(test_dir.join("out-report.msgpack").exists());
    let clusters = fs::read_to_string(test_dir.join("out-clusters.csv"))
        .expect("failed to read clusters file");
    assert_eq!(clusters.lines().count(), cleaned.lines().count());

    fs::remove_dir_all(&test_dir).ok();
}

#[test]
fn failures_exit_with_error() {
    let test_dir = fresh_dir("failures_exit_with_error");
    let test_dir_str = test_dir
        .to_str()
        .expect("failed to convert test directory to string");

    assert!(!run_bin(&["--work-dir", test_dir_str, "run"]));

    fs::write(
        test_dir.join("config.toml"),
        "[source]\nfile = \"absent.csv\"\n",
    )
    .expect("failed to write config file");
    assert!(!run_bin(&["--work-dir", test_dir_str, "clean"]));

    fs::remove_dir_all(&test_dir).ok();
}
