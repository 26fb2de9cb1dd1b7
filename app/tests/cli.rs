use std::{
    fs,
    path::Path,
    process::{Command, Output},
};

const CSV: &str = "\
Program,Function,Workers,CPU%,Memory(KB),IO(KB/s),Time(s)
a,cpu,2,50.0,2048,10.0,10.0
a,cpu,4,70.0,4096,12.0,6.0
a,mem,2,60.0,8192,5.0,12.0
a,mem,4,90.0,16384,6.0,8.0
a,io,2,20.0,1024,400.0,20.0
a,io,4,25.0,1024,700.0,16.0
b,cpu,2,55.0,1536,9.0,9.0
b,cpu,4,75.0,1536,11.0,5.0
b,mem,2,65.0,7168,4.0,11.0
b,mem,4,95.0,7168,5.0,7.0
b,io,2,22.0,1024,380.0,19.0
b,io,4,30.0,1024,650.0,15.0
";

fn perf_report(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_perf-report"))
        .args(args)
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn entries(dir: &Path) -> Vec<String> {
    let mut names = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    names.sort();
    names
}

#[test]
fn missing_input_fails_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let output = perf_report(dir.path(), &[]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("NotFoundError"), "{stderr}");
    assert!(entries(dir.path()).is_empty());
}

#[test]
fn missing_time_column_fails_before_rendering() {
    let dir = tempfile::tempdir().unwrap();
    let csv = CSV
        .lines()
        .map(|l| l.rsplit_once(',').unwrap().0)
        .collect::<Vec<_>>()
        .join("\n");
    fs::write(dir.path().join("measurements.csv"), csv).unwrap();
    let output = perf_report(dir.path(), &[]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("SchemaError"), "{stderr}");
    assert_eq!(entries(dir.path()), ["measurements.csv"]);
}

#[test]
fn default_run_writes_every_report() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("measurements.csv"), CSV).unwrap();
    let output = perf_report(dir.path(), &[]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "{stderr}");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Summary Statistics"));
    assert!(
        fs::read(dir.path().join("worker_scaling.pdf"))
            .unwrap()
            .starts_with(b"%PDF")
    );
    for name in [
        "throughput_vs_msg_size",
        "latency_vs_threads",
        "cache_misses_vs_msg_size",
        "cycles_per_byte_vs_msg_size",
    ] {
        let png = fs::read(dir.path().join(format!("net_io_{name}.png"))).unwrap();
        assert!(png.starts_with(b"\x89PNG"));
    }
}

#[test]
fn local_configuration_is_picked_up() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("report.yaml"),
        "name: svg\nsettings:\n  output_dir: charts\nreports:\n  - type: NetIo\n    pattern: \"{index}_{name}.svg\"\n",
    )
    .unwrap();
    let output = perf_report(dir.path(), &[]);
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let svg = fs::read_to_string(dir.path().join("charts/1_throughput_vs_msg_size.svg")).unwrap();
    assert!(svg.contains("Throughput vs Message Size"));
    assert_eq!(entries(&dir.path().join("charts")).len(), 4);
}

#[test]
fn unknown_report_type_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("custom.yaml"),
        "name: x\nreports:\n  - type: Histogram\n",
    )
    .unwrap();
    let output = perf_report(dir.path(), &["-c", "custom.yaml"]);
    assert!(!output.status.success());
    assert_eq!(entries(dir.path()), ["custom.yaml"]);
}
