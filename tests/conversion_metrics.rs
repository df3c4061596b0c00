#![cfg(unix)]

use std::{
    collections::HashSet,
    fs,
    os::unix::fs::PermissionsExt,
    path::PathBuf,
    time::Duration,
};

use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use tempfile::TempDir;

use stampa::{
    application::convert::{ConversionService, ConvertError},
    config::ConverterSettings,
};

fn write_script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, body).expect("write script");
    let mut perms = fs::metadata(&path).expect("metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("set perms");
    path
}

fn service(dir: &TempDir, binary: PathBuf, timeout: Duration) -> ConversionService {
    let settings = ConverterSettings {
        binary_path: binary,
        timeout,
        scratch_dir: dir.path().join("scratch"),
    };
    ConversionService::new(&settings).expect("conversion service")
}

#[tokio::test]
async fn conversion_outcomes_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let dir = TempDir::new().expect("temp dir");

    let ok_script = write_script(
        &dir,
        "ok-converter",
        r#"#!/bin/sh
set -eu
printf '%%PDF-1.4\n' > "$2"
"#,
    );
    let failing_script = write_script(
        &dir,
        "failing-converter",
        r#"#!/bin/sh
echo "boom" >&2
exit 3
"#,
    );
    let hung_script = write_script(
        &dir,
        "hung-converter",
        r#"#!/bin/sh
sleep 30
"#,
    );

    let slow = Duration::from_secs(5);
    service(&dir, ok_script, slow)
        .render_pdf("<html></html>")
        .await
        .expect("successful conversion");

    let failure = service(&dir, failing_script, slow)
        .render_pdf("<html></html>")
        .await
        .expect_err("converter exits non-zero");
    assert!(matches!(failure, ConvertError::Converter { .. }));

    let timeout = service(&dir, hung_script, Duration::from_millis(200))
        .render_pdf("<html></html>")
        .await
        .expect_err("converter hangs past the ceiling");
    assert!(matches!(timeout, ConvertError::Timeout { .. }));

    let missing = service(&dir, dir.path().join("does-not-exist"), slow)
        .render_pdf("<html></html>")
        .await
        .expect_err("binary is absent");
    assert!(matches!(missing, ConvertError::NotFound(_)));

    let mut names = HashSet::new();
    let mut latency_samples = 0;
    for (composite_key, _, _, value) in snapshotter.snapshot().into_vec() {
        let name = composite_key.key().name().to_string();
        if name == "stampa_conversion_ms" {
            if let DebugValue::Histogram(samples) = &value {
                latency_samples = samples.len();
            }
        }
        names.insert(name);
    }

    let expected = [
        "stampa_conversion_success_total",
        "stampa_conversion_converter_error_total",
        "stampa_conversion_timeout_total",
        "stampa_conversion_io_error_total",
        "stampa_conversion_ms",
    ];
    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }

    assert_eq!(
        latency_samples, 4,
        "latency histogram must record every outcome"
    );
}
