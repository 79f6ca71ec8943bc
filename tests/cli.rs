use assert_cmd::prelude::*;
use predicates::str::contains;
use std::io::Write;
use std::path::Path;
use std::process::Command;
use tempfile::NamedTempFile;

fn shader(name: &str) -> String {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("shaders")
        .join(name)
        .display()
        .to_string()
}

fn write_config(body: &str) -> NamedTempFile {
    let xml = format!(
        r#"<umbra>
  <shaders>
    <lit><vertex>{}</vertex><fragment>{}</fragment></lit>
    <depth><vertex>{}</vertex><fragment>{}</fragment></depth>
  </shaders>
  {body}
</umbra>
"#,
        shader("lit.vert.wgsl"),
        shader("lit.frag.wgsl"),
        shader("shadow.vert.wgsl"),
        shader("shadow.frag.wgsl"),
    );
    let mut tmp = NamedTempFile::new().expect("temp config");
    tmp.write_all(xml.as_bytes()).expect("write config");
    tmp
}

#[test]
fn headless_run_prints_builtin_scene() {
    let mut cmd = Command::cargo_bin("umbra").expect("binary exists");
    cmd.current_dir(env!("CARGO_MANIFEST_DIR"))
        .args(["--headless", "--frames", "5"]);
    cmd.assert()
        .success()
        .stdout(contains("Rendered 5 frame(s) from 3 mesh(es) and 3 texture(s)"))
        .stdout(contains("Final object states:"))
        .stdout(contains(" - Floor"))
        .stdout(contains(" - Ball"));
}

#[test]
fn headless_run_uses_configured_primitives() {
    let config = write_config(
        r#"<primitive>
    <name>Ground</name>
    <mass>0</mass>
    <scale>8 0.2 8</scale>
  </primitive>
  <primitive>
    <name>Marble</name>
    <shape>sphere</shape>
    <position>0 2 0</position>
  </primitive>"#,
    );

    let mut cmd = Command::cargo_bin("umbra").expect("binary exists");
    cmd.arg(config.path()).args(["--headless", "--frames", "3"]);
    cmd.assert()
        .success()
        .stdout(contains("0 model(s) and 2 primitive(s)"))
        .stdout(contains("2 shadow draw(s), 2 main draw(s)"))
        .stdout(contains(" - Marble"))
        .stdout(contains("  Object 1: Marble"));
}

#[test]
fn missing_model_reports_path() {
    let config = write_config(
        r#"<model>
    <name>Statue</name>
    <mesh>/nonexistent/statue.obj</mesh>
    <texture>/nonexistent/statue.png</texture>
  </model>"#,
    );

    let mut cmd = Command::cargo_bin("umbra").expect("binary exists");
    cmd.arg(config.path()).args(["--headless", "--frames", "1"]);
    cmd.assert()
        .failure()
        .stderr(contains("/nonexistent/statue.obj"));
}

#[test]
fn rejects_unknown_flags() {
    let mut cmd = Command::cargo_bin("umbra").expect("binary exists");
    cmd.arg("--turbo");
    cmd.assert().failure().stderr(contains("Unknown argument: --turbo"));
}
