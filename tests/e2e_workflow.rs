//! End-to-end workflow test
//!
//! Tests the complete workflow on a Capacitor-style Android project:
//! 1. Discover operation files
//! 2. Apply them (staged, then committed)
//! 3. Check the patched scripts still parse
//! 4. Find the blocks that were created

use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

const BIN: &str = env!("CARGO_BIN_EXE_gradle-patcher");

fn fixture(name: &str) -> String {
    fs::read_to_string(Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name))
        .unwrap()
}

/// Create an Android project with two operation files
fn setup_e2e_project() -> TempDir {
    let dir = TempDir::new().unwrap();

    fs::create_dir_all(dir.path().join("app")).unwrap();
    fs::create_dir_all(dir.path().join("gradle-patches")).unwrap();
    fs::write(
        dir.path().join("build.gradle"),
        fixture("android/build.gradle"),
    )
    .unwrap();
    fs::write(
        dir.path().join("app/build.gradle"),
        fixture("android/app/build.gradle"),
    )
    .unwrap();

    fs::write(
        dir.path().join("gradle-patches/01-repositories.toml"),
        r#"[meta]
name = "repositories"

[[operations]]
id = "jitpack"
file = "build.gradle"
target = { allprojects = { repositories = {} } }

[[operations.properties]]
name = "maven"

[[operations.properties.block]]
name = "url"
value = "'https://jitpack.io'"
form = "statement"
"#,
    )
    .unwrap();

    fs::write(
        dir.path().join("gradle-patches/02-app.toml"),
        r#"[meta]
name = "app"

[[operations]]
id = "java-17"
file = "app/build.gradle"
target = { android = { compileOptions = {} } }

[[operations.properties]]
name = "sourceCompatibility"
value = "JavaVersion.VERSION_17"
form = "statement"

[[operations.properties]]
name = "targetCompatibility"
value = "JavaVersion.VERSION_17"
form = "statement"

[[operations]]
id = "kotlin-plugin"
file = "app/build.gradle"

[[operations.properties]]
name = "apply plugin"
value = "'kotlin-android'"
form = "property"
"#,
    )
    .unwrap();

    dir
}

#[test]
fn test_e2e_workflow() {
    let dir = setup_e2e_project();
    let root = dir.path();

    // Step 1: list discovers both files in order
    let output = Command::new(BIN)
        .args(["list", "--root", root.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let jitpack = stdout.find("jitpack").unwrap();
    let java = stdout.find("java-17").unwrap();
    assert!(jitpack < java);

    // Step 2: apply everything
    let output = Command::new(BIN)
        .args(["apply", "--yes", "--root", root.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "apply failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let top = fs::read_to_string(root.join("build.gradle")).unwrap();
    assert!(top.contains("        maven {\n            url 'https://jitpack.io'\n        }\n    }\n}\n"));
    // Untouched regions keep their exact bytes.
    let original_top = fixture("android/build.gradle");
    let head = original_top.find("allprojects").unwrap();
    assert_eq!(&top[..head], &original_top[..head]);

    let app = fs::read_to_string(root.join("app/build.gradle")).unwrap();
    assert!(app.contains("    compileOptions {\n        sourceCompatibility JavaVersion.VERSION_17\n"));
    assert!(app.ends_with("apply plugin: 'kotlin-android'\n"));

    // Step 3: both scripts still parse
    for file in ["build.gradle", "app/build.gradle"] {
        let output = Command::new(BIN)
            .args(["check", "--file", file])
            .current_dir(root)
            .output()
            .unwrap();
        assert!(output.status.success(), "{file} no longer parses");
    }

    // Step 4: the created block is found
    let output = Command::new(BIN)
        .args([
            "find",
            "--file",
            "app/build.gradle",
            "--pattern",
            r#"{"android": {"compileOptions": {}}}"#,
        ])
        .current_dir(root)
        .output()
        .unwrap();
    assert!(output.status.success());
    let matches: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(matches.as_array().unwrap().len(), 1);
}
