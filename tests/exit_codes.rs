use std::io::Write;
use std::process::Command;

fn contrafer_binary() -> String {
    std::env::var("CARGO_BIN_EXE_contrafer").unwrap_or_else(|_| {
        let mut path = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        path.push("target");
        path.push("debug");
        path.push("contrafer");
        if cfg!(windows) {
            path.set_extension("exe");
        }
        path.to_string_lossy().to_string()
    })
}

#[test]
fn contrafer_exits_non_zero_on_missing_input() {
    let output = Command::new(contrafer_binary())
        .arg("--input")
        .arg("missing-bundle.json")
        .output()
        .expect("run contrafer");

    assert!(!output.status.success());
}

#[test]
fn contrafer_exits_non_zero_on_malformed_bundle() {
    let mut bundle = tempfile::NamedTempFile::new().expect("temp file");
    bundle
        .write_all(br#"{"equations": "not-a-list"}"#)
        .expect("write bundle");

    let output = Command::new(contrafer_binary())
        .arg("--input")
        .arg(bundle.path())
        .output()
        .expect("run contrafer");

    assert!(!output.status.success());
}

#[test]
fn contrafer_writes_a_report_for_a_valid_bundle() {
    let mut bundle = tempfile::NamedTempFile::new().expect("temp file");
    bundle
        .write_all(
            br#"{
              "declarations": [
                {
                  "owner": {"package": "com.acme", "names": ["Util"]},
                  "name": "requireNonNull",
                  "params": [{"class": {"package": "java.lang", "names": ["Object"]}}],
                  "return_type": {"class": {"package": "java.lang", "names": ["Object"]}}
                }
              ],
              "equations": [
                {
                  "id": {
                    "member": {
                      "owner": "com/acme/Util",
                      "name": "requireNonNull",
                      "descriptor": "(Ljava/lang/Object;)Ljava/lang/Object;"
                    },
                    "direction": {"in": {"param": 0, "constraint": "null"}},
                    "stable": true
                  },
                  "rhs": {"final": "fail"}
                },
                {
                  "id": {
                    "member": {
                      "owner": "com/acme/Util",
                      "name": "requireNonNull",
                      "descriptor": "(Ljava/lang/Object;)Ljava/lang/Object;"
                    },
                    "direction": {"in": {"param": 0, "constraint": "not_null"}},
                    "stable": true
                  },
                  "rhs": {"final": "not_null"}
                },
                {
                  "id": {
                    "member": {
                      "owner": "com/acme/Util",
                      "name": "requireNonNull",
                      "descriptor": "(Ljava/lang/Object;)Ljava/lang/Object;"
                    },
                    "direction": "pure",
                    "stable": true
                  },
                  "rhs": {"effects": []}
                }
              ]
            }"#,
        )
        .expect("write bundle");

    let output = Command::new(contrafer_binary())
        .arg("--input")
        .arg(bundle.path())
        .arg("--quiet")
        .output()
        .expect("run contrafer");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("parse report JSON");
    assert_eq!(report["tool"]["name"], "contrafer");
    let declaration = &report["declarations"][0];
    assert_eq!(declaration["owner"], "com/acme/Util");
    assert_eq!(declaration["name"], "requireNonNull");
    assert_eq!(declaration["pure"], true);
    assert_eq!(declaration["not_null"], false);
    assert_eq!(declaration["contract"], "\"null->fail;!null->!null\"");
    assert_eq!(report["stats"]["equations"], 3);
}
