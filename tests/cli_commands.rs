use assert_cmd::prelude::*;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = format!("state_dir: {}\n", dir.path().join("state").display());
        std::fs::write(dir.path().join("config.yaml"), config).expect("config");
        Self { dir }
    }

    fn write(&self, name: &str, value: &Value) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, serde_json::to_string_pretty(value).unwrap()).expect("fixture");
        path
    }

    fn config(&self) -> PathBuf {
        self.dir.path().join("config.yaml")
    }

    fn command(&self) -> Command {
        let bin = assert_cmd::cargo::cargo_bin!("listing-pilot");
        let mut cmd = Command::new(bin);
        cmd.env_remove("RUST_LOG")
            .arg("--config")
            .arg(self.config())
            .args(["--output", "json"]);
        cmd
    }
}

fn stdout_json(output: &std::process::Output) -> Value {
    let stdout = String::from_utf8(output.stdout.clone()).expect("utf8 output");
    serde_json::from_str(&stdout).unwrap_or_else(|err| panic!("stdout is not JSON ({err}): {stdout}"))
}

fn variation_draft() -> Value {
    let sku = |size: &str, color: &str, stock: i64| {
        json!({ "specifics": { "Size": size, "Colour": color, "Scent": "Rose" }, "stock": stock, "price": 10.0 })
    };
    json!({
        "draftId": "d-cli",
        "title": "Linen shirt",
        "price": 9.99,
        "variations": {
            "hasVariations": true,
            "axes": [
                { "name": "Colour", "values": [{ "name": "Red" }, { "name": "Blue" }] },
                { "name": "Size", "values": [{ "name": "S" }, { "name": "M" }] },
                { "name": "Scent", "values": [{ "name": "Rose" }, { "name": "Lavender" }] }
            ],
            "skus": [sku("S", "Red", 4), sku("S", "Blue", 2), sku("M", "Red", 1), sku("M", "Blue", 0)]
        }
    })
}

fn plain_page() -> Value {
    json!({
        "documents": [{
            "id": "main",
            "url": "https://shop.test/sell",
            "root": { "tag": "body", "children": [
                { "tag": "input", "attrs": { "name": "title", "aria-label": "Title" } },
                { "tag": "input", "attrs": { "name": "price", "aria-label": "Price" } },
                { "tag": "button", "attrs": { "id": "list-it" }, "text": "List it" }
            ]}
        }]
    })
}

fn fill_args(draft: &Path, page: &Path) -> Vec<String> {
    vec![
        "fill".into(),
        "--draft".into(),
        draft.display().to_string(),
        "--page".into(),
        page.display().to_string(),
        "--immediate".into(),
    ]
}

#[test]
fn axes_command_reports_kept_and_dropped_axes() {
    let ws = Workspace::new();
    let draft = ws.write("draft.json", &variation_draft());

    let assert = ws
        .command()
        .args(["axes", "--draft"])
        .arg(&draft)
        .args(["--attribute", "Color", "--attribute", "Size"])
        .assert()
        .success();
    let value = stdout_json(assert.get_output());

    let axes = value["axes"].as_array().expect("axes");
    assert_eq!(axes.len(), 2);
    let targets: Vec<&str> = axes.iter().filter_map(|axis| axis["target"]["name"].as_str()).collect();
    assert!(targets.contains(&"Color") && targets.contains(&"Size"), "{targets:?}");
    assert_eq!(value["dropped"], json!(["Scent"]));
    assert_eq!(value["skus"].as_array().unwrap().len(), 3);
}

#[test]
fn fill_command_emits_the_report() {
    let ws = Workspace::new();
    let draft = ws.write("draft.json", &json!({ "title": "Linen shirt", "price": 24.5 }));
    let page = ws.write("page.json", &plain_page());

    let assert = ws
        .command()
        .args(fill_args(&draft, &page))
        .arg("--ephemeral")
        .assert()
        .success();
    let report = stdout_json(assert.get_output());

    let fields = report["fields"].as_array().expect("fields");
    let title = fields.iter().find(|f| f["field"] == json!("title")).expect("title");
    assert_eq!(title["committed"], json!(true));
    assert_eq!(report["submit_attempted"], json!(true));
    assert_eq!(report["delegated"], json!(false));
}

#[test]
fn strict_fill_fails_when_a_field_stays_unconfirmed() {
    let ws = Workspace::new();
    // No description control on the page.
    let draft = ws.write(
        "draft.json",
        &json!({ "title": "Linen shirt", "price": 24.5, "description": "Washed linen" }),
    );
    let page = ws.write("page.json", &plain_page());

    ws.command()
        .args(fill_args(&draft, &page))
        .args(["--ephemeral", "--strict"])
        .assert()
        .failure();
}

#[test]
fn invalid_draft_is_rejected() {
    let ws = Workspace::new();
    let draft = ws.write("draft.json", &json!({ "title": " ", "price": 5.0 }));
    let page = ws.write("page.json", &plain_page());

    ws.command()
        .args(fill_args(&draft, &page))
        .arg("--ephemeral")
        .assert()
        .failure();
}

#[test]
fn fill_log_is_readable_afterwards() {
    let ws = Workspace::new();
    let draft = ws.write(
        "draft.json",
        &json!({ "draftId": "d-cli", "title": "Linen shirt", "price": 24.5 }),
    );
    let page = ws.write("page.json", &plain_page());
    ws.command().args(fill_args(&draft, &page)).assert().success();

    let assert = ws.command().args(["log", "--scope", "draft:d-cli"]).assert().success();
    let entries = stdout_json(assert.get_output());
    let steps: Vec<&str> = entries
        .as_array()
        .expect("entries")
        .iter()
        .filter_map(|entry| entry["step"].as_str())
        .collect();
    assert_eq!(steps.first(), Some(&"fill.start"));
    assert!(steps.contains(&"field.title"));
    assert_eq!(steps.last(), Some(&"fill.done"));

    let assert = ws
        .command()
        .args(["log", "--scope", "draft:d-cli", "--limit", "1"])
        .assert()
        .success();
    assert_eq!(stdout_json(assert.get_output()).as_array().unwrap().len(), 1);
}

#[test]
fn unlock_reports_when_nothing_is_held() {
    let ws = Workspace::new();
    let assert = ws.command().args(["unlock", "--scope", "draft:none"]).assert().success();
    let value = stdout_json(assert.get_output());
    assert_eq!(value["released"], json!(false));
    assert_eq!(value["holder"], Value::Null);
}

#[test]
fn revise_requires_a_value_for_quantity() {
    let ws = Workspace::new();
    let page = ws.write("page.json", &plain_page());
    ws.command()
        .args(["revise", "--action", "quantity", "--ephemeral", "--page"])
        .arg(&page)
        .assert()
        .failure();
}
