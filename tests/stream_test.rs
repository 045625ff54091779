use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn streaming(dir: &Path) -> Command {
    fs::write(dir.join("hello.tmpl"), "Hello {{.Name}}!").unwrap();
    let mut cmd = Command::cargo_bin("tplcmd").unwrap();
    cmd.env("TPL_GLOB", dir.join("*.tmpl"))
        .env("STREAM", "1")
        .env_remove("TPL_LOG");
    cmd
}

/// ストリーミング: 配列の要素ごとに区切りなしで出力する
#[test]
fn test_stream_renders_each_element() {
    let dir = tempdir().unwrap();

    streaming(dir.path())
        .arg("hello.tmpl")
        .write_stdin(r#"[{"Name":"Alice"},{"Name":"Bob"}]"#)
        .assert()
        .success()
        .stdout("Hello Alice!Hello Bob!");
}

/// ストリーミング: 複数行にまたがる入力
#[test]
fn test_stream_multiline_input() {
    let dir = tempdir().unwrap();

    streaming(dir.path())
        .arg("hello.tmpl")
        .write_stdin("[\n  {\"Name\": \"A\"},\n  {\"Name\": \"B\", \"Extra\": [1, 2]},\n  {\"Name\": \"C\"}\n]\n")
        .assert()
        .success()
        .stdout("Hello A!Hello B!Hello C!");
}

/// ストリーミング: 空の配列
#[test]
fn test_stream_empty_array() {
    let dir = tempdir().unwrap();

    streaming(dir.path())
        .arg("hello.tmpl")
        .write_stdin("[]")
        .assert()
        .success()
        .stdout("");
}

/// ストリーミング: トップレベルがオブジェクトなら出力前に失敗する
#[test]
fn test_stream_rejects_object() {
    let dir = tempdir().unwrap();

    streaming(dir.path())
        .arg("hello.tmpl")
        .write_stdin(r#"{"Name":"Alice"}"#)
        .assert()
        .code(1)
        .stdout("")
        .stderr(predicate::str::contains("ERROR code=STREAM_FORMAT"));
}

/// ストリーミング: 空の入力
#[test]
fn test_stream_empty_input() {
    let dir = tempdir().unwrap();

    streaming(dir.path())
        .arg("hello.tmpl")
        .write_stdin("")
        .assert()
        .code(1)
        .stdout("")
        .stderr(predicate::str::contains("ERROR code=STREAM_FORMAT"));
}

/// ストリーミング: 不正な要素の手前までは出力される
#[test]
fn test_stream_invalid_element() {
    let dir = tempdir().unwrap();

    streaming(dir.path())
        .arg("hello.tmpl")
        .write_stdin(r#"[{"Name":"Alice"}, "Bob", {"Name":"Carol"}]"#)
        .assert()
        .code(1)
        .stdout("Hello Alice!")
        .stderr(predicate::str::contains("ERROR code=INVALID_JSON origin=\"stream record 1\""));
}

/// ストリーミング: 実行エラーで処理を打ち切る
#[test]
fn test_stream_render_error_stops() {
    let dir = tempdir().unwrap();

    streaming(dir.path())
        .arg("hello.tmpl")
        .write_stdin(r#"[{"Name":"Alice"}, {"Nom":"Bob"}, {"Name":"Carol"}]"#)
        .assert()
        .code(1)
        .stdout(predicate::str::starts_with("Hello Alice!"))
        .stdout(predicate::str::contains("Carol").not())
        .stderr(predicate::str::contains("ERROR code=RENDER template=\"hello.tmpl\""));
}

/// ストリーミング: サブコマンドへの引数は無視される
#[test]
fn test_stream_ignores_arguments() {
    let dir = tempdir().unwrap();

    streaming(dir.path())
        .args(["hello.tmpl", "whatever", "else"])
        .write_stdin(r#"[{"Name":"Alice"}]"#)
        .assert()
        .success()
        .stdout("Hello Alice!");
}

/// ストリーミング: STREAMが"1"以外なら通常モード
#[test]
fn test_stream_requires_exact_value() {
    let dir = tempdir().unwrap();

    streaming(dir.path())
        .env("STREAM", "true")
        .args(["hello.tmpl", "--Name", "World"])
        .write_stdin(r#"[{"Name":"Alice"}]"#)
        .assert()
        .success()
        .stdout("Hello World!");
}

/// ストリーミング: 変数のないテンプレートはストリーミングでも到達できない
#[test]
fn test_stream_static_template_unreachable() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("static.tmpl"), "fixed").unwrap();

    streaming(dir.path())
        .arg("static.tmpl")
        .write_stdin("[{}]")
        .assert()
        .code(1)
        .stdout("");
}

/// ストリーミング: --help も無視して標準入力を読む
#[test]
fn test_stream_ignores_help_flag() {
    let dir = tempdir().unwrap();

    streaming(dir.path())
        .args(["hello.tmpl", "--help"])
        .write_stdin(r#"[{"Name":"Alice"}]"#)
        .assert()
        .success()
        .stdout("Hello Alice!");
}
