use std::ffi::OsStr;
use std::process::{Command, Output};

use serde_json::Value;

fn run_spacy<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(env!("CARGO_BIN_EXE_spacy"))
        .args(args)
        .output()
        .unwrap_or_else(|err| panic!("failed to execute spacy binary: {err}"))
}

fn run_json<I, S>(args: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run_spacy(args);
    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!(
            "spacy command failed (status={}):\nstdout:\n{}\nstderr:\n{}",
            output.status, stdout, stderr
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    serde_json::from_str(&stdout)
        .unwrap_or_else(|err| panic!("stdout is not valid JSON: {err}\nstdout:\n{stdout}"))
}

fn as_str<'a>(value: &'a Value, key: &str) -> &'a str {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_else(|| panic!("missing string field `{key}` in payload: {value}"))
}

fn cards(value: &Value) -> &Vec<Value> {
    value
        .get("cards")
        .and_then(Value::as_array)
        .unwrap_or_else(|| panic!("missing `cards` array in payload: {value}"))
}

#[test]
fn preview_lists_every_card_in_order() {
    let value = run_json(["preview", "--text", "", "--first-name", "Bob", "--seed", "7"]);
    assert_eq!(as_str(&value, "cli_contract_version"), "cli.v1");
    assert_eq!(value.get("cache_time").and_then(Value::as_u64), Some(1));

    let ids = cards(&value).iter().map(|card| as_str(card, "id")).collect::<Vec<_>>();
    assert_eq!(
        ids,
        vec![
            "addSpaces",
            "randomizeCase",
            "createTypos",
            "scrambleLetters",
            "generateMe",
            "repeat",
            "reverse",
            "mirror",
            "comboSpacesRepeat",
            "comboRandomcaseSpaces",
        ]
    );

    let generate_me = &cards(&value)[4];
    assert_eq!(as_str(generate_me, "message_text"), "* Bob doesn't know what to say. 🤐");
    assert_eq!(as_str(generate_me, "title"), "🤳 What the hell am I doing?");
}

#[test]
fn preview_with_seed_is_reproducible() {
    let args = ["preview", "--text", "Hello there, General Kenobi", "--seed", "1234"];
    assert_eq!(run_json(args), run_json(args));
}

#[test]
fn transform_runs_a_single_card() {
    let value = run_json(["transform", "mirror", "--text", "ABCD"]);
    assert_eq!(as_str(&value, "id"), "mirror");
    assert_eq!(as_str(&value, "message_text"), "ABCDCBA");

    let value = run_json(["transform", "addSpaces", "--text", "a好b"]);
    assert_eq!(as_str(&value, "message_text"), "a  好 b");
}

#[test]
fn transform_rejects_unknown_cards() {
    let output = run_spacy(["transform", "shout", "--text", "hi"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown card `shout`"), "stderr was: {stderr}");
}

#[test]
fn cards_lists_titles_and_descriptions() {
    let value = run_json(["cards"]);
    let listed = cards(&value);
    assert_eq!(listed.len(), 10);
    assert_eq!(as_str(&listed[6], "title"), "🔀 上海自来水");
    assert_eq!(as_str(&listed[3], "description"), "Recursively add typos.");
}
