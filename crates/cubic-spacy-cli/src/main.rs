use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use cubic_spacy_core::{assemble, CardKind, QueryInput};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "spacy")]
#[command(about = "Preview the inline-query cards of the Cubic Spacy bot offline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print every card the bot would answer with.
    Preview(PreviewArgs),
    /// Run one card's transform.
    Transform(TransformArgs),
    /// List card ids, titles and descriptions.
    Cards,
}

#[derive(Debug, Args)]
struct QueryArgs {
    /// Query text; empty selects each card's default text.
    #[arg(long, default_value = "")]
    text: String,
    #[arg(long, default_value = "Spacy")]
    first_name: String,
    /// Seed for reproducible random cards.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Debug, Args)]
struct PreviewArgs {
    #[command(flatten)]
    query: QueryArgs,
    #[arg(long, default_value = "preview")]
    query_id: String,
}

#[derive(Debug, Args)]
struct TransformArgs {
    #[arg(value_parser = parse_card_kind)]
    kind: CardKind,
    #[command(flatten)]
    query: QueryArgs,
}

fn parse_card_kind(value: &str) -> Result<CardKind, String> {
    CardKind::parse(value).ok_or_else(|| {
        let known = CardKind::ALL.iter().map(|kind| kind.as_str()).collect::<Vec<_>>();
        format!("unknown card `{value}`, expected one of: {}", known.join(", "))
    })
}

fn seeded_rng(seed: Option<u64>) -> StdRng {
    seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64)
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "cli_contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "cli_contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Preview(args) => run_preview(&args),
        Command::Transform(args) => run_transform(&args),
        Command::Cards => run_cards(),
    }
}

fn run_preview(args: &PreviewArgs) -> Result<()> {
    let input =
        QueryInput::new(args.query_id.clone(), args.query.first_name.clone(), args.query.text.clone());
    let cards = assemble(&input, &mut seeded_rng(args.query.seed));
    emit_json(serde_json::json!({
        "query_id": input.query_id,
        "cache_time": cards.cache_time,
        "cards": cards.cards,
    }))
}

fn run_transform(args: &TransformArgs) -> Result<()> {
    let input = QueryInput::new("transform", args.query.first_name.clone(), args.query.text.clone());
    let message_text = args.kind.render(&input, &mut seeded_rng(args.query.seed));
    emit_json(serde_json::json!({
        "id": args.kind,
        "message_text": message_text,
    }))
}

fn run_cards() -> Result<()> {
    let cards = CardKind::ALL
        .into_iter()
        .map(|kind| {
            serde_json::json!({
                "id": kind,
                "title": kind.title(),
                "description": kind.description(),
            })
        })
        .collect::<Vec<_>>();
    emit_json(serde_json::json!({ "cards": cards }))
}
