use std::path::PathBuf;

use aipinyin::{BuildReport, Candidate, DictionaryIndex, Engine, Parser, PinyinConfig};
use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Load a `pinyin,word,weight` dictionary, print its build report, look up
/// keys and decode sample input.
#[derive(ClapParser)]
struct Args {
    /// Dictionary source file.
    dict: PathBuf,

    /// Optional TOML config for the decoder.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Pinyin keys to look up exactly (repeatable).
    #[arg(long = "key")]
    keys: Vec<String>,

    /// Raw input to decode (repeatable).
    #[arg(long = "decode")]
    inputs: Vec<String>,

    /// Context passed to the scorer.
    #[arg(long, default_value = "")]
    context: String,

    #[arg(long, default_value_t = 5)]
    top_k: usize,

    /// Print one JSON document instead of text.
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Lookup {
    key: String,
    entries: Vec<(String, u32)>,
}

#[derive(Serialize)]
struct Decoded {
    input: String,
    candidates: Vec<Candidate>,
}

#[derive(Serialize)]
struct Output {
    report: BuildReport,
    keys: usize,
    entries: usize,
    lookups: Vec<Lookup>,
    decoded: Vec<Decoded>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => PinyinConfig::load_toml(path)?,
        None => PinyinConfig::default(),
    };

    let parser = Parser::from_config(&config);
    let (index, report) = DictionaryIndex::load(&args.dict, &parser)
        .with_context(|| format!("loading {}", args.dict.display()))?;

    let lookups = args
        .keys
        .iter()
        .map(|key| Lookup {
            key: key.clone(),
            entries: index
                .lookup_text(key, &parser)
                .iter()
                .map(|e| (e.word.clone(), e.weight))
                .collect(),
        })
        .collect();
    let keys = index.key_count();
    let entries = index.entry_count();
    info!(keys, entries, malformed = report.malformed_total(), "dictionary loaded");

    let engine = Engine::new(config);
    engine.install(index);
    let decoded = args
        .inputs
        .iter()
        .map(|input| {
            let candidates = engine.decode(input, &args.context, args.top_k)?;
            Ok(Decoded {
                input: input.clone(),
                candidates,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let output = Output {
        report,
        keys,
        entries,
        lookups,
        decoded,
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_text(&output);
    }
    Ok(())
}

fn print_text(output: &Output) {
    let r = &output.report;
    println!(
        "{} rows, {} accepted, {} duplicates merged, {} clamped",
        r.rows, r.accepted, r.merged_duplicates, r.clamped_weights
    );
    println!(
        "{} malformed ({:.1}%), {} comments, {} blank",
        r.malformed_total(),
        r.malformed_ratio() * 100.0,
        r.comments,
        r.blank
    );
    println!("{} keys, {} entries", output.keys, output.entries);

    for lookup in &output.lookups {
        if lookup.entries.is_empty() {
            println!("\nKey '{}' not found", lookup.key);
            continue;
        }
        println!("\nKey '{}': {} entries", lookup.key, lookup.entries.len());
        for (i, (word, weight)) in lookup.entries.iter().enumerate() {
            println!("  {}. {} ({})", i + 1, word, weight);
        }
    }

    for decoded in &output.decoded {
        println!("\nDecode '{}':", decoded.input);
        for (i, c) in decoded.candidates.iter().enumerate() {
            let words: Vec<&str> = c.segments.iter().map(|s| s.word.as_str()).collect();
            match c.model_score {
                Some(model) => println!(
                    "  {}. {} [{}] score={:.2} dict={} model={:.3}",
                    i + 1,
                    c.text,
                    words.join("|"),
                    c.score,
                    c.dict_score,
                    model
                ),
                None => println!("  {}. {} [{}] dict={}", i + 1, c.text, words.join("|"), c.dict_score),
            }
        }
    }
}
