//! Command line front-end of the conduit engine.
//!
//! Mints curis, validates conduit inputs and loads conduit definitions into
//! an in-memory engine to print the resulting proxy feed.
//!
//! # Usage
//! ```bash
//! conduit mint --count 3
//! conduit validate conduit.json
//! cat conduit.json | conduit validate
//! conduit load conduits.json --owner 42
//! ```

mod logging;

use std::{
    fs,
    io::{self, Read},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use conduit_core::conduit::{
    api::{ConduitRequest, ConduitResponse, FeedRequest, FeedResponse},
    core::{
        identifier::{
            CuriConfig, DEFAULT_ALPHABET, DEFAULT_DOMAIN, DEFAULT_PREFIX, DEFAULT_TOKEN_LENGTH,
            IdentifierGenerator,
        },
        record::ConduitFields,
        validation::{ConduitInput, PolicyValidator},
    },
    init_conduit_engine,
};
use serde_json::{Value, json};
use tower::{Service, ServiceExt};
use tracing::{debug, info};

const REDACTED: &str = "[redacted]";

#[derive(Parser, Debug)]
#[command(name = "conduit")]
#[command(about = "Conduit identity and access-policy engine")]
struct ConduitArgs {
    #[command(flatten)]
    curi: CuriArgs,

    #[command(subcommand)]
    command: Command,
}

/// Curi minting configuration
#[derive(Args, Debug)]
struct CuriArgs {
    /// Two-character curi prefix
    #[arg(long, global = true, env = "CONDUIT_CURI_PREFIX", default_value = DEFAULT_PREFIX)]
    prefix: String,

    /// Domain suffix of every curi
    #[arg(long, global = true, env = "CONDUIT_CURI_DOMAIN", default_value = DEFAULT_DOMAIN)]
    domain: String,

    /// Characters a curi token is drawn from
    #[arg(long, global = true, env = "CONDUIT_CURI_ALPHABET", default_value = DEFAULT_ALPHABET)]
    alphabet: String,

    /// Number of characters in a curi token
    #[arg(
        long,
        global = true,
        env = "CONDUIT_CURI_TOKEN_LENGTH",
        default_value_t = DEFAULT_TOKEN_LENGTH
    )]
    token_length: usize,
}

impl CuriArgs {
    fn config(&self) -> Result<CuriConfig> {
        CuriConfig::new(&self.prefix, &self.domain, &self.alphabet, self.token_length)
            .context("invalid curi configuration")
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print freshly minted curis
    Mint {
        /// Number of curis to mint
        #[arg(short, long, default_value_t = 1)]
        count: usize,
    },
    /// Validate a conduit creation input read from FILE or stdin
    Validate {
        /// JSON file holding one conduit object, stdin when omitted
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
    /// Create conduits from a JSON array and print the resulting proxy feed
    Load {
        /// JSON file holding an array of conduit objects
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Owner the conduits are created for
        #[arg(short, long, default_value_t = 1)]
        owner: u64,
    },
}

#[cfg(not(tarpaulin_include))]
#[tokio::main]
async fn main() -> Result<()> {
    logging::init_tracing();

    let args = ConduitArgs::parse();
    let config = args.curi.config()?;

    match args.command {
        Command::Mint { count } => mint(config, count),
        Command::Validate { file } => validate(file.as_deref()),
        Command::Load { file, owner } => load(config, &file, owner).await,
    }
}

fn mint(config: CuriConfig, count: usize) -> Result<()> {
    let generator = IdentifierGenerator::new(config);
    for _ in 0..count {
        println!("{}", generator.mint());
    }
    Ok(())
}

fn validate(file: Option<&Path>) -> Result<()> {
    let input = match read_json(file)? {
        Value::Object(input) => input,
        other => bail!("expected a JSON object, got {}", json_kind(&other)),
    };

    let normalized = PolicyValidator::default()
        .validate_create(&input)
        .and_then(ConduitFields::from_draft);
    match normalized {
        Ok(fields) => {
            let mut fields = serde_json::to_value(fields)?;
            if let Some(key) = fields.get_mut("suriApiKey") {
                *key = Value::from(REDACTED);
            }
            println!("{}", serde_json::to_string_pretty(&fields)?);
            Ok(())
        }
        Err(errors) => {
            debug!("rejected input with {} field error(s)", errors.len());
            println!("{}", serde_json::to_string_pretty(&json!({ "errors": errors }))?);
            std::process::exit(1);
        }
    }
}

async fn load(config: CuriConfig, file: &Path, owner: u64) -> Result<()> {
    let inputs: Vec<ConduitInput> = match read_json(Some(file))? {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::Object(input) => Ok(input),
                other => {
                    bail!("conduit #{index}: expected a JSON object, got {}", json_kind(&other))
                }
            })
            .collect::<Result<_>>()?,
        other => bail!("expected a JSON array, got {}", json_kind(&other)),
    };

    let (mut conduits, mut feed) = init_conduit_engine(config);

    let mut created = Vec::with_capacity(inputs.len());
    for (index, input) in inputs.into_iter().enumerate() {
        let response = conduits
            .ready()
            .await?
            .call(ConduitRequest::Create { owner, input })
            .await
            .with_context(|| format!("conduit #{index} rejected"))?;
        match response {
            ConduitResponse::Created { id, curi } => {
                created.push(json!({ "id": id, "curi": curi }))
            }
            other => bail!("conduit #{index}: unexpected response {other:?}"),
        }
    }
    info!("loaded {} conduit(s) for owner {owner}", created.len());

    let FeedResponse::Routes(routes) =
        feed.ready().await?.call(FeedRequest::ActiveRoutes).await?
    else {
        bail!("unexpected feed response");
    };

    let output = json!({ "created": created, "feed": routes });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn read_json(file: Option<&Path>) -> Result<Value> {
    let raw = match file {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?
        }
        None => {
            let mut raw = String::new();
            io::stdin().read_to_string(&mut raw).context("cannot read stdin")?;
            raw
        }
    };
    serde_json::from_str(&raw).context("input is not valid JSON")
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
