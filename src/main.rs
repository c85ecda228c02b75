use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{anyhow, bail, Context};
use lsi_search::config::ServiceConfig;
use lsi_search::pipeline;
use lsi_search::service::{http, ServiceLoader};
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "\
Usage: lsi-search [--config PATH] <command>

Commands:
  build-corpus <documents.tsv>            tokenize `<id>\\t<text>` lines into the corpus
  fit-tfidf                               fit tf-idf and write the weighted corpus
  fit-lsi [--topics K] [--shard-size S]   fit LSI and build the similarity index
  serve [--bind ADDR]                     load every artifact and serve /api/
  query <text> [--top-k N]                one query, printed as <score>\\t<id>";

enum Command {
    BuildCorpus(PathBuf),
    FitTfidf,
    FitLsi {
        topics: Option<usize>,
        shard_size: Option<usize>,
    },
    Serve {
        bind: Option<SocketAddr>,
    },
    Query {
        text: String,
        top_k: Option<usize>,
    },
}

struct Cli {
    config: Option<PathBuf>,
    command: Command,
}

fn value<T>(args: &mut impl Iterator<Item = String>, flag: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = args.next().ok_or_else(|| anyhow!("{flag} requires a value"))?;
    raw.parse::<T>().map_err(|e| anyhow!("{flag} {raw:?}: {e}"))
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Cli> {
    let mut config = None;
    let mut command_name = None;
    let mut positional: Vec<String> = Vec::new();
    let mut topics = None;
    let mut shard_size = None;
    let mut bind = None;
    let mut top_k = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config = Some(value::<PathBuf>(&mut args, "--config")?),
            "--topics" => topics = Some(value::<usize>(&mut args, "--topics")?),
            "--shard-size" => shard_size = Some(value::<usize>(&mut args, "--shard-size")?),
            "--bind" => bind = Some(value::<SocketAddr>(&mut args, "--bind")?),
            "--top-k" => top_k = Some(value::<usize>(&mut args, "--top-k")?),
            "-h" | "--help" => bail!("{USAGE}"),
            other if command_name.is_none() => command_name = Some(other.to_string()),
            other => positional.push(other.to_string()),
        }
    }

    let command = match command_name.as_deref() {
        Some("build-corpus") => {
            let path = positional
                .into_iter()
                .next()
                .ok_or_else(|| anyhow!("build-corpus needs a documents file\n\n{USAGE}"))?;
            Command::BuildCorpus(PathBuf::from(path))
        }
        Some("fit-tfidf") => Command::FitTfidf,
        Some("fit-lsi") => Command::FitLsi { topics, shard_size },
        Some("serve") => Command::Serve { bind },
        Some("query") => {
            if positional.is_empty() {
                bail!("query needs text\n\n{USAGE}");
            }
            Command::Query {
                text: positional.join(" "),
                top_k,
            }
        }
        Some(other) => bail!("unknown command {other:?}\n\n{USAGE}"),
        None => bail!("{USAGE}"),
    };
    Ok(Cli { config, command })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = parse_args(std::env::args().skip(1))?;
    let mut config = ServiceConfig::load(cli.config.as_deref())?;
    let started = Instant::now();

    match cli.command {
        Command::BuildCorpus(documents) => {
            let file = File::open(&documents)
                .with_context(|| format!("opening {}", documents.display()))?;
            pipeline::build_corpus(BufReader::new(file), &config.artifacts)?;
        }
        Command::FitTfidf => {
            pipeline::fit_tfidf(&config.artifacts, &config.fit)?;
        }
        Command::FitLsi { topics, shard_size } => {
            if let Some(k) = topics {
                config.fit.num_topics = k;
            }
            if let Some(s) = shard_size {
                config.fit.shard_size = s;
            }
            pipeline::fit_lsi(&config.artifacts, &config.fit)?;
        }
        Command::Serve { bind } => {
            let service = ServiceLoader::new(&config).load()?;
            let addr = bind.unwrap_or(config.server.bind);
            http::serve(service, addr).await?;
        }
        Command::Query { text, top_k } => {
            let service = ServiceLoader::new(&config).load()?;
            let top_k = top_k.unwrap_or(service.top_k());
            for (id, score) in service.answer(&text, top_k)? {
                println!("{score:.6}\t{id}");
            }
        }
    }

    info!(elapsed_ms = started.elapsed().as_millis() as u64, "done");
    Ok(())
}
