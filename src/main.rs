use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::{debug, info};
use std::path::PathBuf;
use std::sync::Arc;

use faktory::splitter::Registry;
use faktory::{
    BlobStore, Converter, DockerSource, LayoutStore, Notifier, RuleSplitter, Source, StoreSource,
    TarSource,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum SourceKind {
    Docker,
    Tar,
    Store,
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Verbose mode (-v for info, -vv for debug, -vvv for trace). Also switches to text-based progress"
    )]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Move an application image onto a new base image
    Convert {
        #[arg(help = "Image to convert (e.g., myapp:latest)", value_parser = non_empty)]
        from: String,

        #[arg(help = "Name to publish the result as (e.g., myapp:kontain)", value_parser = non_empty)]
        to: String,

        #[arg(help = "Base image to put the application on", value_parser = non_empty)]
        base: String,

        #[arg(
            short = 't',
            long = "type",
            default_value = "python",
            help = "Runtime family of the source image (python, java, or a token from --rules)"
        )]
        runtime: String,

        #[arg(long, help = "JSON file with an additional splitter rule table")]
        rules: Option<PathBuf>,

        #[arg(
            short,
            long,
            env = "FAKTORY_STORE",
            default_value = "./faktory-store",
            help = "Directory of the image store results are published to"
        )]
        store: PathBuf,

        #[arg(long, value_enum, default_value = "docker", help = "Where to read the source image from")]
        source: SourceKind,

        #[arg(long, value_enum, default_value = "docker", help = "Where to read the base image from")]
        base_source: SourceKind,

        #[arg(long, help = "Write a markdown conversion report to this file")]
        report: Option<PathBuf>,
    },
}

fn non_empty(value: &str) -> Result<String, String> {
    if value.trim().is_empty() {
        Err("must not be empty".to_string())
    } else {
        Ok(value.to_string())
    }
}

fn make_source(kind: SourceKind, store: &Arc<LayoutStore>) -> Box<dyn Source> {
    match kind {
        SourceKind::Docker => Box::new(DockerSource::new()),
        SourceKind::Tar => Box::new(TarSource::new()),
        SourceKind::Store => Box::new(StoreSource::new(store.clone() as Arc<dyn BlobStore>)),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let notifier = Notifier::new(cli.verbose)
        .install()
        .map_err(|e| anyhow!("Failed to install logger: {}", e))?;

    let result = run(cli.command);
    match &result {
        Ok(message) => notifier.finish(message),
        Err(_) => notifier.clear(),
    }
    result.map(|_| ())
}

fn run(command: Command) -> Result<String> {
    match command {
        Command::Convert {
            from,
            to,
            base,
            runtime,
            rules,
            store,
            source,
            base_source,
            report,
        } => {
            info!("Converting {} onto {} as {}", from, base, to);
            debug!("Store: {}", store.display());
            debug!("Sources: {:?} (image), {:?} (base)", source, base_source);

            let mut registry = Registry::builtin()?;
            if let Some(path) = &rules {
                registry.register(RuleSplitter::from_file(path)?);
            }
            debug!("Splitter variants: {}", registry.tokens().join(", "));
            let splitter = registry.get(&runtime)?;

            let store = Arc::new(
                LayoutStore::open(&store)
                    .with_context(|| format!("Failed to open store at {}", store.display()))?,
            );

            let converter = Converter::new(
                &base,
                make_source(base_source, &store).as_ref(),
                splitter,
                make_source(source, &store),
                store.clone(),
            )?;

            let conversion = converter
                .convert(&from, &to)
                .with_context(|| format!("Failed to convert {}", from))?;

            if let Some(path) = &report {
                conversion
                    .save_markdown(path)
                    .with_context(|| format!("Failed to write report to {}", path.display()))?;
            }

            Ok(format!(
                "Published {} ({}, {} conflicts)",
                conversion.tag,
                conversion.manifest,
                conversion.conflicts.len()
            ))
        }
    }
}
