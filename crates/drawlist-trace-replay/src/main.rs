use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use drawlist_gpu::{GroupingStrategy, RenderConfig, RenderPath};
use drawlist_trace_replay::{compile_scene, decode_dump, format_token};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "drawlist-trace-replay",
    about = "Record draw-list token streams headlessly and inspect them."
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record one frame of a scene and print stats and the batch table
    Compile {
        /// Scene manifest (JSON); the built-in demo scene when omitted
        #[arg(long, value_name = "PATH")]
        scene: Option<PathBuf>,

        /// Render config (JSON); flags below override it
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Group primitive families into separate passes
        #[arg(long, action = clap::ArgAction::SetTrue)]
        sorted: bool,

        #[arg(long, value_enum)]
        path: Option<PathArg>,

        /// Submit only the first N batches on the address path
        #[arg(long, value_name = "N")]
        max_batches: Option<u32>,

        #[arg(long)]
        supersampling: Option<f32>,

        /// Write the first model's token stream to this file
        #[arg(long, value_name = "PATH")]
        dump: Option<PathBuf>,
    },
    /// Print every token of a stream written by `compile --dump`
    Decode { file: PathBuf },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PathArg {
    Immediate,
    Emulation,
    CompiledList,
    AddressIndirect,
}

impl From<PathArg> for RenderPath {
    fn from(path: PathArg) -> Self {
        match path {
            PathArg::Immediate => RenderPath::Immediate,
            PathArg::Emulation => RenderPath::Emulation,
            PathArg::CompiledList => RenderPath::CompiledList,
            PathArg::AddressIndirect => RenderPath::AddressIndirect,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match Args::parse().command {
        Command::Compile {
            scene,
            config,
            sorted,
            path,
            max_batches,
            supersampling,
            dump,
        } => {
            let mut render = match &config {
                Some(file) => RenderConfig::load(file)
                    .with_context(|| format!("load config {}", file.display()))?,
                None => RenderConfig::default(),
            };
            if sorted {
                render.grouping = GroupingStrategy::SortedByTopology;
            }
            if let Some(path) = path {
                render.path = path.into();
            }
            if max_batches.is_some() {
                render.max_batches = max_batches;
            }
            if let Some(factor) = supersampling {
                render.supersampling = factor;
            }

            let report = compile_scene(render, scene.as_deref()).context("compile scene")?;
            println!(
                "{}",
                serde_json::to_string(&report.stats).context("serialize stats")?
            );
            print!("{}", report.batch_table());
            println!("draws: {}", report.draws);

            if let Some(out) = dump {
                std::fs::write(&out, &report.tokens)
                    .with_context(|| format!("write {}", out.display()))?;
                eprintln!("wrote {} token bytes to {}", report.tokens.len(), out.display());
            }
        }
        Command::Decode { file } => {
            let bytes = std::fs::read(&file).with_context(|| format!("read {}", file.display()))?;
            for (offset, token) in decode_dump(&bytes)? {
                println!("{}", format_token(offset, &token));
            }
        }
    }
    Ok(())
}
