mod render;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use mcp_openapi_tools::descriptor::tools_from_spec;
use mcp_openapi_tools::loader::{RouteFilter, SpecLoader};
use mcp_openapi_tools::model::ParsedSpec;
use render::Style;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "mcp-openapi", version, about = "Inspect how an OpenAPI document maps to MCP tools")]
struct Cli {
    /// Disable ANSI colors
    #[arg(long, global = true, env = "NO_COLOR", value_parser = clap::builder::FalseyValueParser::new())]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the parsed operation tree
    Parse(SpecArgs),
    /// Print the tools each operation becomes
    Tools {
        #[command(flatten)]
        spec: SpecArgs,

        /// Query parameters the server supplies itself; hidden from tools
        #[arg(long, num_args = 1..)]
        forward_query_params: Vec<String>,
    },
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false, id = "source")]
struct Source {
    /// Local OpenAPI document
    #[arg(long)]
    file: Option<PathBuf>,

    /// Remote OpenAPI document
    #[arg(long)]
    url: Option<String>,
}

#[derive(Debug, Args)]
struct SpecArgs {
    #[command(flatten)]
    source: Source,

    /// Route patterns, anchored at the start of the path
    #[arg(long, required = true, num_args = 1..)]
    paths: Vec<String>,
}

impl SpecArgs {
    fn location(&self) -> anyhow::Result<String> {
        match (&self.source.file, &self.source.url) {
            (Some(file), _) => Ok(file.display().to_string()),
            (None, Some(url)) => Ok(url.clone()),
            (None, None) => anyhow::bail!("one of --file or --url is required"),
        }
    }

    async fn load(&self) -> anyhow::Result<ParsedSpec> {
        let location = self.location()?;
        let filter = RouteFilter::new(&self.paths)?;
        SpecLoader::new(reqwest::Client::new())
            .load(&location, &filter)
            .await
            .with_context(|| format!("loading {location}"))
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();
    let style = Style::new(!cli.no_color);

    match cli.command {
        Command::Parse(args) => {
            let spec = args.load().await?;
            print!("{spec}");
        }
        Command::Tools {
            spec: args,
            forward_query_params,
        } => {
            let spec = args.load().await?;
            let tools = tools_from_spec(&spec, &forward_query_params);
            print!("{}", render::tools(&tools, style));
        }
    }
    Ok(())
}
