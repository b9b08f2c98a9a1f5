use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "modpack-localizer",
    version,
    about = "Translate modpack language files into a resource pack"
)]
struct Cli {
    /// Mod jar, directory of jars, or unpacked resources directory
    input: PathBuf,

    /// Output resource pack (directory, or a path ending in .zip)
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    /// Target locale (default from settings, e.g. zh_cn)
    #[arg(short = 'l', long = "lang")]
    lang: Option<String>,

    /// Model name for the OpenAI-compatible endpoint
    #[arg(short = 'm', long = "model")]
    model: Option<String>,

    /// API key; repeat or comma separate to rotate through several
    #[arg(short = 'k', long = "key")]
    key: Vec<String>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    modpack_localizer::logging::init(cli.verbose)?;

    let output = modpack_localizer::run(modpack_localizer::Config {
        input: cli.input,
        output: cli.output,
        lang: cli.lang,
        model: cli.model,
        keys: cli.key,
        settings_path: cli.read_settings,
    })
    .await?;

    println!("{}", output);
    Ok(())
}
