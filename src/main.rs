use clap::Parser;
use eyre::{Result, WrapErr};
use geotag::config::GeotagConfig;
use geotag::location::HttpGeocoder;
use geotag::manifest;
use geotag::tagger::GeoTagger;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Geotag: attach city and country to media resources from their GPS metadata.
///
/// Reads a JSON manifest of resources, reverse-geocodes each GPS position
/// (cached, rate-limited) and writes the manifest back with a `geotag`
/// annotation on every resolved resource.
///
/// Examples:
///   geotag photos.json > tagged.json
///   geotag photos.json --storage sled --storage-path ~/.cache/geotag
///   geotag photos.json --offline --precision 4
///   RUST_LOG=debug geotag photos.json --rate 0.5 --api-key $KEY
#[derive(Parser)]
#[command(name = "geotag", version, about, long_about = None)]
struct Cli {
    /// Resource manifest (JSON).
    #[arg(index = 1)]
    manifest: PathBuf,

    /// Write the annotated manifest here instead of stdout.
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// JSON config file. Replaces the settings given by flags.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Offline mode: only use the cache, never call the provider.
    #[arg(long)]
    offline: bool,

    #[command(flatten)]
    settings: GeotagConfig,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => GeotagConfig::from_file(path)?,
        None => cli.settings.clone(),
    };

    let mut entries = manifest::load(&cli.manifest)?;
    info!("Loaded {} resources from {}", entries.len(), cli.manifest.display());

    let mut tagger = GeoTagger::new(&config);
    tagger.set_offline(cli.offline);
    let report = tagger
        .process(&mut entries, HttpGeocoder::from_config(&config))
        .wrap_err_with(|| format!("failed to geotag {}", cli.manifest.display()))?;

    match &cli.output {
        Some(path) => {
            let file = File::create(path).wrap_err_with(|| format!("cannot create {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            manifest::write(&mut writer, &entries)?;
            writer.flush()?;
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            manifest::write(&mut stdout, &entries)?;
            writeln!(stdout)?;
        }
    }

    if !report.failed.is_empty() {
        eprintln!("  {} resources could not be tagged:", report.failed.len());
        for failure in &report.failed {
            eprintln!("    {}: {}", failure.id, failure.error);
        }
    }

    Ok(())
}
