use std::path::{Path, PathBuf};
use std::process::ExitCode;

use carwash_core::{CacheBackend, ServiceConfig, DEFAULT_BEATS_PER_BAR, DEFAULT_PRESET};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Mix {
            input,
            output,
            preset,
        } => run_mix(&input, &output, &preset),
        Commands::MapLyrics {
            lyrics,
            bpm,
            beats_per_bar,
            offset,
            output,
        } => run_map_lyrics(&lyrics, bpm, beats_per_bar, offset, &output),
        Commands::Serve(args) => run_serve(args),
    };

    exit_code(outcome)
}

fn exit_code(outcome: carwash_core::Result<()>) -> ExitCode {
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run_mix(input: &Path, output: &Path, preset: &str) -> carwash_core::Result<()> {
    tracing::info!(?input, ?output, preset, "normalizing");
    let original = carwash_core::normalize(input, output, preset)?;
    println!("Done. Loudness was {original:.2} LUFS, now -14 LUFS.");
    Ok(())
}

fn run_map_lyrics(
    lyrics: &Path,
    bpm: f64,
    beats_per_bar: u32,
    offset: f64,
    output: &Path,
) -> carwash_core::Result<()> {
    let report = carwash_core::map_lyrics(lyrics, bpm, beats_per_bar, offset, Some(output))?;
    if !report.skipped.is_empty() {
        tracing::debug!(skipped = report.skipped.len(), "lines without lyrics");
    }
    println!("Wrote {} mappings to {}", report.count(), output.display());
    Ok(())
}

fn run_serve(args: ServeArgs) -> carwash_core::Result<()> {
    let config = args.into_config()?;
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(carwash_server::serve(config))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            std::env::var("LOG_LEVEL")
                .map_err(|_| ())
                .and_then(|level| EnvFilter::try_new(level).map_err(|_| ()))
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Loudness normalization and lyric bar mapping", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Normalize an audio file to -14 LUFS integrated loudness.
    Mix {
        /// Audio file to read.
        #[arg(short, long)]
        input: PathBuf,
        /// Destination file; the extension selects WAV, FLAC or MP3.
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, default_value = DEFAULT_PRESET)]
        preset: String,
    },
    /// Map timestamped LRC lines to bar keys and write them as JSON.
    MapLyrics {
        /// LRC file to read.
        #[arg(short, long)]
        lyrics: PathBuf,
        /// Tempo in beats per minute.
        #[arg(long)]
        bpm: f64,
        #[arg(long, default_value_t = DEFAULT_BEATS_PER_BAR)]
        beats_per_bar: u32,
        /// Seconds before the first downbeat.
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        offset: f64,
        /// Destination JSON file.
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Run the HTTP API.
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// TOML configuration file; flags below override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long)]
    host: Option<String>,
    #[arg(long, env = "PORT")]
    port: Option<u16>,
    /// Cache backend: redis, memory or none.
    #[arg(long, env = "CACHE_BACKEND")]
    cache: Option<CacheBackend>,
    #[arg(long, env = "REDIS_HOST")]
    redis_host: Option<String>,
    #[arg(long, env = "REDIS_PORT")]
    redis_port: Option<u16>,
    /// Lifetime of cached responses in seconds.
    #[arg(long, env = "CACHE_TTL")]
    cache_ttl: Option<u64>,
}

impl ServeArgs {
    fn into_config(self) -> carwash_core::Result<ServiceConfig> {
        let mut config = ServiceConfig::load(self.config.as_deref())?;

        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(backend) = self.cache {
            config.cache.backend = backend;
        }
        if let Some(host) = self.redis_host {
            config.cache.redis_host = host;
        }
        if let Some(port) = self.redis_port {
            config.cache.redis_port = port;
        }
        if let Some(ttl) = self.cache_ttl {
            config.cache.ttl_secs = ttl;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn map_lyrics_defaults() {
        let cli = Cli::try_parse_from([
            "wash-mix", "map-lyrics", "--lyrics", "a.lrc", "--bpm", "120", "--output", "a.json",
        ])
        .unwrap();

        match cli.command {
            Commands::MapLyrics {
                beats_per_bar,
                offset,
                ..
            } => {
                assert_eq!(beats_per_bar, 4);
                assert_eq!(offset, 0.0);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn commands_report_missing_inputs() {
        let dir = std::env::temp_dir().join(format!("wash-mix-{}", std::process::id()));
        let missing = dir.join("missing.wav");

        let outcome = run_mix(&missing, &dir.join("out.wav"), DEFAULT_PRESET);
        assert!(matches!(outcome, Err(carwash_core::MixerError::NotFound(_))));
        assert_eq!(exit_code(outcome), ExitCode::FAILURE);
        assert_eq!(exit_code(Ok(())), ExitCode::SUCCESS);

        let err = run_map_lyrics(&dir.join("missing.lrc"), 120.0, 4, 0.0, &dir.join("out.json"))
            .unwrap_err();
        assert!(matches!(err, carwash_core::MixerError::NotFound(_)));
        assert!(!dir.join("out.json").exists());

        let err = run_map_lyrics(&dir.join("missing.lrc"), 0.0, 4, 0.0, &dir.join("out.json"))
            .unwrap_err();
        assert!(matches!(err, carwash_core::MixerError::InvalidParameter(_)));
    }

    #[test]
    fn serve_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "wash-mix", "serve", "--port", "8080", "--cache", "memory", "--cache-ttl", "60",
        ])
        .unwrap();

        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        let config = args.into_config().unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert_eq!(config.cache.ttl_secs, 60);
    }
}
