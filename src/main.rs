//! Channels CLI
//!
//! Entry point for the `channels` command-line tool.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use artifact_channels::config::{default_user_config_path, EffectiveConfig};
use artifact_channels::model::mapper::parse_channels;
use artifact_channels::model::{ArtifactCoordinate, ChannelDefinition, ModelError};
use artifact_channels::repository::LocalRepositoryFactory;
use artifact_channels::session::{write_recording, ArtifactRequest, ChannelSession, ResolvedArtifact};
use artifact_channels::signature::{
    DetachedSignature, FileFetcher, FileTrustStore, HttpFetcher, KeyringValidator, PksKeyserver,
    SecretKeyFile, SignatureValidator, UrlFetcher,
};
use artifact_channels::{ChannelError, ChannelResult, SignatureResult};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "channels")]
#[command(about = "Resolve artifact versions through channels", version)]
struct Cli {
    /// User config file (default: ~/.config/channels/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Retries while the same artifacts keep failing
    #[arg(long, global = true)]
    max_retries: Option<u32>,

    /// Pause between retries in milliseconds (0: no pause)
    #[arg(long, global = true)]
    retry_timeout_ms: Option<u64>,

    /// Do not query keyservers
    #[arg(long, global = true)]
    offline: bool,

    /// Directory of trusted keys
    #[arg(long, global = true)]
    trust_store: Option<PathBuf>,

    /// Copy resolved artifacts into this directory
    #[arg(long, global = true)]
    local_cache: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve and fetch artifacts through channels
    Resolve {
        /// Channel definition files
        #[arg(long = "channel", short = 'c', required = true)]
        channels: Vec<PathBuf>,

        /// Artifacts as groupId:artifactId[:extension[:classifier]],
        /// or full coordinates with --direct
        #[arg(required = true)]
        artifacts: Vec<String>,

        /// Fetch exact coordinates, bypassing channel streams
        #[arg(long)]
        direct: bool,

        /// Write the channels pinned to the resolved versions into this directory
        #[arg(long)]
        record: Option<PathBuf>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Print the version channels select for an artifact
    Version {
        /// Channel definition files
        #[arg(long = "channel", short = 'c', required = true)]
        channels: Vec<PathBuf>,

        /// groupId:artifactId[:extension[:classifier]]
        artifact: String,

        /// Version returned by channels using the `original` strategy
        #[arg(long)]
        base_version: Option<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Check the detached signature of a file
    Verify {
        file: PathBuf,

        /// Signature file (default: <file>.asc)
        #[arg(long)]
        signature: Option<PathBuf>,

        /// Key ring URLs to try for unknown keys
        #[arg(long = "key-url")]
        key_urls: Vec<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show the effective configuration
    Config,

    /// Generate a signing key
    Keygen {
        /// Secret key file to write; the public key ring goes next to it
        #[arg(long)]
        out: PathBuf,

        #[arg(long)]
        user_id: Option<String>,
    },

    /// Write a detached signature for a file
    Sign {
        file: PathBuf,

        /// Secret key file written by `keygen`
        #[arg(long)]
        key: PathBuf,
    },
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("CHANNELS_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> ChannelResult<()> {
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Resolve {
            channels,
            artifacts,
            direct,
            record,
            json,
        } => run_resolve(&config, &channels, &artifacts, direct, record.as_deref(), json),
        Commands::Version {
            channels,
            artifact,
            base_version,
            json,
        } => run_version(&config, &channels, &artifact, base_version, json),
        Commands::Verify {
            file,
            signature,
            key_urls,
            json,
        } => run_verify(&config, &file, signature, &key_urls, json),
        Commands::Config => {
            println!("{}", config.to_json()?);
            Ok(())
        }
        Commands::Keygen { out, user_id } => run_keygen(&out, user_id.as_deref()),
        Commands::Sign { file, key } => run_sign(&file, &key),
    }
}

fn load_config(cli: &Cli) -> ChannelResult<EffectiveConfig> {
    let mut overrides = serde_json::Map::new();
    let mut retry = serde_json::Map::new();
    if let Some(max_retries) = cli.max_retries {
        retry.insert("max_retries".to_string(), json!(max_retries));
    }
    if let Some(timeout) = cli.retry_timeout_ms {
        retry.insert("timeout_ms".to_string(), json!(timeout));
    }
    if !retry.is_empty() {
        overrides.insert("retry".to_string(), retry.into());
    }
    let mut repository = serde_json::Map::new();
    if cli.offline {
        repository.insert("offline".to_string(), json!(true));
    }
    if let Some(cache) = &cli.local_cache {
        repository.insert("local_cache".to_string(), json!(cache));
    }
    if !repository.is_empty() {
        overrides.insert("repository".to_string(), repository.into());
    }
    if let Some(store) = &cli.trust_store {
        overrides.insert("signature".to_string(), json!({ "trust_store": store }));
    }

    let user_config = cli.config.clone().or_else(default_user_config_path);
    let cli_layer = (!overrides.is_empty()).then(|| overrides.into());
    Ok(EffectiveConfig::build(user_config.as_deref(), cli_layer)?)
}

fn load_channels(paths: &[PathBuf]) -> ChannelResult<Vec<ChannelDefinition>> {
    let mut definitions = Vec::new();
    for path in paths {
        let content = fs::read_to_string(path)?;
        let channels = parse_channels(&content)?;
        debug!(path = %path.display(), channels = channels.len(), "loaded channel file");
        definitions.extend(channels);
    }
    Ok(definitions)
}

fn build_validator(config: &EffectiveConfig) -> ChannelResult<Arc<dyn SignatureValidator>> {
    let store_dir = config
        .trust_store()
        .or_else(|| default_user_config_path().and_then(|p| p.parent().map(|d| d.join("trusted-keys"))))
        .unwrap_or_else(|| PathBuf::from(".channels-trusted-keys"));
    let store = FileTrustStore::open(store_dir)?;

    let fetcher: Arc<dyn UrlFetcher> = if config.offline() {
        Arc::new(FileFetcher)
    } else {
        Arc::new(HttpFetcher::default())
    };
    let mut validator = KeyringValidator::new(Arc::new(store)).with_fetcher(fetcher.clone());
    for server in config.keyservers() {
        validator = validator.with_keyserver(Box::new(PksKeyserver::new(server, fetcher.clone())));
    }
    Ok(Arc::new(validator))
}

fn open_session(config: &EffectiveConfig, channels: &[PathBuf]) -> ChannelResult<ChannelSession> {
    let definitions = load_channels(channels)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nReceived interrupt signal, abandoning retries...");
        flag.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "unable to install interrupt handler");
    }

    let mut factory = LocalRepositoryFactory::new(config.retry_policy()).with_interrupt(interrupted);
    if let Some(cache) = config.local_cache() {
        factory = factory.with_local_cache(cache);
    }

    let validator = if definitions.iter().any(|d| d.require_signature) {
        Some(build_validator(config)?)
    } else {
        None
    };
    ChannelSession::new(definitions, Arc::new(factory), validator)
}

fn parse_request(value: &str) -> ChannelResult<ArtifactRequest> {
    let parts: Vec<&str> = value.split(':').collect();
    let request = match parts.as_slice() {
        [g, a] => ArtifactRequest::new(*g, *a),
        [g, a, e] => ArtifactRequest::new(*g, *a).with_extension(*e),
        [g, a, e, c] => ArtifactRequest::new(*g, *a).with_extension(*e).with_classifier(*c),
        _ => {
            return Err(ModelError::InvalidCoordinate {
                value: value.to_string(),
                reason: "expected groupId:artifactId[:extension[:classifier]]".to_string(),
            }
            .into())
        }
    };
    Ok(request)
}

fn run_resolve(
    config: &EffectiveConfig,
    channels: &[PathBuf],
    artifacts: &[String],
    direct: bool,
    record: Option<&Path>,
    json: bool,
) -> ChannelResult<()> {
    let mut session = open_session(config, channels)?;

    let resolved = if direct {
        let coordinates = artifacts
            .iter()
            .map(|a| ArtifactCoordinate::parse(a))
            .collect::<Result<Vec<_>, _>>()?;
        session.resolve_direct_artifacts(&coordinates)?
    } else {
        let requests = artifacts
            .iter()
            .map(|a| parse_request(a))
            .collect::<ChannelResult<Vec<_>>>()?;
        session.resolve_artifacts(&requests)?
    };

    print_artifacts(&resolved, json)?;

    if let Some(dir) = record {
        let mut recorded = session.recorded_channels()?;
        let path = write_recording(&mut recorded, dir)?;
        if !json {
            println!("Recorded channels written to {}", path.display());
        }
    }
    session.close()
}

fn print_artifacts(resolved: &[ResolvedArtifact], json: bool) -> ChannelResult<()> {
    if json {
        let items: Vec<serde_json::Value> = resolved
            .iter()
            .map(|r| {
                json!({
                    "coordinate": r.coordinate.to_string(),
                    "file": r.file,
                    "channel": r.channel,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for artifact in resolved {
            match &artifact.channel {
                Some(channel) => println!(
                    "{}  {}  (from {})",
                    artifact.coordinate,
                    artifact.file.display(),
                    channel
                ),
                None => println!("{}  {}", artifact.coordinate, artifact.file.display()),
            }
        }
    }
    Ok(())
}

fn run_version(
    config: &EffectiveConfig,
    channels: &[PathBuf],
    artifact: &str,
    base_version: Option<String>,
    json: bool,
) -> ChannelResult<()> {
    let mut session = open_session(config, channels)?;
    let mut request = parse_request(artifact)?;
    request.base_version = base_version;

    let found = session.find_latest_version(&request)?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "artifact": request.label(),
                "version": found.version,
                "channel": found.channel,
            }))?
        );
    } else {
        println!("{} {} (from {})", request.label(), found.version, found.channel);
    }
    session.close()
}

fn run_verify(
    config: &EffectiveConfig,
    file: &Path,
    signature: Option<PathBuf>,
    key_urls: &[String],
    json: bool,
) -> ChannelResult<()> {
    let signature_path = signature.unwrap_or_else(|| {
        let mut name = file.as_os_str().to_owned();
        name.push(".asc");
        PathBuf::from(name)
    });
    let identifier = file.display().to_string();
    let content = fs::read(file)?;

    let result = match fs::read(&signature_path) {
        Ok(signature) => build_validator(config)?.validate(&identifier, &content, &signature, key_urls)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => SignatureResult::NoSignature,
        Err(e) => return Err(e.into()),
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "file": identifier,
                "valid": result.is_ok(),
                "key_id": result.key_id(),
                "result": result.to_string(),
            }))?
        );
    } else if result.is_ok() {
        println!("{}: {}", identifier, result);
    }

    if result.is_ok() {
        Ok(())
    } else {
        Err(ChannelError::Trust {
            artifact: identifier,
            result,
        })
    }
}

fn run_keygen(out: &Path, user_id: Option<&str>) -> ChannelResult<()> {
    let key = SecretKeyFile::generate(user_id);
    key.save(out)?;

    let ring_path = out.with_extension("pub.json");
    fs::write(&ring_path, serde_json::to_string_pretty(&vec![key.public.clone()])?)?;

    println!("Key id:      {}", key.public.key_id);
    println!("Secret key:  {}", out.display());
    println!("Public ring: {}", ring_path.display());
    Ok(())
}

fn run_sign(file: &Path, key: &Path) -> ChannelResult<()> {
    let secret = SecretKeyFile::load(key)?;
    let signing_key = secret.signing_key()?;
    let content = fs::read(file)?;

    let signature = DetachedSignature::sign(&content, &signing_key);
    let mut name = file.as_os_str().to_owned();
    name.push(".asc");
    let path = PathBuf::from(name);
    fs::write(&path, signature.to_json()?)?;

    println!("Signed {} with key {} -> {}", file.display(), signature.key_id, path.display());
    Ok(())
}
