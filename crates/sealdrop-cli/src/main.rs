//! sealdrop: zero-knowledge large-file sharing CLI
//!
//! Commands:
//!   share <file>        - encrypt and upload a file, print its share link
//!   fetch <link>        - download and decrypt a shared file
//!   link <link>         - inspect a share link without revealing its secret
//!   sweep               - abort stale multipart sessions, purge expired shares
//!   status              - check storage and share server reachability
//!   config show         - display current configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sealdrop_core::config::{BackendKind, SealdropConfig};
use sealdrop_core::link::{LinkSecret, ShareLink};
use sealdrop_core::types::{unix_now, Expiry};
use sealdrop_core::SealdropError;
use sealdrop_crypto::MasterSecret;
use sealdrop_pipeline::{
    resolve_cipher, CipherPool, FileSink, KeyMode, ProgressFn, SharePipeline, ShareRequest,
};
use sealdrop_storage::{
    HttpManifestStore, ManifestStore, MultipartBackend, OperatorBackend, OperatorManifestStore,
    PresignedBackend, S3Credentials,
};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "sealdrop",
    version,
    about = "Share large files with client-side encryption",
    long_about = "sealdrop: encrypt files in chunks, upload them to object storage, \
                  and share a link whose fragment carries the key"
)]
struct Cli {
    /// Path to sealdrop.toml configuration file
    #[arg(long, short = 'c', env = "SEALDROP_CONFIG", default_value = "~/.config/sealdrop/config.toml")]
    config: PathBuf,

    /// Log filter (overrides [log] level), e.g. "debug" or "sealdrop_pipeline=trace"
    #[arg(long, env = "SEALDROP_LOG")]
    log: Option<String>,

    /// Log output format (overrides [log] format)
    #[arg(long, env = "SEALDROP_LOG_FORMAT", value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt and upload a file, then print its share link
    Share {
        /// File to share
        file: PathBuf,
        /// Link lifetime: 1h, 24h or 7d (default: [share] default_expiry)
        #[arg(long, short = 'e')]
        expiry: Option<Expiry>,
        /// Name recipients see (default: the file name)
        #[arg(long)]
        name: Option<String>,
        /// MIME type recorded in the manifest
        #[arg(long)]
        content_type: Option<String>,
        /// Split the key with the server (requires the master secret)
        #[arg(long)]
        hybrid: bool,
    },

    /// Download and decrypt a shared file
    Fetch {
        /// Full share link including the '#' fragment
        link: String,
        /// Destination path (default: the shared file's name in the current directory)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Inspect a share link. Never prints the key material.
    Link {
        link: String,
        /// Also look up the file's manifest
        #[arg(long)]
        remote: bool,
    },

    /// Abort stale multipart sessions and purge expired shares
    ///
    /// Works against the bucket directly (s3, fs or memory backend).
    Sweep {
        /// Session age in seconds after which it is aborted (default: [storage] stale_session_secs)
        #[arg(long)]
        max_age_secs: Option<u64>,
        /// Only abort stale sessions; keep expired shares
        #[arg(long)]
        sessions_only: bool,
    },

    /// Check storage and share server reachability
    Status,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let config = load_config(&config_path).await?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli.log_format.unwrap_or(match config.log.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, format);
    if !config_path.exists() {
        tracing::warn!("config file not found: {}  (using defaults)", config_path.display());
    }

    match cli.command {
        Commands::Share {
            file,
            expiry,
            name,
            content_type,
            hybrid,
        } => cmd_share(&config, &file, expiry, name, content_type, hybrid).await,
        Commands::Fetch { link, output } => cmd_fetch(&config, &link, output.as_deref()).await,
        Commands::Link { link, remote } => cmd_link(&config, &link, remote).await,
        Commands::Sweep {
            max_age_secs,
            sessions_only,
        } => cmd_sweep(&config, max_age_secs, sessions_only).await,
        Commands::Status => cmd_status(&config).await,
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &config_path),
    }
}

// ── Config loading and logging ────────────────────────────────────────────────

async fn load_config(path: &Path) -> Result<SealdropConfig> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config: {}", path.display()))
    } else {
        Ok(SealdropConfig::default())
    }
}

/// Logs go to stderr so stdout carries only command output (the share link).
fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Storage wiring ────────────────────────────────────────────────────────────

/// Build an OpenDAL operator for the s3, fs or memory backend.
///
/// S3 credentials come from AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY
/// (or the SEALDROP_ prefixed variants).
fn build_operator_from_env(config: &SealdropConfig) -> Result<opendal::Operator> {
    let mut storage = config.storage.clone();
    storage.root = expand_tilde(&storage.root);

    let creds = match storage.backend {
        BackendKind::S3 => {
            let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
                .or_else(|_| std::env::var("SEALDROP_ACCESS_KEY_ID"))
                .context(
                    "S3 credentials not set\n\
                     Set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY environment variables.\n\
                     Example:\n\
                     \texport AWS_ACCESS_KEY_ID=your-key\n\
                     \texport AWS_SECRET_ACCESS_KEY=your-secret",
                )?;
            let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
                .or_else(|_| std::env::var("SEALDROP_SECRET_ACCESS_KEY"))
                .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
            Some(S3Credentials {
                access_key_id,
                secret_access_key,
            })
        }
        _ => None,
    };

    sealdrop_storage::build_from_config(&storage, creds.as_ref()).context("building storage operator")
}

/// Backend and manifest store selected by `[storage] backend`.
fn build_services(config: &SealdropConfig) -> Result<(Arc<dyn MultipartBackend>, Arc<dyn ManifestStore>)> {
    if config.storage.backend == BackendKind::Presigned {
        let backend = PresignedBackend::from_config(&config.storage).context("building presigned backend")?;
        let store = HttpManifestStore::from_config(&config.storage).context("building metadata client")?;
        return Ok((Arc::new(backend), Arc::new(store)));
    }
    if config.storage.backend == BackendKind::Memory {
        tracing::warn!("memory backend: shares vanish when this process exits");
    }
    let op = build_operator_from_env(config)?;
    Ok((
        Arc::new(OperatorBackend::new(op.clone())),
        Arc::new(OperatorManifestStore::new(op)),
    ))
}

fn build_pipeline(config: &SealdropConfig, pool: &CipherPool) -> Result<SharePipeline> {
    let (backend, store) = build_services(config)?;
    Ok(SharePipeline::new(
        pool.clone(),
        backend,
        store,
        config.pipeline.clone(),
    ))
}

fn master_secret(config: &SealdropConfig) -> Result<MasterSecret> {
    let var = &config.hybrid.master_key_env;
    let secret = std::env::var(var).with_context(|| format!("hybrid mode needs the master secret in ${var}"))?;
    if secret.is_empty() {
        anyhow::bail!("${var} is empty");
    }
    Ok(MasterSecret::from(secret))
}

/// Shut the pool down on Ctrl-C. In-flight uploads then fail with a
/// cancellation and abort their multipart session.
fn cancel_on_interrupt(pool: &CipherPool) -> tokio::task::JoinHandle<()> {
    let pool = pool.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; cancelling");
            pool.shutdown();
        }
    })
}

/// Expand `~` in path to the user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_default();
        PathBuf::from(format!("{home}/{rest}"))
    } else {
        path.to_path_buf()
    }
}

/// Translate pipeline errors into the one-line message users see.
fn user_error(e: SealdropError, what: &str) -> anyhow::Error {
    match e {
        e if e.is_cancellation() => anyhow::anyhow!("{what}: cancelled"),
        SealdropError::NotFound(_) => anyhow::anyhow!("{what}: file not found or expired"),
        SealdropError::ChunkIntegrity { .. } => {
            anyhow::anyhow!("{what}: decryption failed (wrong key or corrupted data)")
        }
        other => anyhow::Error::new(other).context(what.to_string()),
    }
}

// ── Progress bar helpers ──────────────────────────────────────────────────────

fn make_progress_bar(total: u64, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}") {
        pb.set_style(style.progress_chars("=>-"));
    }
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn chunk_progress(pb: &ProgressBar) -> ProgressFn {
    let pb = pb.clone();
    Box::new(move |_pct, status, done, total| {
        pb.set_length(u64::from(total));
        pb.set_position(u64::from(done));
        pb.set_message(status.to_string());
    })
}

// ── `sealdrop share` ──────────────────────────────────────────────────────────

async fn cmd_share(
    config: &SealdropConfig,
    file: &Path,
    expiry: Option<Expiry>,
    name: Option<String>,
    content_type: Option<String>,
    hybrid: bool,
) -> Result<()> {
    if !file.is_file() {
        anyhow::bail!("not a file: {}", file.display());
    }
    let mode = if hybrid || config.hybrid.enabled {
        KeyMode::Hybrid(master_secret(config)?)
    } else {
        KeyMode::ZeroKnowledge
    };
    let request = ShareRequest {
        original_name: name.unwrap_or_else(|| {
            file.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "file".to_string())
        }),
        content_type,
        expiry: expiry.unwrap_or(config.share.default_expiry),
        origin: config.share.origin.clone(),
    };

    let pool = CipherPool::new(config.pipeline.workers);
    let pipeline = build_pipeline(config, &pool)?;
    let interrupt = cancel_on_interrupt(&pool);

    let pb = make_progress_bar(0, "share");
    pb.set_message(request.original_name.clone());
    let progress = chunk_progress(&pb);

    let result = pipeline.share_file(file, &request, &mode, Some(&progress)).await;
    interrupt.abort();
    pool.shutdown();

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            pb.abandon_with_message("failed");
            return Err(user_error(e, &format!("sharing {}", file.display())));
        }
    };
    pb.finish_with_message("done".to_string());

    eprintln!();
    eprintln!("Shared {}:", request.original_name);
    eprintln!("  size:     {}", fmt_bytes(outcome.manifest.original_size));
    eprintln!("  chunks:   {}", outcome.total_chunks);
    eprintln!("  expires:  in {} ({})", request.expiry, outcome.manifest.expires_at);
    eprintln!("  mode:     {}", if mode.is_hybrid() { "hybrid" } else { "zero-knowledge" });
    eprintln!();
    // the only line on stdout, so the link can be piped
    println!("{}", outcome.link.to_url().as_str());
    Ok(())
}

// ── `sealdrop fetch` ──────────────────────────────────────────────────────────

async fn cmd_fetch(config: &SealdropConfig, link: &str, output: Option<&Path>) -> Result<()> {
    let link = ShareLink::parse(link).context("parsing share link")?;
    let master = match link.secret {
        LinkSecret::Hybrid { .. } => Some(master_secret(config)?),
        LinkSecret::ZeroKnowledge { .. } => None,
    };

    let pool = CipherPool::new(config.pipeline.workers);
    let pipeline = build_pipeline(config, &pool)?;
    let interrupt = cancel_on_interrupt(&pool);

    let result = fetch_into(&pipeline, &link, master.as_ref(), output).await;
    interrupt.abort();
    pool.shutdown();
    let (dest, bytes) = result?;

    println!();
    println!("Downloaded:");
    println!("  local:  {}", dest.display());
    println!("  bytes:  {}", fmt_bytes(bytes));
    Ok(())
}

async fn fetch_into(
    pipeline: &SharePipeline,
    link: &ShareLink,
    master: Option<&MasterSecret>,
    output: Option<&Path>,
) -> Result<(PathBuf, u64)> {
    let what = format!("fetching {}", link.public_url());
    let manifest = pipeline
        .lookup(&link.file_id)
        .await
        .map_err(|e| user_error(e, &what))?;
    let cipher = resolve_cipher(&link.secret, &manifest, master).map_err(|e| user_error(e, &what))?;

    let dest = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_destination(&manifest.original_name, &manifest.file_id));
    if dest.exists() {
        anyhow::bail!("refusing to overwrite {}", dest.display());
    }

    let pb = make_progress_bar(u64::from(manifest.chunk_count), "fetch");
    pb.set_message(manifest.original_name.clone());
    let progress = chunk_progress(&pb);

    let mut sink = FileSink::create(&dest)
        .await
        .with_context(|| format!("creating {}", dest.display()))?;
    match pipeline
        .download_and_decrypt(&manifest, cipher, &mut sink, Some(&progress))
        .await
    {
        Ok(outcome) => {
            pb.finish_with_message("done".to_string());
            Ok((dest, outcome.bytes))
        }
        Err(e) => {
            pb.abandon_with_message("failed");
            Err(user_error(e, &what))
        }
    }
}

/// Current-directory path for a shared file, ignoring any directory parts
/// in the sender-supplied name.
fn default_destination(original_name: &str, file_id: &str) -> PathBuf {
    Path::new(original_name)
        .file_name()
        .filter(|n| !n.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(file_id))
}

// ── `sealdrop link` ───────────────────────────────────────────────────────────

async fn cmd_link(config: &SealdropConfig, link: &str, remote: bool) -> Result<()> {
    let link = ShareLink::parse(link).context("parsing share link")?;
    println!("url:      {}", link.public_url());
    println!("file id:  {}", link.file_id);
    println!(
        "mode:     {}",
        match link.secret {
            LinkSecret::ZeroKnowledge { .. } => "zero-knowledge",
            LinkSecret::Hybrid { .. } => "hybrid",
        }
    );

    if remote {
        let (_, store) = build_services(config)?;
        let manifest = sealdrop_storage::fetch_manifest(store.as_ref(), &link.file_id, unix_now())
            .await
            .map_err(|e| user_error(e, "looking up share"))?;
        println!("name:      {}", manifest.original_name);
        println!("size:      {}", fmt_bytes(manifest.original_size));
        println!("chunks:    {}", manifest.chunk_count);
        println!("expires:   in {}", format_remaining(manifest.expires_at.saturating_sub(unix_now())));
        println!("downloads: {}", manifest.download_count);
    }
    Ok(())
}

fn format_remaining(secs: u64) -> String {
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    if h >= 24 {
        format!("{}d {}h", h / 24, h % 24)
    } else if h > 0 {
        format!("{h}h {m}m")
    } else {
        format!("{m}m {}s", secs % 60)
    }
}

// ── `sealdrop sweep` ──────────────────────────────────────────────────────────

async fn cmd_sweep(config: &SealdropConfig, max_age_secs: Option<u64>, sessions_only: bool) -> Result<()> {
    if config.storage.backend == BackendKind::Presigned {
        anyhow::bail!(
            "sweep needs direct bucket access; set [storage] backend to \"s3\" or \"fs\" \
             (the share server sweeps its own bucket)"
        );
    }
    let op = build_operator_from_env(config)?;
    let backend = OperatorBackend::new(op.clone());
    let now = unix_now();
    let max_age = max_age_secs.unwrap_or(config.storage.stale_session_secs);

    let report = backend
        .sweep_stale_sessions(now, max_age)
        .await
        .context("sweeping multipart sessions")?;
    println!("Multipart sessions:");
    println!("  examined: {}", report.examined);
    println!("  aborted:  {}", report.aborted);
    println!("  failed:   {}", report.failed);

    if sessions_only {
        return Ok(());
    }

    let store = OperatorManifestStore::new(op);
    let expired = store.purge_expired(now).await.context("purging expired shares")?;
    let mut freed = 0u64;
    for manifest in &expired {
        match backend.delete_object(&manifest.object_key).await {
            Ok(()) => freed += manifest.stored_size().unwrap_or(manifest.original_size),
            Err(e) => tracing::warn!(file_id = %manifest.file_id, error = %e, "failed to delete expired object"),
        }
    }
    println!("Expired shares:");
    println!("  purged:   {}", expired.len());
    println!("  freed:    {}", fmt_bytes(freed));
    Ok(())
}

// ── `sealdrop status` ─────────────────────────────────────────────────────────

async fn cmd_status(config: &SealdropConfig) -> Result<()> {
    println!("sealdrop v{}", env!("CARGO_PKG_VERSION"));
    println!("  backend:  {:?}", config.storage.backend);
    println!("  workers:  {} cipher, {} upload, {} download",
        config.pipeline.workers,
        config.pipeline.upload_concurrency,
        config.pipeline.download_concurrency,
    );
    println!("  hybrid:   {}", if config.hybrid.enabled { "enabled" } else { "disabled" });

    match config.storage.backend {
        BackendKind::Presigned => {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(config.storage.request_timeout_secs))
                .build()
                .context("building HTTP client")?;
            match sealdrop_storage::check_api_health(&client, &config.storage.api_base).await {
                Ok(()) => println!("  server:   ok ({})", config.storage.api_base),
                Err(e) => println!("  server:   UNREACHABLE ({e})"),
            }
        }
        _ => {
            let op = build_operator_from_env(config)?;
            match sealdrop_storage::check_health(&op).await {
                Ok(()) => println!("  storage:  ok"),
                Err(e) => println!("  storage:  UNREACHABLE ({e})"),
            }
            let sessions = OperatorBackend::new(op).list_sessions().await.unwrap_or_default();
            println!("  sessions: {} open multipart", sessions.len());
        }
    }
    Ok(())
}

// ── `sealdrop config show` ────────────────────────────────────────────────────

fn cmd_config_show(config: &SealdropConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_share() {
        let cli = Cli::try_parse_from(["sealdrop", "share", "movie.mkv", "--expiry", "7d", "--hybrid"]).unwrap();
        match cli.command {
            Commands::Share { file, expiry, hybrid, .. } => {
                assert_eq!(file, PathBuf::from("movie.mkv"));
                assert_eq!(expiry, Some(Expiry::SevenDays));
                assert!(hybrid);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_expiry() {
        assert!(Cli::try_parse_from(["sealdrop", "share", "a", "--expiry", "2w"]).is_err());
    }

    #[test]
    fn test_default_destination_strips_directories() {
        assert_eq!(default_destination("../../etc/passwd", "id"), PathBuf::from("passwd"));
        assert_eq!(default_destination("report.pdf", "id"), PathBuf::from("report.pdf"));
        assert_eq!(default_destination("..", "id"), PathBuf::from("id"));
    }

    #[test]
    fn test_expand_tilde() {
        std::env::set_var("HOME", "/home/test");
        assert_eq!(expand_tilde(Path::new("~/a/b")), PathBuf::from("/home/test/a/b"));
        assert_eq!(expand_tilde(Path::new("/etc/x")), PathBuf::from("/etc/x"));
    }

    #[test]
    fn test_fmt_bytes() {
        assert_eq!(fmt_bytes(512), "512 B");
        assert_eq!(fmt_bytes(2048), "2.0 KB");
        assert_eq!(fmt_bytes(120 * 1024 * 1024), "120.0 MB");
    }

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(90), "1m 30s");
        assert_eq!(format_remaining(3 * 3600 + 60), "3h 1m");
        assert_eq!(format_remaining(7 * 86400), "7d 0h");
    }

    #[test]
    fn test_user_error_hides_detail() {
        let e = user_error(SealdropError::ChunkIntegrity { index: 3 }, "fetching x");
        assert_eq!(e.to_string(), "fetching x: decryption failed (wrong key or corrupted data)");
        let e = user_error(SealdropError::PoolTerminated, "sharing y");
        assert_eq!(e.to_string(), "sharing y: cancelled");
    }

    #[tokio::test]
    async fn test_missing_config_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("nope.toml")).await.unwrap();
        assert_eq!(config.pipeline.workers, 4);
    }
}
