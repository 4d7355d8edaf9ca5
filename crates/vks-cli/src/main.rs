//! vks: validator key sync
//!
//! Commands:
//!   sync                 - scan registered keys, assign signer groups, write the store
//!   export               - seal registered keys to a recipient, one .enc file per key
//!   keygen --out <path>  - create a recipient keypair (<path>.key / <path>.pub)
//!   status               - store reachability, record count, signer groups
//!   config show          - display current configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::SecretString;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use vks_core::config::{StoreBackend, VksConfig};
use vks_core::{DerivationScheme, OperatorAddress};
use vks_crypto::{CipherKey, MasterSecret, RecipientPublicKey, RecipientSecretKey};
use vks_registry::BeaconOracle;
use vks_store::{build_operator, OperatorStore, S3Credentials, SyncStore};
use vks_sync::{ProgressFn, SyncPlan, SyncReport, SyncRequest, TransferBundle};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "vks",
    version,
    about = "Validator key sync",
    long_about = "vks: derive validator keys, detect the registered ones, and publish them \
                  encrypted to the remote-signer store"
)]
struct Cli {
    /// Path to vks.toml configuration file
    #[arg(long, short = 'c', env = "VKS_CONFIG", default_value = "vks.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [log] level
    #[arg(long, env = "VKS_LOG")]
    log: Option<String>,

    /// Log format; overrides [log] format
    #[arg(long, env = "VKS_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sync registered validator keys into the shared store
    ///
    /// The mnemonic is read from VKS_MNEMONIC or prompted for.
    Sync {
        /// Operator wallet address recorded with every key
        #[arg(long, env = "VKS_OPERATOR")]
        operator: Option<String>,
        /// Keys per remote-signer instance
        #[arg(long)]
        capacity: Option<u64>,
        /// Derivation scheme (standard, legacy)
        #[arg(long)]
        scheme: Option<String>,
        /// Directory of .enc key files transferred from another operator
        #[arg(long, requires = "decrypt_key")]
        private_keys_dir: Option<PathBuf>,
        /// Recipient secret key (.key file) that opens the transferred files
        #[arg(long, requires = "private_keys_dir")]
        decrypt_key: Option<PathBuf>,
        /// Previous at-rest cipher key (base64); a new one is generated otherwise
        #[arg(long, env = "VKS_CIPHER_KEY", hide_env_values = true)]
        cipher_key: Option<String>,
        /// Print the plan and exit without writing
        #[arg(long)]
        dry_run: bool,
        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Export registered keys sealed to a recipient public key
    Export {
        /// Recipient public key (.pub file from `vks keygen`)
        #[arg(long)]
        recipient_key: PathBuf,
        /// Output directory (overrides [export] output_dir)
        #[arg(long, short = 'o')]
        output_dir: Option<PathBuf>,
        /// Derivation scheme (standard, legacy)
        #[arg(long)]
        scheme: Option<String>,
    },

    /// Generate a recipient keypair for receiving exported keys
    Keygen {
        /// Output path stem: writes <out>.key and <out>.pub
        #[arg(long)]
        out: PathBuf,
    },

    /// Show store reachability and signer group count
    Status {
        /// Keys per remote-signer instance
        #[arg(long)]
        capacity: Option<u64>,
    },

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
    let config = load_config(&cli.config).await?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = match cli.log_format.clone() {
        Some(f) => f,
        None => parse_log_format(&config.log.format)?,
    };
    init_logging(&level, &format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "vks starting"
    );

    match cli.command {
        Commands::Sync {
            operator,
            capacity,
            scheme,
            private_keys_dir,
            decrypt_key,
            cipher_key,
            dry_run,
            yes,
        } => {
            let args = SyncArgs {
                operator,
                capacity,
                scheme,
                private_keys_dir,
                decrypt_key,
                cipher_key,
                dry_run,
                yes,
            };
            cmd_sync(&config, args).await
        }
        Commands::Export {
            recipient_key,
            output_dir,
            scheme,
        } => cmd_export(&config, &recipient_key, output_dir.as_deref(), scheme.as_deref()).await,
        Commands::Keygen { out } => cmd_keygen(&out),
        Commands::Status { capacity } => cmd_status(&config, capacity).await,
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config),
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

async fn load_config(path: &Path) -> Result<VksConfig> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config: {}", path.display()))
    } else {
        Ok(VksConfig::default())
    }
}

fn parse_log_format(s: &str) -> Result<LogFormat> {
    LogFormat::from_str(s, true).map_err(|e| anyhow::anyhow!("invalid log format '{s}': {e}"))
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Logs go to stderr so stdout stays clean for the operator summary.
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(io::stderr))
                .init();
        }
    }
}

fn resolve_scheme(config: &VksConfig, flag: Option<&str>) -> Result<DerivationScheme> {
    let raw = flag.unwrap_or(&config.sync.scheme);
    raw.parse::<DerivationScheme>()
        .with_context(|| format!("resolving derivation scheme '{raw}'"))
}

fn resolve_capacity(config: &VksConfig, flag: Option<u64>) -> u64 {
    flag.unwrap_or(config.sync.validator_capacity)
}

// ── Collaborators from config ─────────────────────────────────────────────────

fn open_store(config: &VksConfig) -> Result<OperatorStore> {
    let credentials = match config.store.backend {
        StoreBackend::S3 => Some(S3Credentials::from_env()?),
        StoreBackend::Fs | StoreBackend::Memory => None,
    };
    let op = build_operator(&config.store, credentials.as_ref())
        .context("building store operator")?;
    Ok(OperatorStore::new(op, &config.store.prefix))
}

fn read_master_secret() -> Result<MasterSecret> {
    let phrase = match std::env::var("VKS_MNEMONIC") {
        Ok(phrase) => phrase,
        Err(_) => rpassword::prompt_password("Mnemonic: ").context("reading mnemonic")?,
    };
    MasterSecret::from_mnemonic(&SecretString::from(phrase)).context("validating mnemonic")
}

fn read_key_file(path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading key file: {}", path.display()))?;
    Ok(content.trim().to_string())
}

fn write_key_file(path: &Path, contents: &str, private: bool) -> Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    if private {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    #[cfg(not(unix))]
    let _ = private;

    let mut file = options
        .open(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writeln!(file, "{contents}").with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(is_yes(&line))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

// ── Progress display ──────────────────────────────────────────────────────────

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}") {
        pb.set_style(style);
    }
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn scan_progress(pb: &ProgressBar) -> ProgressFn {
    let pb = pb.clone();
    Box::new(move |done, _total, public_key| {
        pb.set_position(done);
        pb.set_message(format!("{done} registered (last {})", short_key(public_key)));
    })
}

fn short_key(public_key: &str) -> &str {
    public_key.get(..14).unwrap_or(public_key)
}

// ── `vks sync` ────────────────────────────────────────────────────────────────

struct SyncArgs {
    operator: Option<String>,
    capacity: Option<u64>,
    scheme: Option<String>,
    private_keys_dir: Option<PathBuf>,
    decrypt_key: Option<PathBuf>,
    cipher_key: Option<String>,
    dry_run: bool,
    yes: bool,
}

async fn cmd_sync(config: &VksConfig, args: SyncArgs) -> Result<()> {
    let operator: OperatorAddress = args
        .operator
        .as_deref()
        .or(config.sync.operator.as_deref())
        .context("no operator address: pass --operator or set sync.operator in vks.toml")?
        .parse()
        .context("parsing operator address")?;
    let scheme = resolve_scheme(config, args.scheme.as_deref())?;
    let capacity = resolve_capacity(config, args.capacity);
    let cipher_key = args
        .cipher_key
        .as_deref()
        .map(CipherKey::from_base64)
        .transpose()
        .context("parsing cipher key")?;

    let recipient = args
        .decrypt_key
        .as_deref()
        .map(|path| -> Result<RecipientSecretKey> {
            let hex = read_key_file(path)?;
            RecipientSecretKey::from_hex(&hex)
                .with_context(|| format!("parsing recipient key: {}", path.display()))
        })
        .transpose()?;
    let files = match &args.private_keys_dir {
        Some(dir) => Some(
            vks_sync::read_bundle(dir)
                .with_context(|| format!("reading transfer bundle: {}", dir.display()))?,
        ),
        None => None,
    };
    let transfer = match (files, recipient.as_ref()) {
        (Some(files), Some(recipient)) => Some(TransferBundle { files, recipient }),
        _ => None,
    };

    let store = open_store(config)?;
    let oracle = BeaconOracle::from_config(&config.registry)?;
    let secret = read_master_secret()?;

    println!(
        "Syncing {scheme} keys for {operator} (capacity {capacity}, beacon {})",
        config.registry.beacon_url
    );

    let pb = make_spinner("scan");
    let progress = scan_progress(&pb);
    let plan = vks_sync::plan_sync(
        SyncRequest {
            secret: &secret,
            scheme,
            operator,
            capacity,
            cipher_key,
            transfer,
        },
        &oracle,
        &store,
        Some(&progress),
    )
    .await;
    pb.finish_and_clear();
    let plan = plan?;

    print_plan(&plan);

    if args.dry_run {
        println!("\nDry run: nothing written.");
        return Ok(());
    }
    if plan.is_noop() {
        println!("\nStore already up to date.");
    } else if !args.yes && !confirm("\nWrite these records to the store?")? {
        println!("Aborted: nothing written.");
        return Ok(());
    }

    let report = plan.apply(&store).await?;
    print_report(&report);
    Ok(())
}

fn print_plan(plan: &SyncPlan) {
    println!();
    println!("Registered keys:     {}", plan.active_keys);
    println!("Transferred keys:    {}", plan.transferred_keys);
    println!("New records:         {}", plan.new_count());
    println!("Re-encrypted:        {}", plan.reencrypted_count());
    println!("Unchanged:           {}", plan.unchanged.len());
    println!("Store after sync:    {} keys in {} groups", plan.total_keys(), plan.group_count());

    if !plan.transfer_failures.is_empty() {
        println!("\nSkipped transfer files:");
        for failure in &plan.transfer_failures {
            println!("  {}: {}", failure.file, failure.error);
        }
    }
    if !plan.stale.is_empty() {
        println!(
            "\n{} stored record(s) do not open under this cipher key and will not be readable by signers:",
            plan.stale.len()
        );
        for public_key in &plan.stale {
            println!("  {public_key}");
        }
    }
}

fn print_report(report: &SyncReport) {
    println!();
    println!(
        "Wrote {} new, {} updated ({} unchanged).",
        report.written.inserted, report.written.updated, report.unchanged
    );
    println!("Keys in store:       {}", report.total_keys);
    println!("validatorsCount:     {}", report.group_count);
    println!("DECRYPTION_KEY:      {}", report.cipher_key.expose_base64());
    println!();
    println!("Set DECRYPTION_KEY on every signer instance and provision validatorsCount instances.");
}

// ── `vks export` ──────────────────────────────────────────────────────────────

async fn cmd_export(
    config: &VksConfig,
    recipient_key: &Path,
    output_dir: Option<&Path>,
    scheme: Option<&str>,
) -> Result<()> {
    let recipient = RecipientPublicKey::from_hex(&read_key_file(recipient_key)?)
        .with_context(|| format!("parsing recipient key: {}", recipient_key.display()))?;
    let scheme = resolve_scheme(config, scheme)?;
    let output_dir = output_dir.unwrap_or(&config.export.output_dir);

    let oracle = BeaconOracle::from_config(&config.registry)?;
    let secret = read_master_secret()?;

    let pb = make_spinner("scan");
    let progress = scan_progress(&pb);
    let exported =
        vks_sync::export_registered(&secret, scheme, &oracle, &recipient, Some(&progress)).await;
    pb.finish_and_clear();
    let exported = exported?;

    let written = vks_sync::write_export(output_dir, &exported)
        .with_context(|| format!("writing export: {}", output_dir.display()))?;
    println!(
        "Exported {written} key(s) to {} for recipient {}",
        output_dir.display(),
        recipient.to_hex()
    );
    Ok(())
}

// ── `vks keygen` ──────────────────────────────────────────────────────────────

fn cmd_keygen(out: &Path) -> Result<()> {
    let secret_path = out.with_extension("key");
    let public_path = out.with_extension("pub");

    let secret = RecipientSecretKey::generate();
    let public = secret.public_key();

    write_key_file(&secret_path, &secret.expose_hex(), true)?;
    write_key_file(&public_path, &public.to_hex(), false)?;

    println!("Secret key: {} (keep private)", secret_path.display());
    println!("Public key: {}", public_path.display());
    println!("Share the public key with the exporting operator: {}", public.to_hex());
    Ok(())
}

// ── `vks status` ──────────────────────────────────────────────────────────────

async fn cmd_status(config: &VksConfig, capacity: Option<u64>) -> Result<()> {
    let capacity = resolve_capacity(config, capacity);
    let store = open_store(config)?;

    let backend = match config.store.backend {
        StoreBackend::Fs => format!("fs:{}", config.store.root.display()),
        StoreBackend::S3 => format!("s3:{}/{}", config.store.endpoint, config.store.bucket),
        StoreBackend::Memory => "memory".to_string(),
    };
    println!("Store:     {backend} (prefix {})", config.store.prefix);

    if !store.connection_check().await {
        println!("Status:    unreachable");
        anyhow::bail!("store connection check failed");
    }
    println!("Status:    reachable");

    let count = store.count().await.context("counting records")?;
    let groups = vks_sync::group_count(count, capacity)?;
    println!("Records:   {count}");
    println!("Groups:    {groups} (capacity {capacity})");
    Ok(())
}

// ── `vks config show` ─────────────────────────────────────────────────────────

fn cmd_config_show(config: &VksConfig, config_path: &Path) -> Result<()> {
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
