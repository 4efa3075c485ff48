#![forbid(unsafe_code)]
//! CertVault command line: seal files, certify them on the registry, transfer ownership.

use certvault::chain::{ChainTransport, LocalChain};
use certvault::client::{CertificationStatus, ChainClient, ClientWarning};
use certvault::config::{load_config, Config, SIGNER_KEY_ENV};
use certvault::envelope::EnvelopeCodec;
use certvault::error::CertError;
use certvault::password::{generate_secure_password, hash_password};
use certvault::persistence::Database;
use certvault::transaction::parse_document_id;
use certvault::units::{format_units, parse_units};
use clap::{Parser, Subcommand};
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::Color as TableColor;
use comfy_table::{Attribute, Cell, ContentArrangement, Table};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Level;

const DEVNET_SCHEME: &str = "devnet://";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "certvault.toml", global = true)]
    config: PathBuf,
    /// Raise log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seals a file into a password-protected envelope
    Encrypt {
        input: PathBuf,
        output: PathBuf,
        /// Generated and printed once when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Opens an envelope
    Decrypt {
        input: PathBuf,
        output: PathBuf,
        /// Prompted for when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Prints an Argon2 verifier for a password read from the terminal
    HashPassword,
    /// Local development chain
    Devnet {
        #[command(subcommand)]
        command: DevnetCommands,
    },
    /// Certifies a content id
    Certify { fingerprint: String },
    /// Looks up a certified document
    Verify { id: String },
    /// Transfers a document to another account
    Transfer { id: String, account: String },
    /// Lists the documents ever assigned to an account
    List { account: String },
    /// Checks connectivity to the network and registry
    Status {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum DevnetCommands {
    /// Creates or reopens the chain, deploys the registry and funds the signer
    Init {
        /// Amount credited to the signer, in native units
        #[arg(long, default_value = "10")]
        fund: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "❌".red(), e.to_string().red().bold());
        eprintln!("{} {}", "💡".yellow(), e.remediation_hint().yellow());
        if e.is_retryable() {
            eprintln!("{}", "   This error is retryable once current state has been re-queried.".dimmed());
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CertError> {
    match cli.command {
        Commands::Encrypt {
            input,
            output,
            password,
        } => encrypt(&cli.config, &input, &output, password),
        Commands::Decrypt {
            input,
            output,
            password,
        } => decrypt(&cli.config, &input, &output, password),
        Commands::HashPassword => {
            let password = prompt("Password: ")?;
            println!("{}", hash_password(&password)?);
            Ok(())
        }
        Commands::Devnet {
            command: DevnetCommands::Init { fund },
        } => devnet_init(&cli.config, &fund),
        Commands::Certify { fingerprint } => certify(&connect(&cli.config)?, &fingerprint).await,
        Commands::Verify { id } => verify(&connect(&cli.config)?, &id).await,
        Commands::Transfer { id, account } => transfer(&connect(&cli.config)?, &id, &account).await,
        Commands::List { account } => list(&connect(&cli.config)?, &account).await,
        Commands::Status { json } => status(&connect(&cli.config)?, json).await,
    }
}

fn prompt(label: &str) -> Result<String, CertError> {
    Ok(rpassword::prompt_password(label)?)
}

/// Envelope parameters come from the config file when one exists; sealing
/// works without any network settings.
fn envelope_codec(config_path: &Path) -> Result<EnvelopeCodec, CertError> {
    if !config_path.exists() {
        return Ok(EnvelopeCodec::default());
    }
    let raw = std::fs::read_to_string(config_path)?;
    Ok(Config::from_toml_str(&raw)?.envelope.codec())
}

fn encrypt(config_path: &Path, input: &Path, output: &Path, password: Option<String>) -> Result<(), CertError> {
    let codec = envelope_codec(config_path)?;
    let (password, generated) = match password {
        Some(p) => (p, false),
        None => (generate_secure_password(), true),
    };

    let plaintext = std::fs::read(input)?;
    let sealed = codec.encrypt(&plaintext, &password)?;
    std::fs::write(output, &sealed.bytes)?;

    println!("{}", "🔒 Envelope written".bright_green().bold());
    println!("   File:      {}", output.display().to_string().bright_white());
    println!(
        "   Algorithm: {} (key derivation: {})",
        sealed.metadata.algorithm, sealed.metadata.kdf
    );
    println!(
        "   Size:      {} -> {} bytes",
        sealed.metadata.original_size, sealed.metadata.encrypted_size
    );
    if generated {
        println!();
        println!("{}", "🔑 Generated password (shown once, store it safely):".yellow().bold());
        println!("   {}", password.bright_white());
    }
    Ok(())
}

fn decrypt(config_path: &Path, input: &Path, output: &Path, password: Option<String>) -> Result<(), CertError> {
    let codec = envelope_codec(config_path)?;
    let password = match password {
        Some(p) => p,
        None => prompt("Password: ")?,
    };

    let envelope = std::fs::read(input)?;
    let plaintext = codec.decrypt(&envelope, &password)?;
    std::fs::write(output, &plaintext)?;

    println!(
        "{} {} ({} bytes)",
        "🔓 Decrypted to".bright_green().bold(),
        output.display().to_string().bright_white(),
        plaintext.len()
    );
    Ok(())
}

fn devnet_path(config: &Config) -> Result<&str, CertError> {
    config.network.rpc_url.strip_prefix(DEVNET_SCHEME).ok_or_else(|| {
        CertError::Config(format!(
            "Unsupported rpc_url {:?}: only {}<sqlite path> endpoints are available",
            config.network.rpc_url, DEVNET_SCHEME
        ))
    })
}

fn open_devnet(config: &Config) -> Result<Arc<LocalChain>, CertError> {
    let db = Database::open(devnet_path(config)?)?;
    Ok(Arc::new(LocalChain::open(config.network.chain_id, Box::new(db))?))
}

fn connect(config_path: &Path) -> Result<ChainClient, CertError> {
    let config = load_config(config_path)?;
    let chain: Arc<dyn ChainTransport> = open_devnet(&config)?;
    ChainClient::from_config(&config, chain)
}

fn devnet_init(config_path: &Path, fund: &str) -> Result<(), CertError> {
    let raw = std::fs::read_to_string(config_path)
        .map_err(|e| CertError::Config(format!("Failed to read {}: {}", config_path.display(), e)))?;
    let config = Config::from_toml_str(&raw)?.with_signer_override(std::env::var(SIGNER_KEY_ENV).ok());
    let signer = config.signer_keypair()?;
    let amount = parse_units(fund)?;

    let chain = open_devnet(&config)?;
    let registry = match config.registry_address() {
        Ok(address) if chain.registry(&address).is_some() => address,
        _ => chain.deploy_registry(signer.account())?,
    };
    chain.fund(signer.account(), amount)?;

    println!("{}", "⛓️  Development chain ready".bright_cyan().bold());
    println!("   Database:  {}", devnet_path(&config)?.bright_white());
    println!("   Chain id:  {}", config.network.chain_id);
    println!("   Height:    {}", chain.height());
    println!("   Signer:    {}", signer.account().to_string().bright_white());
    println!("   Funded:    +{}", format_units(amount));
    println!("   Registry:  {}", registry.to_string().bright_green());
    if config.network.registry_address.trim() != registry.to_hex() {
        println!();
        println!(
            "{}",
            format!("💡 Set network.registry_address = \"{}\" in {}", registry, config_path.display()).yellow()
        );
    }
    Ok(())
}

async fn certify(client: &ChainClient, fingerprint: &str) -> Result<(), CertError> {
    if let Some(existing) = client.check_exists_remote(fingerprint).await? {
        println!(
            "{}",
            format!("ℹ️  Fingerprint already certified as document #{}", existing).yellow()
        );
    }

    let receipt = client.certify_remote(fingerprint).await?;
    for warning in &receipt.warnings {
        match warning {
            ClientWarning::LowBalance { balance, threshold } => println!(
                "{}",
                format!(
                    "⚠️  Low balance: {} (threshold {})",
                    format_units(*balance),
                    format_units(*threshold)
                )
                .yellow()
            ),
        }
    }

    println!("{}", "✅ Document certified".bright_green().bold());
    match receipt.document_id {
        Some(id) => println!("   Document:  #{}", id.to_string().bright_white().bold()),
        None => println!("   Document:  {}", "id unavailable (event not found in receipt)".yellow()),
    }
    println!("   Fingerprint: {}", receipt.fingerprint);
    println!("   Tx:        {}", receipt.tx_hash);
    println!("   Block:     {}", receipt.block_number);
    println!("   Gas used:  {}", receipt.gas_used);
    println!("   Explorer:  {}", receipt.explorer_link.bright_blue());
    println!("   Completed: {}", receipt.completed_at.to_rfc3339());
    Ok(())
}

async fn verify(client: &ChainClient, id: &str) -> Result<(), CertError> {
    let id = parse_document_id(id)?;
    match client.verify_remote(id).await? {
        CertificationStatus::Found {
            id,
            fingerprint,
            owner,
            certified_at,
            ..
        } => {
            println!("{}", format!("✅ Document #{} is certified", id).bright_green().bold());
            println!("   Fingerprint: {}", fingerprint.bright_white());
            println!("   Owner:       {}", owner);
            println!("   Certified:   {}", certified_at.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        CertificationStatus::NotFound { id } => {
            println!("{}", format!("❔ Document #{} does not exist", id).yellow());
        }
    }
    Ok(())
}

async fn transfer(client: &ChainClient, id: &str, account: &str) -> Result<(), CertError> {
    let id = parse_document_id(id)?;
    let receipt = client.transfer_remote(id, account).await?;

    println!("{}", "✅ Ownership transferred".bright_green().bold());
    println!("   Document:  #{}", receipt.document_id);
    println!("   New owner: {}", receipt.new_owner.to_string().bright_white());
    println!("   Tx:        {}", receipt.tx_hash);
    println!("   Block:     {}", receipt.block_number);
    println!("   Gas used:  {}", receipt.gas_used);
    println!("   Explorer:  {}", receipt.explorer_link.bright_blue());
    Ok(())
}

async fn list(client: &ChainClient, account: &str) -> Result<(), CertError> {
    let ids = client.list_by_owner_remote(account).await?;
    if ids.is_empty() {
        println!("{}", "No documents recorded for this account.".yellow());
        return Ok(());
    }

    let owner = account.trim().to_lowercase();
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Id").fg(TableColor::Cyan).add_attribute(Attribute::Bold),
            Cell::new("Fingerprint").fg(TableColor::Cyan).add_attribute(Attribute::Bold),
            Cell::new("Current owner").fg(TableColor::Cyan).add_attribute(Attribute::Bold),
            Cell::new("Certified").fg(TableColor::Cyan).add_attribute(Attribute::Bold),
        ]);

    // The owner index is append-only, so some rows may have been transferred away.
    for id in ids {
        match client.verify_remote(id).await? {
            CertificationStatus::Found {
                fingerprint,
                owner: current,
                certified_at,
                ..
            } => {
                let color = if current.to_hex() == owner {
                    TableColor::Green
                } else {
                    TableColor::Grey
                };
                table.add_row(vec![
                    Cell::new(format!("#{}", id)).fg(TableColor::White),
                    Cell::new(fingerprint).fg(TableColor::White),
                    Cell::new(current.to_string()).fg(color),
                    Cell::new(certified_at.format("%Y-%m-%d %H:%M").to_string()).fg(TableColor::Grey),
                ]);
            }
            CertificationStatus::NotFound { .. } => {
                table.add_row(vec![
                    Cell::new(format!("#{}", id)).fg(TableColor::White),
                    Cell::new("-"),
                    Cell::new("missing").fg(TableColor::Red),
                    Cell::new("-"),
                ]);
            }
        }
    }

    println!("{}", table);
    Ok(())
}

async fn status(client: &ChainClient, json: bool) -> Result<(), CertError> {
    let snapshot = client.test_connectivity().await;

    if json {
        let value = serde_json::json!({
            "success": snapshot.success,
            "error": snapshot.error,
            "network": snapshot.network,
            "chainId": snapshot.chain_id,
            "signer": snapshot.signer.to_hex(),
            "balance": snapshot.balance.map(format_units),
            "blockNumber": snapshot.block_number,
            "registry": snapshot.registry.to_hex(),
            "registryReachable": snapshot.registry_reachable,
            "documentCount": snapshot.document_count,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let show = |v: Option<String>| v.unwrap_or_else(|| "-".to_string());
    if snapshot.success {
        println!("{}", "🟢 Connected".bright_green().bold());
    } else {
        println!("{}", "🔴 Not connected".red().bold());
    }
    if let Some(error) = &snapshot.error {
        println!("   Error:     {}", error.red());
    }
    println!("   Network:   {}", snapshot.network);
    println!("   Chain id:  {}", show(snapshot.chain_id.map(|c| c.to_string())));
    println!("   Signer:    {}", snapshot.signer);
    println!("   Balance:   {}", show(snapshot.balance.map(format_units)));
    println!("   Block:     {}", show(snapshot.block_number.map(|b| b.to_string())));
    println!("   Registry:  {}", snapshot.registry);
    println!(
        "   Reachable: {}",
        if snapshot.registry_reachable { "yes".green() } else { "no".red() }
    );
    println!("   Documents: {}", show(snapshot.document_count.map(|c| c.to_string())));
    Ok(())
}
