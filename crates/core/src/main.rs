//! easyacme - command-line entry point
//!
//! Every subcommand prints its result as JSON on stdout; logs go to stderr.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use easyacme::model::PageRequest;
use easyacme::service::{
    AccountFilter, AuthorizeRequest, CertificateFilter, CreateDnsProvider, DnsProviderFilter,
    IssueRequest, Services,
};
use easyacme::{
    AccountId, AccountStatus, CertType, CertificateId, DnsProviderId, EffectiveStatus,
    RegisterAccount,
};
use easyacme_common::init_tracing;
use easyacme_config::Config;

/// ACME certificates over DNS-01, manual or through a DNS provider API
#[derive(Parser, Debug)]
#[command(name = "easyacme")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path (.kdl, .json or .toml)
    #[arg(short = 'c', long = "config", env = "EASYACME_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (debug level)
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate configuration and exit
    Check,

    /// ACME accounts
    #[command(subcommand)]
    Account(AccountCommand),

    /// DNS provider credentials
    #[command(subcommand)]
    Dns(DnsCommand),

    /// Certificates
    #[command(subcommand)]
    Cert(CertCommand),
}

#[derive(Subcommand, Debug)]
enum AccountCommand {
    /// Generate a key and register it with the CA
    Register {
        #[arg(long)]
        name: String,
        /// CA directory URL; defaults to acme.directory-url
        #[arg(long, default_value = "")]
        server: String,
        #[arg(long, default_value = "")]
        email: String,
        /// P256, P384, 2048, 3072, 4096 or 8192
        #[arg(long, default_value = "P256")]
        key_type: String,
        #[arg(long)]
        eab_kid: Option<String>,
        #[arg(long)]
        eab_hmac_key: Option<String>,
    },
    /// Deactivate an account at the CA
    Deactivate { id: String },
    List {
        #[arg(long)]
        name: Option<String>,
        #[arg(long, value_enum)]
        status: Option<AccountStatusArg>,
        /// Only accounts registered with (true) or without (false) external account binding
        #[arg(long)]
        has_eab: Option<bool>,
        #[command(flatten)]
        page: PageArgs,
    },
    Stats,
}

#[derive(Subcommand, Debug)]
enum DnsCommand {
    Add {
        #[arg(long)]
        name: String,
        /// tencentcloud, aliyun, cloudflare, godaddy or hetzner
        #[arg(long = "type")]
        provider_type: String,
        #[arg(long, default_value = "")]
        secret_id: String,
        #[arg(long, default_value = "", env = "EASYACME_DNS_SECRET_KEY", hide_env_values = true)]
        secret_key: String,
        #[arg(long, default_value = "")]
        notes: String,
    },
    List {
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Remove one or more provider records
    Remove {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Print the stored secrets
    Reveal { id: String },
}

#[derive(Subcommand, Debug)]
enum CertCommand {
    /// Open an order and print the TXT records to publish
    Authorize(OrderArgs),
    /// Issue a certificate
    Issue {
        #[command(flatten)]
        order: OrderArgs,
        /// DNS provider id; omit for manual DNS
        #[arg(long)]
        dns_provider: Option<String>,
        /// Manual DNS in one process: print the records, wait for Enter, then issue
        #[arg(long)]
        wait_for_dns: bool,
    },
    Revoke { id: String },
    List {
        #[arg(long)]
        domain: Option<String>,
        #[arg(long, value_enum)]
        status: Option<CertStatusArg>,
        #[arg(long, value_enum)]
        cert_type: Option<CertTypeArg>,
        #[command(flatten)]
        page: PageArgs,
    },
    Show { id: String },
    /// Write the chain (and optionally the private key) to a directory
    Download {
        id: String,
        #[arg(long, default_value = ".")]
        out: PathBuf,
        #[arg(long)]
        private_key: bool,
    },
    Stats,
}

#[derive(Args, Debug)]
struct OrderArgs {
    #[arg(long)]
    account: String,
    #[arg(long, default_value = "P256")]
    key_type: String,
    /// Repeat for every name; the first is the primary name
    #[arg(long = "domain", required = true)]
    domains: Vec<String>,
}

#[derive(Args, Debug)]
struct PageArgs {
    #[arg(long, default_value_t = 1)]
    page: usize,
    #[arg(long, default_value_t = easyacme::model::DEFAULT_PAGE_SIZE)]
    page_size: usize,
}

impl From<&PageArgs> for PageRequest {
    fn from(args: &PageArgs) -> Self {
        PageRequest {
            page: args.page,
            page_size: args.page_size,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum AccountStatusArg {
    Pending,
    Valid,
    Deactivated,
    Revoked,
}

impl From<AccountStatusArg> for AccountStatus {
    fn from(arg: AccountStatusArg) -> Self {
        match arg {
            AccountStatusArg::Pending => AccountStatus::Pending,
            AccountStatusArg::Valid => AccountStatus::Valid,
            AccountStatusArg::Deactivated => AccountStatus::Deactivated,
            AccountStatusArg::Revoked => AccountStatus::Revoked,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CertStatusArg {
    NotIssued,
    Issued,
    Expired,
    Revoked,
}

impl From<CertStatusArg> for EffectiveStatus {
    fn from(arg: CertStatusArg) -> Self {
        match arg {
            CertStatusArg::NotIssued => EffectiveStatus::NotIssued,
            CertStatusArg::Issued => EffectiveStatus::Issued,
            CertStatusArg::Expired => EffectiveStatus::Expired,
            CertStatusArg::Revoked => EffectiveStatus::Revoked,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CertTypeArg {
    Dv,
    Ov,
}

impl From<CertTypeArg> for CertType {
    fn from(arg: CertTypeArg) -> Self {
        match arg {
            CertTypeArg::Dv => CertType::DV,
            CertTypeArg::Ov => CertType::OV,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    let level = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    init_tracing(level, config.logging.log_format()?)?;

    if let Commands::Check = cli.command {
        info!("Configuration valid");
        return print_json(&config);
    }

    let services = Services::from_config(&config).context("Failed to initialize services")?;

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            signal_token.cancel();
        }
    });

    match cli.command {
        Commands::Check => Ok(()),
        Commands::Account(cmd) => run_account(&services, cmd).await,
        Commands::Dns(cmd) => run_dns(&services, cmd),
        Commands::Cert(cmd) => run_cert(&services, cmd, &cancel).await,
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load configuration file {}", path.display()))?,
        None => Config::default_embedded().context("Failed to load embedded configuration")?,
    };
    config
        .validate()
        .context("Configuration validation failed")?;
    Ok(config)
}

async fn run_account(services: &Services, cmd: AccountCommand) -> Result<()> {
    let accounts = &services.accounts;
    match cmd {
        AccountCommand::Register {
            name,
            server,
            email,
            key_type,
            eab_kid,
            eab_hmac_key,
        } => {
            let account = accounts
                .register(RegisterAccount {
                    name,
                    server,
                    email,
                    key_type,
                    eab_key_id: eab_kid,
                    eab_hmac_key,
                })
                .await?;
            print_json(&account)
        }
        AccountCommand::Deactivate { id } => {
            accounts.deactivate(&AccountId::new(id)).await?;
            print_json(&serde_json::json!({ "deactivated": true }))
        }
        AccountCommand::List {
            name,
            status,
            has_eab,
            page,
        } => {
            let filter = AccountFilter {
                name,
                status: status.map(Into::into),
                has_eab,
            };
            print_json(&accounts.list(&filter, (&page).into())?)
        }
        AccountCommand::Stats => print_json(&accounts.stats()?),
    }
}

fn run_dns(services: &Services, cmd: DnsCommand) -> Result<()> {
    let providers = &services.dns_providers;
    match cmd {
        DnsCommand::Add {
            name,
            provider_type,
            secret_id,
            secret_key,
            notes,
        } => print_json(&providers.create(CreateDnsProvider {
            name,
            provider_type,
            secret_id,
            secret_key,
            notes,
        })?),
        DnsCommand::List { name, page } => {
            let filter = DnsProviderFilter {
                name,
                provider_type: None,
            };
            print_json(&providers.list(&filter, (&page).into())?)
        }
        DnsCommand::Remove { ids } => {
            let ids: Vec<_> = ids.into_iter().map(DnsProviderId::new).collect();
            let removed = providers.delete_many(&ids)?;
            print_json(&serde_json::json!({ "removed": removed }))
        }
        DnsCommand::Reveal { id } => print_json(&providers.reveal(&DnsProviderId::new(id))?),
    }
}

async fn run_cert(services: &Services, cmd: CertCommand, cancel: &CancellationToken) -> Result<()> {
    let certificates = &services.certificates;
    match cmd {
        CertCommand::Authorize(order) => {
            let auth = certificates
                .create_manual_authorization(&order.authorize_request())
                .await?;
            print_json(&auth)
        }
        CertCommand::Issue {
            order,
            dns_provider,
            wait_for_dns,
        } => {
            if dns_provider.is_none() {
                if !wait_for_dns {
                    bail!("manual issuance needs --wait-for-dns, or pass --dns-provider");
                }
                let auth = certificates
                    .create_manual_authorization(&order.authorize_request())
                    .await?;
                eprintln!("Publish these TXT records, then press Enter:");
                for record in &auth.info_list {
                    eprintln!("  {}  TXT  \"{}\"", record.fqdn, record.value);
                }
                wait_for_enter().await?;
            }

            let request = IssueRequest {
                key_type: order.key_type,
                account_id: AccountId::new(order.account),
                domains: order.domains,
                dns_provider_id: dns_provider,
            };
            let certificate = certificates.issue(&request, Some(cancel)).await?;
            print_json(&certificate)
        }
        CertCommand::Revoke { id } => {
            certificates.revoke(&CertificateId::new(id)).await?;
            print_json(&serde_json::json!({ "revoked": true }))
        }
        CertCommand::List {
            domain,
            status,
            cert_type,
            page,
        } => {
            let filter = CertificateFilter {
                domain,
                cert_type: cert_type.map(Into::into),
                status: status.map(Into::into),
                account_id: None,
            };
            print_json(&certificates.list(&filter, (&page).into())?)
        }
        CertCommand::Show { id } => print_json(&certificates.get(&CertificateId::new(id))?),
        CertCommand::Download {
            id,
            out,
            private_key,
        } => {
            let id = CertificateId::new(id);
            let mut downloads = vec![certificates.download_chain(&id)?];
            if private_key {
                downloads.push(certificates.download_private_key(&id)?);
            }
            std::fs::create_dir_all(&out)
                .with_context(|| format!("Failed to create {}", out.display()))?;
            let mut written = Vec::new();
            for download in downloads {
                let path = out.join(&download.file_name);
                std::fs::write(&path, download.content.as_bytes())
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                written.push(path.display().to_string());
            }
            print_json(&serde_json::json!({ "written": written }))
        }
        CertCommand::Stats => print_json(&certificates.stats()?),
    }
}

impl OrderArgs {
    fn authorize_request(&self) -> AuthorizeRequest {
        AuthorizeRequest {
            key_type: self.key_type.clone(),
            account_id: AccountId::new(self.account.clone()),
            domains: self.domains.clone(),
        }
    }
}

async fn wait_for_enter() -> Result<()> {
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("Failed to read from stdin")?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
