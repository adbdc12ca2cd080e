use clap::{Parser, Subcommand};
use relay::config::{self, MailSettings};
use relay::delivery::{DeliveryChain, SmtpStrategy};

#[derive(Parser)]
#[command(name = "trucept-relay")]
#[command(about = "Trucept contact form relay", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Write a default configuration file (if none exists).
    Init {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.trucept/relay.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the HTTP gateway serving POST /api/contact. Mail providers come from SMTP_*, EMAIL_TO, and SENDGRID_API_KEY (env over config).
    Serve {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.trucept/relay.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from config or 3000)
        #[arg(long, short)]
        port: Option<u16>,

        /// Bind address (default from config or 127.0.0.1)
        #[arg(long, short)]
        bind: Option<String>,
    },

    /// Print the resolved mail provider chain (secrets redacted).
    Check {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.trucept/relay.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Also connect and authenticate to the SMTP relay.
        #[arg(long)]
        verify: bool,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("trucept-relay {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Serve { config, port, bind }) => {
            if let Err(e) = run_serve(config, port, bind).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Check { config, verify }) => {
            if let Err(e) = run_check(config, verify).await {
                log::error!("check failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(config::default_config_path);
    if relay::init::init_config(&path)? {
        println!("wrote default configuration to {}", path.display());
    } else {
        println!("configuration already exists at {}", path.display());
    }
    Ok(())
}

async fn run_serve(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
    bind: Option<String>,
) -> anyhow::Result<()> {
    let (mut config, path) = config::load_config(config_path)?;
    log::debug!("using config {}", path.display());
    if let Some(p) = port {
        config.server.port = p;
    }
    if let Some(b) = bind {
        config.server.bind = b;
    }
    let mail = MailSettings::from_env(&config);
    log::info!("starting gateway on {}:{}", config.server.bind, config.server.port);
    relay::gateway::run_gateway(config, mail).await
}

fn redact(value: &Option<String>) -> serde_json::Value {
    match value {
        Some(_) => serde_json::Value::String("<set>".to_string()),
        None => serde_json::Value::Null,
    }
}

async fn run_check(config_path: Option<std::path::PathBuf>, verify: bool) -> anyhow::Result<()> {
    let (config, path) = config::load_config(config_path)?;
    let mode = config::resolve_runtime_mode(&config);
    let mail = MailSettings::from_env(&config);
    let chain = DeliveryChain::from_settings(&mail, mode, &config.contact.company_name);

    let mut report = serde_json::json!({
        "config": path.display().to_string(),
        "mode": mode.as_str(),
        "providers": chain.provider_names(),
        "inbox": mail.inbox,
        "smtp": {
            "host": mail.smtp.host,
            "port": mail.smtp.port,
            "user": mail.smtp.user,
            "pass": redact(&mail.smtp.pass),
            "from": mail.smtp.from,
            "complete": mail.smtp.is_complete(),
        },
        "sendgrid": {
            "apiKey": redact(&mail.sendgrid.api_key),
            "apiBase": mail.sendgrid.api_base,
        },
    });

    if verify {
        let strategy = SmtpStrategy::new(mail.smtp.clone(), &config.contact.company_name);
        report["smtp"]["verify"] = match strategy.verify().await {
            Ok(_) => serde_json::json!("ok"),
            Err(e) => serde_json::json!(e.to_string()),
        };
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
