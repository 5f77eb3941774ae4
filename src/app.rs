use crate::api::DonationApi;
use crate::catalog::CampaignFilter;
use crate::client::AuthenticatedClient;
use crate::redact::redact_tokens;
use crate::settings::ClientConfig;
use crate::state::open_store;
use crate::transport::ReqwestTransport;
use crate::types::{DonationPayload, UserType};
use anyhow::{anyhow, bail, Context};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

const USAGE: &str = "usage: donation-client <command>

commands:
  login <email> <password> [donor|recipient|organization]
  logout
  whoami
  campaigns [--search <text>] [--category <name>]
  campaign <id>
  donate <campaign-id> <amount> [payment-method] [--anonymous]
  donations [--status <status>]";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Login {
        email: String,
        password: String,
        user_type: UserType,
    },
    Logout,
    WhoAmI,
    Campaigns(CampaignFilter),
    Campaign(String),
    Donate(DonationPayload),
    Donations { status: Option<String> },
    Help,
}

/// `--name value` pairs; any name outside `allowed` is rejected.
fn parse_options(command: &str, rest: &[String], allowed: &[&str]) -> anyhow::Result<Vec<(String, String)>> {
    let mut options = Vec::new();
    let mut iter = rest.iter();
    while let Some(arg) = iter.next() {
        let Some(name) = arg.strip_prefix("--").filter(|n| allowed.contains(n)) else {
            bail!("unexpected argument for {command}: {arg}");
        };
        let Some(value) = iter.next() else {
            bail!("--{name} needs a value");
        };
        options.push((name.to_string(), value.clone()));
    }
    Ok(options)
}

impl Command {
    pub fn parse<I, S>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let Some((name, rest)) = args.split_first() else {
            return Ok(Self::Help);
        };

        match name.as_str() {
            "login" => {
                let [email, password, tail @ ..] = rest else {
                    bail!("login needs <email> <password>");
                };
                let user_type = match tail.first() {
                    Some(raw) => UserType::parse(raw).ok_or_else(|| anyhow!("unknown user type: {raw}"))?,
                    None => UserType::default(),
                };
                Ok(Self::Login {
                    email: email.clone(),
                    password: password.clone(),
                    user_type,
                })
            }
            "logout" => Ok(Self::Logout),
            "whoami" => Ok(Self::WhoAmI),
            "campaigns" => {
                let mut filter = CampaignFilter::default();
                for (name, value) in parse_options("campaigns", rest, &["search", "category"])? {
                    match name.as_str() {
                        "search" => filter.search = Some(value),
                        _ => filter.category = Some(value),
                    }
                }
                Ok(Self::Campaigns(filter))
            }
            "campaign" => match rest.first() {
                Some(id) => Ok(Self::Campaign(id.clone())),
                None => bail!("campaign needs <id>"),
            },
            "donate" => {
                let anonymous = rest.iter().any(|a| a == "--anonymous");
                let positional: Vec<&String> = rest.iter().filter(|a| !a.starts_with("--")).collect();
                let [campaign, amount, tail @ ..] = positional.as_slice() else {
                    bail!("donate needs <campaign-id> <amount>");
                };
                let campaign = campaign
                    .parse::<u64>()
                    .with_context(|| format!("invalid campaign id: {campaign}"))?;
                let amount = amount
                    .parse::<f64>()
                    .with_context(|| format!("invalid amount: {amount}"))?;

                let mut payload = DonationPayload::new(campaign, amount);
                if let Some(method) = tail.first() {
                    payload.payment_method = method.to_string();
                }
                payload.is_anonymous = anonymous;
                Ok(Self::Donate(payload))
            }
            "donations" => {
                let status = parse_options("donations", rest, &["status"])?
                    .pop()
                    .map(|(_, value)| value);
                Ok(Self::Donations { status })
            }
            "help" | "-h" | "--help" => Ok(Self::Help),
            other => bail!("unknown command: {other}\n\n{USAGE}"),
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn execute(api: &DonationApi, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Help => println!("{USAGE}"),
        Command::Login {
            email,
            password,
            user_type,
        } => print_json(&api.login(&email, &password, user_type).await?)?,
        Command::Logout => {
            api.logout().await?;
            println!("Logged out.");
        }
        Command::WhoAmI => {
            let profile = if api.is_authenticated().await? {
                api.profile().await?
            } else {
                None
            };
            match profile {
                Some(profile) => print_json(&profile)?,
                None => println!("Not logged in."),
            }
        }
        Command::Campaigns(filter) => print_json(&api.search_campaigns(&filter).await?)?,
        Command::Campaign(id) => print_json(&api.get_campaign(&id).await?)?,
        Command::Donate(payload) => print_json(&api.create_donation(&payload).await?)?,
        Command::Donations { status } => {
            print_json(&api.donation_history(status.as_deref()).await?)?
        }
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("donation_client=info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub async fn run() -> anyhow::Result<()> {
    init_tracing();

    let command = Command::parse(std::env::args().skip(1))?;
    let config = ClientConfig::load().context("failed to load configuration")?;
    debug!(base_url = %config.base_url, store = ?config.store, "configuration loaded");

    let store = open_store(&config).context("failed to open credential store")?;
    let transport = Arc::new(ReqwestTransport::new(&config)?);
    let client = AuthenticatedClient::new(&config, transport, store);
    let api = DonationApi::new(&config, client);

    execute(&api, command).await.map_err(|e| {
        let message = redact_tokens(&e.to_string()).into_owned();
        match e.downcast_ref::<crate::api::ApiError>() {
            Some(api_err) if api_err.requires_login() => {
                anyhow!("{message}\nRun `donation-client login <email> <password>` to sign in again.")
            }
            _ => anyhow!(message),
        }
    })
}
