//! ecobee command-line client
//!
//! Authorizes against the ecobee API with the PIN flow (or a web login),
//! persists the token set to the credentials file, and runs one thermostat
//! command per invocation.

mod cli;
mod config;
mod metrics;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use ecobee_auth::JsonFileStore;
use ecobee_client::{AuthOutcome, Ecobee, Vacation, model_name};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::ReqwestTransport;

use crate::cli::{Command, USAGE, VacationArgs};
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs go to stderr so command output on stdout stays clean
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = cli::parse(std::env::args().skip(1))?;
    if cli.command == Command::Help {
        print!("{USAGE}");
        return Ok(());
    }

    let config_path = Config::resolve_path(cli.config.as_deref());
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        credentials = %config.ecobee.credentials_path.display(),
        api_base_url = %config.ecobee.api_base_url,
        web_login = config.settings().username.is_some(),
        "configuration loaded"
    );

    // Install before any client code records metrics
    let prometheus = match &config.ecobee.metrics_path {
        Some(_) => Some(metrics::install_recorder().context("failed to install metrics recorder")?),
        None => None,
    };

    let transport = ReqwestTransport::new(config.timeout()).context("failed to build HTTP client")?;
    let store = JsonFileStore::new(config.ecobee.credentials_path.clone());
    let mut ecobee = Ecobee::connect(config.settings(), Arc::new(transport), Arc::new(store))
        .await
        .context("failed to load credentials")?;

    let result = run(&mut ecobee, &config, cli.index, cli.command)
        .await
        .map_err(explain);

    if let (Some(handle), Some(path)) = (&prometheus, &config.ecobee.metrics_path) {
        if let Err(e) = metrics::write_textfile(handle, path) {
            error!(error = %e, path = %path.display(), "failed to write metrics");
        }
    }
    result
}

/// Attach a remedy to token errors the user can act on.
fn explain(err: anyhow::Error) -> anyhow::Error {
    let hint = match err.downcast_ref::<ecobee_client::Error>() {
        Some(ecobee_client::Error::InvalidToken) => {
            "stored tokens were rejected; run `ecobee-cli authorize` or `ecobee-cli login`"
        }
        Some(ecobee_client::Error::ExpiredToken) => {
            "access token expired and could not be renewed; run `ecobee-cli refresh`"
        }
        _ => return err,
    };
    err.context(hint)
}

async fn run(ecobee: &mut Ecobee, config: &Config, index: usize, command: Command) -> Result<()> {
    match command {
        Command::Help => print!("{USAGE}"),
        Command::Authorize => authorize(ecobee, config).await?,
        Command::Login => {
            if !ecobee.login().await? {
                bail!("web login failed; check [secondary] username and password");
            }
            println!("logged in");
        }
        Command::Refresh => {
            if !ecobee.refresh_tokens().await? {
                bail!("token refresh failed; run `ecobee-cli authorize`");
            }
            println!("tokens refreshed");
        }
        Command::Status => {
            let credentials = ecobee.session().credentials();
            println!("state: {}", ecobee.state());
            println!("api key: {}", present(&credentials.api_key));
            println!("access token: {}", present(&credentials.access_token));
            println!("refresh token: {}", present(&credentials.refresh_token));
            if let Some(pin) = ecobee.session().pin() {
                println!("pending PIN: {pin}");
            }
            if credentials.has_secondary() {
                println!("web session: present");
            }
        }
        Command::Thermostats => {
            connect(ecobee).await?;
            for (i, thermostat) in ecobee.thermostats().iter().enumerate() {
                print_thermostat(i, thermostat);
            }
        }
        command => {
            connect(ecobee).await?;
            let updated = apply(ecobee, index, command).await?;
            if !updated {
                bail!("ecobee rejected the update; see logs for details");
            }
            println!("ok");
        }
    }
    Ok(())
}

/// Ensure usable tokens and a fresh thermostat list.
async fn connect(ecobee: &mut Ecobee) -> Result<()> {
    match ecobee.authenticate().await? {
        AuthOutcome::Authorized => {}
        AuthOutcome::AwaitingPin(pin) => bail!(
            "not authorized; enter PIN {pin} at ecobee.com (My Apps > Add Application), then run `ecobee-cli authorize`"
        ),
        AuthOutcome::Failed => bail!("not authorized; run `ecobee-cli authorize`"),
    }
    if !ecobee.get_thermostats().await? {
        bail!("failed to fetch thermostats; see logs for details");
    }
    Ok(())
}

async fn apply(ecobee: &mut Ecobee, index: usize, command: Command) -> Result<bool> {
    let updated = match command {
        Command::Hvac(mode) => ecobee.set_hvac_mode(index, mode).await?,
        Command::Hold { cool, heat, hold } => ecobee.set_hold_temp(index, cool, heat, hold).await?,
        Command::Climate { name, hold } => ecobee.set_climate_hold(index, &name, hold).await?,
        Command::Fan {
            fan,
            cool,
            heat,
            hold,
        } => ecobee.set_fan_mode(index, fan, cool, heat, hold).await?,
        Command::FanMin(minutes) => ecobee.set_fan_min_on_time(index, minutes).await?,
        Command::Resume { all } => ecobee.resume_program(index, all).await?,
        Command::Message(text) => ecobee.send_message(index, text.as_deref()).await?,
        Command::Humidity(percent) => ecobee.set_humidity(index, percent).await?,
        Command::Mic(enabled) => ecobee.set_mic_mode(index, enabled).await?,
        Command::Dst(enabled) => ecobee.set_dst_mode(index, enabled).await?,
        Command::Occupancy {
            auto_away,
            follow_me,
        } => ecobee.set_occupancy_modes(index, auto_away, follow_me).await?,
        Command::VacationCreate(args) => ecobee.create_vacation(index, vacation(args)).await?,
        Command::VacationDelete(name) => ecobee.delete_vacation(index, &name).await?,
        other => bail!("{other:?} is not a thermostat command"),
    };
    Ok(updated)
}

fn vacation(args: VacationArgs) -> Vacation {
    let mut vacation = Vacation::new(args.name, args.cool, args.heat);
    if let Some((date, time)) = args.start {
        vacation = vacation.starting(date, time);
    }
    if let Some((date, time)) = args.end {
        vacation = vacation.ending(date, time);
    }
    if let Some(fan) = args.fan {
        vacation = vacation.fan(fan);
    }
    if let Some(minutes) = args.fan_min_on_time {
        vacation = vacation.fan_min_on_time(minutes);
    }
    vacation
}

/// Request a PIN, then poll the token endpoint until the user authorizes it.
async fn authorize(ecobee: &mut Ecobee, config: &Config) -> Result<()> {
    if ecobee.session().credentials().api_key.is_empty() {
        bail!("no API key; set ecobee.api_key or ECOBEE_API_KEY");
    }
    if !ecobee.request_pin().await {
        bail!("failed to request a PIN; see logs for details");
    }
    let pin = ecobee.session().pin().unwrap_or_default().to_string();
    println!("enter PIN {pin} at ecobee.com (My Apps > Add Application)");

    let deadline = Instant::now() + config.pin_poll_timeout();
    loop {
        tokio::time::sleep(config.pin_poll_interval()).await;
        if ecobee.request_tokens().await? {
            println!("authorized");
            return Ok(());
        }
        if Instant::now() >= deadline {
            bail!("PIN {pin} was not authorized in time; run `ecobee-cli authorize` again");
        }
        warn!(pin = %pin, "PIN not yet authorized, polling again");
    }
}

fn present(value: &str) -> &'static str {
    if value.is_empty() { "missing" } else { "present" }
}

fn print_thermostat(index: usize, thermostat: &Value) {
    let field = |name: &str| thermostat.get(name).and_then(Value::as_str).unwrap_or("?");
    let model = model_name(field("modelNumber")).unwrap_or("unknown model");
    println!(
        "[{index}] {} ({}) {model}",
        field("name"),
        field("identifier")
    );
}
