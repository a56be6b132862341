//! Command-line parsing
//!
//! Hand-rolled: global options (`--config`, `--index`) may appear anywhere,
//! the first positional argument names the command, and each command takes
//! its own positionals and flags.

use anyhow::{Context, Result, anyhow, bail};
use ecobee_client::{FanMode, HoldType, HvacMode};

pub const USAGE: &str = "\
usage: ecobee-cli [--config PATH] [--index N] <command> [args]

commands:
  authorize                          request a PIN and wait for it to be authorized
  login                              sign in with the [secondary] web credentials
  refresh                            renew the access token
  status                             show the authorization state
  thermostats                        list registered thermostats
  hvac <auto|auxHeatOnly|cool|heat|off>
  hold <cool> <heat> [--hold TYPE]
  climate <name> [--hold TYPE]
  fan <auto|on> <cool> <heat> [--hold TYPE]
  fan-min <minutes>
  resume [--all]
  message [text]
  humidity <percent>
  mic <on|off>
  dst <on|off>
  occupancy [--auto-away on|off] [--follow-me on|off]
  vacation-create <name> <cool> <heat> [--start DATE TIME] [--end DATE TIME]
                  [--fan auto|on] [--fan-min MINUTES]
  vacation-delete <name>
  help

TYPE is dateTime, nextTransition (default), indefinite or holdHours=N.
";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Authorize,
    Login,
    Refresh,
    Status,
    Thermostats,
    Hvac(HvacMode),
    Hold {
        cool: f64,
        heat: f64,
        hold: HoldType,
    },
    Climate {
        name: String,
        hold: HoldType,
    },
    Fan {
        fan: FanMode,
        cool: f64,
        heat: f64,
        hold: HoldType,
    },
    FanMin(u8),
    Resume {
        all: bool,
    },
    Message(Option<String>),
    Humidity(u8),
    Mic(bool),
    Dst(bool),
    Occupancy {
        auto_away: Option<bool>,
        follow_me: Option<bool>,
    },
    VacationCreate(VacationArgs),
    VacationDelete(String),
    Help,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct VacationArgs {
    pub name: String,
    pub cool: f64,
    pub heat: f64,
    pub start: Option<(String, String)>,
    pub end: Option<(String, String)>,
    pub fan: Option<FanMode>,
    pub fan_min_on_time: Option<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cli {
    pub config: Option<String>,
    pub index: usize,
    pub command: Command,
}

/// Split arguments into positionals and `--flag value...` pairs.
struct Args {
    positionals: Vec<String>,
    flags: Vec<(String, Vec<String>)>,
}

/// Number of values each known flag consumes.
fn flag_arity(name: &str) -> Option<usize> {
    match name {
        "--all" => Some(0),
        "--config" | "--index" | "--hold" | "--fan" | "--fan-min" | "--auto-away"
        | "--follow-me" => Some(1),
        "--start" | "--end" => Some(2),
        _ => None,
    }
}

impl Args {
    fn split(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut positionals = Vec::new();
        let mut flags = Vec::new();
        let mut iter = args.into_iter();
        while let Some(arg) = iter.next() {
            if arg == "-h" || arg == "--help" {
                positionals.insert(0, "help".to_string());
                continue;
            }
            if !arg.starts_with("--") {
                positionals.push(arg);
                continue;
            }
            let arity = flag_arity(&arg).ok_or_else(|| anyhow!("unknown option: {arg}"))?;
            let values: Vec<String> = iter.by_ref().take(arity).collect();
            if values.len() != arity {
                bail!("{arg} expects {arity} value(s)");
            }
            flags.push((arg, values));
        }
        Ok(Self { positionals, flags })
    }

    fn take_flag(&mut self, name: &str) -> Option<Vec<String>> {
        let position = self.flags.iter().position(|(flag, _)| flag == name)?;
        Some(self.flags.remove(position).1)
    }

    fn take_value(&mut self, name: &str) -> Option<String> {
        self.take_flag(name).and_then(|mut values| values.pop())
    }

    fn take_pair(&mut self, name: &str) -> Option<(String, String)> {
        let mut values = self.take_flag(name)?.into_iter();
        Some((values.next()?, values.next()?))
    }

    fn hold(&mut self) -> Result<HoldType> {
        match self.take_value("--hold") {
            Some(value) => Ok(value.parse()?),
            None => Ok(HoldType::default()),
        }
    }

    fn positional(&self, index: usize, what: &str) -> Result<&str> {
        self.positionals
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| anyhow!("missing argument: {what}"))
    }

    fn number<T>(&self, index: usize, what: &str) -> Result<T>
    where
        T: std::str::FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        self.positional(index, what)?
            .parse()
            .with_context(|| format!("invalid {what}"))
    }
}

fn on_off(value: &str) -> Result<bool> {
    match value {
        "on" | "true" => Ok(true),
        "off" | "false" => Ok(false),
        other => bail!("expected on or off, got: {other}"),
    }
}

/// Parse arguments, excluding the program name.
pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Cli> {
    let mut args = Args::split(args)?;
    let config = args.take_value("--config");
    let index = match args.take_value("--index") {
        Some(value) => value.parse().context("invalid --index")?,
        None => 0,
    };

    let name = args.positionals.first().cloned().unwrap_or_default();
    let command = match name.as_str() {
        "" | "help" => Command::Help,
        "authorize" => Command::Authorize,
        "login" => Command::Login,
        "refresh" => Command::Refresh,
        "status" => Command::Status,
        "thermostats" => Command::Thermostats,
        "hvac" => Command::Hvac(args.positional(1, "HVAC mode")?.parse()?),
        "hold" => Command::Hold {
            cool: args.number(1, "cool temperature")?,
            heat: args.number(2, "heat temperature")?,
            hold: args.hold()?,
        },
        "climate" => Command::Climate {
            name: args.positional(1, "climate name")?.to_string(),
            hold: args.hold()?,
        },
        "fan" => Command::Fan {
            fan: args.positional(1, "fan mode")?.parse()?,
            cool: args.number(2, "cool temperature")?,
            heat: args.number(3, "heat temperature")?,
            hold: args.hold()?,
        },
        "fan-min" => Command::FanMin(args.number(1, "minutes")?),
        "resume" => Command::Resume {
            all: args.take_flag("--all").is_some(),
        },
        "message" => {
            let text = args.positionals[1..].join(" ");
            Command::Message((!text.is_empty()).then_some(text))
        }
        "humidity" => Command::Humidity(args.number(1, "humidity percent")?),
        "mic" => Command::Mic(on_off(args.positional(1, "on or off")?)?),
        "dst" => Command::Dst(on_off(args.positional(1, "on or off")?)?),
        "occupancy" => {
            let auto_away = args.take_value("--auto-away").map(|v| on_off(&v)).transpose()?;
            let follow_me = args.take_value("--follow-me").map(|v| on_off(&v)).transpose()?;
            Command::Occupancy {
                auto_away,
                follow_me,
            }
        }
        "vacation-create" => {
            let fan = args
                .take_value("--fan")
                .map(|v| v.parse::<FanMode>())
                .transpose()?;
            let fan_min_on_time = args
                .take_value("--fan-min")
                .map(|v| v.parse::<u8>())
                .transpose()
                .context("invalid --fan-min")?;
            Command::VacationCreate(VacationArgs {
                name: args.positional(1, "vacation name")?.to_string(),
                cool: args.number(2, "cool temperature")?,
                heat: args.number(3, "heat temperature")?,
                start: args.take_pair("--start"),
                end: args.take_pair("--end"),
                fan,
                fan_min_on_time,
            })
        }
        "vacation-delete" => {
            Command::VacationDelete(args.positional(1, "vacation name")?.to_string())
        }
        other => bail!("unknown command: {other}"),
    };

    if let Some((flag, _)) = args.flags.first() {
        bail!("{flag} is not valid for {name}");
    }

    Ok(Cli {
        config,
        index,
        command,
    })
}
