//! Request bodies for thermostat reads and writes
//!
//! Every body is a typed structure serialized once. Writes go to
//! `POST thermostat` as either a settings patch under `thermostat` or a list
//! of `functions`, each `{type, params}`.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{Error, Result};

pub const DEFAULT_MESSAGE: &str = "Hello from ecobee-client!";

/// Longest message the thermostat displays.
pub const MAX_MESSAGE_CHARS: usize = 500;

/// Which thermostats a request applies to, and what a read includes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub selection_type: &'static str,
    pub selection_match: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub include_runtime: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub include_sensors: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub include_program: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub include_equipment_status: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub include_events: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub include_weather: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub include_settings: bool,
}

impl Selection {
    /// Every registered thermostat with the sub-objects the client reads.
    pub fn registered() -> Self {
        Self {
            selection_type: "registered",
            selection_match: String::new(),
            include_runtime: true,
            include_sensors: true,
            include_program: true,
            include_equipment_status: true,
            include_events: true,
            include_weather: true,
            include_settings: true,
        }
    }

    /// A single thermostat by identifier.
    pub fn thermostat(identifier: &str) -> Self {
        Self {
            selection_type: "thermostats",
            selection_match: identifier.to_string(),
            include_runtime: false,
            include_sensors: false,
            include_program: false,
            include_equipment_status: false,
            include_events: false,
            include_weather: false,
            include_settings: false,
        }
    }
}

/// Value of the `json` query parameter on `GET thermostat`.
#[derive(Debug, Serialize)]
pub struct ThermostatQuery {
    pub selection: Selection,
}

/// Body of `POST thermostat`.
#[derive(Debug, Serialize)]
pub struct UpdateRequest {
    pub selection: Selection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thermostat: Option<ThermostatPatch>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<Function>,
}

impl UpdateRequest {
    pub fn patch(selection: Selection, patch: ThermostatPatch) -> Self {
        Self {
            selection,
            thermostat: Some(patch),
            functions: Vec::new(),
        }
    }

    pub fn function(selection: Selection, function: Function) -> Self {
        Self {
            selection,
            thermostat: None,
            functions: vec![function],
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct ThermostatPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<SettingsPatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioPatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationPatch>,
}

impl ThermostatPatch {
    pub fn settings(settings: SettingsPatch) -> Self {
        Self {
            settings: Some(settings),
            ..Self::default()
        }
    }
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hvac_mode: Option<HvacMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fan_min_on_time: Option<u8>,
    /// The API takes the humidity set point as a string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_away: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_me_comfort: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioPatch {
    pub microphone_enabled: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationPatch {
    pub is_daylight_saving: bool,
}

/// Thermostat function call.
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "params", rename_all = "camelCase")]
pub enum Function {
    SetHold(HoldParams),
    CreateVacation(VacationParams),
    DeleteVacation {
        name: String,
    },
    ResumeProgram {
        #[serde(rename = "resumeAll")]
        resume_all: bool,
    },
    SendMessage {
        text: String,
    },
}

/// How long a hold lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HoldType {
    DateTime,
    #[default]
    NextTransition,
    Indefinite,
    /// Hold for this many hours; must be at least 1.
    HoldHours(u32),
}

impl HoldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HoldType::DateTime => "dateTime",
            HoldType::NextTransition => "nextTransition",
            HoldType::Indefinite => "indefinite",
            HoldType::HoldHours(_) => "holdHours",
        }
    }
}

impl fmt::Display for HoldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HoldType::HoldHours(hours) => write!(f, "holdHours={hours}"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Parses `dateTime`, `nextTransition`, `indefinite` or `holdHours=N`.
impl FromStr for HoldType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dateTime" => Ok(HoldType::DateTime),
            "nextTransition" => Ok(HoldType::NextTransition),
            "indefinite" => Ok(HoldType::Indefinite),
            other => other
                .strip_prefix("holdHours=")
                .and_then(|hours| hours.parse().ok())
                .map(HoldType::HoldHours)
                .ok_or_else(|| Error::InvalidArgument(format!("unknown hold type: {other}"))),
        }
    }
}

/// `setHold` parameters. `holdHours` is only sent for `HoldType::HoldHours`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldParams {
    pub hold_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hold_hours: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cool_hold_temp: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heat_hold_temp: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hold_climate_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fan: Option<FanMode>,
}

impl HoldParams {
    pub fn new(hold: HoldType) -> Result<Self> {
        let hold_hours = match hold {
            HoldType::HoldHours(0) => {
                return Err(Error::InvalidArgument(
                    "holdHours must be at least 1".into(),
                ));
            }
            HoldType::HoldHours(hours) => Some(hours),
            _ => None,
        };
        Ok(Self {
            hold_type: hold.as_str(),
            hold_hours,
            cool_hold_temp: None,
            heat_hold_temp: None,
            hold_climate_ref: None,
            fan: None,
        })
    }

    pub fn temperatures(mut self, cool: f64, heat: f64) -> Self {
        self.cool_hold_temp = Some(tenths(cool));
        self.heat_hold_temp = Some(tenths(heat));
        self
    }
}

/// Degrees to the API's integer tenths of a degree.
pub fn tenths(degrees: f64) -> i32 {
    (degrees * 10.0).round() as i32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum HvacMode {
    Auto,
    AuxHeatOnly,
    Cool,
    Heat,
    Off,
}

impl FromStr for HvacMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(HvacMode::Auto),
            "auxHeatOnly" => Ok(HvacMode::AuxHeatOnly),
            "cool" => Ok(HvacMode::Cool),
            "heat" => Ok(HvacMode::Heat),
            "off" => Ok(HvacMode::Off),
            other => Err(Error::InvalidArgument(format!("unknown HVAC mode: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FanMode {
    #[default]
    Auto,
    On,
}

impl FromStr for FanMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(FanMode::Auto),
            "on" => Ok(FanMode::On),
            other => Err(Error::InvalidArgument(format!("unknown fan mode: {other}"))),
        }
    }
}

/// `createVacation` parameters.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VacationParams {
    pub name: String,
    pub cool_hold_temp: i32,
    pub heat_hold_temp: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    pub fan: FanMode,
    pub fan_min_on_time: String,
}

/// Builder for a vacation event.
///
/// Dates are `YYYY-MM-DD` and times `HH:MM:SS`, in thermostat local time.
/// Without a start the vacation begins now; without an end the thermostat
/// picks its default length.
#[derive(Debug, Clone)]
pub struct Vacation {
    name: String,
    cool_temp: f64,
    heat_temp: f64,
    start: Option<(String, String)>,
    end: Option<(String, String)>,
    fan: FanMode,
    fan_min_on_time: u8,
}

impl Vacation {
    pub fn new(name: impl Into<String>, cool_temp: f64, heat_temp: f64) -> Self {
        Self {
            name: name.into(),
            cool_temp,
            heat_temp,
            start: None,
            end: None,
            fan: FanMode::Auto,
            fan_min_on_time: 0,
        }
    }

    pub fn starting(mut self, date: impl Into<String>, time: impl Into<String>) -> Self {
        self.start = Some((date.into(), time.into()));
        self
    }

    pub fn ending(mut self, date: impl Into<String>, time: impl Into<String>) -> Self {
        self.end = Some((date.into(), time.into()));
        self
    }

    pub fn fan(mut self, fan: FanMode) -> Self {
        self.fan = fan;
        self
    }

    pub fn fan_min_on_time(mut self, minutes: u8) -> Self {
        self.fan_min_on_time = minutes;
        self
    }

    pub fn into_params(self) -> Result<VacationParams> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidArgument("vacation name is empty".into()));
        }
        validate_fan_min_on_time(self.fan_min_on_time)?;
        for (date, time) in self.start.iter().chain(self.end.iter()) {
            if !matches_shape(date, "dddd-dd-dd") {
                return Err(Error::InvalidArgument(format!(
                    "date must be YYYY-MM-DD: {date}"
                )));
            }
            if !matches_shape(time, "dd:dd:dd") {
                return Err(Error::InvalidArgument(format!(
                    "time must be HH:MM:SS: {time}"
                )));
            }
        }

        let (start_date, start_time) = self.start.unzip();
        let (end_date, end_time) = self.end.unzip();
        Ok(VacationParams {
            name: self.name,
            cool_hold_temp: tenths(self.cool_temp),
            heat_hold_temp: tenths(self.heat_temp),
            start_date,
            start_time,
            end_date,
            end_time,
            fan: self.fan,
            fan_min_on_time: self.fan_min_on_time.to_string(),
        })
    }
}

/// `d` matches an ASCII digit; any other character matches itself.
fn matches_shape(value: &str, shape: &str) -> bool {
    value.len() == shape.len()
        && value.chars().zip(shape.chars()).all(|(c, s)| match s {
            'd' => c.is_ascii_digit(),
            other => c == other,
        })
}

pub fn validate_fan_min_on_time(minutes: u8) -> Result<()> {
    if minutes > 60 {
        return Err(Error::InvalidArgument(format!(
            "fan minimum on time must be 0-60 minutes, got {minutes}"
        )));
    }
    Ok(())
}

/// First `MAX_MESSAGE_CHARS` characters of `text`, or the default greeting.
pub fn message_text(text: Option<&str>) -> String {
    text.unwrap_or(DEFAULT_MESSAGE)
        .chars()
        .take(MAX_MESSAGE_CHARS)
        .collect()
}

/// Marketing name for an ecobee `modelNumber`.
pub fn model_name(model_number: &str) -> Option<&'static str> {
    let name = match model_number {
        "idtSmart" => "ecobee Smart Thermostat",
        "idtEms" => "ecobee Smart EMS Thermostat",
        "siSmart" => "ecobee Si Smart Thermostat",
        "siEms" => "ecobee Si EMS Thermostat",
        "athenaSmart" => "ecobee3 Smart Thermostat",
        "athenaEms" => "ecobee3 EMS Thermostat",
        "corSmart" => "Carrier/Bryant Cor Thermostat",
        "nikeSmart" => "ecobee3 lite Smart Thermostat",
        "nikeEms" => "ecobee3 lite EMS Thermostat",
        "apolloSmart" => "ecobee4 Smart Thermostat",
        "vulcanSmart" => "ecobee Smart Thermostat with Voice Control",
        _ => return None,
    };
    Some(name)
}
