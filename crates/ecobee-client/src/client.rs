//! The ecobee client context
//!
//! `Ecobee` owns the executor, the credential session and the cached
//! thermostat list. Every operation takes `&mut self`, so at most one request
//! is in flight per client.

use std::sync::Arc;

use ecobee_auth::{AuthState, CredentialStore, Endpoints, ENDPOINT_THERMOSTAT};
use serde_json::Value;
use tracing::{debug, info, warn};
use transport::Transport;

use crate::classify::StatusCodeMap;
use crate::commands::{
    AudioPatch, FanMode, Function, HoldParams, HoldType, HvacMode, LocationPatch, Selection,
    SettingsPatch, ThermostatPatch, ThermostatQuery, UpdateRequest, Vacation, message_text,
    validate_fan_min_on_time,
};
use crate::error::{Error, Result};
use crate::executor::{Executor, RequestDescriptor};
use crate::session::{AuthOutcome, Session};

/// Construction parameters that do not live in the credential store.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// Overrides the stored API key when set.
    pub api_key: Option<String>,
    pub endpoints: Endpoints,
    pub status_codes: StatusCodeMap,
    /// Web-login credentials; both must be set to enable the web flow.
    pub username: Option<String>,
    pub password: Option<String>,
}

pub struct Ecobee {
    executor: Executor,
    session: Session,
    thermostats: Vec<Value>,
}

impl Ecobee {
    /// Load stored credentials and build a client.
    pub async fn connect(
        settings: Settings,
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self> {
        let mut credentials = store
            .load()
            .await
            .map_err(|e| Error::Store(e.to_string()))?;
        if let Some(api_key) = settings.api_key.filter(|k| !k.is_empty()) {
            credentials.api_key = api_key;
        }

        let mut session = Session::new(
            credentials,
            store,
            transport.clone(),
            settings.endpoints.clone(),
        );
        if let (Some(username), Some(password)) = (settings.username, settings.password) {
            session.set_web_login(username, password);
        }

        let executor = Executor::new(transport, settings.endpoints, settings.status_codes);
        Ok(Self {
            executor,
            session,
            thermostats: Vec::new(),
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> AuthState {
        self.session.state()
    }

    pub async fn request_pin(&mut self) -> bool {
        self.session.request_pin().await
    }

    pub async fn request_tokens(&mut self) -> Result<bool> {
        self.session.request_tokens().await
    }

    pub async fn refresh_tokens(&mut self) -> Result<bool> {
        self.session.refresh_tokens().await
    }

    pub async fn login(&mut self) -> Result<bool> {
        self.session.login().await
    }

    pub async fn authenticate(&mut self) -> Result<AuthOutcome> {
        self.session.authenticate().await
    }

    /// Fetch and cache every registered thermostat.
    ///
    /// Returns `Ok(false)` when the request failed or the response had no
    /// `thermostatList`; the previous cache is kept.
    pub async fn get_thermostats(&mut self) -> Result<bool> {
        let query = serde_json::to_string(&ThermostatQuery {
            selection: Selection::registered(),
        })
        .map_err(|e| Error::InvalidArgument(format!("encoding selection: {e}")))?;
        let request =
            RequestDescriptor::get(ENDPOINT_THERMOSTAT, "get thermostats").param("json", query);

        let payload = self.executor.execute(&request, &mut self.session).await?;
        match payload.and_then(|mut p| p.get_mut("thermostatList").map(Value::take)) {
            Some(Value::Array(list)) => {
                info!(thermostats = list.len(), "fetched thermostats");
                self.thermostats = list;
                Ok(true)
            }
            _ => {
                warn!("thermostat response had no thermostatList");
                Ok(false)
            }
        }
    }

    /// Re-fetch thermostat data.
    pub async fn update(&mut self) -> Result<bool> {
        self.get_thermostats().await
    }

    /// Cached thermostats from the last successful fetch.
    pub fn thermostats(&self) -> &[Value] {
        &self.thermostats
    }

    pub fn thermostat(&self, index: usize) -> Result<&Value> {
        self.thermostats
            .get(index)
            .ok_or(Error::UnknownThermostat(index))
    }

    /// Remote sensors of a cached thermostat; empty when none are reported.
    pub fn remote_sensors(&self, index: usize) -> Result<&[Value]> {
        Ok(self
            .thermostat(index)?
            .get("remoteSensors")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]))
    }

    fn selection(&self, index: usize) -> Result<Selection> {
        self.thermostat(index)?
            .get("identifier")
            .and_then(Value::as_str)
            .map(Selection::thermostat)
            .ok_or(Error::UnknownThermostat(index))
    }

    async fn post(&mut self, body: UpdateRequest, action: &str) -> Result<bool> {
        let body = serde_json::to_value(&body)
            .map_err(|e| Error::InvalidArgument(format!("encoding {action} request: {e}")))?;
        let request = RequestDescriptor::post(ENDPOINT_THERMOSTAT, action).body(body);
        let acknowledged = self
            .executor
            .execute(&request, &mut self.session)
            .await?
            .is_some();
        debug!(action, acknowledged, "thermostat update finished");
        Ok(acknowledged)
    }

    async fn patch_settings(
        &mut self,
        index: usize,
        settings: SettingsPatch,
        action: &str,
    ) -> Result<bool> {
        let body = UpdateRequest::patch(self.selection(index)?, ThermostatPatch::settings(settings));
        self.post(body, action).await
    }

    async fn call(&mut self, index: usize, function: Function, action: &str) -> Result<bool> {
        let body = UpdateRequest::function(self.selection(index)?, function);
        self.post(body, action).await
    }

    pub async fn set_hvac_mode(&mut self, index: usize, mode: HvacMode) -> Result<bool> {
        let settings = SettingsPatch {
            hvac_mode: Some(mode),
            ..SettingsPatch::default()
        };
        self.patch_settings(index, settings, "set HVAC mode").await
    }

    /// Minutes per hour the fan runs, 0-60.
    pub async fn set_fan_min_on_time(&mut self, index: usize, minutes: u8) -> Result<bool> {
        validate_fan_min_on_time(minutes)?;
        let settings = SettingsPatch {
            fan_min_on_time: Some(minutes),
            ..SettingsPatch::default()
        };
        self.patch_settings(index, settings, "set fan minimum on time")
            .await
    }

    /// Target humidity, 0-100 percent.
    pub async fn set_humidity(&mut self, index: usize, percent: u8) -> Result<bool> {
        if percent > 100 {
            return Err(Error::InvalidArgument(format!(
                "humidity must be 0-100, got {percent}"
            )));
        }
        let settings = SettingsPatch {
            humidity: Some(percent.to_string()),
            ..SettingsPatch::default()
        };
        self.patch_settings(index, settings, "set humidity level")
            .await
    }

    /// Smart Home/Away and Follow Me. `None` leaves a setting unchanged.
    pub async fn set_occupancy_modes(
        &mut self,
        index: usize,
        auto_away: Option<bool>,
        follow_me: Option<bool>,
    ) -> Result<bool> {
        if auto_away.is_none() && follow_me.is_none() {
            return Err(Error::InvalidArgument(
                "set at least one of auto_away and follow_me".into(),
            ));
        }
        let settings = SettingsPatch {
            auto_away,
            follow_me_comfort: follow_me,
            ..SettingsPatch::default()
        };
        self.patch_settings(index, settings, "set occupancy modes")
            .await
    }

    /// Alexa microphone (ecobee4 only).
    pub async fn set_mic_mode(&mut self, index: usize, enabled: bool) -> Result<bool> {
        let patch = ThermostatPatch {
            audio: Some(AudioPatch {
                microphone_enabled: enabled,
            }),
            ..ThermostatPatch::default()
        };
        let body = UpdateRequest::patch(self.selection(index)?, patch);
        self.post(body, "set mic mode").await
    }

    pub async fn set_dst_mode(&mut self, index: usize, enabled: bool) -> Result<bool> {
        let patch = ThermostatPatch {
            location: Some(LocationPatch {
                is_daylight_saving: enabled,
            }),
            ..ThermostatPatch::default()
        };
        let body = UpdateRequest::patch(self.selection(index)?, patch);
        self.post(body, "set dst mode").await
    }

    pub async fn set_fan_mode(
        &mut self,
        index: usize,
        fan: FanMode,
        cool_temp: f64,
        heat_temp: f64,
        hold: HoldType,
    ) -> Result<bool> {
        let mut params = HoldParams::new(hold)?.temperatures(cool_temp, heat_temp);
        params.fan = Some(fan);
        self.call(index, Function::SetHold(params), "set fan mode")
            .await
    }

    pub async fn set_hold_temp(
        &mut self,
        index: usize,
        cool_temp: f64,
        heat_temp: f64,
        hold: HoldType,
    ) -> Result<bool> {
        let params = HoldParams::new(hold)?.temperatures(cool_temp, heat_temp);
        self.call(index, Function::SetHold(params), "set hold temp")
            .await
    }

    /// Hold a comfort setting such as `away`, `home` or `sleep`.
    pub async fn set_climate_hold(
        &mut self,
        index: usize,
        climate: &str,
        hold: HoldType,
    ) -> Result<bool> {
        if climate.is_empty() {
            return Err(Error::InvalidArgument("climate reference is empty".into()));
        }
        let mut params = HoldParams::new(hold)?;
        params.hold_climate_ref = Some(climate.to_string());
        self.call(index, Function::SetHold(params), "set climate hold")
            .await
    }

    pub async fn create_vacation(&mut self, index: usize, vacation: Vacation) -> Result<bool> {
        let params = vacation.into_params()?;
        self.call(index, Function::CreateVacation(params), "create a vacation")
            .await
    }

    pub async fn delete_vacation(&mut self, index: usize, name: &str) -> Result<bool> {
        let function = Function::DeleteVacation {
            name: name.to_string(),
        };
        self.call(index, function, "delete a vacation").await
    }

    pub async fn resume_program(&mut self, index: usize, resume_all: bool) -> Result<bool> {
        self.call(index, Function::ResumeProgram { resume_all }, "resume program")
            .await
    }

    /// Show a message on the thermostat. Long messages are truncated.
    pub async fn send_message(&mut self, index: usize, text: Option<&str>) -> Result<bool> {
        let function = Function::SendMessage {
            text: message_text(text),
        };
        self.call(index, function, "send message").await
    }
}
