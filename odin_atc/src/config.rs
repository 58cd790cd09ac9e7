/*
 * Copyright © 2025, United States Government, as represented by the Administrator of
 * the National Aeronautics and Space Administration. All rights reserved.
 *
 * The “ODIN” software is licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License. You may obtain a copy
 * of the License at http://www.apache.org/licenses/LICENSE-2.0.
 *
 * Unless required by applicable law or agreed to in writing, software distributed under
 * the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND,
 * either express or implied. See the License for the specific language governing permissions
 * and limitations under the License.
 */

//! Configuration comes in two layers:
//!  - [`AtcConfig`] is the static RON file the process is started with (where is the journal,
//!    which tokens do we accept, what are the initial settings)
//!  - [`Settings`] are derived from the key/value configuration in the store. They can be changed
//!    at runtime, in which case the receiver is restarted to pick them up

use std::{collections::BTreeMap, fmt, net::IpAddr, path::PathBuf, sync::{Arc,RwLock}, time::Duration};
use serde::{Serialize,Deserialize};
use tracing::info;

use crate::errors::{OdinAtcError,Result};
use crate::validator::Tolerances;
use crate::store::AtcStore;
use crate::auth::TokenEntry;

/// a single configuration value. Stored values can be text even for numeric settings
#[derive(Debug,Clone,PartialEq,Serialize,Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Number(f64),
    Text(String),
}

impl ConfigValue {
    pub fn as_f64 (&self)->Option<f64> {
        match self {
            ConfigValue::Number(v) => Some(*v),
            ConfigValue::Text(s) => s.trim().parse().ok()
        }
    }

    pub fn as_str (&self)->Option<&str> {
        if let ConfigValue::Text(s) = self { Some(s.as_str()) } else { None }
    }

    /// parse stored text the way it was entered: numbers if possible, otherwise strings
    pub fn from_text (s: &str)->Self {
        match s.trim().parse::<f64>() {
            Ok(v) => ConfigValue::Number(v),
            Err(_) => ConfigValue::Text(s.to_string())
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Number(v) => write!( f, "{v}"),
            ConfigValue::Text(s) => write!( f, "{s}")
        }
    }
}

impl From<f64> for ConfigValue { fn from (v: f64)->Self { ConfigValue::Number(v) } }
impl From<u16> for ConfigValue { fn from (v: u16)->Self { ConfigValue::Number(v as f64) } }
impl From<&str> for ConfigValue { fn from (s: &str)->Self { ConfigValue::Text(s.to_string()) } }
impl From<String> for ConfigValue { fn from (s: String)->Self { ConfigValue::Text(s) } }

pub type ConfigMap = BTreeMap<String,ConfigValue>;

/// names of the configuration keys we use. Other keys are kept in the store but ignored here
pub mod keys {
    pub const LISTEN_ADDRESS: &str = "LISTEN_ADDRESS";
    pub const SBS_DEFAULT_PORT: &str = "SBS_DEFAULT_PORT";
    pub const SBS_SOURCE_ADDRESS: &str = "SBS_SOURCE_ADDRESS";
    pub const RECONNECT_INTERVAL_IN_SECONDS: &str = "RECONNECT_INTERVAL_IN_SECONDS";
    pub const SOURCE_IDLE_TIMEOUT_IN_SECONDS: &str = "SOURCE_IDLE_TIMEOUT_IN_SECONDS";
    pub const FLIGHT_RECORD_INTERVAL_IN_SECONDS: &str = "FLIGHT_RECORD_INTERVAL_IN_SECONDS";
    pub const MAX_FLIGHT_UPDATE_INTERVAL_IN_SECONDS: &str = "MAX_FLIGHT_UPDATE_INTERVAL_IN_SECONDS";
    pub const INSTRUCTION_VALIDITY_TIME_AFTER_FLIGHT_IS_LOST_IN_SECONDS: &str = "INSTRUCTION_VALIDITY_TIME_AFTER_FLIGHT_IS_LOST_IN_SECONDS";
    pub const MINIMUM_DESCENT_ALTITUDE_IN_FEET: &str = "MINIMUM_DESCENT_ALTITUDE_IN_FEET";
    pub const ALTITUDE_TOLERANCE_IN_FEET: &str = "ALTITUDE_TOLERANCE_IN_FEET";
    pub const GROUND_SPEED_TOLERANCE_IN_KNOTS: &str = "GROUND_SPEED_TOLERANCE_IN_KNOTS";
    pub const TRACK_TOLERANCE_IN_DEGREES: &str = "TRACK_TOLERANCE_IN_DEGREES";
    pub const ALTITUDE_INSTRUCTION_COMPLETION_TIME_IN_SECONDS: &str = "ALTITUDE_INSTRUCTION_COMPLETION_TIME_IN_SECONDS";
    pub const GROUND_SPEED_INSTRUCTION_COMPLETION_TIME_IN_SECONDS: &str = "GROUND_SPEED_INSTRUCTION_COMPLETION_TIME_IN_SECONDS";
    pub const TRACK_INSTRUCTION_COMPLETION_TIME_IN_SECONDS: &str = "TRACK_INSTRUCTION_COMPLETION_TIME_IN_SECONDS";
}

/// the live settings of the tracker
#[derive(Debug,Clone,PartialEq)]
pub struct Settings {
    pub listen_address: IpAddr,
    pub sbs_port: u16, // 0 means ephemeral port
    pub sbs_source: Option<String>, // host:port of an SBS output we connect to
    pub reconnect_interval: Duration,
    pub source_idle_timeout: Option<Duration>,

    pub record_interval: Duration,
    pub max_flight_update_interval: Duration,
    pub instruction_validity_after_lost: Duration,

    pub minimum_descent_altitude: f64,
    pub altitude_tolerance: f64,
    pub ground_speed_tolerance: f64,
    pub track_tolerance: f64,

    pub altitude_completion_time: Duration,
    pub ground_speed_completion_time: Duration,
    pub track_completion_time: Duration,
}

impl Default for Settings {
    fn default()->Self {
        Settings {
            listen_address: IpAddr::from([0,0,0,0]),
            sbs_port: 30003,
            sbs_source: None,
            reconnect_interval: Duration::from_secs(5),
            source_idle_timeout: Some( Duration::from_secs(60)),

            record_interval: Duration::from_secs(5),
            max_flight_update_interval: Duration::from_secs(60),
            instruction_validity_after_lost: Duration::from_secs(600),

            minimum_descent_altitude: 3000.0,
            altitude_tolerance: 50.0,
            ground_speed_tolerance: 5.0,
            track_tolerance: 2.0,

            altitude_completion_time: Duration::from_secs(120),
            ground_speed_completion_time: Duration::from_secs(60),
            track_completion_time: Duration::from_secs(60),
        }
    }
}

fn number (config: &ConfigMap, key: &str)->Result<Option<f64>> {
    match config.get( key) {
        Some(v) => match v.as_f64() {
            Some(x) if x.is_finite() => Ok( Some(x) ),
            _ => Err( OdinAtcError::ConfigError( format!("{key} is not a number: {v}")))
        }
        None => Ok(None)
    }
}

fn seconds (config: &ConfigMap, key: &str)->Result<Option<Duration>> {
    match number( config, key)? {
        Some(x) => Duration::try_from_secs_f64( x)
            .map( Some)
            .map_err( |_| OdinAtcError::ConfigError( format!("{key} is not a valid number of seconds: {x}"))),
        None => Ok(None)
    }
}

fn text (config: &ConfigMap, key: &str)->Option<String> {
    config.get( key).map( |v| v.to_string().trim().to_string())
}

impl Settings {
    /// overlay the values in `config` over the defaults
    pub fn from_configuration (config: &ConfigMap)->Result<Self> {
        use keys::*;
        let mut s = Settings::default();

        if let Some(addr) = text( config, LISTEN_ADDRESS) {
            s.listen_address = addr.parse()
                .map_err( |_| OdinAtcError::ConfigError( format!("{LISTEN_ADDRESS} is not an IP address: {addr}")))?;
        }
        if let Some(port) = number( config, SBS_DEFAULT_PORT)? {
            if port < 0.0 || port > u16::MAX as f64 || port.fract() != 0.0 {
                return Err( OdinAtcError::ConfigError( format!("{SBS_DEFAULT_PORT} is not a port number: {port}")))
            }
            s.sbs_port = port as u16;
        }
        if let Some(src) = text( config, SBS_SOURCE_ADDRESS) {
            s.sbs_source = if src.is_empty() { None } else { Some(src) };
        }
        if let Some(d) = seconds( config, RECONNECT_INTERVAL_IN_SECONDS)? { s.reconnect_interval = d; }
        if let Some(d) = seconds( config, SOURCE_IDLE_TIMEOUT_IN_SECONDS)? {
            s.source_idle_timeout = if d.is_zero() { None } else { Some(d) };
        }
        if let Some(d) = seconds( config, FLIGHT_RECORD_INTERVAL_IN_SECONDS)? {
            if d.is_zero() {
                return Err( OdinAtcError::ConfigError( format!("{FLIGHT_RECORD_INTERVAL_IN_SECONDS} has to be positive")))
            }
            s.record_interval = d;
        }
        if let Some(d) = seconds( config, MAX_FLIGHT_UPDATE_INTERVAL_IN_SECONDS)? { s.max_flight_update_interval = d; }
        if let Some(d) = seconds( config, INSTRUCTION_VALIDITY_TIME_AFTER_FLIGHT_IS_LOST_IN_SECONDS)? { s.instruction_validity_after_lost = d; }

        if let Some(x) = number( config, MINIMUM_DESCENT_ALTITUDE_IN_FEET)? { s.minimum_descent_altitude = x; }
        if let Some(x) = number( config, ALTITUDE_TOLERANCE_IN_FEET)? { s.altitude_tolerance = x; }
        if let Some(x) = number( config, GROUND_SPEED_TOLERANCE_IN_KNOTS)? { s.ground_speed_tolerance = x; }
        if let Some(x) = number( config, TRACK_TOLERANCE_IN_DEGREES)? { s.track_tolerance = x; }

        if let Some(d) = seconds( config, ALTITUDE_INSTRUCTION_COMPLETION_TIME_IN_SECONDS)? { s.altitude_completion_time = d; }
        if let Some(d) = seconds( config, GROUND_SPEED_INSTRUCTION_COMPLETION_TIME_IN_SECONDS)? { s.ground_speed_completion_time = d; }
        if let Some(d) = seconds( config, TRACK_INSTRUCTION_COMPLETION_TIME_IN_SECONDS)? { s.track_completion_time = d; }

        Ok(s)
    }

    /// the key/value representation of these settings
    pub fn to_configuration (&self)->ConfigMap {
        use keys::*;
        let mut map = ConfigMap::new();
        let mut secs = |k: &str, d: Duration| { map.insert( k.to_string(), ConfigValue::Number( d.as_secs_f64())); };

        secs( RECONNECT_INTERVAL_IN_SECONDS, self.reconnect_interval);
        secs( SOURCE_IDLE_TIMEOUT_IN_SECONDS, self.source_idle_timeout.unwrap_or_default());
        secs( FLIGHT_RECORD_INTERVAL_IN_SECONDS, self.record_interval);
        secs( MAX_FLIGHT_UPDATE_INTERVAL_IN_SECONDS, self.max_flight_update_interval);
        secs( INSTRUCTION_VALIDITY_TIME_AFTER_FLIGHT_IS_LOST_IN_SECONDS, self.instruction_validity_after_lost);
        secs( ALTITUDE_INSTRUCTION_COMPLETION_TIME_IN_SECONDS, self.altitude_completion_time);
        secs( GROUND_SPEED_INSTRUCTION_COMPLETION_TIME_IN_SECONDS, self.ground_speed_completion_time);
        secs( TRACK_INSTRUCTION_COMPLETION_TIME_IN_SECONDS, self.track_completion_time);

        map.insert( LISTEN_ADDRESS.to_string(), self.listen_address.to_string().into());
        map.insert( SBS_DEFAULT_PORT.to_string(), self.sbs_port.into());
        map.insert( SBS_SOURCE_ADDRESS.to_string(), self.sbs_source.clone().unwrap_or_default().into());
        map.insert( MINIMUM_DESCENT_ALTITUDE_IN_FEET.to_string(), self.minimum_descent_altitude.into());
        map.insert( ALTITUDE_TOLERANCE_IN_FEET.to_string(), self.altitude_tolerance.into());
        map.insert( GROUND_SPEED_TOLERANCE_IN_KNOTS.to_string(), self.ground_speed_tolerance.into());
        map.insert( TRACK_TOLERANCE_IN_DEGREES.to_string(), self.track_tolerance.into());

        map
    }

    pub fn tolerances (&self)->Tolerances {
        Tolerances {
            minimum_descent_altitude: self.minimum_descent_altitude,
            altitude: self.altitude_tolerance,
            ground_speed: self.ground_speed_tolerance,
            track: self.track_tolerance
        }
    }
}

/// the configuration clients get to see if nothing has been stored yet
pub fn default_configuration ()->ConfigMap {
    Settings::default().to_configuration()
}

/// write entries of `defaults` that are not in the store yet
pub async fn seed_configuration (store: &dyn AtcStore, defaults: &ConfigMap)->Result<()> {
    let stored = store.configuration().await?;
    let missing: ConfigMap = defaults.iter()
        .filter( |(k,_)| !stored.contains_key( *k))
        .map( |(k,v)| (k.clone(), v.clone()))
        .collect();

    if !missing.is_empty() {
        info!("seeding {} configuration values", missing.len());
        store.update_configuration( missing).await?;
    }
    Ok(())
}

/// the current settings, shared between receiver, protocol and service. Readers get an immutable
/// snapshot, reloads swap in a new one
#[derive(Debug,Clone,Default)]
pub struct SharedSettings(Arc<RwLock<Arc<Settings>>>);

impl SharedSettings {
    pub fn new (settings: Settings)->Self {
        SharedSettings( Arc::new( RwLock::new( Arc::new(settings))))
    }

    pub fn current (&self)->Arc<Settings> {
        self.0.read().unwrap_or_else( |poisoned| poisoned.into_inner()).clone()
    }

    pub fn set (&self, settings: Settings) {
        *self.0.write().unwrap_or_else( |poisoned| poisoned.into_inner()) = Arc::new(settings);
    }

    pub async fn load (store: &dyn AtcStore)->Result<Self> {
        let config = store.configuration().await?;
        Ok( SharedSettings::new( Settings::from_configuration( &config)?) )
    }

    /// re-read settings from the store. Our settings are not changed if the stored ones are invalid
    pub async fn reload (&self, store: &dyn AtcStore)->Result<Arc<Settings>> {
        let config = store.configuration().await?;
        let settings = Settings::from_configuration( &config)?;
        self.set( settings);
        Ok( self.current() )
    }
}

/// the static bootstrap configuration, usually from a `atc.ron` file
#[derive(Debug,Clone,Default,Serialize,Deserialize)]
#[serde(default)]
pub struct AtcConfig {
    /// journal file of the store. In-memory only if not set
    pub store_path: Option<PathBuf>,

    /// initial settings that are stored if there is no value yet
    pub defaults: ConfigMap,

    pub tokens: Vec<TokenEntry>,
}
