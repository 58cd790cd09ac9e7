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

use std::{fmt, str::FromStr};
use chrono::{DateTime,Utc};
use serde::{Serialize,Deserialize,Serializer,Deserializer,de::Error as DeError};

use crate::errors::{OdinAtcError,Result,parse_error};
use crate::validator::normalize_360;

/// ICAO 24 bit aircraft address (mode S transponder code), written as 6 hex digits
#[derive(Debug,Clone,Copy,PartialEq,Eq,Hash,PartialOrd,Ord)]
pub struct Icao24(u32);

impl Icao24 {
    pub const MAX: u32 = 0xff_ffff;

    pub fn new (addr: u32)->Option<Self> {
        if addr <= Self::MAX { Some(Icao24(addr)) } else { None }
    }

    pub fn value (&self)->u32 { self.0 }
}

impl FromStr for Icao24 {
    type Err = OdinAtcError;

    fn from_str (s: &str)->Result<Self> {
        let s = s.trim();
        if s.len() != 6 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err( parse_error!( "not a valid ICAO 24 bit address: {:?}", s))
        }
        u32::from_str_radix( s, 16)
            .map( Icao24)
            .map_err( |e| parse_error!( "not a valid ICAO 24 bit address: {:?} ({})", s, e))
    }
}

impl fmt::Display for Icao24 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!( f, "{:06X}", self.0)
    }
}

impl Serialize for Icao24 {
    fn serialize<S: Serializer> (&self, s: S)->std::result::Result<S::Ok,S::Error> {
        s.serialize_str( &self.to_string())
    }
}

impl<'de> Deserialize<'de> for Icao24 {
    fn deserialize<D: Deserializer<'de>> (deserializer: D)->std::result::Result<Icao24,D::Error> {
        let s = String::deserialize( deserializer)?;
        s.parse().map_err( |e: OdinAtcError| D::Error::custom( e.to_string()))
    }
}

#[derive(Debug,Clone,Copy,PartialEq,Serialize,Deserialize)]
pub struct Position { pub latitude: f64, pub longitude: f64 }

/// the merge rule for sparse telemetry fields: a present new value always wins, a missing one
/// never clobbers what we already know
#[inline]
pub fn prepare_value<T> (old: Option<T>, new: Option<T>)->Option<T> {
    match new {
        Some(v) => Some(v),
        None => old
    }
}

/// the latest known state of a tracked aircraft.
/// All telemetry fields are optional since the feed delivers them in separate fragments
#[derive(Debug,Clone,PartialEq,Serialize,Deserialize)]
pub struct FlightTelemetry {
    pub icao: Icao24,
    pub callsign: Option<String>,

    pub altitude: Option<f64>,      // feet (baro, relative to 1013.25hPa)
    pub ground_speed: Option<f64>,  // knots
    pub track: Option<f64>,         // degrees [0..360)
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub vertical_rate: Option<i64>, // ft/min
    pub squawk: Option<String>,
    pub on_ground: Option<bool>,

    pub last_update: DateTime<Utc>,
}

impl FlightTelemetry {
    pub fn new (icao: Icao24, last_update: DateTime<Utc>)->Self {
        FlightTelemetry {
            icao,
            callsign: None,
            altitude: None,
            ground_speed: None,
            track: None,
            latitude: None,
            longitude: None,
            vertical_rate: None,
            squawk: None,
            on_ground: None,
            last_update
        }
    }

    pub fn position (&self)->Option<Position> {
        match (self.latitude, self.longitude) {
            (Some(latitude),Some(longitude)) => Some( Position{latitude,longitude} ),
            _ => None
        }
    }

    pub fn has_telemetry (&self)->bool {
        self.altitude.is_some() || self.ground_speed.is_some() || self.track.is_some() || self.latitude.is_some()
    }
}

impl fmt::Display for FlightTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!( f, "Flight( icao: {}", self.icao)?;
        if let Some(cs) = &self.callsign { write!( f, ", cs: \"{cs}\"")?; }
        if let Some(p) = self.position() { write!( f, ", pos: ({:.5},{:.5})", p.latitude, p.longitude)?; }
        if let Some(alt) = self.altitude { write!( f, ", alt: {:.0}", alt)?; }
        if let Some(gs) = self.ground_speed { write!( f, ", spd: {:.1}", gs)?; }
        if let Some(trk) = self.track { write!( f, ", trk: {:.0}", trk)?; }
        if let Some(vr) = self.vertical_rate { write!( f, ", vr: {}", vr)?; }
        if let Some(sq) = &self.squawk { write!( f, ", sq: {sq}")?; }
        write!( f, ", time: {})", self.last_update)
    }
}

/// the sparse set of values decoded from a single feed message
#[derive(Debug,Clone,PartialEq)]
pub struct TelemetryUpdate<'a> {
    pub icao: Icao24,
    pub callsign: Option<&'a str>,
    pub altitude: Option<f64>,
    pub ground_speed: Option<f64>,
    pub track: Option<f64>,
    pub position: Option<Position>,
    pub vertical_rate: Option<i64>,
    pub squawk: Option<&'a str>,
    pub on_ground: Option<bool>,
}

impl<'a> TelemetryUpdate<'a> {
    pub fn new (icao: Icao24)->Self {
        TelemetryUpdate {
            icao,
            callsign: None,
            altitude: None,
            ground_speed: None,
            track: None,
            position: None,
            vertical_rate: None,
            squawk: None,
            on_ground: None
        }
    }

    /// true if there is nothing to merge
    pub fn is_empty (&self)->bool {
        self.callsign.is_none() && self.altitude.is_none() && self.ground_speed.is_none() && self.track.is_none()
        && self.position.is_none() && self.vertical_rate.is_none() && self.squawk.is_none() && self.on_ground.is_none()
    }

    /// merge our values into `ft`, field by field
    pub fn update (&self, ft: &mut FlightTelemetry, timestamp: DateTime<Utc>) {
        ft.callsign = prepare_value( ft.callsign.take(), self.callsign.map( |cs| cs.to_string()));
        ft.altitude = prepare_value( ft.altitude, self.altitude);
        ft.ground_speed = prepare_value( ft.ground_speed, self.ground_speed);
        ft.track = prepare_value( ft.track, self.track.map( normalize_360));
        ft.latitude = prepare_value( ft.latitude, self.position.map( |p| p.latitude));
        ft.longitude = prepare_value( ft.longitude, self.position.map( |p| p.longitude));
        ft.vertical_rate = prepare_value( ft.vertical_rate, self.vertical_rate);
        ft.squawk = prepare_value( ft.squawk.take(), self.squawk.map( |sq| sq.to_string()));
        ft.on_ground = prepare_value( ft.on_ground, self.on_ground);

        ft.last_update = timestamp;
    }
}

impl<'a> fmt::Display for TelemetryUpdate<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!( f, "TelemetryUpdate( icao: {}", self.icao)?;
        if let Some(cs) = self.callsign { write!( f, ", callsign: {cs}")?; }
        if let Some(alt) = self.altitude { write!( f, ", altitude: {alt}")?; }
        if let Some(gs) = self.ground_speed { write!( f, ", ground_speed: {gs}")?; }
        if let Some(trk) = self.track { write!( f, ", track: {trk}")?; }
        if let Some(p) = self.position { write!( f, ", position: ({},{})", p.latitude, p.longitude)?; }
        if let Some(vr) = self.vertical_rate { write!( f, ", vertical_rate: {vr}")?; }
        if let Some(sq) = self.squawk { write!( f, ", squawk: {sq}")?; }
        if let Some(og) = self.on_ground { write!( f, ", on_ground: {og}")?; }
        write!( f, " )")
    }
}
