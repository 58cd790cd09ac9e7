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

//! ATC instructions and the protocol that decides who may issue them.
//!
//! A flight is either uncontrolled or controlled by the ATC user who issued the instruction that
//! is referenced by its latest [`FlightSnapshot`]. Instructions are immutable - each submission
//! creates a new [`InstructionRecord`] into which values of the previous one are carried forward,
//! and appends a new snapshot that points to it. Releasing control appends a snapshot without
//! instruction reference.
//!
//! There is no locking across requests. Concurrent submissions for the same flight are resolved
//! by the issuer check, i.e. the first one that gets stored wins and a competing ATC gets
//! `Forbidden` on its next attempt.

use std::{fmt, sync::Arc};
use chrono::{DateTime,Utc};
use serde::{Serialize,Deserialize,Deserializer,de::{self,Visitor}};
use tracing::{info,warn};

use crate::{utc_now, time_before};
use crate::errors::{OdinAtcError,Result};
use crate::flight::{Icao24,FlightTelemetry};
use crate::validator::Tolerances;
use crate::registry::FlightRegistry;
use crate::store::AtcStore;
use crate::config::SharedSettings;
use crate::auth::AtcUser;

pub type InstructionId = u64;

/// a single instructed value together with the time it was set (not when the record was created)
#[derive(Debug,Clone,Copy,PartialEq,Serialize,Deserialize)]
pub struct InstructionValue {
    pub value: f64,
    pub timestamp: DateTime<Utc>
}

impl InstructionValue {
    pub fn new (value: f64, timestamp: DateTime<Utc>)->Self { InstructionValue { value, timestamp } }
}

#[derive(Debug,Clone,PartialEq,Serialize,Deserialize)]
pub struct InstructionRecord {
    pub id: InstructionId, // assigned by the store
    pub atc_user_id: String,
    pub atc_user_fullname: String,
    pub icao: Icao24,
    pub created: DateTime<Utc>,

    pub altitude: Option<InstructionValue>,     // feet
    pub ground_speed: Option<InstructionValue>, // knots
    pub track: Option<InstructionValue>,        // degrees
}

impl fmt::Display for InstructionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!( f, "Instruction( id: {}, icao: {}, atc: {}", self.id, self.icao, self.atc_user_id)?;
        if let Some(v) = self.altitude { write!( f, ", alt: {}", v.value)?; }
        if let Some(v) = self.ground_speed { write!( f, ", spd: {}", v.value)?; }
        if let Some(v) = self.track { write!( f, ", trk: {}", v.value)?; }
        write!( f, " )")
    }
}

/// append-only control state record of a flight
#[derive(Debug,Clone,PartialEq,Serialize,Deserialize)]
pub struct FlightSnapshot {
    pub icao: Icao24,
    pub timestamp: DateTime<Utc>,
    pub instruction_id: Option<InstructionId>,

    pub callsign: Option<String>,
    pub altitude: Option<f64>,
    pub ground_speed: Option<f64>,
    pub track: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl FlightSnapshot {
    pub fn from_telemetry (ft: &FlightTelemetry, instruction_id: Option<InstructionId>, timestamp: DateTime<Utc>)->Self {
        FlightSnapshot {
            icao: ft.icao,
            timestamp,
            instruction_id,
            callsign: ft.callsign.clone(),
            altitude: ft.altitude,
            ground_speed: ft.ground_speed,
            track: ft.track,
            latitude: ft.latitude,
            longitude: ft.longitude
        }
    }

    /// a copy of our telemetry with a new control state
    pub fn successor (&self, instruction_id: Option<InstructionId>, timestamp: DateTime<Utc>)->Self {
        FlightSnapshot { timestamp, instruction_id, ..self.clone() }
    }
}

/// what a client submitted for a single instruction field
#[derive(Debug,Clone,Copy,PartialEq,Default)]
pub enum InstructionInput {
    /// field was not in the request (or null)
    #[default]
    Omitted,
    /// field was an empty string
    Blank,
    Value(f64)
}

impl InstructionInput {
    pub fn value (&self)->Option<f64> {
        if let InstructionInput::Value(v) = self { Some(*v) } else { None }
    }
}

impl From<f64> for InstructionInput {
    fn from (v: f64)->Self { InstructionInput::Value(v) }
}

impl From<Option<f64>> for InstructionInput {
    fn from (v: Option<f64>)->Self {
        match v {
            Some(v) => InstructionInput::Value(v),
            None => InstructionInput::Omitted
        }
    }
}

struct InstructionInputVisitor;

impl<'de> Visitor<'de> for InstructionInputVisitor {
    type Value = InstructionInput;

    fn expecting (&self, f: &mut fmt::Formatter)->fmt::Result {
        f.write_str("a number, a numeric string, an empty string or null")
    }

    fn visit_unit<E: de::Error> (self)->std::result::Result<InstructionInput,E> { Ok(InstructionInput::Omitted) }

    fn visit_none<E: de::Error> (self)->std::result::Result<InstructionInput,E> { Ok(InstructionInput::Omitted) }

    fn visit_some<D: Deserializer<'de>> (self, deserializer: D)->std::result::Result<InstructionInput,D::Error> {
        deserializer.deserialize_any( InstructionInputVisitor)
    }

    fn visit_f64<E: de::Error> (self, v: f64)->std::result::Result<InstructionInput,E> {
        if v.is_finite() { Ok(InstructionInput::Value(v)) } else { Err( E::custom("instruction value not finite")) }
    }

    fn visit_i64<E: de::Error> (self, v: i64)->std::result::Result<InstructionInput,E> { Ok(InstructionInput::Value(v as f64)) }

    fn visit_u64<E: de::Error> (self, v: u64)->std::result::Result<InstructionInput,E> { Ok(InstructionInput::Value(v as f64)) }

    fn visit_str<E: de::Error> (self, s: &str)->std::result::Result<InstructionInput,E> {
        let s = s.trim();
        if s.is_empty() {
            Ok(InstructionInput::Blank)
        } else {
            match s.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(InstructionInput::Value(v)),
                _ => Err( E::custom( format!("not a numeric instruction value: {s:?}")))
            }
        }
    }
}

impl<'de> Deserialize<'de> for InstructionInput {
    fn deserialize<D: Deserializer<'de>> (deserializer: D)->std::result::Result<InstructionInput,D::Error> {
        deserializer.deserialize_any( InstructionInputVisitor)
    }
}

/// the fields a client submits for a flight. Deserializes from requests like
/// `{"altitude": 5000, "ground_speed": "", "track": "270"}`
#[derive(Debug,Clone,Copy,PartialEq,Default,Deserialize)]
#[serde(default)]
pub struct InstructionRequest {
    pub altitude: InstructionInput,
    pub ground_speed: InstructionInput,
    pub track: InstructionInput,
}

impl InstructionRequest {
    pub fn new ()->Self { Self::default() }

    pub fn with_altitude (mut self, v: impl Into<InstructionInput>)->Self { self.altitude = v.into(); self }
    pub fn with_ground_speed (mut self, v: impl Into<InstructionInput>)->Self { self.ground_speed = v.into(); self }
    pub fn with_track (mut self, v: impl Into<InstructionInput>)->Self { self.track = v.into(); self }

    /// check that all submitted values are legal instructions
    pub fn validate (&self, tolerances: &Tolerances)->Result<()> {
        if let Some(v) = self.altitude.value() {
            if !tolerances.is_valid_altitude_instruction( v) {
                return Err( OdinAtcError::InvalidInstruction( format!("altitude {v} below minimum descent altitude {}", tolerances.minimum_descent_altitude)))
            }
        }
        if let Some(v) = self.ground_speed.value() {
            if !tolerances.is_valid_ground_speed_instruction( v) {
                return Err( OdinAtcError::InvalidInstruction( format!("negative ground speed {v}")))
            }
        }
        if let Some(v) = self.track.value() {
            if !tolerances.is_valid_track_instruction( v) {
                return Err( OdinAtcError::InvalidInstruction( format!("track {v} not within [0,360)")))
            }
        }
        Ok(())
    }
}

/// merge a submitted field with the value of the prior instruction. Only a changed value gets
/// a new timestamp, which is what compliance deadlines are computed from
pub fn carry_forward (input: InstructionInput, prior: Option<InstructionValue>, now: DateTime<Utc>)->Option<InstructionValue> {
    match input {
        InstructionInput::Value(v) => match prior {
            Some(p) if p.value == v => Some(p),
            _ => Some( InstructionValue::new( v, now))
        }
        InstructionInput::Omitted | InstructionInput::Blank => prior
    }
}

/// the submit/release protocol for flight control
pub struct InstructionOwnership {
    store: Arc<dyn AtcStore>,
    registry: Arc<FlightRegistry>,
    settings: SharedSettings,
}

impl InstructionOwnership {
    pub fn new (store: Arc<dyn AtcStore>, registry: Arc<FlightRegistry>, settings: SharedSettings)->Self {
        InstructionOwnership { store, registry, settings }
    }

    /// the instruction referenced by a snapshot. Dangling references are treated as no control
    async fn referenced_instruction (&self, snapshot: &FlightSnapshot)->Result<Option<Arc<InstructionRecord>>> {
        match snapshot.instruction_id {
            Some(id) => {
                let instr = self.store.instruction( id).await?;
                if instr.is_none() {
                    warn!("snapshot of {} refers to unknown instruction {}", snapshot.icao, id);
                }
                Ok(instr)
            }
            None => Ok(None)
        }
    }

    /// issue a new instruction for `icao`, carrying forward values of the active instruction
    /// that are not changed by `request`
    pub async fn submit (&self, icao: Icao24, user: &AtcUser, request: &InstructionRequest)->Result<Arc<InstructionRecord>> {
        let settings = self.settings.current();
        request.validate( &settings.tolerances())?;

        let now = utc_now();
        let cutoff = time_before( now, settings.max_flight_update_interval);
        let snapshot = self.store.latest_snapshot( icao, cutoff).await?
            .ok_or_else( || OdinAtcError::NotFound( format!("no recent update for flight {icao}")))?;

        let prior = self.referenced_instruction( &snapshot).await?;
        if let Some(prior) = &prior {
            if prior.atc_user_id != user.id {
                return Err( OdinAtcError::Forbidden( format!("flight {icao} is controlled by {}", prior.atc_user_fullname)))
            }
        }

        let record = InstructionRecord {
            id: 0,
            atc_user_id: user.id.clone(),
            atc_user_fullname: user.full_name.clone(),
            icao,
            created: now,
            altitude: carry_forward( request.altitude, prior.as_ref().and_then( |p| p.altitude), now),
            ground_speed: carry_forward( request.ground_speed, prior.as_ref().and_then( |p| p.ground_speed), now),
            track: carry_forward( request.track, prior.as_ref().and_then( |p| p.track), now),
        };

        let record = self.store.add_instruction( record).await?;
        self.store.add_snapshot( snapshot.successor( Some(record.id), now)).await?;
        self.registry.set_active_instruction( icao, record.clone());

        info!("{} issued {}", user.id, record);
        Ok(record)
    }

    /// give up control of `icao`. Only the ATC who issued the active instruction can do this
    pub async fn release (&self, icao: Icao24, user_id: &str)->Result<()> {
        let settings = self.settings.current();
        let now = utc_now();
        let cutoff = time_before( now, settings.instruction_validity_after_lost);
        let snapshot = self.store.latest_snapshot( icao, cutoff).await?
            .ok_or_else( || OdinAtcError::NotFound( format!("no recent snapshot for flight {icao}")))?;

        let prior = self.referenced_instruction( &snapshot).await?
            .ok_or_else( || OdinAtcError::NoActiveControl( format!("flight {icao} is not controlled")))?;
        if prior.atc_user_id != user_id {
            return Err( OdinAtcError::Forbidden( format!("flight {icao} is controlled by {}", prior.atc_user_fullname)))
        }

        self.store.add_snapshot( snapshot.successor( None, now)).await?;
        self.registry.clear_active_instruction( icao);

        info!("{} released control of {}", user_id, icao);
        Ok(())
    }
}
