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

use std::time::Duration;
use chrono::{DateTime,TimeDelta,Utc};
use serde::Serialize;

use crate::flight::FlightTelemetry;
use crate::instructions::{InstructionRecord,InstructionValue};
use crate::registry::FlightRegistry;
use crate::config::Settings;

#[derive(Debug,Clone,Copy,PartialEq,Eq,PartialOrd,Ord,Serialize)]
#[serde(rename_all="snake_case")]
pub enum ComplianceState {
    Compliant,
    Pending,
    Overdue,
}

/// how a single instructed value compares to the telemetry
#[derive(Debug,Clone,PartialEq,Serialize)]
pub struct FieldStatus {
    pub value: f64,
    pub set: DateTime<Utc>,
    pub due: DateTime<Utc>,
    pub valid: Option<bool>, // None if there is no telemetry for this field
}

impl FieldStatus {
    fn new (instr: InstructionValue, completion_time: Duration, actual: Option<f64>, check: impl Fn(f64,f64)->bool)->Self {
        let due = TimeDelta::from_std( completion_time).ok()
            .and_then( |dt| instr.timestamp.checked_add_signed( dt))
            .unwrap_or( DateTime::<Utc>::MAX_UTC);

        FieldStatus { value: instr.value, set: instr.timestamp, due, valid: actual.map( |a| check( a, instr.value)) }
    }

    pub fn state (&self, now: DateTime<Utc>)->ComplianceState {
        if self.valid == Some(true) {
            ComplianceState::Compliant
        } else if now > self.due {
            ComplianceState::Overdue
        } else {
            ComplianceState::Pending
        }
    }
}

/// status of the active instruction of a flight
#[derive(Debug,Clone,PartialEq,Serialize)]
pub struct InstructionStatus {
    pub instruction_id: u64,
    pub atc_user_id: String,
    pub atc_user_fullname: String,
    pub altitude: Option<FieldStatus>,
    pub ground_speed: Option<FieldStatus>,
    pub track: Option<FieldStatus>,
    pub state: ComplianceState, // the worst of all instructed fields
}

pub fn instruction_status (ft: &FlightTelemetry, instr: &InstructionRecord, settings: &Settings, now: DateTime<Utc>)->InstructionStatus {
    let tol = settings.tolerances();

    let altitude = instr.altitude.map( |v| FieldStatus::new( v, settings.altitude_completion_time, ft.altitude, |a,i| tol.validate_altitude(a,i)));
    let ground_speed = instr.ground_speed.map( |v| FieldStatus::new( v, settings.ground_speed_completion_time, ft.ground_speed, |a,i| tol.validate_ground_speed(a,i)));
    let track = instr.track.map( |v| FieldStatus::new( v, settings.track_completion_time, ft.track, |a,i| tol.validate_track(a,i)));

    let state = [&altitude, &ground_speed, &track].iter()
        .filter_map( |fs| fs.as_ref().map( |fs| fs.state( now)))
        .max()
        .unwrap_or( ComplianceState::Compliant);

    InstructionStatus {
        instruction_id: instr.id,
        atc_user_id: instr.atc_user_id.clone(),
        atc_user_fullname: instr.atc_user_fullname.clone(),
        altitude, ground_speed, track, state
    }
}

/// what clients get for each flight
#[derive(Debug,Clone,PartialEq,Serialize)]
pub struct FlightReport {
    #[serde(flatten)]
    pub telemetry: FlightTelemetry,
    pub instructions: Option<InstructionStatus>,
}

/// reports for all flights in the registry, with the status of cached active instructions
pub fn flight_reports (registry: &FlightRegistry, settings: &Settings, now: DateTime<Utc>)->Vec<FlightReport> {
    let mut list: Vec<FlightReport> = registry.list_all().into_iter().map( |telemetry| {
        let instructions = registry.active_instruction( telemetry.icao)
            .map( |instr| instruction_status( &telemetry, &instr, settings, now));
        FlightReport { telemetry, instructions }
    }).collect();

    list.sort_by_key( |r| r.telemetry.icao);
    list
}
