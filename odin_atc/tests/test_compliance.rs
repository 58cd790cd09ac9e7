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

use chrono::{DateTime,TimeDelta,Utc};
use odin_atc::{utc_now, FlightTelemetry, Icao24, InstructionRecord, Settings};
use odin_atc::instructions::InstructionValue;
use odin_atc::compliance::{instruction_status,ComplianceState};

fn icao (s: &str)->Icao24 { s.parse().unwrap() }

fn record (set: DateTime<Utc>, altitude: Option<f64>, track: Option<f64>)->InstructionRecord {
    InstructionRecord {
        id: 1,
        atc_user_id: "atc1".into(),
        atc_user_fullname: "Jane Controller".into(),
        icao: icao("A1B2C3"),
        created: set,
        altitude: altitude.map( |v| InstructionValue::new( v, set)),
        ground_speed: None,
        track: track.map( |v| InstructionValue::new( v, set))
    }
}

#[test]
fn test_compliant() {
    let now = utc_now();
    let mut ft = FlightTelemetry::new( icao("A1B2C3"), now);
    ft.altitude = Some(4990.0);
    ft.track = Some(359.0);

    let status = instruction_status( &ft, &record( now, Some(5000.0), Some(1.0)), &Settings::default(), now);
    assert_eq!( status.altitude.as_ref().unwrap().valid, Some(true));
    assert_eq!( status.track.as_ref().unwrap().valid, Some(true));
    assert_eq!( status.state, ComplianceState::Compliant);
}

#[test]
fn test_pending_and_overdue() {
    let now = utc_now();
    let mut ft = FlightTelemetry::new( icao("A1B2C3"), now);
    ft.altitude = Some(8000.0);
    ft.track = Some(90.0);
    let settings = Settings::default();

    // altitude was set 90s ago (due after 120s), track 90s ago (due after 60s)
    let set = now - TimeDelta::seconds(90);
    let status = instruction_status( &ft, &record( set, Some(5000.0), Some(180.0)), &settings, now);

    let alt = status.altitude.as_ref().unwrap();
    assert_eq!( alt.valid, Some(false));
    assert_eq!( alt.due, set + TimeDelta::seconds(120));
    assert_eq!( alt.state( now), ComplianceState::Pending);

    let trk = status.track.as_ref().unwrap();
    assert_eq!( trk.state( now), ComplianceState::Overdue);
    assert_eq!( status.state, ComplianceState::Overdue);
}

#[test]
fn test_missing_telemetry() {
    let now = utc_now();
    let ft = FlightTelemetry::new( icao("A1B2C3"), now);
    let status = instruction_status( &ft, &record( now, Some(5000.0), None), &Settings::default(), now);

    assert_eq!( status.altitude.as_ref().unwrap().valid, None);
    assert_eq!( status.state, ComplianceState::Pending);
    assert!( status.track.is_none());
}
