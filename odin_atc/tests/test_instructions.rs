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

use std::sync::Arc;
use chrono::TimeDelta;
use odin_atc::{
    utc_now, AtcStore, AtcUser, FlightRegistry, FlightSnapshot, FlightTelemetry, Icao24, InstructionInput,
    InstructionOwnership, InstructionRequest, MemoryStore, OdinAtcError, Settings, SharedSettings
};

struct Fixture {
    store: Arc<MemoryStore>,
    registry: Arc<FlightRegistry>,
    ownership: InstructionOwnership,
}

fn fixture ()->Fixture {
    let store = Arc::new( MemoryStore::new());
    let registry = Arc::new( FlightRegistry::new());
    let settings = SharedSettings::new( Settings::default());
    let ownership = InstructionOwnership::new( store.clone(), registry.clone(), settings);
    Fixture { store, registry, ownership }
}

fn icao (s: &str)->Icao24 { s.parse().unwrap() }

/// add a snapshot for a flight that was last seen `age_secs` ago
async fn seen (store: &MemoryStore, addr: Icao24, age_secs: i64) {
    let t = utc_now() - TimeDelta::seconds( age_secs);
    let mut ft = FlightTelemetry::new( addr, t);
    ft.altitude = Some(8000.0);
    store.add_snapshot( FlightSnapshot::from_telemetry( &ft, None, t)).await.unwrap();
}

#[tokio::test]
async fn test_ownership_scenario() {
    let f = fixture();
    let x = icao("A1B2C3");
    let a = AtcUser::new( "atc-a", "Alice A");
    let b = AtcUser::new( "atc-b", "Bob B");
    seen( &f.store, x, 1).await;

    let r1 = f.ownership.submit( x, &a, &InstructionRequest::new().with_altitude( 4000.0)).await.unwrap();
    assert_eq!( r1.atc_user_id, "atc-a");
    assert_eq!( r1.altitude.map( |v| v.value), Some(4000.0));
    assert!( r1.ground_speed.is_none());
    assert_eq!( f.registry.active_instruction( x).map( |i| i.id), Some(r1.id));

    match f.ownership.submit( x, &b, &InstructionRequest::new().with_track( 90.0)).await {
        Err(OdinAtcError::Forbidden(msg)) => println!("B rejected: {msg}"),
        other => panic!("expected Forbidden, got {other:?}")
    }

    let r2 = f.ownership.submit( x, &a, &InstructionRequest::new().with_ground_speed( 250.0)).await.unwrap();
    assert_ne!( r1.id, r2.id);
    assert_eq!( r2.altitude, r1.altitude); // value and original timestamp
    assert_eq!( r2.ground_speed.map( |v| v.value), Some(250.0));
    assert!( r2.ground_speed.unwrap().timestamp >= r1.altitude.unwrap().timestamp);

    f.ownership.release( x, "atc-a").await.unwrap();
    assert!( f.registry.active_instruction( x).is_none());

    let r3 = f.ownership.submit( x, &b, &InstructionRequest::new().with_track( 90.0)).await.unwrap();
    assert_eq!( r3.atc_user_id, "atc-b");
    assert!( r3.altitude.is_none()); // nothing carried over from A
    assert_eq!( r3.track.map( |v| v.value), Some(90.0));

    let latest = f.store.latest_snapshot( x, utc_now() - TimeDelta::seconds(60)).await.unwrap().unwrap();
    assert_eq!( latest.instruction_id, Some(r3.id));
    assert_eq!( latest.altitude, Some(8000.0)); // telemetry copied from previous snapshot
}

#[tokio::test]
async fn test_changed_value_gets_new_timestamp() {
    let f = fixture();
    let x = icao("A1B2C3");
    let a = AtcUser::new( "atc-a", "Alice A");
    seen( &f.store, x, 1).await;

    let r1 = f.ownership.submit( x, &a, &InstructionRequest::new().with_altitude( 4000.0).with_track( 90.0)).await.unwrap();
    let r2 = f.ownership.submit( x, &a, &InstructionRequest::new().with_altitude( 4000.0).with_track( 120.0)).await.unwrap();

    assert_eq!( r2.altitude, r1.altitude);
    assert_eq!( r2.track.map( |v| v.value), Some(120.0));
    assert!( r2.track.unwrap().timestamp >= r1.track.unwrap().timestamp);
    assert_eq!( r2.created, r2.track.unwrap().timestamp);
}

#[tokio::test]
async fn test_blank_carries_forward() {
    let f = fixture();
    let x = icao("A1B2C3");
    let a = AtcUser::new( "atc-a", "Alice A");
    seen( &f.store, x, 1).await;

    let r1 = f.ownership.submit( x, &a, &InstructionRequest::new().with_altitude( 5000.0).with_ground_speed( 200.0)).await.unwrap();

    let blank = InstructionRequest { altitude: InstructionInput::Blank, ground_speed: InstructionInput::Blank, track: InstructionInput::Omitted };
    let r2 = f.ownership.submit( x, &a, &blank).await.unwrap();
    assert_eq!( r2.altitude, r1.altitude);
    assert_eq!( r2.ground_speed, r1.ground_speed);
    assert!( r2.track.is_none());
}

#[tokio::test]
async fn test_stale_flight() {
    let f = fixture();
    let y = icao("DEAD01");
    let a = AtcUser::new( "atc-a", "Alice A");

    // never seen
    assert!( matches!( f.ownership.submit( y, &a, &InstructionRequest::new().with_altitude( 4000.0)).await, Err(OdinAtcError::NotFound(_))));

    // last seen longer ago than the max flight update interval
    seen( &f.store, y, 120).await;
    assert!( matches!( f.ownership.submit( y, &a, &InstructionRequest::new().with_altitude( 4000.0)).await, Err(OdinAtcError::NotFound(_))));
}

#[tokio::test]
async fn test_invalid_instruction() {
    let f = fixture();
    let x = icao("A1B2C3");
    let a = AtcUser::new( "atc-a", "Alice A");
    seen( &f.store, x, 1).await;

    let requests = [
        InstructionRequest::new().with_altitude( 2000.0),
        InstructionRequest::new().with_ground_speed( -5.0),
        InstructionRequest::new().with_track( 360.0),
    ];
    for req in &requests {
        assert!( matches!( f.ownership.submit( x, &a, req).await, Err(OdinAtcError::InvalidInstruction(_))), "accepted {req:?}");
    }
    assert!( f.registry.active_instruction( x).is_none());
}

#[tokio::test]
async fn test_release_errors() {
    let f = fixture();
    let x = icao("A1B2C3");
    let a = AtcUser::new( "atc-a", "Alice A");

    assert!( matches!( f.ownership.release( x, "atc-a").await, Err(OdinAtcError::NotFound(_))));

    // still within the instruction validity window although too old for new instructions
    seen( &f.store, x, 120).await;
    assert!( matches!( f.ownership.release( x, "atc-a").await, Err(OdinAtcError::NoActiveControl(_))));

    seen( &f.store, x, 0).await;
    f.ownership.submit( x, &a, &InstructionRequest::new().with_altitude( 4000.0)).await.unwrap();
    assert!( matches!( f.ownership.release( x, "atc-b").await, Err(OdinAtcError::Forbidden(_))));

    f.ownership.release( x, "atc-a").await.unwrap();
    assert!( matches!( f.ownership.release( x, "atc-a").await, Err(OdinAtcError::NoActiveControl(_))));
}
