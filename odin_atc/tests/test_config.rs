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

use std::{net::IpAddr, time::Duration};
use odin_atc::{load_config, AtcConfig, AtcStore, ConfigMap, ConfigValue, MemoryStore, OdinAtcError, Settings, SharedSettings};
use odin_atc::config::{keys, seed_configuration, default_configuration};

fn config (entries: &[(&str,ConfigValue)])->ConfigMap {
    entries.iter().map( |(k,v)| (k.to_string(), v.clone())).collect()
}

#[test]
fn test_defaults() {
    let s = Settings::from_configuration( &ConfigMap::new()).unwrap();
    assert_eq!( s, Settings::default());
    assert_eq!( s.sbs_port, 30003);
    assert_eq!( s.max_flight_update_interval, Duration::from_secs(60));
    assert_eq!( s.instruction_validity_after_lost, Duration::from_secs(600));

    let tol = s.tolerances();
    assert_eq!( tol.minimum_descent_altitude, 3000.0);
    assert_eq!( tol.altitude, 50.0);
    assert_eq!( tol.ground_speed, 5.0);
    assert_eq!( tol.track, 2.0);
}

#[test]
fn test_text_values() {
    let s = Settings::from_configuration( &config( &[
        (keys::SBS_DEFAULT_PORT, ConfigValue::Text("40003".into())),
        (keys::LISTEN_ADDRESS, ConfigValue::Text("127.0.0.1".into())),
        (keys::ALTITUDE_TOLERANCE_IN_FEET, ConfigValue::Text("100".into())),
        (keys::SBS_SOURCE_ADDRESS, ConfigValue::Text("".into())),
        (keys::SOURCE_IDLE_TIMEOUT_IN_SECONDS, ConfigValue::Number(0.0)),
        ("MAP_ZOOM", ConfigValue::Number(9.0)),
    ])).unwrap();

    assert_eq!( s.sbs_port, 40003);
    assert_eq!( s.listen_address, "127.0.0.1".parse::<IpAddr>().unwrap());
    assert_eq!( s.altitude_tolerance, 100.0);
    assert_eq!( s.sbs_source, None);
    assert_eq!( s.source_idle_timeout, None);
}

#[test]
fn test_invalid_values() {
    let invalid = [
        (keys::SBS_DEFAULT_PORT, ConfigValue::Number(70000.0)),
        (keys::SBS_DEFAULT_PORT, ConfigValue::Text("port".into())),
        (keys::LISTEN_ADDRESS, ConfigValue::Text("not an address".into())),
        (keys::FLIGHT_RECORD_INTERVAL_IN_SECONDS, ConfigValue::Number(0.0)),
        (keys::MAX_FLIGHT_UPDATE_INTERVAL_IN_SECONDS, ConfigValue::Number(-1.0)),
    ];
    for (k,v) in invalid {
        match Settings::from_configuration( &config( &[(k, v.clone())])) {
            Err(OdinAtcError::ConfigError(msg)) => println!("{msg}"),
            other => panic!("accepted {k} = {v}: {other:?}")
        }
    }
}

#[test]
fn test_round_trip_defaults() {
    let s = Settings::from_configuration( &default_configuration()).unwrap();
    assert_eq!( s, Settings::default());
}

#[tokio::test]
async fn test_seed_and_reload() {
    let store = MemoryStore::new();
    store.update_configuration( config( &[(keys::SBS_DEFAULT_PORT, ConfigValue::Number(40003.0))])).await.unwrap();

    let defaults = config( &[
        (keys::SBS_DEFAULT_PORT, ConfigValue::Number(30003.0)),
        (keys::TRACK_TOLERANCE_IN_DEGREES, ConfigValue::Number(3.0)),
    ]);
    seed_configuration( &store, &defaults).await.unwrap();

    let stored = store.configuration().await.unwrap();
    assert_eq!( stored.get( keys::SBS_DEFAULT_PORT), Some( &ConfigValue::Number(40003.0))); // not overwritten
    assert_eq!( stored.get( keys::TRACK_TOLERANCE_IN_DEGREES), Some( &ConfigValue::Number(3.0)));

    let settings = SharedSettings::load( &store).await.unwrap();
    assert_eq!( settings.current().sbs_port, 40003);

    store.update_configuration( config( &[(keys::SBS_DEFAULT_PORT, ConfigValue::Number(40004.0))])).await.unwrap();
    let s = settings.reload( &store).await.unwrap();
    assert_eq!( s.sbs_port, 40004);

    // invalid stored values leave the current settings alone
    store.update_configuration( config( &[(keys::SBS_DEFAULT_PORT, ConfigValue::Text("nope".into()))])).await.unwrap();
    assert!( settings.reload( &store).await.is_err());
    assert_eq!( settings.current().sbs_port, 40004);
}

#[test]
fn test_load_ron_config() {
    let path = std::env::temp_dir().join( format!("odin_atc_config_{}.ron", std::process::id()));
    std::fs::write( &path, r#"
        AtcConfig(
            store_path: Some("journal.jsonl"),
            defaults: { "SBS_DEFAULT_PORT": 30004, "LISTEN_ADDRESS": "127.0.0.1" },
            tokens: [ TokenEntry( token: "t1", user_id: "atc1", full_name: "Jane Controller" ) ],
        )
    "#).unwrap();

    let config: AtcConfig = load_config( &path).unwrap();
    let _ = std::fs::remove_file( &path);

    assert_eq!( config.store_path.as_deref(), Some( std::path::Path::new("journal.jsonl")));
    assert_eq!( config.defaults.get("SBS_DEFAULT_PORT").and_then( |v| v.as_f64()), Some(30004.0));
    assert_eq!( config.defaults.get("LISTEN_ADDRESS").and_then( |v| v.as_str()), Some("127.0.0.1"));
    assert_eq!( config.tokens.len(), 1);
    assert!( !config.tokens[0].is_admin);
}
