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

use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{io::AsyncWriteExt, net::{TcpListener,TcpStream}, time};
use odin_atc::{
    utc_now, AtcStore, AtcUser, ConfigMap, ConfigValue, FlightRegistry, FlightSnapshot, FlightTelemetry, Icao24,
    InstructionOwnership, InstructionRequest, MemoryStore, OdinAtcError, Receiver, SharedSettings
};
use odin_atc::config::keys;
use odin_atc::receiver::{read_sbs_stream,StreamEnd,MAX_SBS_LINE_LEN};
use tokio_util::sync::CancellationToken;

const MSG_3: &str = "MSG,3,111,11111,A04424,111111,2016/03/11,13:07:05.343,2016/03/11,13:07:05.288,,11025,,,37.17274,-122.03935,,,,,,0\r\n";
const MSG_4: &str = "MSG,4,111,11111,AC1FCC,111111,2016/03/11,13:07:07.777,2016/03/11,13:07:07.713,,,316,106,,,1536,,,,,0\r\n";
const GARBAGE: &str = "MSG,3,111,11111,XYZ,111111,this is not SBS\n";

fn icao (s: &str)->Icao24 { s.parse().unwrap() }

async fn test_store (port: u16)->Arc<MemoryStore> {
    let store = Arc::new( MemoryStore::new());
    let mut config = ConfigMap::new();
    config.insert( keys::LISTEN_ADDRESS.into(), ConfigValue::Text("127.0.0.1".into()));
    config.insert( keys::SBS_DEFAULT_PORT.into(), ConfigValue::Number(port as f64));
    config.insert( keys::FLIGHT_RECORD_INTERVAL_IN_SECONDS.into(), ConfigValue::Number(0.1));
    store.update_configuration( config).await.unwrap();
    store
}

async fn test_receiver (store: Arc<MemoryStore>)->(Arc<Receiver>, Arc<FlightRegistry>, SharedSettings) {
    let settings = SharedSettings::load( store.as_ref()).await.unwrap();
    let registry = Arc::new( FlightRegistry::new());
    let receiver = Arc::new( Receiver::new( registry.clone(), store, settings.clone()));
    (receiver, registry, settings)
}

async fn feed (addr: SocketAddr, lines: &[&str])->TcpStream {
    let mut stream = TcpStream::connect( addr).await.unwrap();
    for line in lines {
        stream.write_all( line.as_bytes()).await.unwrap();
    }
    stream.flush().await.unwrap();
    stream
}

async fn wait_for_flight (registry: &FlightRegistry, addr: Icao24)->bool {
    for _ in 0..100 {
        if registry.get( addr).is_some() { return true }
        time::sleep( Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn test_receive_and_restart() {
    let store = test_store(0).await;
    let (receiver, registry, _) = test_receiver( store.clone()).await;

    receiver.start().await.unwrap();
    assert!( receiver.is_running().await);
    let addrs = receiver.local_addrs().await;
    assert_eq!( addrs.len(), 1);

    let _conn = feed( addrs[0], &[GARBAGE, MSG_3]).await;
    assert!( wait_for_flight( &registry, icao("A04424")).await);
    assert_eq!( registry.get( icao("A04424")).unwrap().altitude, Some(11025.0));

    receiver.restart().await.unwrap();
    let all = registry.list_all();
    assert!( all.iter().any( |ft| ft.icao == icao("A04424")));

    // we listen again after the restart
    let addrs = receiver.local_addrs().await;
    let _conn2 = feed( addrs[0], &[MSG_4]).await;
    assert!( wait_for_flight( &registry, icao("AC1FCC")).await);
    assert_eq!( registry.len(), 2);

    // stop has to terminate although feeder connections are still open
    time::timeout( Duration::from_secs(5), receiver.stop()).await.unwrap();
    assert!( !receiver.is_running().await);
    assert!( receiver.local_addrs().await.is_empty());
    assert_eq!( registry.len(), 2);
}

#[tokio::test]
async fn test_bind_failure() {
    let blocker = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = blocker.local_addr().unwrap().port();

    let store = test_store( port).await;
    let (receiver, _, _) = test_receiver( store).await;

    match receiver.start().await {
        Err(OdinAtcError::BindFailure{addr,..}) => println!("failed to bind {addr} as expected"),
        other => panic!("expected bind failure, got {other:?}")
    }
    assert!( !receiver.is_running().await);
}

#[tokio::test]
async fn test_failed_restart_leaves_receiver_stopped() {
    let blocker = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = blocker.local_addr().unwrap().port();

    let store = test_store(0).await;
    let (receiver, _, _) = test_receiver( store.clone()).await;
    receiver.start().await.unwrap();

    let mut changes = ConfigMap::new();
    changes.insert( keys::SBS_DEFAULT_PORT.into(), ConfigValue::Number(port as f64));
    store.update_configuration( changes).await.unwrap();

    receiver.restart_detached().await.unwrap(); // the task itself does not fail
    assert!( !receiver.is_running().await);

    drop( blocker);
    receiver.restart().await.unwrap();
    assert!( receiver.is_running().await);
    assert_eq!( receiver.local_addrs().await[0].port(), port);
    receiver.stop().await;
}

async fn accept (source: &TcpListener)->TcpStream {
    let (stream,peer) = time::timeout( Duration::from_secs(5), source.accept()).await
        .expect("no connection from receiver").unwrap();
    println!("receiver connected from {peer}");
    stream
}

#[tokio::test]
async fn test_connector_reconnect() {
    let source = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let source_addr = source.local_addr().unwrap();

    let store = test_store(0).await;
    let mut changes = ConfigMap::new();
    changes.insert( keys::SBS_SOURCE_ADDRESS.into(), ConfigValue::Text( source_addr.to_string()));
    changes.insert( keys::RECONNECT_INTERVAL_IN_SECONDS.into(), ConfigValue::Number(0.1));
    changes.insert( keys::SOURCE_IDLE_TIMEOUT_IN_SECONDS.into(), ConfigValue::Number(0.5));
    store.update_configuration( changes).await.unwrap();

    let (receiver, registry, _) = test_receiver( store).await;
    receiver.start().await.unwrap();

    // source closes the connection after the first line
    let mut conn = accept( &source).await;
    conn.write_all( MSG_3.as_bytes()).await.unwrap();
    assert!( wait_for_flight( &registry, icao("A04424")).await);
    drop( conn);

    // the receiver reconnects, then goes idle on the silent connection and reconnects again
    let mut conn = accept( &source).await;
    conn.write_all( MSG_4.as_bytes()).await.unwrap();
    assert!( wait_for_flight( &registry, icao("AC1FCC")).await);
    let _idle_conn = accept( &source).await;
    assert_eq!( registry.len(), 2);

    // stop has to terminate while the source connection is open
    time::timeout( Duration::from_secs(5), receiver.stop()).await.unwrap();
    assert!( !receiver.is_running().await);
    assert_eq!( registry.len(), 2);
}

#[tokio::test]
async fn test_oversized_lines() {
    // a valid record padded beyond the line limit, followed by a regular one
    let padded = format!("{}{}\n", MSG_3.trim_end(), " ".repeat( 2 * MAX_SBS_LINE_LEN));
    let input = format!("{padded}{MSG_4}");

    let registry = FlightRegistry::new();
    let cancel = CancellationToken::new();
    let end = read_sbs_stream( std::io::Cursor::new( input.into_bytes()), &registry, &cancel, None).await;

    assert!( matches!( end, StreamEnd::Closed));
    assert!( registry.get( icao("A04424")).is_none());
    assert_eq!( registry.get( icao("AC1FCC")).unwrap().ground_speed, Some(316.0));
    assert_eq!( registry.len(), 1);
}

#[tokio::test]
async fn test_recorder() {
    let store = test_store(0).await;
    let (receiver, registry, settings) = test_receiver( store.clone()).await;
    let addr = icao("A04424");

    // an instruction that was issued before we (re)started
    let t = utc_now();
    store.add_snapshot( FlightSnapshot::from_telemetry( &FlightTelemetry::new( addr, t), None, t)).await.unwrap();
    let ownership = InstructionOwnership::new( store.clone(), Arc::new( FlightRegistry::new()), settings);
    let record = ownership.submit( addr, &AtcUser::new("atc-a", "Alice A"), &InstructionRequest::new().with_altitude( 11000.0)).await.unwrap();
    assert!( registry.active_instruction( addr).is_none());

    receiver.start().await.unwrap();
    let _conn = feed( receiver.local_addrs().await[0], &[MSG_3]).await;
    assert!( wait_for_flight( &registry, addr).await);

    let mut recorded = false;
    for _ in 0..100 {
        let snapshots = store.snapshots( addr).await.unwrap();
        if snapshots.len() > 2 {
            let last = snapshots.last().unwrap();
            assert_eq!( last.instruction_id, Some(record.id));
            assert_eq!( last.altitude, Some(11025.0));
            recorded = true;
            break;
        }
        time::sleep( Duration::from_millis(50)).await;
    }
    assert!( recorded);
    assert_eq!( registry.active_instruction( addr).map( |i| i.id), Some(record.id));

    receiver.stop().await;
}
