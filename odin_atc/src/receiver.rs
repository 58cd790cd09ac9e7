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

//! The receiver owns the network side of the tracker: the SBS listener port that feeders
//! connect to, an optional connector that pulls SBS data from a dump1090 style output port,
//! and the recorder task that periodically appends flight snapshots to the store.
//!
//! All tasks of a running receiver share a [`CancellationToken`]. Reads always select on it,
//! which means [`Receiver::stop`] returns after all tasks (including per-connection tasks)
//! have terminated. The [`FlightRegistry`] is not owned by the receiver and survives restarts.

use std::{fmt, net::SocketAddr, sync::Arc, time::Duration};
use chrono::{DateTime,Utc};
use tokio::{
    io::{AsyncBufRead,AsyncBufReadExt,AsyncRead,AsyncReadExt,BufReader},
    net::{TcpListener,TcpStream},
    sync::Mutex,
    task::{JoinHandle,JoinSet},
    time::{self,MissedTickBehavior}
};
use tokio_util::sync::CancellationToken;
use tracing::{debug,error,info,warn};

use crate::{utc_now, time_before};
use crate::errors::{OdinAtcError,Result};
use crate::flight::FlightTelemetry;
use crate::registry::FlightRegistry;
use crate::instructions::FlightSnapshot;
use crate::store::AtcStore;
use crate::config::{Settings,SharedSettings};
use crate::sbs::decode_line;

/// longest SBS line we accept. Regular MSG records are well below 200 bytes
pub const MAX_SBS_LINE_LEN: usize = 1024;

/// where SBS data comes from
#[derive(Debug,Clone,PartialEq)]
pub enum FeedSpec {
    /// accept feeder connections on this address
    Listen(SocketAddr),
    /// connect to this host:port and read from it
    Connect(String),
}

impl FeedSpec {
    pub fn from_settings (settings: &Settings)->Vec<FeedSpec> {
        let mut feeds = vec![ FeedSpec::Listen( SocketAddr::new( settings.listen_address, settings.sbs_port)) ];
        if let Some(src) = &settings.sbs_source {
            feeds.push( FeedSpec::Connect( src.clone()));
        }
        feeds
    }
}

/// why we stopped reading from a stream
#[derive(Debug)]
pub enum StreamEnd {
    Closed,
    Cancelled,
    IdleTimeout,
    Error(std::io::Error),
}

impl fmt::Display for StreamEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamEnd::Closed => write!( f, "closed"),
            StreamEnd::Cancelled => write!( f, "cancelled"),
            StreamEnd::IdleTimeout => write!( f, "idle timeout"),
            StreamEnd::Error(e) => write!( f, "error: {e}")
        }
    }
}

struct RunningReceiver {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    local_addrs: Vec<SocketAddr>,
}

impl RunningReceiver {
    async fn shutdown (self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("receiver task terminated abnormally: {e}");
            }
        }
    }
}

pub struct Receiver {
    registry: Arc<FlightRegistry>,
    store: Arc<dyn AtcStore>,
    settings: SharedSettings,

    // lifecycle operations are serialized through this lock
    running: Mutex<Option<RunningReceiver>>,
}

impl Receiver {
    pub fn new (registry: Arc<FlightRegistry>, store: Arc<dyn AtcStore>, settings: SharedSettings)->Self {
        Receiver { registry, store, settings, running: Mutex::new(None) }
    }

    pub fn registry (&self)->&Arc<FlightRegistry> { &self.registry }

    /// bind all listeners and start the receiver tasks. This is a no-op if we are already running.
    /// Nothing is left running if any of the listeners cannot be bound
    pub async fn start (&self)->Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            debug!("receiver already running");
            return Ok(())
        }

        let settings = self.settings.current();
        *running = Some( self.spawn( &settings).await? );
        Ok(())
    }

    /// cancel all tasks and wait for them to terminate
    pub async fn stop (&self) {
        let mut running = self.running.lock().await;
        if let Some(r) = running.take() {
            r.shutdown().await;
            info!("receiver stopped");
        }
    }

    /// stop, re-read the settings from the store and start again. If the new listeners cannot be
    /// started the receiver stays stopped
    pub async fn restart (&self)->Result<()> {
        let mut running = self.running.lock().await;
        if let Some(r) = running.take() {
            r.shutdown().await;
        }

        if let Err(e) = self.settings.reload( self.store.as_ref()).await {
            warn!("failed to reload settings, keeping current ones: {e}");
        }
        let settings = self.settings.current();

        match self.spawn( &settings).await {
            Ok(r) => {
                info!("receiver restarted on {:?}", r.local_addrs);
                *running = Some(r);
                Ok(())
            }
            Err(e) => {
                error!("receiver restart failed, receiver remains stopped: {e}");
                Err(e)
            }
        }
    }

    /// restart in a spawned task. Callers do not have to wait for the (potentially slow) shutdown
    /// of the current connections. Failures are only logged
    pub fn restart_detached (self: &Arc<Self>)->JoinHandle<()> {
        let receiver = self.clone();
        tokio::spawn( async move {
            // restart() already logged the error
            let _ = receiver.restart().await;
        })
    }

    pub async fn is_running (&self)->bool {
        self.running.lock().await.is_some()
    }

    /// the bound addresses of all listeners, empty if we are not running
    pub async fn local_addrs (&self)->Vec<SocketAddr> {
        self.running.lock().await.as_ref().map( |r| r.local_addrs.clone()).unwrap_or_default()
    }

    async fn spawn (&self, settings: &Arc<Settings>)->Result<RunningReceiver> {
        let feeds = FeedSpec::from_settings( settings);

        // bind everything before we spawn any task
        let mut listeners = Vec::new();
        for feed in &feeds {
            if let FeedSpec::Listen(addr) = feed {
                let listener = TcpListener::bind( addr).await
                    .map_err( |source| OdinAtcError::BindFailure { addr: addr.to_string(), source })?;
                listeners.push( listener);
            }
        }

        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();
        let mut local_addrs = Vec::new();

        for listener in listeners {
            let local_addr = listener.local_addr()?;
            info!("listening for SBS feeders on {local_addr}");
            local_addrs.push( local_addr);
            tasks.push( tokio::spawn( run_listener( listener, self.registry.clone(), cancel.clone())));
        }

        for feed in feeds {
            if let FeedSpec::Connect(addr) = feed {
                tasks.push( tokio::spawn( run_connector( addr, self.registry.clone(), cancel.clone(), settings.reconnect_interval, settings.source_idle_timeout)));
            }
        }

        tasks.push( tokio::spawn( run_recorder( self.registry.clone(), self.store.clone(), settings.clone(), cancel.clone())));

        Ok( RunningReceiver { cancel, tasks, local_addrs } )
    }
}

async fn run_listener (listener: TcpListener, registry: Arc<FlightRegistry>, cancel: CancellationToken) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            res = listener.accept() => match res {
                Ok((stream,peer)) => {
                    info!("SBS feeder connected from {peer}");
                    let registry = registry.clone();
                    let cancel = cancel.clone();
                    connections.spawn( async move {
                        let end = read_sbs_stream( stream, &registry, &cancel, None).await;
                        info!("SBS feeder {peer} {end}");
                    });
                }
                Err(e) => {
                    warn!("failed to accept SBS feeder: {e}");
                    time::sleep( Duration::from_millis(100)).await;
                }
            },
            Some(res) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = res { warn!("SBS feeder task failed: {e}"); }
            }
        }
    }

    drop( listener);
    while let Some(res) = connections.join_next().await {
        if let Err(e) = res { warn!("SBS feeder task failed: {e}"); }
    }
}

async fn run_connector (addr: String, registry: Arc<FlightRegistry>, cancel: CancellationToken, reconnect_interval: Duration, idle_timeout: Option<Duration>) {
    loop {
        let conn = tokio::select! {
            _ = cancel.cancelled() => break,
            res = TcpStream::connect( &addr) => res
        };

        match conn {
            Ok(stream) => {
                info!("connected to SBS source {addr}");
                match read_sbs_stream( stream, &registry, &cancel, idle_timeout).await {
                    StreamEnd::Cancelled => break,
                    end => warn!("SBS source {addr} {end}, reconnecting in {reconnect_interval:?}")
                }
            }
            Err(e) => warn!("failed to connect to SBS source {addr}: {e}, retrying in {reconnect_interval:?}")
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = time::sleep( reconnect_interval) => {}
        }
    }
    info!("SBS connector for {addr} terminated");
}

/// read SBS lines from `stream` and merge them into `registry` until the stream is closed,
/// `cancel` is triggered or we don't get any data within `idle_timeout`.
/// Lines exceeding [`MAX_SBS_LINE_LEN`] are dropped
pub async fn read_sbs_stream<R> (stream: R, registry: &FlightRegistry, cancel: &CancellationToken, idle_timeout: Option<Duration>)->StreamEnd
    where R: AsyncRead + Unpin
{
    let mut reader = BufReader::new( stream);
    let mut buf: Vec<u8> = Vec::with_capacity( 256);
    let mut n_updates: usize = 0;
    let mut skipping = false; // inside an oversized line

    let end = loop {
        buf.clear();

        let res = tokio::select! {
            _ = cancel.cancelled() => break StreamEnd::Cancelled,
            res = async {
                match idle_timeout {
                    Some(dur) => time::timeout( dur, read_line( &mut reader, &mut buf)).await.ok(),
                    None => Some( read_line( &mut reader, &mut buf).await)
                }
            } => res
        };

        match res {
            Some(Ok(0)) => break StreamEnd::Closed,
            Some(Ok(n)) => {
                let complete = buf.last() == Some(&b'\n');
                if skipping {
                    skipping = !complete;
                } else if n >= MAX_SBS_LINE_LEN && !complete {
                    debug!("dropping SBS line exceeding {MAX_SBS_LINE_LEN} bytes");
                    skipping = true;
                } else {
                    match std::str::from_utf8( &buf) {
                        Ok(line) => if decode_line( registry, line) { n_updates += 1 },
                        Err(_) => debug!("dropping non UTF-8 SBS line")
                    }
                }
            }
            Some(Err(e)) => break StreamEnd::Error(e),
            None => break StreamEnd::IdleTimeout
        }
    };

    debug!("processed {n_updates} SBS updates");
    end
}

// read up to the next newline but never more than MAX_SBS_LINE_LEN bytes
async fn read_line<R> (reader: &mut R, buf: &mut Vec<u8>)->std::io::Result<usize>
    where R: AsyncBufRead + Unpin
{
    let mut limited = reader.take( MAX_SBS_LINE_LEN as u64);
    limited.read_until( b'\n', buf).await
}

async fn run_recorder (registry: Arc<FlightRegistry>, store: Arc<dyn AtcStore>, settings: Arc<Settings>, cancel: CancellationToken) {
    let mut interval = time::interval( settings.record_interval);
    interval.set_missed_tick_behavior( MissedTickBehavior::Delay);
    interval.tick().await; // first tick completes immediately

    let mut since = utc_now();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let now = utc_now();
        for ft in registry.updated_since( since) {
            if let Err(e) = record_flight( &registry, store.as_ref(), &settings, &ft, now).await {
                warn!("failed to record snapshot of {}: {}", ft.icao, e);
            }
        }
        since = now;
    }
}

/// append a snapshot for `ft` that keeps the current control state. The control state is taken
/// from the latest snapshot within the instruction validity window, i.e. instructions lapse if
/// we don't get updates for a flight. The registry cache is updated accordingly.
/// This can race with a concurrent submit/release, in which case the next snapshot of the
/// ownership protocol or recorder corrects it
pub async fn record_flight (registry: &FlightRegistry, store: &dyn AtcStore, settings: &Settings, ft: &FlightTelemetry, now: DateTime<Utc>)->Result<()> {
    let cutoff = time_before( now, settings.instruction_validity_after_lost);
    let mut instruction_id = store.latest_snapshot( ft.icao, cutoff).await?.and_then( |s| s.instruction_id);

    match instruction_id {
        Some(id) => {
            if registry.active_instruction( ft.icao).map( |i| i.id) != Some(id) {
                match store.instruction( id).await? {
                    Some(instr) => {
                        debug!("restored active instruction {instr}");
                        registry.set_active_instruction( ft.icao, instr);
                    }
                    None => {
                        warn!("snapshot of {} refers to unknown instruction {}", ft.icao, id);
                        registry.clear_active_instruction( ft.icao);
                        instruction_id = None;
                    }
                }
            }
        }
        None => registry.clear_active_instruction( ft.icao)
    }

    store.add_snapshot( FlightSnapshot::from_telemetry( ft, instruction_id, now)).await
}
