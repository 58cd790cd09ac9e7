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

use std::{collections::HashMap, fs::{File,OpenOptions}, io::{BufRead,BufReader,Write}, path::{Path,PathBuf}, sync::{Arc,Mutex,RwLock}};
use async_trait::async_trait;
use chrono::{DateTime,Utc};
use serde::{Serialize,Deserialize};
use tracing::{debug,info};

use crate::errors::{OdinAtcError,Result,store_error};
use crate::flight::Icao24;
use crate::instructions::{InstructionId,InstructionRecord,FlightSnapshot};
use crate::config::ConfigMap;

/// the durable part of the system: instruction history, flight snapshots and the key/value
/// configuration. All methods are async so that implementations can use remote databases
#[async_trait]
pub trait AtcStore: Send + Sync {

    /// the snapshot of `icao` with the latest timestamp that is strictly newer than `newer_than`.
    /// If several snapshots share that timestamp the one that was added last wins
    async fn latest_snapshot (&self, icao: Icao24, newer_than: DateTime<Utc>)->Result<Option<FlightSnapshot>>;

    /// all snapshots of `icao` in the order they were added
    async fn snapshots (&self, icao: Icao24)->Result<Vec<FlightSnapshot>>;

    async fn instruction (&self, id: InstructionId)->Result<Option<Arc<InstructionRecord>>>;

    /// store `record` under a new id (the id field of the argument is ignored)
    async fn add_instruction (&self, record: InstructionRecord)->Result<Arc<InstructionRecord>>;

    async fn add_snapshot (&self, snapshot: FlightSnapshot)->Result<()>;

    async fn configuration (&self)->Result<ConfigMap>;

    /// upsert the given entries, keys that are not in `changes` are kept
    async fn update_configuration (&self, changes: ConfigMap)->Result<()>;
}

/// what goes into the journal file, one JSON object per line
#[derive(Debug,Clone,Serialize,Deserialize)]
#[serde(rename_all="snake_case")]
enum JournalEntry {
    Instruction(InstructionRecord),
    Snapshot(FlightSnapshot),
    Configuration(ConfigMap),
}

#[derive(Debug,Default)]
struct StoreData {
    next_id: InstructionId,
    instructions: HashMap<InstructionId,Arc<InstructionRecord>>,
    snapshots: HashMap<Icao24,Vec<FlightSnapshot>>,
    configuration: ConfigMap,
}

impl StoreData {
    fn apply (&mut self, entry: JournalEntry) {
        match entry {
            JournalEntry::Instruction(record) => {
                self.next_id = self.next_id.max( record.id + 1);
                self.instructions.insert( record.id, Arc::new(record));
            }
            JournalEntry::Snapshot(snapshot) => {
                self.snapshots.entry( snapshot.icao).or_default().push( snapshot);
            }
            JournalEntry::Configuration(changes) => {
                self.configuration.extend( changes);
            }
        }
    }
}

/// an [`AtcStore`] that keeps everything in memory and optionally appends each change to a
/// JSON-lines journal, which is replayed when the store is re-opened
#[derive(Debug)]
pub struct MemoryStore {
    data: RwLock<StoreData>,
    journal: Option<Mutex<File>>,
    path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new ()->Self {
        MemoryStore { data: RwLock::new( StoreData { next_id: 1, ..StoreData::default() }), journal: None, path: None }
    }

    /// open (or create) a journal backed store
    pub fn open<P: AsRef<Path>> (path: P)->Result<Self> {
        let path = path.as_ref();
        let mut data = StoreData { next_id: 1, ..StoreData::default() };

        if path.is_file() {
            let reader = BufReader::new( File::open( path)?);
            let mut n = 0;
            for (i,line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() { continue }
                let entry: JournalEntry = serde_json::from_str( &line)
                    .map_err( |e| store_error!( "malformed journal entry in {:?} line {}: {}", path, i+1, e))?;
                data.apply( entry);
                n += 1;
            }
            info!("replayed {} journal entries from {:?}", n, path);
        }

        let file = OpenOptions::new().create(true).append(true).open( path)?;

        Ok( MemoryStore { data: RwLock::new(data), journal: Some( Mutex::new(file)), path: Some( path.to_path_buf()) } )
    }

    pub fn path (&self)->Option<&Path> { self.path.as_deref() }

    fn write_journal (&self, entry: &JournalEntry)->Result<()> {
        if let Some(journal) = &self.journal {
            let mut line = serde_json::to_string( entry)?;
            line.push('\n');
            let mut file = journal.lock().map_err( |_| store_error!( "journal lock poisoned"))?;
            file.write_all( line.as_bytes())?;
            file.flush()?;
        }
        Ok(())
    }

    /// journal first, so that we never have in-memory state that would be lost on restart
    fn commit (&self, entry: JournalEntry)->Result<()> {
        let mut data = self.data.write().map_err( |_| store_error!( "store lock poisoned"))?;
        self.write_journal( &entry)?;
        debug!("committed {:?}", entry);
        data.apply( entry);
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default()->Self { Self::new() }
}

#[async_trait]
impl AtcStore for MemoryStore {
    async fn latest_snapshot (&self, icao: Icao24, newer_than: DateTime<Utc>)->Result<Option<FlightSnapshot>> {
        let data = self.data.read().map_err( |_| store_error!( "store lock poisoned"))?;
        let mut latest: Option<&FlightSnapshot> = None;
        if let Some(list) = data.snapshots.get( &icao) {
            for s in list.iter().filter( |s| s.timestamp > newer_than) {
                if latest.is_none_or( |l| s.timestamp >= l.timestamp) {
                    latest = Some(s);
                }
            }
        }
        Ok( latest.cloned() )
    }

    async fn snapshots (&self, icao: Icao24)->Result<Vec<FlightSnapshot>> {
        let data = self.data.read().map_err( |_| store_error!( "store lock poisoned"))?;
        Ok( data.snapshots.get( &icao).cloned().unwrap_or_default() )
    }

    async fn instruction (&self, id: InstructionId)->Result<Option<Arc<InstructionRecord>>> {
        let data = self.data.read().map_err( |_| store_error!( "store lock poisoned"))?;
        Ok( data.instructions.get( &id).cloned() )
    }

    async fn add_instruction (&self, mut record: InstructionRecord)->Result<Arc<InstructionRecord>> {
        let mut data = self.data.write().map_err( |_| store_error!( "store lock poisoned"))?;
        record.id = data.next_id;
        let entry = JournalEntry::Instruction( record.clone());
        self.write_journal( &entry)?;
        data.apply( entry);

        data.instructions.get( &record.id).cloned().ok_or_else( || store_error!( "instruction {} not stored", record.id))
    }

    async fn add_snapshot (&self, snapshot: FlightSnapshot)->Result<()> {
        self.commit( JournalEntry::Snapshot(snapshot))
    }

    async fn configuration (&self)->Result<ConfigMap> {
        let data = self.data.read().map_err( |_| store_error!( "store lock poisoned"))?;
        Ok( data.configuration.clone() )
    }

    async fn update_configuration (&self, changes: ConfigMap)->Result<()> {
        if changes.is_empty() { return Ok(()) }
        self.commit( JournalEntry::Configuration(changes))
    }
}
