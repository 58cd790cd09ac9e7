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

use std::sync::{Arc,Mutex,MutexGuard};
use chrono::{DateTime,Utc};
use dashmap::DashMap;

use crate::{utc_now, flight::{Icao24,FlightTelemetry,TelemetryUpdate}, instructions::InstructionRecord};

/// shared handle for a single registry record. Identity is stable for the lifetime of the registry
pub type FlightEntry = Arc<Mutex<FlightTelemetry>>;

/// lock an entry. A poisoned lock still holds consistent telemetry (each field is merged
/// atomically) so we just continue with it
pub fn lock_entry (entry: &FlightEntry)->MutexGuard<'_,FlightTelemetry> {
    entry.lock().unwrap_or_else( |poisoned| poisoned.into_inner())
}

/// the in-memory map of all aircraft we have seen, plus the instructions that are currently
/// in force for them.
/// This is shared between the receiver tasks (writers) and API calls (readers). Records are never
/// removed - consumers have to check `last_update` for staleness
#[derive(Debug,Default)]
pub struct FlightRegistry {
    flights: DashMap<Icao24,FlightEntry>,

    // None values mean the last instruction was released or has lapsed
    instructions: DashMap<Icao24,Option<Arc<InstructionRecord>>>,
}

impl FlightRegistry {
    pub fn new ()->Self {
        FlightRegistry { flights: DashMap::new(), instructions: DashMap::new() }
    }

    /// return the record for `icao`, creating a blank one if we haven't seen this address yet
    pub fn get_or_create (&self, icao: Icao24)->FlightEntry {
        if let Some(e) = self.flights.get( &icao) {
            return e.value().clone()
        }
        self.flights.entry( icao)
            .or_insert_with( || Arc::new( Mutex::new( FlightTelemetry::new( icao, utc_now()))))
            .value()
            .clone()
    }

    pub fn get (&self, icao: Icao24)->Option<FlightTelemetry> {
        self.flights.get( &icao).map( |e| lock_entry( e.value()).clone())
    }

    /// merge a decoded update into the respective record (which is created if necessary)
    pub fn apply (&self, update: &TelemetryUpdate)->FlightTelemetry {
        let entry = self.get_or_create( update.icao);
        let mut ft = lock_entry( &entry);
        update.update( &mut ft, utc_now());
        ft.clone()
    }

    /// copy of all current records. This is a snapshot - it is not updated afterwards
    pub fn list_all (&self)->Vec<FlightTelemetry> {
        self.flights.iter().map( |e| lock_entry( e.value()).clone()).collect()
    }

    /// copies of records that were updated after `t`
    pub fn updated_since (&self, t: DateTime<Utc>)->Vec<FlightTelemetry> {
        let mut list = Vec::new();
        for e in self.flights.iter() {
            let ft = lock_entry( e.value());
            if ft.last_update > t {
                list.push( ft.clone());
            }
        }
        list
    }

    pub fn len (&self)->usize { self.flights.len() }

    pub fn is_empty (&self)->bool { self.flights.is_empty() }

    //--- the active instruction cache

    pub fn set_active_instruction (&self, icao: Icao24, instruction: Arc<InstructionRecord>) {
        self.instructions.insert( icao, Some(instruction));
    }

    pub fn clear_active_instruction (&self, icao: Icao24) {
        self.instructions.insert( icao, None);
    }

    pub fn active_instruction (&self, icao: Icao24)->Option<Arc<InstructionRecord>> {
        self.instructions.get( &icao).and_then( |e| e.value().clone())
    }

    pub fn n_controlled (&self)->usize {
        self.instructions.iter().filter( |e| e.value().is_some()).count()
    }
}
