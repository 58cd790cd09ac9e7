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

//! ATC flight tracker: decodes SBS surveillance feeds into a live flight registry and arbitrates
//! instructions that ATC users issue for these flights.
//!
//! Data flows from the network through the [`receiver`] and the [`sbs`] decoder into the
//! [`registry::FlightRegistry`]. The [`receiver`] also records periodic [`instructions::FlightSnapshot`]s
//! in the [`store`], which is what the [`instructions::InstructionOwnership`] protocol uses to
//! decide if a flight is current and who controls it. [`service::AtcService`] puts it all together
//! for an API layer.

use std::{fs, path::Path, time::Duration};
use chrono::{DateTime,TimeDelta,Utc};
use serde::de::DeserializeOwned;

pub mod errors;
pub mod flight;
pub mod registry;
pub mod sbs;
pub mod validator;
pub mod instructions;
pub mod compliance;
pub mod store;
pub mod auth;
pub mod config;
pub mod receiver;
pub mod service;

pub use errors::{OdinAtcError,Result};
pub use flight::{Icao24,FlightTelemetry,TelemetryUpdate};
pub use registry::FlightRegistry;
pub use instructions::{InstructionRecord,InstructionRequest,InstructionInput,FlightSnapshot,InstructionOwnership};
pub use store::{AtcStore,MemoryStore};
pub use config::{AtcConfig,ConfigMap,ConfigValue,Settings,SharedSettings};
pub use auth::{AtcUser,Authenticator,StaticAuthenticator};
pub use receiver::Receiver;
pub use service::AtcService;

#[inline]
pub fn utc_now()->DateTime<Utc> {
    Utc::now()
}

/// start of a time window of length `dur` that ends at `t`, saturating at the earliest
/// representable time
pub fn time_before (t: DateTime<Utc>, dur: Duration)->DateTime<Utc> {
    TimeDelta::from_std( dur).ok()
        .and_then( |dt| t.checked_sub_signed( dt))
        .unwrap_or( DateTime::<Utc>::MIN_UTC)
}

/// load a RON config file
pub fn load_config<C: DeserializeOwned, P: AsRef<Path>> (path: P)->Result<C> {
    let data = fs::read( path.as_ref())?;
    Ok( ron::de::from_bytes( data.as_slice())? )
}
