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

//! transport independent API of the tracker. Each method corresponds to one request of the
//! client (flight list, control, release, configuration) and maps authentication failures
//! to the respective [`OdinAtcError`] variants

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::utc_now;
use crate::errors::{OdinAtcError,Result};
use crate::flight::Icao24;
use crate::registry::FlightRegistry;
use crate::store::AtcStore;
use crate::config::{ConfigMap,Settings,SharedSettings,default_configuration};
use crate::auth::{Authenticator,ParsedToken};
use crate::instructions::{InstructionOwnership,InstructionRecord,InstructionRequest};
use crate::compliance::{FlightReport,flight_reports};
use crate::receiver::Receiver;

pub struct AtcService {
    registry: Arc<FlightRegistry>,
    store: Arc<dyn AtcStore>,
    settings: SharedSettings,
    receiver: Arc<Receiver>,
    ownership: InstructionOwnership,
    auth: Arc<dyn Authenticator>,
}

impl AtcService {
    pub fn new (registry: Arc<FlightRegistry>, store: Arc<dyn AtcStore>, settings: SharedSettings,
                receiver: Arc<Receiver>, auth: Arc<dyn Authenticator>)->Self
    {
        let ownership = InstructionOwnership::new( store.clone(), registry.clone(), settings.clone());
        AtcService { registry, store, settings, receiver, ownership, auth }
    }

    pub fn receiver (&self)->&Arc<Receiver> { &self.receiver }

    pub fn settings (&self)->Arc<Settings> { self.settings.current() }

    fn active_token (&self, raw_token: &str)->Result<ParsedToken> {
        let token = self.auth.parse_token( raw_token)?;
        if self.auth.is_token_active( &token) {
            Ok(token)
        } else {
            Err( OdinAtcError::Unauthorized( format!("token of {} has expired", token.user_id())))
        }
    }

    // tokens the authenticator rejects are Unauthorized, known tokens without privileges AdminRequired
    fn admin_token (&self, raw_token: &str)->Result<ParsedToken> {
        let token = self.auth.parse_token( raw_token)?;
        if self.auth.is_admin_user( &token) {
            Ok(token)
        } else {
            Err( OdinAtcError::AdminRequired( format!("{} is not an active admin user", token.user_id())))
        }
    }

    // unknown or malformed addresses are just flights we don't know about
    fn flight_address (icao: &str)->Result<Icao24> {
        icao.parse().map_err( |_| OdinAtcError::NotFound( format!("no flight {icao:?}")))
    }

    /// all known flights with the status of their active instructions
    pub fn flights (&self)->Vec<FlightReport> {
        flight_reports( &self.registry, &self.settings.current(), utc_now())
    }

    pub async fn control_flight (&self, icao: &str, raw_token: &str, request: &InstructionRequest)->Result<Arc<InstructionRecord>> {
        let token = self.active_token( raw_token)?;
        let icao = Self::flight_address( icao)?;
        self.ownership.submit( icao, &token.atc_user(), request).await
    }

    pub async fn stop_controlling_flight (&self, icao: &str, raw_token: &str)->Result<()> {
        let token = self.active_token( raw_token)?;
        let icao = Self::flight_address( icao)?;
        self.ownership.release( icao, token.user_id()).await
    }

    /// the stored configuration merged over the defaults
    pub async fn configuration (&self, raw_token: &str)->Result<ConfigMap> {
        self.admin_token( raw_token)?;

        let mut config = default_configuration();
        config.extend( self.store.configuration().await?);
        Ok(config)
    }

    /// store `changes` and restart the receiver with the new settings. We return as soon as the
    /// restart is scheduled, the returned handle can be used to wait for it
    pub async fn update_configuration (&self, raw_token: &str, changes: ConfigMap)->Result<JoinHandle<()>> {
        let token = self.admin_token( raw_token)?;

        let mut merged = self.store.configuration().await?;
        merged.extend( changes.clone());
        Settings::from_configuration( &merged)?; // reject before we store anything

        self.store.update_configuration( changes).await?;
        self.settings.reload( self.store.as_ref()).await?;
        info!("configuration updated by {}", token.user_id());

        Ok( self.receiver.restart_detached() )
    }
}
