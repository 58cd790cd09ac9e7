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

use std::{path::PathBuf, sync::Arc, time::Duration};
use anyhow::Result;
use clap::Parser;
use lazy_static::lazy_static;
use tokio::time;
use tracing::{info,warn};
use tracing_subscriber::EnvFilter;

use odin_atc::{
    load_config, AtcConfig, AtcService, AtcStore, FlightRegistry, MemoryStore, Receiver,
    SharedSettings, StaticAuthenticator, config::seed_configuration, compliance::ComplianceState
};

/// ATC flight tracker: receives SBS feeds and keeps track of flights and ATC instructions
#[derive(Parser)]
#[command(about="ATC flight tracker")]
struct CliOpts {
    /// RON config file (store path, initial settings, tokens)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// seconds between status log messages
    #[arg(long, default_value_t=30)]
    status_interval: u64,
}

lazy_static! { static ref ARGS: CliOpts = CliOpts::parse(); }

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter( EnvFilter::from_default_env())
        .init();

    let config: AtcConfig = match &ARGS.config {
        Some(path) => load_config( path)?,
        None => AtcConfig::default()
    };

    let store: Arc<dyn AtcStore> = match &config.store_path {
        Some(path) => Arc::new( MemoryStore::open( path)?),
        None => Arc::new( MemoryStore::new())
    };
    seed_configuration( store.as_ref(), &config.defaults).await?;

    let settings = SharedSettings::load( store.as_ref()).await?;
    let registry = Arc::new( FlightRegistry::new());
    let receiver = Arc::new( Receiver::new( registry.clone(), store.clone(), settings.clone()));
    receiver.start().await?;

    let auth = Arc::new( StaticAuthenticator::new( &config.tokens));
    info!("accepting {} configured tokens", auth.len());
    let service = AtcService::new( registry.clone(), store, settings, receiver.clone(), auth);

    let mut status = time::interval( Duration::from_secs( ARGS.status_interval.max(1)));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = status.tick() => {
                info!("{} flights, {} under control, listening on {:?}", registry.len(), registry.n_controlled(), receiver.local_addrs().await);
                for report in service.flights() {
                    if let Some(status) = report.instructions.filter( |s| s.state == ComplianceState::Overdue) {
                        warn!("{} overdue on instruction {} of {}", report.telemetry.icao, status.instruction_id, status.atc_user_fullname);
                    }
                }
            }
        }
    }

    info!("shutting down");
    receiver.stop().await;
    Ok(())
}
