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

use tokio::{net::TcpStream, io::{BufReader,AsyncBufReadExt}};
use anyhow::Result;
use clap::Parser;
use lazy_static::lazy_static;
use odin_atc::sbs::{CsvFields,parse_msg};

/// SBS socket monitoring tool
#[derive(Parser)]
#[command(about="SBS socket monitoring tool")]
struct CliOpts {
    /// print lines that are not decoded into updates (non-MSG records, unknown fields)
    #[arg(short, long)]
    verbose: bool,

    /// host:port from where to read SBS messages (e.g. localhost:30003)
    url: String,
}

lazy_static! { static ref ARGS: CliOpts = CliOpts::parse(); }

#[tokio::main]
async fn main() -> Result<()> {
    let stream = TcpStream::connect( &ARGS.url).await?;
    let mut lines = BufReader::with_capacity( 4096, stream).lines();

    while let Some(line) = lines.next_line().await? {
        let csv = CsvFields::new( &line);
        match parse_msg( &csv) {
            Ok(Some(update)) => println!("{update}"),
            Ok(None) => if ARGS.verbose { println!("ignored: {line}") },
            Err(e) => println!("PARSE ERROR ({e}) for {line}")
        }
    }
    Ok(())
}
