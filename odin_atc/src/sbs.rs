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

use memchr::memchr_iter;
use tracing::{debug,trace};

use crate::errors::{OdinAtcError,Result,parse_error};
use crate::flight::{Icao24,Position,TelemetryUpdate};
use crate::registry::FlightRegistry;

/// number of fields in a complete MSG record. Shorter lines are truncated and get rejected
pub const MSG_FIELDS: usize = 22;

/// a value type we can read from a single SBS field
pub trait SbsValue: Sized {
    fn from_field (s: &str)->Option<Self>;
}

impl SbsValue for f64 {
    fn from_field (s: &str)->Option<f64> {
        s.parse::<f64>().ok().filter( |v| v.is_finite())
    }
}

impl SbsValue for i64 {
    fn from_field (s: &str)->Option<i64> { s.parse().ok() }
}

// dump1090 uses "-1" for set flags, other SBS sources "1"
impl SbsValue for bool {
    fn from_field (s: &str)->Option<bool> {
        match s {
            "0" => Some(false),
            "1" | "-1" => Some(true),
            _ => None
        }
    }
}

/// the comma separated fields of a single SBS line
pub struct CsvFields<'a> {
    line: &'a str,
    fields: Vec<&'a str>
}

impl<'a> CsvFields<'a> {
    pub fn new (line: &'a str)->Self {
        let line = line.trim_end_matches( &['\r','\n'][..]);
        let mut fields = Vec::with_capacity( MSG_FIELDS);

        let mut i0 = 0;
        for i in memchr_iter( b',', line.as_bytes()) {
            fields.push( &line[i0..i]);
            i0 = i+1;
        }
        fields.push( &line[i0..]);

        CsvFields { line, fields }
    }

    pub fn line (&self)->&'a str { self.line }

    pub fn len (&self)->usize { self.fields.len() }

    pub fn is_empty (&self)->bool { self.line.trim().is_empty() }

    /// the trimmed field content, None if the field is missing or blank
    pub fn str (&self, idx: usize)->Option<&'a str> {
        self.fields.get( idx).map( |s| s.trim()).filter( |s| !s.is_empty())
    }

    /// Ok(None) if the field is blank, Err if it is present but cannot be parsed
    pub fn field<T: SbsValue> (&self, idx: usize)->Result<Option<T>> {
        match self.str( idx) {
            Some(s) => match T::from_field( s) {
                Some(v) => Ok( Some(v) ),
                None => Err( parse_error!( "invalid value {:?} in field {}", s, idx))
            }
            None => Ok(None)
        }
    }
}

/// decode a single feed line and merge it into the registry.
/// Returns true if the line carried telemetry. Malformed lines are dropped
pub fn decode_line (registry: &FlightRegistry, line: &str)->bool {
    let csv = CsvFields::new( line);

    match parse_msg( &csv) {
        Ok(Some(update)) => {
            trace!("{}", update);
            registry.apply( &update);
            true
        }
        Ok(None) => false,
        Err(e) => {
            debug!("dropping SBS line {:?}: {}", csv.line(), e);
            false
        }
    }
}

/// SBS as documented on http://woodair.net/SBS/Article/Barebones42_Socket_Data.htm
///
/// Message examples:
///  MSG,1,111,11111,AA2BC2,111111,2016/03/11,13:07:16.663,2016/03/11,13:07:16.626,UAL814  ,,,,,,,,,,,0
///  MSG,3,111,11111,A04424,111111,2016/03/11,13:07:05.343,2016/03/11,13:07:05.288,,11025,,,37.17274,-122.03935,,,,,,0
///  MSG,4,111,11111,AC1FCC,111111,2016/03/11,13:07:07.777,2016/03/11,13:07:07.713,,,316,106,,,1536,,,,,0
///
/// fields:
///   0: message type (MSG, SEL, ID, AIR, STA, CLK)
///   1: transmission type (MSG only: 1-8)
///   4: ICAO 24 bit id (mode S transponder code)
///   6,7: date/time generated
///   8,9: date/time logged
///  10: callsign
///  11: mode-C altitude (relative to 1013.2mb (Flight Level), *not* AMSL)
///  12: ground speed
///  13: track (from vx,vy, *not* heading)
///  14: latitude
///  15: longitude
///  16: vertical rate (ft/min - 64ft resolution)
///  17: squawk (mode-A squawk code)
///  18: alert (flag indicating squawk has changed)
///  19: emergency (flag)
///  20: spi (flag, transponder ident activated)
///  21: on ground (flag)
///
/// We only process MSG records. Everything else, and MSG records that don't carry any telemetry
/// we track, is returned as `Ok(None)`
pub fn parse_msg<'a> (csv: &CsvFields<'a>)->Result<Option<TelemetryUpdate<'a>>> {
    if csv.is_empty() {
        return Ok(None)
    }

    match csv.str(0) {
        Some("MSG") => {}
        Some(_) => return Ok(None), // SEL, ID, AIR, STA, CLK
        None => return Err( parse_error!( "missing message type"))
    }

    if csv.len() < MSG_FIELDS {
        return Err( parse_error!( "truncated MSG record ({} fields)", csv.len()))
    }

    let msg_type = csv.field::<i64>(1)?.ok_or_else( || parse_error!( "missing transmission type"))?;
    let icao: Icao24 = csv.str(4).ok_or_else( || parse_error!( "missing ICAO address"))?.parse()?;

    let update = match msg_type {
        1 => parse_aircraft_identification( csv, icao)?,
        2 => parse_surface_position( csv, icao)?,
        3 => parse_airborne_position( csv, icao)?,
        4 => parse_airborne_velocity( csv, icao)?,
        5 => parse_surveillance_alt( csv, icao)?,
        6 => parse_surveillance_id( csv, icao)?,
        7 => parse_air_to_air( csv, icao)?,
        8 => parse_all_call_reply( csv, icao)?,
        _ => return Err( parse_error!( "unknown transmission type {}", msg_type))
    };

    if update.is_empty() { Ok(None) } else { Ok( Some(update) ) }
}

fn parse_position (csv: &CsvFields)->Result<Option<Position>> {
    // we only accept latitude/longitude in pairs
    match (csv.field::<f64>(14)?, csv.field::<f64>(15)?) {
        (Some(latitude),Some(longitude)) => {
            if latitude.abs() <= 90.0 && longitude.abs() <= 180.0 {
                Ok( Some( Position{latitude,longitude}) )
            } else {
                Err( parse_error!( "position out of range: {},{}", latitude, longitude))
            }
        }
        _ => Ok(None)
    }
}

fn parse_aircraft_identification<'a> (csv: &CsvFields<'a>, icao: Icao24)->Result<TelemetryUpdate<'a>> {
    let mut update = TelemetryUpdate::new( icao);
    update.callsign = csv.str(10);
    Ok(update)
}

fn parse_surface_position<'a> (csv: &CsvFields<'a>, icao: Icao24)->Result<TelemetryUpdate<'a>> {
    let mut update = TelemetryUpdate::new( icao);
    update.altitude = csv.field(11)?;
    update.ground_speed = csv.field(12)?;
    update.track = csv.field(13)?;
    update.position = parse_position( csv)?;
    update.on_ground = Some(true);
    Ok(update)
}

fn parse_airborne_position<'a> (csv: &CsvFields<'a>, icao: Icao24)->Result<TelemetryUpdate<'a>> {
    let mut update = TelemetryUpdate::new( icao);
    update.altitude = csv.field(11)?;
    update.position = parse_position( csv)?;
    update.on_ground = csv.field(21)?;
    Ok(update)
}

fn parse_airborne_velocity<'a> (csv: &CsvFields<'a>, icao: Icao24)->Result<TelemetryUpdate<'a>> {
    let mut update = TelemetryUpdate::new( icao);
    update.ground_speed = csv.field(12)?;
    update.track = csv.field(13)?;
    update.vertical_rate = csv.field(16)?;
    Ok(update)
}

fn parse_surveillance_alt<'a> (csv: &CsvFields<'a>, icao: Icao24)->Result<TelemetryUpdate<'a>> {
    let mut update = TelemetryUpdate::new( icao);
    update.altitude = csv.field(11)?;
    update.on_ground = csv.field(21)?;
    Ok(update)
}

fn parse_surveillance_id<'a> (csv: &CsvFields<'a>, icao: Icao24)->Result<TelemetryUpdate<'a>> {
    let mut update = TelemetryUpdate::new( icao);
    update.altitude = csv.field(11)?;
    update.squawk = csv.str(17);
    update.on_ground = csv.field(21)?;
    Ok(update)
}

fn parse_air_to_air<'a> (csv: &CsvFields<'a>, icao: Icao24)->Result<TelemetryUpdate<'a>> {
    let mut update = TelemetryUpdate::new( icao);
    update.altitude = csv.field(11)?;
    Ok(update)
}

fn parse_all_call_reply<'a> (csv: &CsvFields<'a>, icao: Icao24)->Result<TelemetryUpdate<'a>> {
    let mut update = TelemetryUpdate::new( icao);
    update.on_ground = csv.field(21)?;
    Ok(update)
}
