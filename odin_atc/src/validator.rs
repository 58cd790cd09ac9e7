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

//! stateless checks for ATC instructions: is an instruction value legal, and does observed
//! telemetry satisfy an issued instruction. Tolerances come from the live [`crate::config::Settings`]
//! and are passed in by value for each check

use serde::{Serialize,Deserialize};

/// normalize angle in degrees to [0,360)
#[inline]
pub fn normalize_360 (d: f64)->f64 {
    let x = d % 360.0;
    if x < 0.0 { 360.0 + x } else { x }
}

/// circular distance between two headings in degrees, within [0,180]
#[inline]
pub fn track_difference (a: f64, b: f64)->f64 {
    let d = (normalize_360(a) - normalize_360(b)).abs();
    d.min( 360.0 - d)
}

#[inline]
pub fn is_valid_ground_speed_instruction (value: f64)->bool {
    value >= 0.0
}

#[inline]
pub fn is_valid_track_instruction (value: f64)->bool {
    value >= 0.0 && value < 360.0
}

/// the configured thresholds for instruction checks
#[derive(Debug,Clone,Copy,PartialEq,Serialize,Deserialize)]
pub struct Tolerances {
    pub minimum_descent_altitude: f64, // feet
    pub altitude: f64,                 // feet
    pub ground_speed: f64,             // knots
    pub track: f64,                    // degrees
}

impl Default for Tolerances {
    fn default()->Self {
        Tolerances { minimum_descent_altitude: 3000.0, altitude: 50.0, ground_speed: 5.0, track: 2.0 }
    }
}

impl Tolerances {
    pub fn is_valid_altitude_instruction (&self, value: f64)->bool {
        value >= self.minimum_descent_altitude
    }

    pub fn is_valid_ground_speed_instruction (&self, value: f64)->bool {
        is_valid_ground_speed_instruction( value)
    }

    pub fn is_valid_track_instruction (&self, value: f64)->bool {
        is_valid_track_instruction( value)
    }

    pub fn validate_altitude (&self, actual: f64, instructed: f64)->bool {
        (actual - instructed).abs() <= self.altitude
    }

    pub fn validate_ground_speed (&self, actual: f64, instructed: f64)->bool {
        (actual - instructed).abs() <= self.ground_speed
    }

    pub fn validate_track (&self, actual: f64, instructed: f64)->bool {
        track_difference( actual, instructed) <= self.track
    }
}
