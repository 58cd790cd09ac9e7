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

use thiserror::Error;

pub type Result<T> = std::result::Result<T,OdinAtcError>;

#[derive(Error,Debug)]
pub enum OdinAtcError {

    /// there is no (fresh) flight or snapshot for the requested address
    #[error("not found: {0}")]
    NotFound(String),

    /// requester is not the ATC who currently controls the flight
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("no active control: {0}")]
    NoActiveControl(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("admin required: {0}")]
    AdminRequired(String),

    #[error("invalid instruction: {0}")]
    InvalidInstruction(String),

    #[error("failed to bind listener {addr}: {source}")]
    BindFailure { addr: String, #[source] source: std::io::Error },

    /// malformed feed input - never surfaced outside of the decoder
    #[error("parse error {0}")]
    ParseError(String),

    #[error("store error {0}")]
    StoreError(String),

    #[error("config error {0}")]
    ConfigError(String),

    #[error("IO error {0}")]
    IOError( #[from] std::io::Error),

    #[error("JSON error {0}")]
    JsonError( #[from] serde_json::Error),

    #[error("RON error {0}")]
    RonError( #[from] ron::error::SpannedError),
}

impl OdinAtcError {
    /// true for errors that are caused by the requester (as opposed to the system)
    pub fn is_client_error (&self)->bool {
        matches!( self,
            OdinAtcError::NotFound(_) | OdinAtcError::Forbidden(_) | OdinAtcError::NoActiveControl(_) |
            OdinAtcError::Unauthorized(_) | OdinAtcError::AdminRequired(_) | OdinAtcError::InvalidInstruction(_)
        )
    }
}

macro_rules! parse_error {
    ($fmt:literal $(, $arg:expr )* ) => {
        OdinAtcError::ParseError( format!( $fmt $(, $arg)* ))
    };
}
pub (crate) use parse_error;

macro_rules! store_error {
    ($fmt:literal $(, $arg:expr )* ) => {
        OdinAtcError::StoreError( format!( $fmt $(, $arg)* ))
    };
}
pub (crate) use store_error;
