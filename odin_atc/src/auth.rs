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

use std::collections::HashMap;
use chrono::{DateTime,Utc};
use serde::{Serialize,Deserialize};

use crate::utc_now;
use crate::errors::{OdinAtcError,Result};

/// the ATC user on whose behalf an instruction is issued
#[derive(Debug,Clone,PartialEq,Eq,Serialize,Deserialize)]
pub struct AtcUser {
    pub id: String,
    pub full_name: String,
}

impl AtcUser {
    pub fn new (id: impl ToString, full_name: impl ToString)->Self {
        AtcUser { id: id.to_string(), full_name: full_name.to_string() }
    }
}

#[derive(Debug,Clone,PartialEq)]
pub struct ParsedToken {
    pub user_id: String,
    pub full_name: String,
    pub is_admin: bool,
    pub expires: Option<DateTime<Utc>>,
}

impl ParsedToken {
    pub fn user_id (&self)->&str { &self.user_id }

    pub fn user_full_name (&self)->&str { &self.full_name }

    pub fn atc_user (&self)->AtcUser {
        AtcUser::new( &self.user_id, &self.full_name)
    }
}

/// token verification is done elsewhere, we only need to know who is calling and if that
/// user is still allowed to
pub trait Authenticator: Send + Sync {
    /// Err(Unauthorized) if `raw` is not a token we know about
    fn parse_token (&self, raw: &str)->Result<ParsedToken>;

    fn is_token_active (&self, token: &ParsedToken)->bool {
        token.expires.is_none_or( |t| t > utc_now())
    }

    fn is_admin_user (&self, token: &ParsedToken)->bool {
        self.is_token_active( token) && token.is_admin
    }
}

/// a configured token
#[derive(Debug,Clone,Serialize,Deserialize)]
pub struct TokenEntry {
    pub token: String,
    pub user_id: String,
    pub full_name: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
}

/// an [`Authenticator`] for a fixed table of tokens
#[derive(Debug,Default)]
pub struct StaticAuthenticator {
    tokens: HashMap<String,ParsedToken>,
}

impl StaticAuthenticator {
    pub fn new (entries: &[TokenEntry])->Self {
        let tokens = entries.iter().map( |e| {
            (e.token.clone(), ParsedToken { user_id: e.user_id.clone(), full_name: e.full_name.clone(), is_admin: e.is_admin, expires: e.expires })
        }).collect();
        StaticAuthenticator { tokens }
    }

    pub fn len (&self)->usize { self.tokens.len() }

    pub fn is_empty (&self)->bool { self.tokens.is_empty() }
}

impl Authenticator for StaticAuthenticator {
    fn parse_token (&self, raw: &str)->Result<ParsedToken> {
        let raw = raw.trim();
        let raw = raw.strip_prefix("Bearer ").unwrap_or( raw);
        self.tokens.get( raw).cloned().ok_or_else( || OdinAtcError::Unauthorized( "unknown token".to_string()))
    }
}
