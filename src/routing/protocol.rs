//! Messages exchanged with the routing worker. On the wire they are JSON
//! objects tagged by `command`, e.g. `{"command":"remove","id":"..."}`.

use crate::model::{CellSnapshot, LinkSnapshot};
use serde::{Deserialize, Serialize};

use super::RouterError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum RouterRequest {
    Reset { cells: Vec<CellSnapshot> },
    Change { cell: CellSnapshot },
    Add { cell: CellSnapshot },
    Remove { id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum RouterResponse {
    Routed { cells: Vec<CellSnapshot> },
}

impl RouterRequest {
    pub fn from_json(json: &str) -> Result<Self, RouterError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, RouterError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl RouterResponse {
    pub fn from_json(json: &str) -> Result<Self, RouterError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, RouterError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Routed links; other cell kinds in a response are ignored.
    pub fn links(&self) -> impl Iterator<Item = &LinkSnapshot> {
        let RouterResponse::Routed { cells } = self;
        cells.iter().filter_map(|c| match c {
            CellSnapshot::Link(l) => Some(l),
            _ => None,
        })
    }
}
