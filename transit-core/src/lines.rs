//! Line reference data: which designations to track and their route shapes.
//!
//! Built once at startup and shared read-only.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::geo::Coordinates;
use crate::types::{LineInfo, Result, TransitError};

pub const TRAMS: &[&str] = &["1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11"];
pub const BUSES: &[&str] = &["16", "17", "18", "19", "21", "25"];
pub const EXPRESS_BUSES: &[&str] = &["X1", "X2", "X3", "X4", "RÖD", "LILA", "SVART"];

/// A built-in group of line designations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineGroup {
    Tram,
    Bus,
    Express,
}

impl LineGroup {
    pub fn designations(self) -> &'static [&'static str] {
        match self {
            LineGroup::Tram => TRAMS,
            LineGroup::Bus => BUSES,
            LineGroup::Express => EXPRESS_BUSES,
        }
    }
}

impl fmt::Display for LineGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineGroup::Tram => write!(f, "tram"),
            LineGroup::Bus => write!(f, "bus"),
            LineGroup::Express => write!(f, "express"),
        }
    }
}

impl FromStr for LineGroup {
    type Err = TransitError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tram" | "trams" => Ok(LineGroup::Tram),
            "bus" | "buses" => Ok(LineGroup::Bus),
            "express" => Ok(LineGroup::Express),
            other => Err(TransitError::UnknownLineGroup(other.to_string())),
        }
    }
}

/// Parse a comma-separated list such as `"tram, bus"`.
pub fn parse_groups(list: &str) -> Result<Vec<LineGroup>> {
    list.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(str::parse)
        .collect()
}

/// A line with its display metadata and route geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    #[serde(rename = "lineInfo")]
    pub info: LineInfo,
    #[serde(default)]
    pub route: Vec<Coordinates>,
}

/// Immutable line reference table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LineCatalog {
    groups: Vec<LineGroup>,
    lines: Vec<Line>,
}

impl LineCatalog {
    pub fn new(groups: Vec<LineGroup>, lines: Vec<Line>) -> Self {
        LineCatalog { groups, lines }
    }

    /// Catalog with the given groups and routes parsed from JSON text.
    pub fn from_json(groups: Vec<LineGroup>, text: &str) -> Result<Self> {
        let lines: Vec<Line> = serde_json::from_str(text)?;
        Ok(LineCatalog::new(groups, lines))
    }

    /// Catalog with the given groups and routes read from a JSON file.
    pub fn load(groups: Vec<LineGroup>, path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        LineCatalog::from_json(groups, &text)
    }

    pub fn groups(&self) -> &[LineGroup] {
        &self.groups
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// Routed line by designation.
    pub fn get(&self, name: &str) -> Option<&Line> {
        self.lines.iter().find(|l| l.info.name == name)
    }

    /// Line filter for the upstream: group designations, then routed lines,
    /// without duplicates.
    pub fn designations(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let group_names = self.groups.iter().flat_map(|g| g.designations().iter().copied());
        let routed = self.lines.iter().map(|l| l.info.name.as_str());
        for name in group_names.chain(routed) {
            if !out.iter().any(|d| d == name) {
                out.push(name.to_string());
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
