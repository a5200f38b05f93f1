//! Leg label newtype.
//!
//! Legs (half-edges) carry globally unique positive labels. Markings are
//! conventionally labelled `1..=n`; the labels of legs paired into edges are
//! free and get renamed by structural operations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A leg (half-edge) label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Leg(pub u32);

impl Leg {
    /// Returns the label shifted by `shift`.
    pub fn shifted(self, shift: u32) -> Leg {
        Leg(self.0 + shift)
    }
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Leg {
    fn from(label: u32) -> Self {
        Leg(label)
    }
}
