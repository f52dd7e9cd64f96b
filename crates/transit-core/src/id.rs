//! Stable string identifiers for feed-keyed entities
//!
//! Timetable and live feeds key everything by operator-scoped strings such as
//! `TokyoMetro.Ginza.A1234` or `JL123`. Each kind gets its own newtype so a
//! station id can never be handed to a train lookup by accident.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Timetable identifier of a train (one leg of a through service)
    TrainId
);
string_id!(
    /// Flight identifier as reported by the flight information feed
    FlightId
);
string_id!(
    /// Railway line identifier
    RailwayId
);
string_id!(
    /// Station identifier
    StationId
);
string_id!(
    /// Identifier of a path record (railway geometry or flight corridor)
    RouteId
);

impl TrainId {
    /// Identifier under which a live-only train is registered.
    ///
    /// Ad hoc trains share the feed's id space with timetabled ones, so the
    /// registry key gets a suffix to keep the two apart.
    pub fn ad_hoc(&self) -> TrainId {
        TrainId(format!("{}.Today", self.0))
    }

    pub fn is_ad_hoc(&self) -> bool {
        self.0.ends_with(".Today")
    }
}

impl RailwayId {
    /// Route id of the railway's geometry
    pub fn route(&self) -> RouteId {
        RouteId(self.0.clone())
    }
}
