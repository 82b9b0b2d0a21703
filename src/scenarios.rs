//! Canned probe sessions for the ride notification channel.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::probe::{Deadline, ProbeSpec, Schedule};

/// The `connection` announcement a client sends right after connecting.
pub fn connection_payload(subject: &str) -> Value {
    json!({ "type": "connection", "userId": subject })
}

pub fn ride_accepted_payload(ride_id: u64, driver_id: u64, message: &str) -> Value {
    json!({
        "type": "ride_accepted",
        "rideId": ride_id,
        "driverId": driver_id,
        "message": message,
    })
}

pub fn proximity_alert_payload(ride_id: u64, distance_meters: u64, message: &str) -> Value {
    json!({
        "type": "proximity_alert",
        "rideId": ride_id,
        "distanceMeters": distance_meters,
        "message": message,
    })
}

/// A named, ready-to-run probe session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scenario {
    /// Announce, then push a ride acceptance and a proximity alert to
    /// check that admin notifications reach the subject.
    AdminDebug,
    /// Announce and watch for anything within five seconds.
    Connectivity,
    /// Announce, ping after two seconds, and log the shape of replies.
    Structure,
}

impl Scenario {
    pub const ALL: [Scenario; 3] = [
        Scenario::AdminDebug,
        Scenario::Connectivity,
        Scenario::Structure,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Scenario::AdminDebug => "admin-debug",
            Scenario::Connectivity => "connectivity",
            Scenario::Structure => "structure",
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Scenario::AdminDebug => {
                "announce, ride_accepted at 1000ms, proximity_alert at 500ms; 10s deadline"
            }
            Scenario::Connectivity => "announce and listen; 5s deadline",
            Scenario::Structure => "announce, ping at 2000ms, inspect replies; 10s deadline",
        }
    }

    /// The probes this scenario sends as `subject`.
    ///
    /// Delays are kept as declared, so `admin-debug` sends its proximity
    /// alert before the ride acceptance.
    ///
    /// # Errors
    ///
    /// Only if a canned payload fails validation, which would be a bug.
    pub fn schedule(self, subject: &str) -> Result<Schedule> {
        let specs = match self {
            Scenario::AdminDebug => vec![
                ProbeSpec::new(0, connection_payload(subject)),
                ProbeSpec::new(
                    1000,
                    ride_accepted_payload(1, 1, "Your ride has been accepted by a driver"),
                ),
                ProbeSpec::new(
                    500,
                    proximity_alert_payload(1, 500, "Your driver is 500 meters away"),
                ),
            ],
            Scenario::Connectivity => vec![ProbeSpec::new(0, connection_payload(subject))],
            Scenario::Structure => vec![
                ProbeSpec::new(0, connection_payload(subject)),
                ProbeSpec::new(2000, json!({ "type": "ping" })),
            ],
        };
        Schedule::new(specs)
    }

    pub fn deadline(self) -> Deadline {
        match self {
            Scenario::Connectivity => Deadline::new(Duration::from_secs(5)).unwrap_or_default(),
            Scenario::AdminDebug | Scenario::Structure => Deadline::default(),
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scenario {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Scenario::ALL
            .into_iter()
            .find(|scenario| scenario.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownScenario(s.to_string()))
    }
}
