//! 4D airspace volumes and the pure predicates evaluated over them.
//!
//! Shapes follow the ASTM F3548-21 wire format so that payloads fetched from
//! USSes and flight intents loaded from fixtures share the same types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::OperationalIntentState;

/// Maximum number of vertices an operational intent may declare across all
/// of its nominal and off-nominal volumes.
pub const MAX_VERTICES: usize = 10_000;

const METERS_PER_DEGREE: f64 = 111_319.5;
const METERS_PER_FOOT: f64 = 0.3048;

/// Roughly one centimeter of latitude.
const DEGREE_TOLERANCE: f64 = 1e-7;
const ALTITUDE_TOLERANCE_M: f64 = 0.01;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LatLngPoint {
    pub lat: f64,
    pub lng: f64,
}

impl LatLngPoint {
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub vertices: Vec<LatLngPoint>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Radius {
    pub value: f64,
    #[serde(default = "default_length_units")]
    pub units: String,
}

impl Radius {
    #[must_use]
    pub fn meters(&self) -> f64 {
        to_meters(self.value, &self.units)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub center: LatLngPoint,
    pub radius: Radius,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Altitude {
    pub value: f64,
    #[serde(default = "default_altitude_reference")]
    pub reference: String,
    #[serde(default = "default_length_units")]
    pub units: String,
}

impl Altitude {
    #[must_use]
    pub fn w84_meters(value: f64) -> Self {
        Self {
            value,
            reference: default_altitude_reference(),
            units: default_length_units(),
        }
    }

    #[must_use]
    pub fn meters(&self) -> f64 {
        to_meters(self.value, &self.units)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Time {
    pub value: DateTime<Utc>,
    #[serde(default = "default_time_format")]
    pub format: String,
}

impl Time {
    #[must_use]
    pub fn new(value: DateTime<Utc>) -> Self {
        Self {
            value,
            format: default_time_format(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Volume3D {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outline_circle: Option<Circle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outline_polygon: Option<Polygon>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude_lower: Option<Altitude>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude_upper: Option<Altitude>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Volume4D {
    pub volume: Volume3D,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_start: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_end: Option<Time>,
}

impl Volume4D {
    /// Complexity contributed by this volume: a circle counts as a single
    /// vertex, a polygon counts each of its vertices.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        if self.volume.outline_circle.is_some() {
            return 1;
        }

        self.volume
            .outline_polygon
            .as_ref()
            .map_or(0, |polygon| polygon.vertices.len())
    }

    /// Axis-aligned bounds of this volume, or `None` when it has no outline.
    #[must_use]
    pub fn bounds(&self) -> Option<BoundingVolume> {
        let (lat_min, lat_max, lng_min, lng_max) =
            if let Some(circle) = &self.volume.outline_circle {
                let radius = circle.radius.meters();
                let lat_delta = radius / METERS_PER_DEGREE;
                let lng_delta = radius
                    / (METERS_PER_DEGREE * circle.center.lat.to_radians().cos()).max(f64::EPSILON);
                (
                    circle.center.lat - lat_delta,
                    circle.center.lat + lat_delta,
                    circle.center.lng - lng_delta,
                    circle.center.lng + lng_delta,
                )
            } else {
                let vertices = &self.volume.outline_polygon.as_ref()?.vertices;
                let first = vertices.first()?;
                vertices.iter().fold(
                    (first.lat, first.lat, first.lng, first.lng),
                    |(lat_min, lat_max, lng_min, lng_max), p| {
                        (
                            lat_min.min(p.lat),
                            lat_max.max(p.lat),
                            lng_min.min(p.lng),
                            lng_max.max(p.lng),
                        )
                    },
                )
            };

        Some(BoundingVolume {
            lat_min,
            lat_max,
            lng_min,
            lng_max,
            altitude_lower: self.volume.altitude_lower.as_ref().map(Altitude::meters),
            altitude_upper: self.volume.altitude_upper.as_ref().map(Altitude::meters),
            time_start: self.time_start.as_ref().map(|t| t.value),
            time_end: self.time_end.as_ref().map(|t| t.value),
        })
    }
}

/// Total complexity of a set of volumes, see [`Volume4D::vertex_count`].
pub fn total_vertices<'a, I>(volumes: I) -> usize
where
    I: IntoIterator<Item = &'a Volume4D>,
{
    volumes.into_iter().map(Volume4D::vertex_count).sum()
}

/// Whether an operational intent in `state` may declare off-nominal volumes.
///
/// Accepted and Activated intents are nominal and must not carry any.
#[must_use]
pub const fn off_nominal_volumes_allowed(state: OperationalIntentState) -> bool {
    !matches!(
        state,
        OperationalIntentState::Accepted | OperationalIntentState::Activated
    )
}

/// Axis-aligned 4D box. Missing altitude or time bounds are unbounded.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundingVolume {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lng_min: f64,
    pub lng_max: f64,
    pub altitude_lower: Option<f64>,
    pub altitude_upper: Option<f64>,
    pub time_start: Option<DateTime<Utc>>,
    pub time_end: Option<DateTime<Utc>>,
}

impl BoundingVolume {
    /// Smallest box containing every outlined volume of `volumes`.
    pub fn of<'a, I>(volumes: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Volume4D>,
    {
        volumes
            .into_iter()
            .filter_map(Volume4D::bounds)
            .reduce(|acc, next| acc.union(&next))
    }

    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            lat_min: self.lat_min.min(other.lat_min),
            lat_max: self.lat_max.max(other.lat_max),
            lng_min: self.lng_min.min(other.lng_min),
            lng_max: self.lng_max.max(other.lng_max),
            altitude_lower: self.altitude_lower.zip(other.altitude_lower).map(|(a, b)| a.min(b)),
            altitude_upper: self.altitude_upper.zip(other.altitude_upper).map(|(a, b)| a.max(b)),
            time_start: self.time_start.zip(other.time_start).map(|(a, b)| a.min(b)),
            time_end: self.time_end.zip(other.time_end).map(|(a, b)| a.max(b)),
        }
    }

    /// Describes every way in which `inner` sticks out of `self`. An empty
    /// result means `self` encompasses `inner`.
    #[must_use]
    pub fn uncovered(&self, inner: &Self) -> Vec<String> {
        let mut problems = Vec::new();

        if inner.lat_min < self.lat_min - DEGREE_TOLERANCE
            || inner.lat_max > self.lat_max + DEGREE_TOLERANCE
        {
            problems.push(format!(
                "latitude range [{}, {}] is not within shared range [{}, {}]",
                inner.lat_min, inner.lat_max, self.lat_min, self.lat_max
            ));
        }
        if inner.lng_min < self.lng_min - DEGREE_TOLERANCE
            || inner.lng_max > self.lng_max + DEGREE_TOLERANCE
        {
            problems.push(format!(
                "longitude range [{}, {}] is not within shared range [{}, {}]",
                inner.lng_min, inner.lng_max, self.lng_min, self.lng_max
            ));
        }

        if let Some(lower) = self.altitude_lower {
            match inner.altitude_lower {
                Some(expected) if expected >= lower - ALTITUDE_TOLERANCE_M => {}
                expected => problems.push(format!(
                    "lower altitude {expected:?} m is below shared lower altitude {lower} m"
                )),
            }
        }
        if let Some(upper) = self.altitude_upper {
            match inner.altitude_upper {
                Some(expected) if expected <= upper + ALTITUDE_TOLERANCE_M => {}
                expected => problems.push(format!(
                    "upper altitude {expected:?} m is above shared upper altitude {upper} m"
                )),
            }
        }

        if let Some(start) = self.time_start {
            match inner.time_start {
                Some(expected) if expected >= start => {}
                expected => problems.push(format!(
                    "start time {expected:?} is before shared start time {start}"
                )),
            }
        }
        if let Some(end) = self.time_end {
            match inner.time_end {
                Some(expected) if expected <= end => {}
                expected => {
                    problems.push(format!("end time {expected:?} is after shared end time {end}"));
                }
            }
        }

        problems
    }

    /// Whether the two boxes share any interior. Unbounded altitude or time
    /// ranges overlap everything along that axis.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        fn overlap<T: PartialOrd>(
            range: (Option<T>, Option<T>),
            other: (Option<T>, Option<T>),
        ) -> bool {
            let below = matches!((&range.1, &other.0), (Some(hi), Some(lo)) if hi <= lo);
            let above = matches!((&range.0, &other.1), (Some(lo), Some(hi)) if lo >= hi);
            !below && !above
        }

        overlap(
            (Some(self.lat_min), Some(self.lat_max)),
            (Some(other.lat_min), Some(other.lat_max)),
        ) && overlap(
            (Some(self.lng_min), Some(self.lng_max)),
            (Some(other.lng_min), Some(other.lng_max)),
        ) && overlap(
            (self.altitude_lower, self.altitude_upper),
            (other.altitude_lower, other.altitude_upper),
        ) && overlap(
            (self.time_start, self.time_end),
            (other.time_start, other.time_end),
        )
    }

    /// Rectangular volume usable as a query extent.
    #[must_use]
    pub fn to_volume4d(&self) -> Volume4D {
        Volume4D {
            volume: Volume3D {
                outline_circle: None,
                outline_polygon: Some(Polygon {
                    vertices: vec![
                        LatLngPoint::new(self.lat_min, self.lng_min),
                        LatLngPoint::new(self.lat_min, self.lng_max),
                        LatLngPoint::new(self.lat_max, self.lng_max),
                        LatLngPoint::new(self.lat_max, self.lng_min),
                    ],
                }),
                altitude_lower: self.altitude_lower.map(Altitude::w84_meters),
                altitude_upper: self.altitude_upper.map(Altitude::w84_meters),
            },
            time_start: self.time_start.map(Time::new),
            time_end: self.time_end.map(Time::new),
        }
    }
}

fn to_meters(value: f64, units: &str) -> f64 {
    if units.eq_ignore_ascii_case("FT") {
        value * METERS_PER_FOOT
    } else {
        value
    }
}

fn default_length_units() -> String {
    "M".to_owned()
}

fn default_altitude_reference() -> String {
    "W84".to_owned()
}

fn default_time_format() -> String {
    "RFC3339".to_owned()
}
