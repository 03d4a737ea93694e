//! Coordinates and map links.
//!
//! The engine never talks to a mapping provider. It only stores positions and
//! hands out link strings that a view can open.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Base URL for generated map links.
pub const MAPS_BASE_URL: &str = "https://maps.google.com/?q=";

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in [-90, 90].
    pub lat: f64,
    /// Longitude in [-180, 180].
    pub lng: f64,
}

impl Coordinates {
    /// Creates a coordinate pair without validation.
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Parses raw form text into validated coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NotANumber`] for unparseable text, or the
    /// errors of [`Coordinates::validate`].
    pub fn parse(lat: &str, lng: &str) -> Result<Self, ValidationError> {
        let coords = Self {
            lat: parse_component("lat", lat)?,
            lng: parse_component("lng", lng)?,
        };
        coords.validate()?;
        Ok(coords)
    }

    /// Checks that both components are finite and in range.
    ///
    /// # Errors
    ///
    /// Returns the first failing component.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_component("lat", self.lat, 90.0)?;
        check_component("lng", self.lng, 180.0)
    }

    /// Returns a map link pointing at this position.
    #[must_use]
    pub fn maps_link(&self) -> String {
        format!("{MAPS_BASE_URL}{},{}", self.lat, self.lng)
    }

    /// Extracts coordinates from a `?q=<lat>,<lng>` style map link.
    ///
    /// Returns `None` when the link carries no parseable valid position.
    #[must_use]
    pub fn from_maps_link(link: &str) -> Option<Self> {
        static QUERY: OnceLock<Regex> = OnceLock::new();
        let re = QUERY.get_or_init(|| {
            Regex::new(r"[?&]q=(-?\d+(?:\.\d+)?),\s*(-?\d+(?:\.\d+)?)")
                .expect("map link pattern is valid")
        });
        let caps = re.captures(link)?;
        let lat = caps.get(1)?.as_str().parse().ok()?;
        let lng = caps.get(2)?.as_str().parse().ok()?;
        let coords = Self { lat, lng };
        coords.validate().ok().map(|()| coords)
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6}", self.lat, self.lng)
    }
}

fn parse_component(field: &'static str, input: &str) -> Result<f64, ValidationError> {
    input
        .trim()
        .parse::<f64>()
        .map_err(|_| ValidationError::NotANumber {
            field,
            input: input.to_string(),
        })
}

fn check_component(field: &'static str, value: f64, bound: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteCoordinate { field, value });
    }
    if !(-bound..=bound).contains(&value) {
        return Err(ValidationError::CoordinateOutOfRange {
            field,
            value,
            min: -bound,
            max: bound,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_padded_decimal_text() {
        let c = Coordinates::parse(" 40.7128", "-74.006 ").unwrap();
        assert_eq!(c, Coordinates::new(40.7128, -74.006));
    }

    #[test]
    fn parse_rejects_garbage_and_non_finite() {
        let err = Coordinates::parse("abc", "1").unwrap_err();
        assert!(matches!(err, ValidationError::NotANumber { field: "lat", .. }));

        let err = Coordinates::parse("1", "NaN").unwrap_err();
        assert!(matches!(err, ValidationError::NonFiniteCoordinate { field: "lng", .. }));

        let err = Coordinates::parse("inf", "1").unwrap_err();
        assert!(matches!(err, ValidationError::NonFiniteCoordinate { field: "lat", .. }));
    }

    #[test]
    fn validate_checks_ranges() {
        assert!(Coordinates::new(90.0, 180.0).validate().is_ok());
        assert!(Coordinates::new(-90.0, -180.0).validate().is_ok());
        assert!(matches!(
            Coordinates::new(90.5, 0.0).validate(),
            Err(ValidationError::CoordinateOutOfRange { field: "lat", .. })
        ));
        assert!(matches!(
            Coordinates::new(0.0, -180.5).validate(),
            Err(ValidationError::CoordinateOutOfRange { field: "lng", .. })
        ));
    }

    #[test]
    fn maps_link_round_trips_through_parser() {
        let c = Coordinates::new(40.7128, -74.006);
        let link = c.maps_link();
        assert_eq!(link, "https://maps.google.com/?q=40.7128,-74.006");
        assert_eq!(Coordinates::from_maps_link(&link), Some(c));
    }

    #[test]
    fn from_maps_link_ignores_unrelated_links() {
        assert_eq!(Coordinates::from_maps_link("https://example.com/"), None);
        assert_eq!(Coordinates::from_maps_link("https://maps.google.com/?q=95,10"), None);
        assert_eq!(
            Coordinates::from_maps_link("https://maps.google.com/?z=3&q=1.5, 2"),
            Some(Coordinates::new(1.5, 2.0))
        );
    }
}
