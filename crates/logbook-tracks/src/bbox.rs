//! Logbook Bounding Box
//!
//! Parsing and validation of `swLng,swLat,neLng,neLat` viewport strings.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use geo::{Distance, Haversine, Point};
use logbook_common::{LogbookError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A geographic box given by its south-west and north-east corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub sw_lng: f64,
    pub sw_lat: f64,
    pub ne_lng: f64,
    pub ne_lat: f64,
}

impl BoundingBox {
    pub fn new(sw_lng: f64, sw_lat: f64, ne_lng: f64, ne_lat: f64) -> Result<Self> {
        let bbox = Self {
            sw_lng,
            sw_lat,
            ne_lng,
            ne_lat,
        };
        bbox.validate()?;
        Ok(bbox)
    }

    fn validate(&self) -> Result<()> {
        let corners = [self.sw_lng, self.sw_lat, self.ne_lng, self.ne_lat];
        if corners.iter().any(|c| !c.is_finite()) {
            return Err(LogbookError::validation("bbox coordinates must be finite"));
        }
        if !(-90.0..=90.0).contains(&self.sw_lat) || !(-90.0..=90.0).contains(&self.ne_lat) {
            return Err(LogbookError::validation("bbox latitude out of range"));
        }
        if !(-180.0..=180.0).contains(&self.sw_lng) || !(-180.0..=180.0).contains(&self.ne_lng) {
            return Err(LogbookError::validation("bbox longitude out of range"));
        }
        if self.sw_lat > self.ne_lat {
            return Err(LogbookError::validation("bbox south edge is north of north edge"));
        }
        // antimeridian-crossing boxes are not supported
        if self.sw_lng > self.ne_lng {
            return Err(LogbookError::validation("bbox west edge is east of east edge"));
        }
        Ok(())
    }

    /// Haversine distance between the corners, in meters.
    pub fn diagonal_distance(&self) -> f64 {
        let sw = Point::new(self.sw_lng, self.sw_lat);
        let ne = Point::new(self.ne_lng, self.ne_lat);
        Haversine::distance(sw, ne)
    }
}

impl FromStr for BoundingBox {
    type Err = LogbookError;

    fn from_str(raw: &str) -> Result<Self> {
        let parts: Vec<f64> = raw
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| LogbookError::validation(format!("invalid bbox '{}'", raw)))?;

        match parts.as_slice() {
            [sw_lng, sw_lat, ne_lng, ne_lat] => Self::new(*sw_lng, *sw_lat, *ne_lng, *ne_lat),
            _ => Err(LogbookError::validation(format!(
                "bbox must have four numbers, got '{}'",
                raw
            ))),
        }
    }
}
