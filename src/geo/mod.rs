//! Geospatial indexes.
//!
//! A geo set is a sorted set whose scores are full-resolution geohash cell
//! ids (see [`cell`]). A radius search covers the circle with a handful of
//! coarser cells, scans each one's contiguous id range on the score axis and
//! keeps the candidates whose decoded position is within the radius.

pub mod cell;

use std::fmt;

use tracing::debug;

use crate::backend::ReturnValues;
use crate::client::{validate_key, validate_member, Client};
use crate::error::{Error, Result};
use crate::expression::{ExpressionBuilder, SortCondition};
use crate::item::{Attribute, Item, Key};
use crate::value::Value;

/// A point on the globe, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance to `other`, in `unit`.
    pub fn distance_to(&self, other: &Location, unit: Unit) -> f64 {
        unit.from_meters(cell::distance(
            self.longitude,
            self.latitude,
            other.longitude,
            other.latitude,
        ))
    }

    fn cell(&self) -> Result<u64> {
        cell::encode(self.longitude, self.latitude).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "invalid longitude,latitude pair {:.6},{:.6}",
                self.longitude, self.latitude
            ))
        })
    }

    fn from_cell(id: u64) -> Self {
        let (longitude, latitude) = cell::decode(id);
        Self {
            latitude,
            longitude,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// Distance unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Unit {
    #[default]
    Meters,
    Kilometers,
    Miles,
    Feet,
}

impl Unit {
    fn meters(self) -> f64 {
        match self {
            Unit::Meters => 1.0,
            Unit::Kilometers => 1000.0,
            Unit::Miles => 1609.34,
            Unit::Feet => 0.3048,
        }
    }

    pub fn to_meters(self, distance: f64) -> f64 {
        distance * self.meters()
    }

    pub fn from_meters(self, meters: f64) -> f64 {
        meters / self.meters()
    }
}

/// A radius search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoMember {
    pub member: String,
    pub location: Location,
    /// Distance from the search center, in the search unit.
    pub distance: f64,
}

fn location_of(item: &Item) -> Result<Location> {
    item.score
        .map(|score| Location::from_cell(score as u64))
        .ok_or_else(|| Error::Decode(format!("geo member {:?} has no score", item.key)))
}

impl Client {
    /// Add or move members. Returns the members that were not already
    /// present. Nothing is written if any location is outside the indexable
    /// area.
    pub async fn geoadd<I, M>(&self, key: &str, members: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = (M, Location)>,
        M: Into<String>,
    {
        validate_key(key)?;
        let cells = members
            .into_iter()
            .map(|(member, location)| {
                let member = member.into();
                validate_member(&member)?;
                Ok((member, location.cell()?))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut added = Vec::new();
        for (member, id) in cells {
            let update = ExpressionBuilder::new().set(Attribute::Score, id as f64);
            let old = self
                .backend()
                .update_item(&Key::new(key, member.as_str()), &update, ReturnValues::AllOld)
                .await?;
            if old.is_none() {
                added.push(member);
            }
        }
        Ok(added)
    }

    /// Stored position of each member, `None` for missing ones. Positions
    /// are cell centers, so they differ slightly from what was added.
    pub async fn geopos(&self, key: &str, members: &[&str]) -> Result<Vec<Option<Location>>> {
        validate_key(key)?;
        let mut positions = Vec::with_capacity(members.len());
        for member in members {
            validate_member(member)?;
            positions.push(match self.get(key, member).await? {
                Some(item) => Some(location_of(&item)?),
                None => None,
            });
        }
        Ok(positions)
    }

    /// Distance between two members, or `None` if either is missing.
    pub async fn geodist(
        &self,
        key: &str,
        first: &str,
        second: &str,
        unit: Unit,
    ) -> Result<Option<f64>> {
        match self.geopos(key, &[first, second]).await?.as_slice() {
            [Some(a), Some(b)] => Ok(Some(a.distance_to(b, unit))),
            _ => Ok(None),
        }
    }

    /// Standard 11-character geohash of each member, `None` for missing ones.
    pub async fn geohash(&self, key: &str, members: &[&str]) -> Result<Vec<Option<String>>> {
        validate_key(key)?;
        let mut hashes = Vec::with_capacity(members.len());
        for member in members {
            validate_member(member)?;
            hashes.push(match self.get(key, member).await? {
                Some(item) => item.score.map(|score| cell::geohash(score as u64)),
                None => None,
            });
        }
        Ok(hashes)
    }

    /// Members within `radius` of `center`, each with its distance in `unit`.
    ///
    /// Results are in scan order, not nearest-first. With `count`, scanning
    /// stops as soon as that many members are found.
    pub async fn georadius(
        &self,
        key: &str,
        center: Location,
        radius: f64,
        unit: Unit,
        count: Option<usize>,
    ) -> Result<Vec<GeoMember>> {
        validate_key(key)?;
        center.cell()?;
        if !radius.is_finite() || radius < 0.0 {
            return Err(Error::InvalidArgument(format!("invalid radius {radius}")));
        }
        if count == Some(0) {
            return Ok(Vec::new());
        }
        let radius_m = unit.to_meters(radius);
        let ranges = cell::covering(center.longitude, center.latitude, radius_m);
        debug!(key = %key, %center, radius_m, ranges = ranges.len(), "GEORADIUS covering");

        let mut found = Vec::new();
        'ranges: for (lo, hi) in ranges {
            let mut scan = self
                .scan(key)
                .by_score()
                .keys_only()
                .condition(SortCondition::Between(
                    Value::Float(lo as f64),
                    Value::Float(hi as f64),
                ))
                .run(self.backend());

            while let Some(item) = scan.next().await? {
                let location = location_of(&item)?;
                let meters = cell::distance(
                    center.longitude,
                    center.latitude,
                    location.longitude,
                    location.latitude,
                );
                if meters > radius_m {
                    continue;
                }
                found.push(GeoMember {
                    member: item.key.sort,
                    location,
                    distance: unit.from_meters(meters),
                });
                if count.is_some_and(|n| found.len() >= n) {
                    break 'ranges;
                }
            }
        }
        Ok(found)
    }

    /// [`georadius`](Self::georadius) centered on a stored member. Empty if
    /// the member does not exist.
    pub async fn georadiusbymember(
        &self,
        key: &str,
        member: &str,
        radius: f64,
        unit: Unit,
        count: Option<usize>,
    ) -> Result<Vec<GeoMember>> {
        match self.geopos(key, &[member]).await?.pop().flatten() {
            Some(center) => self.georadius(key, center, radius, unit, count).await,
            None => Ok(Vec::new()),
        }
    }
}
