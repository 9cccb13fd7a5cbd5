//! Geohash cells.
//!
//! A location is quantized to a 26-step grid in each axis and the two grid
//! offsets are bit-interleaved into a 52-bit cell id, longitude in the high
//! bit of each pair. Every prefix of a cell id is a coarser cell, so a
//! coarse cell covers one contiguous range of full-resolution ids. 52 bits
//! fit exactly in an `f64`, which is how ids are stored as scores.

/// Full resolution, in bits per axis.
pub const STEP_MAX: u32 = 26;

pub const LONG_MIN: f64 = -180.0;
pub const LONG_MAX: f64 = 180.0;
/// Latitude limits of the indexable area (the Web Mercator square).
pub const LAT_MIN: f64 = -85.051_128_78;
pub const LAT_MAX: f64 = 85.051_128_78;
const STANDARD_LAT_MIN: f64 = -90.0;
const STANDARD_LAT_MAX: f64 = 90.0;

pub const EARTH_RADIUS_IN_METERS: f64 = 6_372_797.560_856;

const BASE32_ALPHABET: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Slack added around a search box to absorb rounding at its edges.
const BOX_MARGIN_DEGREES: f64 = 1e-7;

/// Spread the low 32 bits of `x` and `y` into the even and odd bits.
fn interleave(x: u32, y: u32) -> u64 {
    const B: [u64; 5] = [
        0x5555_5555_5555_5555,
        0x3333_3333_3333_3333,
        0x0F0F_0F0F_0F0F_0F0F,
        0x00FF_00FF_00FF_00FF,
        0x0000_FFFF_0000_FFFF,
    ];
    let mut x = u64::from(x);
    let mut y = u64::from(y);

    x = (x | (x << 16)) & B[4];
    y = (y | (y << 16)) & B[4];
    x = (x | (x << 8)) & B[3];
    y = (y | (y << 8)) & B[3];
    x = (x | (x << 4)) & B[2];
    y = (y | (y << 4)) & B[2];
    x = (x | (x << 2)) & B[1];
    y = (y | (y << 2)) & B[1];
    x = (x | (x << 1)) & B[0];
    y = (y | (y << 1)) & B[0];

    x | (y << 1)
}

/// Inverse of [`interleave`]: even bits in the low word, odd in the high.
fn deinterleave(interleaved: u64) -> (u32, u32) {
    const B: [u64; 6] = [
        0x5555_5555_5555_5555,
        0x3333_3333_3333_3333,
        0x0F0F_0F0F_0F0F_0F0F,
        0x00FF_00FF_00FF_00FF,
        0x0000_FFFF_0000_FFFF,
        0x0000_0000_FFFF_FFFF,
    ];
    let mut x = interleaved;
    let mut y = interleaved >> 1;

    x &= B[0];
    y &= B[0];
    x = (x | (x >> 1)) & B[1];
    y = (y | (y >> 1)) & B[1];
    x = (x | (x >> 2)) & B[2];
    y = (y | (y >> 2)) & B[2];
    x = (x | (x >> 4)) & B[3];
    y = (y | (y >> 4)) & B[3];
    x = (x | (x >> 8)) & B[4];
    y = (y | (y >> 8)) & B[4];
    x = (x | (x >> 16)) & B[5];
    y = (y | (y >> 16)) & B[5];

    (x as u32, y as u32)
}

/// Grid offset of `value` inside `[min, max]` split into `2^step` slots.
fn offset(value: f64, min: f64, max: f64, step: u32) -> u32 {
    let slots = 1_u64 << step;
    let raw = ((value - min) / (max - min) * slots as f64) as u64;
    // `value == max` lands one past the last slot.
    raw.min(slots - 1) as u32
}

fn encode_in(longitude: f64, latitude: f64, lat_min: f64, lat_max: f64, step: u32) -> u64 {
    let lat = offset(latitude, lat_min, lat_max, step);
    let long = offset(longitude, LONG_MIN, LONG_MAX, step);
    interleave(lat, long)
}

/// True when the pair can be indexed.
pub fn is_valid(longitude: f64, latitude: f64) -> bool {
    (LONG_MIN..=LONG_MAX).contains(&longitude) && (LAT_MIN..=LAT_MAX).contains(&latitude)
}

/// Full-resolution cell id of a location, or `None` outside the indexable
/// area.
pub fn encode(longitude: f64, latitude: f64) -> Option<u64> {
    is_valid(longitude, latitude).then(|| encode_in(longitude, latitude, LAT_MIN, LAT_MAX, STEP_MAX))
}

/// Center of a full-resolution cell as `(longitude, latitude)`.
pub fn decode(cell: u64) -> (f64, f64) {
    let scale = (1_u64 << STEP_MAX) as f64;
    let (lat_offset, long_offset) = deinterleave(cell);

    let lat_span = LAT_MAX - LAT_MIN;
    let long_span = LONG_MAX - LONG_MIN;
    let lat_lo = LAT_MIN + f64::from(lat_offset) / scale * lat_span;
    let lat_hi = LAT_MIN + (f64::from(lat_offset) + 1.0) / scale * lat_span;
    let long_lo = LONG_MIN + f64::from(long_offset) / scale * long_span;
    let long_hi = LONG_MIN + (f64::from(long_offset) + 1.0) / scale * long_span;

    (
        ((long_lo + long_hi) / 2.0).clamp(LONG_MIN, LONG_MAX),
        ((lat_lo + lat_hi) / 2.0).clamp(LAT_MIN, LAT_MAX),
    )
}

/// Great-circle (haversine) distance in meters.
pub fn distance(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let lat1r = lat1.to_radians();
    let lat2r = lat2.to_radians();
    let u = ((lat2r - lat1r) / 2.0).sin();
    let v = ((lon2.to_radians() - lon1.to_radians()) / 2.0).sin();
    let a = (u * u + lat1r.cos() * lat2r.cos() * v * v).clamp(0.0, 1.0);
    2.0 * EARTH_RADIUS_IN_METERS * a.sqrt().asin()
}

/// Standard 11-character geohash of a stored cell.
///
/// Stored cells use the Mercator latitude limits; the standard geohash uses
/// ±90, so the cell center is re-encoded first.
pub fn geohash(cell: u64) -> String {
    let (longitude, latitude) = decode(cell);
    let bits = encode_in(
        longitude,
        latitude,
        STANDARD_LAT_MIN,
        STANDARD_LAT_MAX,
        STEP_MAX,
    );

    (0..11)
        .map(|i| {
            // 52 bits give ten full characters; the eleventh is padding.
            let index = if i == 10 {
                0
            } else {
                ((bits >> (52 - (i + 1) * 5)) & 0x1f) as usize
            };
            char::from(BASE32_ALPHABET[index])
        })
        .collect()
}

/// Full-resolution id range `[first, last]` covered by cell `cell` at `step`.
pub fn cell_range(cell: u64, step: u32) -> (u64, u64) {
    let shift = 2 * (STEP_MAX - step);
    (cell << shift, ((cell + 1) << shift) - 1)
}

/// Latitude/longitude box.
#[derive(Debug, Clone, Copy, PartialEq)]
struct BoundingBox {
    lat_min: f64,
    lat_max: f64,
    /// May extend past ±180 when the circle crosses the antimeridian.
    long_min: f64,
    long_max: f64,
}

fn bounding_box(longitude: f64, latitude: f64, radius_m: f64) -> BoundingBox {
    let angular = radius_m / EARTH_RADIUS_IN_METERS;
    let dlat = angular.to_degrees() + BOX_MARGIN_DEGREES;
    let lat_min = latitude - dlat;
    let lat_max = latitude + dlat;

    // The circle reaches a pole, or its half-width can't be bounded.
    let sin_ratio = angular.sin() / latitude.to_radians().cos();
    let full_width = lat_max >= STANDARD_LAT_MAX
        || lat_min <= STANDARD_LAT_MIN
        || angular >= std::f64::consts::FRAC_PI_2
        || !(0.0..1.0).contains(&sin_ratio);

    let (long_min, long_max) = if full_width {
        (LONG_MIN, LONG_MAX)
    } else {
        let dlong = sin_ratio.asin().to_degrees() + BOX_MARGIN_DEGREES;
        (longitude - dlong, longitude + dlong)
    };

    BoundingBox {
        lat_min: lat_min.max(LAT_MIN),
        lat_max: lat_max.min(LAT_MAX),
        long_min,
        long_max,
    }
}

/// Split a longitude interval at the antimeridian.
fn longitude_intervals(long_min: f64, long_max: f64) -> Vec<(f64, f64)> {
    if long_max - long_min >= LONG_MAX - LONG_MIN {
        return vec![(LONG_MIN, LONG_MAX)];
    }
    if long_min < LONG_MIN {
        vec![(LONG_MIN, long_max), (long_min + 360.0, LONG_MAX)]
    } else if long_max > LONG_MAX {
        vec![(long_min, LONG_MAX), (LONG_MIN, long_max - 360.0)]
    } else {
        vec![(long_min, long_max)]
    }
}

/// Finest step whose cells are at least half the box in each axis, so the
/// box spans at most three cells per axis.
fn covering_step(bbox: &BoundingBox) -> u32 {
    let height = bbox.lat_max - bbox.lat_min;
    let width = (bbox.long_max - bbox.long_min).min(LONG_MAX - LONG_MIN);
    (0..=STEP_MAX)
        .rev()
        .find(|&step| {
            let slots = (1_u64 << step) as f64;
            let cell_height = (LAT_MAX - LAT_MIN) / slots;
            let cell_width = (LONG_MAX - LONG_MIN) / slots;
            cell_height * 2.0 >= height && cell_width * 2.0 >= width
        })
        .unwrap_or(0)
}

/// Ranges of full-resolution cell ids whose union contains every cell with a
/// center within `radius_m` of the given point. Sorted and non-overlapping.
pub fn covering(longitude: f64, latitude: f64, radius_m: f64) -> Vec<(u64, u64)> {
    let bbox = bounding_box(longitude, latitude, radius_m.max(0.0));
    if bbox.lat_min > bbox.lat_max {
        return Vec::new();
    }
    let step = covering_step(&bbox);

    let lat_lo = offset(bbox.lat_min, LAT_MIN, LAT_MAX, step);
    let lat_hi = offset(bbox.lat_max, LAT_MIN, LAT_MAX, step);

    let mut ranges = Vec::new();
    for (long_min, long_max) in longitude_intervals(bbox.long_min, bbox.long_max) {
        let long_lo = offset(long_min, LONG_MIN, LONG_MAX, step);
        let long_hi = offset(long_max, LONG_MIN, LONG_MAX, step);
        for lat in lat_lo..=lat_hi {
            for long in long_lo..=long_hi {
                ranges.push(cell_range(interleave(lat, long), step));
            }
        }
    }

    ranges.sort_unstable();
    let mut merged: Vec<(u64, u64)> = Vec::with_capacity(ranges.len());
    for (lo, hi) in ranges {
        match merged.last_mut() {
            Some(last) if lo <= last.1.saturating_add(1) => last.1 = last.1.max(hi),
            _ => merged.push((lo, hi)),
        }
    }
    merged
}
