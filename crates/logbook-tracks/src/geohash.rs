//! Logbook Geohash
//!
//! Fixed-precision geohash encoding used as the spatial bucket key of track
//! points, and bounding-box coverage used to turn a map viewport into a set
//! of bucket prefixes.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Longest supported hash.
pub const MAX_PRECISION: usize = 12;

// =============================================================================
// Encoding
// =============================================================================

/// Encode a coordinate as a geohash of `precision` characters.
pub fn encode(latitude: f64, longitude: f64, precision: usize) -> String {
    let precision = precision.clamp(1, MAX_PRECISION);
    let (mut lat_lo, mut lat_hi) = (-90.0_f64, 90.0_f64);
    let (mut lon_lo, mut lon_hi) = (-180.0_f64, 180.0_f64);

    let mut hash = String::with_capacity(precision);
    let mut even = true;
    let mut bits = 0u8;
    let mut index = 0usize;

    while hash.len() < precision {
        if even {
            let mid = (lon_lo + lon_hi) / 2.0;
            if longitude >= mid {
                index = index * 2 + 1;
                lon_lo = mid;
            } else {
                index *= 2;
                lon_hi = mid;
            }
        } else {
            let mid = (lat_lo + lat_hi) / 2.0;
            if latitude >= mid {
                index = index * 2 + 1;
                lat_lo = mid;
            } else {
                index *= 2;
                lat_hi = mid;
            }
        }
        even = !even;

        bits += 1;
        if bits == 5 {
            hash.push(BASE32[index] as char);
            bits = 0;
            index = 0;
        }
    }

    hash
}

// =============================================================================
// Cell Geometry
// =============================================================================

/// Cell size `(lat_degrees, lon_degrees)` at a precision.
pub fn cell_size(precision: usize) -> (f64, f64) {
    let (lat_bits, lon_bits) = bit_split(precision);
    (
        180.0 / 2f64.powi(lat_bits as i32),
        360.0 / 2f64.powi(lon_bits as i32),
    )
}

fn bit_split(precision: usize) -> (u32, u32) {
    let total = (5 * precision.clamp(1, MAX_PRECISION)) as u32;
    (total / 2, total - total / 2)
}

/// Inclusive cell index ranges covering the box on each axis.
fn index_ranges(
    sw_lat: f64,
    sw_lon: f64,
    ne_lat: f64,
    ne_lon: f64,
    precision: usize,
) -> ((u64, u64), (u64, u64)) {
    let (lat_bits, lon_bits) = bit_split(precision);
    let (cell_lat, cell_lon) = cell_size(precision);

    let axis = |lo: f64, hi: f64, origin: f64, cell: f64, bits: u32| {
        let max = (1u64 << bits) - 1;
        let first = (((lo - origin) / cell).floor().max(0.0) as u64).min(max);
        let last = (((hi - origin) / cell).floor().max(0.0) as u64).min(max);
        (first, last.max(first))
    };

    (
        axis(sw_lat, ne_lat, -90.0, cell_lat, lat_bits),
        axis(sw_lon, ne_lon, -180.0, cell_lon, lon_bits),
    )
}

/// Number of cells of `precision` intersecting the box, without enumerating.
pub fn count_cells(sw_lat: f64, sw_lon: f64, ne_lat: f64, ne_lon: f64, precision: usize) -> u64 {
    let ((lat_first, lat_last), (lon_first, lon_last)) =
        index_ranges(sw_lat, sw_lon, ne_lat, ne_lon, precision);
    (lat_last - lat_first + 1).saturating_mul(lon_last - lon_first + 1)
}

/// All cells of `precision` intersecting the box.
pub fn bboxes(sw_lat: f64, sw_lon: f64, ne_lat: f64, ne_lon: f64, precision: usize) -> Vec<String> {
    let ((lat_first, lat_last), (lon_first, lon_last)) =
        index_ranges(sw_lat, sw_lon, ne_lat, ne_lon, precision);
    let (cell_lat, cell_lon) = cell_size(precision);

    let mut hashes = Vec::new();
    for lat_idx in lat_first..=lat_last {
        let lat = -90.0 + (lat_idx as f64 + 0.5) * cell_lat;
        for lon_idx in lon_first..=lon_last {
            let lon = -180.0 + (lon_idx as f64 + 0.5) * cell_lon;
            hashes.push(encode(lat, lon, precision));
        }
    }
    hashes
}

// =============================================================================
// Tests
// =============================================================================
