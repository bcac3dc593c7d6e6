//! Geographic utilities: great-circle distance, polyline projection,
//! WKT LINESTRING parsing and arrival-time estimation.
//!
//! All distances are kilometers unless stated otherwise. Coordinates are
//! `(lon, lat)` pairs in degrees, matching the wire format of object
//! positions.

pub mod smoothing;

/// Earth's radius in km.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Knots to km/h.
const KNOTS_TO_KMH: f64 = 1.852;

fn to_rad(degrees: f64) -> f64 {
    degrees * (std::f64::consts::PI / 180.0)
}

/// Haversine great-circle distance between two points, in kilometers.
///
/// Symmetric, and zero for identical points.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = to_rad(lat2 - lat1);
    let d_lon = to_rad(lon2 - lon1);

    let a = (d_lat / 2.0).sin().powi(2)
        + to_rad(lat1).cos() * to_rad(lat2).cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Result of projecting a point onto a segment or polyline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestPoint {
    /// Great-circle distance from the query point to `point`, in km.
    pub distance_km: f64,
    /// Nearest point as `(lon, lat)`.
    pub point: (f64, f64),
}

/// Project a point onto the segment `a`-`b`, clamping the projection
/// parameter to `[0, 1]`. Degenerates to point distance when `a == b`.
pub fn project_onto_segment(
    px: f64,
    py: f64,
    a: (f64, f64),
    b: (f64, f64),
) -> NearestPoint {
    let (x1, y1) = a;
    let (x2, y2) = b;
    let dx = x2 - x1;
    let dy = y2 - y1;

    if dx == 0.0 && dy == 0.0 {
        return NearestPoint {
            distance_km: haversine_distance(py, px, y1, x1),
            point: (x1, y1),
        };
    }

    let t = (((px - x1) * dx + (py - y1) * dy) / (dx * dx + dy * dy)).clamp(0.0, 1.0);
    let nearest = (x1 + t * dx, y1 + t * dy);

    NearestPoint {
        distance_km: haversine_distance(py, px, nearest.1, nearest.0),
        point: nearest,
    }
}

/// Nearest point on a polyline, taken as the minimum over all consecutive
/// segment pairs. Returns `None` for polylines with fewer than two points.
pub fn nearest_point_on_polyline(
    lon: f64,
    lat: f64,
    polyline: &[(f64, f64)],
) -> Option<NearestPoint> {
    if polyline.len() < 2 {
        return None;
    }

    polyline
        .windows(2)
        .map(|seg| project_onto_segment(lon, lat, seg[0], seg[1]))
        .min_by(|a, b| a.distance_km.total_cmp(&b.distance_km))
}

/// Extract `lon lat` pairs from a `LINESTRING(...)` textual form.
///
/// Malformed input yields an empty polyline; this never panics.
pub fn parse_line_string(wkt: &str) -> Vec<(f64, f64)> {
    let trimmed = wkt.trim();
    let upper = trimmed.to_ascii_uppercase();
    if !upper.starts_with("LINESTRING") {
        return Vec::new();
    }

    let open = match trimmed.find('(') {
        Some(i) => i,
        None => return Vec::new(),
    };
    let close = match trimmed.rfind(')') {
        Some(i) if i > open => i,
        _ => return Vec::new(),
    };

    trimmed[open + 1..close]
        .split(',')
        .filter_map(|pair| {
            let mut parts = pair.split_whitespace();
            let lon = parts.next()?.parse::<f64>().ok()?;
            let lat = parts.next()?.parse::<f64>().ok()?;
            Some((lon, lat))
        })
        .collect()
}

/// Seconds until a contact at `(lon, lat)` moving at `speed_knots` reaches
/// the nearest point of `polyline`.
///
/// Returns `None` when the speed is non-positive or the polyline is too
/// short to project onto; callers must guard rather than divide by zero.
pub fn estimate_arrival_seconds(
    lon: f64,
    lat: f64,
    speed_knots: f64,
    polyline: &[(f64, f64)],
) -> Option<i64> {
    if speed_knots <= 0.0 {
        return None;
    }
    let nearest = nearest_point_on_polyline(lon, lat, polyline)?;
    let speed_kmh = speed_knots * KNOTS_TO_KMH;
    let seconds = nearest.distance_km / speed_kmh * 3600.0;
    Some(seconds.round() as i64)
}

/// Great-circle travel time in seconds from `(lat1, lon1)` to `(lat2, lon2)`
/// at a fixed speed in knots. Used for interceptor time-to-impact estimates.
pub fn travel_time_seconds(lat1: f64, lon1: f64, lat2: f64, lon2: f64, speed_knots: f64) -> f64 {
    let dist_km = haversine_distance(lat1, lon1, lat2, lon2);
    dist_km / (speed_knots * KNOTS_TO_KMH) * 3600.0
}
