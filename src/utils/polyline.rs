// src/utils/polyline.rs
//
// Decoder for the standard encoded-polyline format (signed deltas packed
// into 5-bit chunks, offset by 63, at 1e-5 coordinate precision). This is
// the only fallback path for route geometry when the provider omits
// per-step coordinates, so the decoding must be bit-exact.

use crate::errors::SwiftaidError;
use crate::models::ride::GeoPoint;

const PRECISION: f64 = 1e5;

/// Decode an encoded polyline into an ordered coordinate sequence.
pub fn decode(encoded: &str) -> Result<Vec<GeoPoint>, SwiftaidError> {
    let bytes = encoded.as_bytes();
    let mut points = Vec::new();
    let mut idx = 0usize;
    let mut lat = 0i64;
    let mut lon = 0i64;

    while idx < bytes.len() {
        let (delta_lat, next) = decode_signed(bytes, idx)?;
        let (delta_lon, next) = decode_signed(bytes, next)?;
        idx = next;

        lat += delta_lat;
        lon += delta_lon;

        points.push(GeoPoint {
            latitude: lat as f64 / PRECISION,
            longitude: lon as f64 / PRECISION,
        });
    }

    Ok(points)
}

/// Decode one zig-zag signed value starting at `idx`, returning the value
/// and the index of the next unread byte.
fn decode_signed(bytes: &[u8], mut idx: usize) -> Result<(i64, usize), SwiftaidError> {
    let mut accumulator: i64 = 0;
    let mut shift: u32 = 0;

    loop {
        let byte = *bytes.get(idx).ok_or_else(|| {
            SwiftaidError::PolylineDecode(format!("truncated chunk at byte {idx}"))
        })?;
        let chunk = i64::from(byte) - 63;
        if chunk < 0 {
            return Err(SwiftaidError::PolylineDecode(format!(
                "invalid character {byte:#04x} at byte {idx}"
            )));
        }
        idx += 1;

        accumulator |= (chunk & 0x1f) << shift;
        shift += 5;

        if chunk < 0x20 {
            break;
        }
        if shift > 35 {
            return Err(SwiftaidError::PolylineDecode(format!(
                "chunk overflow at byte {idx}"
            )));
        }
    }

    let value = if accumulator & 1 != 0 {
        !(accumulator >> 1)
    } else {
        accumulator >> 1
    };

    Ok((value, idx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_reference_sample() {
        // Reference sample from the encoded-polyline format documentation.
        let points = decode("_p~iF~ps|U_ulLnnqC_mqNvxq`@").unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].latitude, 38.5);
        assert_eq!(points[0].longitude, -120.2);
        assert_eq!(points[1].latitude, 40.7);
        assert_eq!(points[1].longitude, -120.95);
        assert_eq!(points[2].latitude, 43.252);
        assert_eq!(points[2].longitude, -126.453);
    }

    #[test]
    fn test_decode_empty_string() {
        let points = decode("").unwrap();
        assert!(points.is_empty());
    }

    #[test]
    fn test_decode_single_point() {
        // (38.5, -120.2) alone.
        let points = decode("_p~iF~ps|U").unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].latitude, 38.5);
        assert_eq!(points[0].longitude, -120.2);
    }

    #[test]
    fn test_decode_truncated_input_fails() {
        // Drop the last byte of the longitude chunk.
        let err = decode("_p~iF~ps|").unwrap_err();
        assert!(matches!(err, SwiftaidError::PolylineDecode(_)));
    }

    #[test]
    fn test_decode_rejects_bytes_below_offset() {
        // 0x1f is below the 63 offset, never valid in this encoding.
        let err = decode("\x1f").unwrap_err();
        assert!(matches!(err, SwiftaidError::PolylineDecode(_)));
    }

    #[test]
    fn test_deltas_accumulate() {
        // The second point is encoded relative to the first; verify the
        // accumulated values, not just the first pair.
        let points = decode("_p~iF~ps|U_ulLnnqC").unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].latitude, 40.7);
        assert_eq!(points[1].longitude, -120.95);
    }
}
