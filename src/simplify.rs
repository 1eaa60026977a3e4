//! # Track Simplification
//!
//! Douglas-Peucker reduction of GPX track segments under a tolerance given in
//! meters.
//!
//! The tolerance is converted to degrees once per file, using the latitude of the
//! first point of the first non-empty segment (see [`meters_to_degrees`]). Each
//! segment is then simplified independently over its (longitude, latitude)
//! coordinates; elevation never influences which points survive.
//!
//! The file is rewritten as a stream of XML events. Only `<trkpt>` elements inside
//! a `<trkseg>` are ever removed; a surviving point is written exactly as it was
//! read (elevation, time, extensions and all), and everything outside track
//! segments (metadata, copyright, waypoints, routes, track names and
//! `<extensions>`) is copied through byte for byte.
//!
//! ## Example
//!
//! ```rust
//! use trail_redux::{simplify, TrackPoint};
//!
//! let segment = vec![
//!     TrackPoint::new(47.0000, 11.0000),
//!     TrackPoint::new(47.0005, 11.0010), // on the chord
//!     TrackPoint::new(47.0010, 11.0020),
//! ];
//! let kept = simplify::douglas_peucker_indices(&segment, 0.0002);
//! assert_eq!(kept, vec![0, 2]);
//! ```

use geo::{Coord, LineString, SimplifyIdx};
use gpx::Gpx;
use log::{debug, warn};
use quick_xml::events::Event;
use quick_xml::{Reader, Writer};

use crate::error::{ReduxError, Result};
use crate::geo_utils::{meters_to_degrees, polyline_length};
use crate::TrackPoint;

const TRKSEG: &[u8] = b"trkseg";
const TRKPT: &[u8] = b"trkpt";

/// Indices of the points kept by Douglas-Peucker at `tolerance_degrees`.
///
/// Indices are ascending and always include the first and last point. Inputs with
/// fewer than two points are returned whole. A tolerance of zero keeps every
/// point that is off the line through its neighbours.
pub fn douglas_peucker_indices(points: &[TrackPoint], tolerance_degrees: f64) -> Vec<usize> {
    if points.len() < 2 {
        return (0..points.len()).collect();
    }

    let coords: Vec<Coord<f64>> = points
        .iter()
        .map(|p| Coord {
            x: p.longitude,
            y: p.latitude,
        })
        .collect();

    LineString::new(coords).simplify_idx(&tolerance_degrees)
}

/// Simplify a single segment, carrying elevation for surviving points.
pub fn simplify_points(points: &[TrackPoint], tolerance_degrees: f64) -> Vec<TrackPoint> {
    douglas_peucker_indices(points, tolerance_degrees)
        .into_iter()
        .map(|i| points[i])
        .collect()
}

/// Latitude of the first point of the first non-empty segment, if any.
pub fn reference_latitude(gpx: &Gpx) -> Option<f64> {
    gpx.tracks
        .iter()
        .flat_map(|t| t.segments.iter())
        .flat_map(|s| s.points.iter())
        .next()
        .map(|wp| wp.point().y())
}

fn sanitize_tolerance(tolerance_meters: f64) -> f64 {
    if tolerance_meters.is_finite() && tolerance_meters > 0.0 {
        tolerance_meters
    } else {
        0.0
    }
}

/// Parse GPX bytes, surfacing parse failures as [`ReduxError::MalformedTrackFile`].
pub fn parse_gpx(data: &[u8]) -> Result<Gpx> {
    gpx::read(data).map_err(|e| ReduxError::malformed(e.to_string()))
}

/// Simplify raw GPX bytes.
///
/// The input is validated as GPX first. Files without tracks or without any track
/// point are returned byte-for-byte.
pub fn simplify_gpx_bytes(data: &[u8], tolerance_meters: f64) -> Result<Vec<u8>> {
    let gpx = parse_gpx(data)?;

    if gpx.tracks.is_empty() {
        warn!("[Simplify] GPX file contains no tracks, returning original");
        return Ok(data.to_vec());
    }
    let Some(latitude) = reference_latitude(&gpx) else {
        warn!("[Simplify] GPX file contains no trackpoints, returning original");
        return Ok(data.to_vec());
    };

    let tolerance_meters = sanitize_tolerance(tolerance_meters);
    let tolerance_degrees = meters_to_degrees(tolerance_meters, latitude);
    debug!(
        "[Simplify] Using tolerance {}m ≈ {:.8}° at latitude {:.5}",
        tolerance_meters, tolerance_degrees, latitude
    );

    rewrite_segments(data, tolerance_degrees)
}

// ============================================================================
// Streaming rewrite
// ============================================================================

/// Child of a `<trkseg>`: a track point (with the whitespace in front of it) or
/// anything else, which is always kept.
enum SegmentItem<'a> {
    Point {
        point: TrackPoint,
        events: Vec<Event<'a>>,
    },
    Other(Event<'a>),
}

fn rewrite_segments(data: &[u8], tolerance_degrees: f64) -> Result<Vec<u8>> {
    let mut reader = Reader::from_reader(data);
    let mut writer = Writer::new(Vec::with_capacity(data.len()));

    loop {
        let event = next_event(&mut reader)?;
        if matches!(event, Event::Eof) {
            break;
        }
        let opens_segment = is_start(&event, TRKSEG);
        write_event(&mut writer, event)?;
        if opens_segment {
            let items = read_segment(&mut reader)?;
            write_segment(&mut writer, items, tolerance_degrees)?;
        }
    }

    Ok(writer.into_inner())
}

/// Collect the children of a segment up to and including `</trkseg>`.
fn read_segment<'a>(reader: &mut Reader<&'a [u8]>) -> Result<Vec<SegmentItem<'a>>> {
    let mut items = Vec::new();
    let mut blank: Vec<Event<'a>> = Vec::new();

    loop {
        let event = next_event(reader)?;
        if matches!(event, Event::Eof) {
            return Err(ReduxError::malformed("unterminated <trkseg>"));
        }
        if is_blank(&event) {
            blank.push(event);
            continue;
        }

        if let Some(point) = track_point(&event)? {
            let mut events = std::mem::take(&mut blank);
            let nested = matches!(event, Event::Start(_));
            events.push(event);
            if nested {
                read_element(reader, &mut events)?;
            }
            items.push(SegmentItem::Point { point, events });
            continue;
        }

        items.extend(blank.drain(..).map(SegmentItem::Other));
        let closes_segment = is_end(&event, TRKSEG);
        let nested = matches!(event, Event::Start(_));
        let mut events = vec![event];
        if nested {
            read_element(reader, &mut events)?;
        }
        items.extend(events.into_iter().map(SegmentItem::Other));
        if closes_segment {
            return Ok(items);
        }
    }
}

fn write_segment(
    writer: &mut Writer<Vec<u8>>,
    items: Vec<SegmentItem<'_>>,
    tolerance_degrees: f64,
) -> Result<()> {
    let points: Vec<TrackPoint> = items
        .iter()
        .filter_map(|item| match item {
            SegmentItem::Point { point, .. } => Some(*point),
            SegmentItem::Other(_) => None,
        })
        .collect();

    let mut keep = vec![false; points.len()];
    for i in douglas_peucker_indices(&points, tolerance_degrees) {
        keep[i] = true;
    }
    debug!(
        "[Simplify] Segment {} -> {} points ({:.0}m -> {:.0}m)",
        points.len(),
        keep.iter().filter(|k| **k).count(),
        polyline_length(&points),
        polyline_length(&simplify_points(&points, tolerance_degrees))
    );

    let mut index = 0;
    for item in items {
        match item {
            SegmentItem::Other(event) => write_event(writer, event)?,
            SegmentItem::Point { events, .. } => {
                if keep[index] {
                    for event in events {
                        write_event(writer, event)?;
                    }
                }
                index += 1;
            }
        }
    }
    Ok(())
}

/// Append events up to the end tag matching an already consumed start tag.
fn read_element<'a>(reader: &mut Reader<&'a [u8]>, events: &mut Vec<Event<'a>>) -> Result<()> {
    let mut depth = 1usize;
    while depth > 0 {
        let event = next_event(reader)?;
        match event {
            Event::Start(_) => depth += 1,
            Event::End(_) => depth -= 1,
            Event::Eof => return Err(ReduxError::malformed("unexpected end of file")),
            _ => {}
        }
        events.push(event);
    }
    Ok(())
}

/// Coordinates of a `<trkpt>` start or empty tag.
fn track_point(event: &Event<'_>) -> Result<Option<TrackPoint>> {
    let start = match event {
        Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == TRKPT => e,
        _ => return Ok(None),
    };

    let mut latitude = None;
    let mut longitude = None;
    for attr in start.attributes() {
        let attr = attr.map_err(|e| ReduxError::malformed(e.to_string()))?;
        let value = std::str::from_utf8(&attr.value)
            .ok()
            .and_then(|v| v.trim().parse::<f64>().ok());
        match attr.key.local_name().as_ref() {
            b"lat" => latitude = value,
            b"lon" => longitude = value,
            _ => {}
        }
    }

    match (latitude, longitude) {
        (Some(lat), Some(lon)) => Ok(Some(TrackPoint::new(lat, lon))),
        _ => Err(ReduxError::malformed("track point without a valid lat/lon")),
    }
}

fn is_start(event: &Event<'_>, name: &[u8]) -> bool {
    matches!(event, Event::Start(e) if e.local_name().as_ref() == name)
}

fn is_end(event: &Event<'_>, name: &[u8]) -> bool {
    matches!(event, Event::End(e) if e.local_name().as_ref() == name)
}

fn is_blank(event: &Event<'_>) -> bool {
    matches!(event, Event::Text(t) if t.iter().all(u8::is_ascii_whitespace))
}

fn next_event<'a>(reader: &mut Reader<&'a [u8]>) -> Result<Event<'a>> {
    reader.read_event().map_err(|e| {
        ReduxError::malformed(format!("{} at byte {}", e, reader.buffer_position()))
    })
}

fn write_event(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| ReduxError::malformed(e.to_string()))
}

/// Byte-level simplification seam used by the pipeline.
pub trait TrackSimplifier {
    /// Simplify a serialized track file under a tolerance in meters.
    fn simplify(&self, data: &[u8], tolerance_meters: f64) -> Result<Vec<u8>>;
}

/// [`TrackSimplifier`] backed by GPX validation, Douglas-Peucker and a streaming
/// XML rewrite.
#[derive(Debug, Clone, Copy, Default)]
pub struct GpxSimplifier;

impl TrackSimplifier for GpxSimplifier {
    fn simplify(&self, data: &[u8], tolerance_meters: f64) -> Result<Vec<u8>> {
        simplify_gpx_bytes(data, tolerance_meters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_GPX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="trail-tests" xmlns="http://www.topografix.com/GPX/1/1">
  <metadata>
    <name>Alpine loop</name>
    <desc>Morning hike above the valley</desc>
  </metadata>
  <wpt lat="47.0100" lon="11.0100">
    <name>Hut</name>
  </wpt>
  <trk>
    <name>Loop</name>
    <desc>Full loop</desc>
    <trkseg>
      <trkpt lat="47.0000" lon="11.0000"><ele>1200.0</ele><time>2024-05-01T08:00:00Z</time></trkpt>
      <trkpt lat="47.00101" lon="11.0010"><ele>1210.0</ele><time>2024-05-01T08:00:10Z</time></trkpt>
      <trkpt lat="47.0020" lon="11.0020"><ele>1220.0</ele><time>2024-05-01T08:00:20Z</time></trkpt>
      <trkpt lat="47.0030" lon="11.0030"><ele>1250.0</ele><time>2024-05-01T08:00:30Z</time></trkpt>
      <trkpt lat="47.0020" lon="11.0040"><ele>1230.0</ele><time>2024-05-01T08:00:40Z</time></trkpt>
      <trkpt lat="47.00099" lon="11.0050"><ele>1215.0</ele><time>2024-05-01T08:00:50Z</time></trkpt>
      <trkpt lat="47.0000" lon="11.0060"><ele>1205.0</ele><time>2024-05-01T08:01:00Z</time></trkpt>
    </trkseg>
    <trkseg>
      <trkpt lat="47.0200" lon="11.0200"><ele>900.0</ele></trkpt>
    </trkseg>
  </trk>
</gpx>
"#;

    /// Everything up to the first segment: copyright, waypoint and route
    /// extensions, track extensions.
    const RICH_HEAD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="Garmin Connect" xmlns="http://www.topografix.com/GPX/1/1" xmlns:gpxx="http://www.garmin.com/xmlschemas/GpxExtensions/v3">
  <metadata>
    <name>Ridge walk</name>
    <copyright author="Jane Doe">
      <year>2024</year>
      <license>https://creativecommons.org/licenses/by-sa/4.0/</license>
    </copyright>
  </metadata>
  <wpt lat="47.0100" lon="11.0100">
    <name>Spring</name>
    <extensions><gpxx:WaypointExtension><gpxx:Proximity>25</gpxx:Proximity></gpxx:WaypointExtension></extensions>
  </wpt>
  <rte>
    <name>Approach</name>
    <rtept lat="47.0000" lon="11.0000"/>
    <rtept lat="47.0005" lon="11.0005"/>
    <rtept lat="47.0010" lon="11.0010"/>
  </rte>
  <trk>
    <name>Ridge</name>
    <extensions><gpxx:TrackExtension><gpxx:DisplayColor>Red</gpxx:DisplayColor></gpxx:TrackExtension></extensions>
    <trkseg>"#;

    const RICH_SEGMENT: &str = r#"
      <trkpt lat="47.000" lon="11.000"><ele>1000</ele><time>2024-05-01T08:00:00Z</time></trkpt>
      <trkpt lat="47.001" lon="11.001"><ele>1001</ele><time>2024-05-01T08:00:10Z</time></trkpt>
      <!-- pause -->
      <trkpt lat="47.002" lon="11.002"><ele>1002</ele></trkpt>
      <trkpt lat="47.003" lon="11.003"/>
      <trkpt lat="47.004" lon="11.004"><ele>1004</ele><extensions><gpxx:Depth>0</gpxx:Depth></extensions></trkpt>
      <extensions><gpxx:SegmentNote>summit push</gpxx:SegmentNote></extensions>
    "#;

    const RICH_TAIL: &str = r#"</trkseg>
  </trk>
</gpx>
"#;

    fn rich_gpx() -> String {
        format!("{}{}{}", RICH_HEAD, RICH_SEGMENT, RICH_TAIL)
    }

    /// Straight west-east line with a ~1m wiggle on every other point.
    fn wiggly_line(n: usize) -> Vec<TrackPoint> {
        (0..n)
            .map(|i| {
                let wiggle = if i % 2 == 1 { 0.00001 } else { 0.0 };
                TrackPoint::new(47.0 + wiggle, 11.0 + i as f64 * 0.0005)
                    .with_elevation(1000.0 + i as f64)
            })
            .collect()
    }

    fn gpx_with_segments(segments: &[Vec<TrackPoint>]) -> Vec<u8> {
        let mut out = String::from(
            "<?xml version=\"1.0\"?>\n<gpx version=\"1.1\" creator=\"trail-tests\" xmlns=\"http://www.topografix.com/GPX/1/1\">\n  <trk>\n    <name>Synthetic</name>\n",
        );
        for points in segments {
            out.push_str("    <trkseg>\n");
            for p in points {
                out.push_str(&format!("      <trkpt lat=\"{}\" lon=\"{}\">", p.latitude, p.longitude));
                if let Some(ele) = p.elevation {
                    out.push_str(&format!("<ele>{}</ele>", ele));
                }
                out.push_str("</trkpt>\n");
            }
            out.push_str("    </trkseg>\n");
        }
        out.push_str("  </trk>\n</gpx>\n");
        out.into_bytes()
    }

    fn segment_points(data: &[u8], segment: usize) -> Vec<TrackPoint> {
        parse_gpx(data).unwrap().tracks[0].segments[segment]
            .points
            .iter()
            .map(|wp| TrackPoint {
                latitude: wp.point().y(),
                longitude: wp.point().x(),
                elevation: wp.elevation,
            })
            .collect()
    }

    #[test]
    fn test_small_wiggles_collapse_to_endpoints() {
        let points = wiggly_line(50);
        // 20m at 47° is ~0.00026°, far above the 0.00001° wiggle
        let tol = meters_to_degrees(20.0, 47.0);
        let kept = douglas_peucker_indices(&points, tol);
        assert_eq!(kept, vec![0, 49]);
    }

    #[test]
    fn test_spike_survives() {
        let mut points = wiggly_line(21);
        points[10].latitude += 0.01; // ~1.1km detour
        let kept = douglas_peucker_indices(&points, meters_to_degrees(20.0, 47.0));
        assert!(kept.contains(&10));
        assert_eq!(kept.first(), Some(&0));
        assert_eq!(kept.last(), Some(&20));
    }

    #[test]
    fn test_short_segments_pass_through() {
        let empty: Vec<TrackPoint> = vec![];
        assert!(douglas_peucker_indices(&empty, 0.001).is_empty());

        let single = vec![TrackPoint::new(47.0, 11.0)];
        assert_eq!(simplify_points(&single, 0.001), single);
    }

    #[test]
    fn test_zero_tolerance_keeps_non_collinear_points() {
        let points = wiggly_line(30);
        assert_eq!(simplify_points(&points, 0.0).len(), points.len());

        let tiny = meters_to_degrees(1e-6, 47.0);
        assert_eq!(simplify_points(&points, tiny).len(), points.len());

        let data = gpx_with_segments(&[points.clone()]);
        assert_eq!(simplify_gpx_bytes(&data, 0.0).unwrap(), data);
        assert_eq!(simplify_gpx_bytes(&data, -5.0).unwrap(), data);
    }

    #[test]
    fn test_point_count_never_grows_and_endpoints_preserved() {
        let data = gpx_with_segments(&[wiggly_line(40), wiggly_line(3), wiggly_line(1)]);
        for tolerance in [0.0, 0.5, 5.0, 20.0, 150.0] {
            let simplified = simplify_gpx_bytes(&data, tolerance).unwrap();
            for i in 0..3 {
                let before = segment_points(&data, i);
                let after = segment_points(&simplified, i);
                assert!(after.len() <= before.len());
                assert_eq!(after.first(), before.first());
                assert_eq!(after.last(), before.last());
            }
        }
    }

    #[test]
    fn test_elevation_carried_for_survivors() {
        // Straight climb to a summit and straight descent: only the summit is interior
        let points: Vec<TrackPoint> = (0..21)
            .map(|i| {
                let rise = 10.0 - (i as f64 - 10.0).abs();
                TrackPoint::new(47.0 + rise * 0.001, 11.0 + i as f64 * 0.0005)
                    .with_elevation(1000.0 + i as f64)
            })
            .collect();

        let simplified = simplify_gpx_bytes(&gpx_with_segments(&[points.clone()]), 20.0).unwrap();
        let kept = segment_points(&simplified, 0);
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[1], points[10]);
        assert_eq!(kept[1].elevation, Some(1010.0));
    }

    #[test]
    fn test_missing_elevation_is_not_synthesized() {
        let points: Vec<TrackPoint> = (0..10)
            .map(|i| TrackPoint::new(47.0, 11.0 + i as f64 * 0.001))
            .collect();
        let simplified = simplify_gpx_bytes(&gpx_with_segments(&[points]), 20.0).unwrap();
        assert!(segment_points(&simplified, 0)
            .iter()
            .all(|p| p.elevation.is_none()));
    }

    #[test]
    fn test_stable_at_fixed_tolerance() {
        let mut points = wiggly_line(60);
        points[15].latitude += 0.003;
        points[40].latitude -= 0.002;

        let once = simplify_gpx_bytes(&gpx_with_segments(&[points]), 25.0).unwrap();
        let twice = simplify_gpx_bytes(&once, 25.0).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_empty_document_unchanged() {
        let data = gpx_with_segments(&[vec![], vec![]]);
        assert_eq!(simplify_gpx_bytes(&data, 20.0).unwrap(), data);
    }

    #[test]
    fn test_reference_latitude_skips_empty_segments() {
        let data = gpx_with_segments(&[vec![], vec![TrackPoint::new(-33.9, 18.4)]]);
        assert_eq!(reference_latitude(&parse_gpx(&data).unwrap()), Some(-33.9));
    }

    #[test]
    fn test_non_segment_content_copied_verbatim() {
        let input = rich_gpx();
        let out = String::from_utf8(simplify_gpx_bytes(input.as_bytes(), 20.0).unwrap()).unwrap();

        assert!(out.starts_with(RICH_HEAD), "content before the segment changed:\n{}", out);
        assert!(out.ends_with(RICH_TAIL), "content after the segment changed:\n{}", out);
        assert!(out.contains("<license>https://creativecommons.org/licenses/by-sa/4.0/</license>"));
        assert!(out.contains("<gpxx:Proximity>25</gpxx:Proximity>"));
        assert!(out.contains("<gpxx:DisplayColor>Red</gpxx:DisplayColor>"));
        assert!(out.contains(r#"<rtept lat="47.0005" lon="11.0005"/>"#));
    }

    #[test]
    fn test_segment_rewrite_keeps_survivors_verbatim() {
        let input = rich_gpx();
        let out = String::from_utf8(simplify_gpx_bytes(input.as_bytes(), 20.0).unwrap()).unwrap();

        let segment = &out[RICH_HEAD.len()..out.len() - RICH_TAIL.len()];
        assert_eq!(
            segment,
            r#"
      <trkpt lat="47.000" lon="11.000"><ele>1000</ele><time>2024-05-01T08:00:00Z</time></trkpt>
      <!-- pause -->
      <trkpt lat="47.004" lon="11.004"><ele>1004</ele><extensions><gpxx:Depth>0</gpxx:Depth></extensions></trkpt>
      <extensions><gpxx:SegmentNote>summit push</gpxx:SegmentNote></extensions>
    "#
        );
    }

    #[test]
    fn test_sample_reduced_around_peak() {
        let out = simplify_gpx_bytes(SAMPLE_GPX.as_bytes(), 20.0).unwrap();
        let text = String::from_utf8(out.clone()).unwrap();

        // Peak kept, wiggles dropped; the single-point segment is untouched
        let first = segment_points(&out, 0);
        assert_eq!(first.len(), 3);
        assert_eq!(first[1].elevation, Some(1250.0));
        assert_eq!(
            segment_points(&out, 1),
            segment_points(SAMPLE_GPX.as_bytes(), 1)
        );

        // Survivors keep their timestamps
        assert!(text.contains("<time>2024-05-01T08:00:30Z</time>"));
        assert!(!text.contains("2024-05-01T08:00:10Z"));
        assert!(text.contains("<name>Hut</name>"));
        assert!(out.len() < SAMPLE_GPX.len());
    }

    #[test]
    fn test_simplify_bytes_deterministic() {
        let a = simplify_gpx_bytes(SAMPLE_GPX.as_bytes(), 20.0).unwrap();
        let b = simplify_gpx_bytes(SAMPLE_GPX.as_bytes(), 20.0).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_no_tracks_returns_original_bytes() {
        let data = br#"<?xml version="1.0"?>
<gpx version="1.1" creator="t" xmlns="http://www.topografix.com/GPX/1/1">
  <wpt lat="47.0" lon="11.0"><name>Only a waypoint</name></wpt>
</gpx>"#;
        let out = simplify_gpx_bytes(data, 20.0).unwrap();
        assert_eq!(out, data.to_vec());
    }

    #[test]
    fn test_malformed_input_is_distinct_error() {
        let result = simplify_gpx_bytes(b"this is not a gpx file", 20.0);
        assert!(matches!(result, Err(ReduxError::MalformedTrackFile { .. })));

        let result = GpxSimplifier.simplify(b"<gpx version=\"1.1\"><trk><trkseg>", 20.0);
        assert!(matches!(result, Err(ReduxError::MalformedTrackFile { .. })));
    }
}
