//! Layer decoding: header scan, per-kind record readers, arc cache,
//! sequential iteration with optional filters, and rewind.
//!
//! A layer is a single-threaded, forward-only pass over one open stream.
//! The record kind is fixed by the magic header for the lifetime of the
//! stream; polygon mode additionally front-loads an arc section into a
//! cache that ring construction consults later in the same pass.

use std::collections::HashMap;
use std::io::{BufRead, Seek};

use encoding_rs::Encoding;
use geo::Intersects;
use tracing::{debug, warn};

use crate::error::WmapError;
use crate::line::{default_encoding, LineReader};
use crate::tokenize::{parse_float_lenient, parse_int_lenient, read_parse_line};
use crate::types::{Feature, Geometry, RecordKind, Vertex};

/// Predicate applied to every decoded feature before it is yielded.
pub type AttributeFilter = Box<dyn Fn(&Feature) -> bool>;

/// One decoded WMAP layer with its own cursor and arc cache.
pub struct Layer<R> {
    reader: LineReader<R>,
    kind: RecordKind,
    /// Declared record count; iteration is bounded by it.
    feature_count: u64,
    emitted: u64,
    /// Set when a short record ends the usable data before the declared
    /// count; cleared only by `reset_reading`.
    done: bool,
    /// Physical lines between stream start and the first record (header,
    /// count line, and the kind-3 arc/node preamble).
    data_offset: u64,
    /// Arc ID -> polyline points, populated only in polygon mode.
    arcs: HashMap<i64, Vec<Vertex>>,
    spatial_filter: Option<geo::Rect<f64>>,
    attribute_filter: Option<AttributeFilter>,
}

impl<R> std::fmt::Debug for Layer<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer")
            .field("kind", &self.kind)
            .field("feature_count", &self.feature_count)
            .field("emitted", &self.emitted)
            .field("done", &self.done)
            .field("data_offset", &self.data_offset)
            .finish_non_exhaustive()
    }
}

impl<R: BufRead> Layer<R> {
    /// Decodes the header, the record count, and (in polygon mode) the
    /// arc and node sections, leaving the cursor at the first record.
    pub fn from_reader(reader: R) -> Result<Self, WmapError> {
        Self::from_reader_with_encoding(reader, default_encoding())
    }

    pub fn from_reader_with_encoding(
        reader: R,
        encoding: &'static Encoding,
    ) -> Result<Self, WmapError> {
        let mut reader = LineReader::with_encoding(reader, encoding);

        let header = reader
            .read_line()?
            .ok_or_else(|| WmapError::truncated("magic header"))?;
        let kind = RecordKind::from_magic(&header).ok_or_else(|| WmapError::FormatMismatch {
            found: header.trim().to_string(),
        })?;
        debug!(magic = kind.magic(), "recognized WMAP header");

        // Lenient count: non-numeric or negative declares zero records,
        // matching the legacy integer parsing.
        let mut feature_count = read_count(&mut reader)?;

        let mut arcs = HashMap::new();
        if kind == RecordKind::Polygon {
            arcs = decode_arc_section(&mut reader, feature_count)?;
            skip_node_section(&mut reader)?;
            feature_count = read_count(&mut reader)?;
        }

        let data_offset = reader.lines_read();
        Ok(Self {
            reader,
            kind,
            feature_count,
            emitted: 0,
            done: false,
            data_offset,
            arcs,
            spatial_filter: None,
            attribute_filter: None,
        })
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    /// Declared record count from the file's count line.
    pub fn feature_count(&self) -> u64 {
        self.feature_count
    }

    /// The format carries no spatial reference.
    pub fn spatial_ref(&self) -> Option<&str> {
        None
    }

    /// Schema: the single string attribute every feature carries.
    pub fn fields(&self) -> &'static [&'static str] {
        &[crate::types::ATTR_LAYER]
    }

    /// Restrict iteration to features whose bounding box intersects `rect`.
    /// `None` clears the filter.
    pub fn set_spatial_filter(&mut self, rect: Option<geo::Rect<f64>>) {
        self.spatial_filter = rect;
    }

    /// Restrict iteration to features passing `predicate`.
    pub fn set_attribute_filter(&mut self, predicate: Option<AttributeFilter>) {
        self.attribute_filter = predicate;
    }

    /// Yields the next feature passing the current filters, or `None` at
    /// end of data. A short record ends the data permanently for this pass.
    pub fn next_feature(&mut self) -> Result<Option<Feature>, WmapError> {
        loop {
            let Some(feature) = self.next_unfiltered()? else {
                return Ok(None);
            };
            if self.matches_filters(&feature) {
                return Ok(Some(feature));
            }
        }
    }

    fn next_unfiltered(&mut self) -> Result<Option<Feature>, WmapError> {
        if self.done || self.emitted >= self.feature_count {
            return Ok(None);
        }
        let feature = match self.kind {
            RecordKind::Point => self.read_point()?,
            RecordKind::Polyline => self.read_polyline()?,
            RecordKind::Polygon => self.read_polygon()?,
        };
        match feature {
            Some(feature) => {
                self.emitted += 1;
                Ok(Some(feature))
            }
            None => {
                if self.emitted < self.feature_count {
                    debug!(
                        emitted = self.emitted,
                        declared = self.feature_count,
                        "stream ended before the declared record count"
                    );
                }
                self.done = true;
                Ok(None)
            }
        }
    }

    fn matches_filters(&self, feature: &Feature) -> bool {
        if let Some(rect) = &self.spatial_filter {
            match feature.geometry.bounding_rect() {
                Some(bbox) if rect.intersects(&bbox) => {}
                _ => return false,
            }
        }
        if let Some(predicate) = &self.attribute_filter {
            if !predicate(feature) {
                return false;
            }
        }
        true
    }

    /// One comma-tokenized line: x, y, feature ID. Fewer than two fields
    /// ends the usable data.
    fn read_point(&mut self) -> Result<Option<Feature>, WmapError> {
        let Some(fields) = read_parse_line(&mut self.reader, ',', true)? else {
            return Ok(None);
        };
        if fields.len() < 2 {
            return Ok(None);
        }
        let vertex = Vertex::new(
            parse_float_lenient(&fields[0]),
            parse_float_lenient(&fields[1]),
        );
        let fid = fields.get(2).map(|f| parse_int_lenient(f));
        Ok(Some(Feature::new(
            fid,
            Geometry::Point(vertex),
            RecordKind::Point,
        )))
    }

    /// Label line, point count, that many point lines, one trailing
    /// separator line.
    fn read_polyline(&mut self) -> Result<Option<Feature>, WmapError> {
        let Some(label) = self.reader.read_line()? else {
            return Ok(None);
        };
        if label.is_empty() {
            return Ok(None);
        }
        let Some(count_line) = self.reader.read_line()? else {
            return Ok(None);
        };
        let point_count = parse_int_lenient(&count_line);

        let mut points = Vec::with_capacity(point_count.max(0) as usize);
        for _ in 0..point_count {
            let Some(fields) = read_parse_line(&mut self.reader, ',', true)? else {
                return Ok(None);
            };
            if fields.len() < 2 {
                return Ok(None);
            }
            points.push(Vertex::new(
                parse_float_lenient(&fields[0]),
                parse_float_lenient(&fields[1]),
            ));
        }
        self.reader.read_line()?; // record separator

        Ok(Some(Feature::new(
            None,
            Geometry::Polyline(points),
            RecordKind::Polyline,
        )))
    }

    /// Label line, `numOfArc` line, then `numOfArc - 1` signed arc
    /// references stitched into the ring, one trailing line.
    ///
    /// The off-by-one against the declared arc count is preserved from the
    /// format as observed; files in the wild store one more count value
    /// than arcs contributing geometry.
    fn read_polygon(&mut self) -> Result<Option<Feature>, WmapError> {
        let Some(label) = self.reader.read_line()? else {
            return Ok(None);
        };
        if label.is_empty() {
            return Ok(None);
        }
        let Some(count_line) = self.reader.read_line()? else {
            return Ok(None);
        };
        let num_of_arc = parse_int_lenient(&count_line);

        let mut ring: Vec<Vertex> = Vec::new();
        for _ in 1..num_of_arc {
            let Some(ref_line) = self.reader.read_line()? else {
                return Ok(None);
            };
            let arc_id = parse_int_lenient(&ref_line);
            let key = arc_id.abs();
            let Some(arc) = self.arcs.get(&key) else {
                warn!(arc_id = key, "polygon ring references an arc missing from the arc section");
                return Err(WmapError::ArcNotFound { id: key });
            };
            if arc_id > 0 {
                ring.extend(arc.iter().copied());
            } else {
                // Reverse traversal, z forced back to 0.
                ring.extend(arc.iter().rev().map(|v| Vertex { z: 0.0, ..*v }));
            }
        }
        self.reader.read_line()?; // record separator

        let outer: Vec<(f64, f64)> = ring.iter().map(|v| (v.x, v.y)).collect();
        Ok(Some(Feature::new(
            None,
            Geometry::Polygon(outer),
            RecordKind::Polygon,
        )))
    }
}

impl<R: BufRead + Seek> Layer<R> {
    /// Rewinds to the first record: seek to the stream start, then skip the
    /// remembered number of preamble lines. The header is not re-scanned
    /// and the arc cache is kept; it was built from these same bytes.
    pub fn reset_reading(&mut self) -> Result<(), WmapError> {
        self.reader.rewind()?;
        for _ in 0..self.data_offset {
            self.reader.read_line()?;
        }
        self.emitted = 0;
        self.done = false;
        Ok(())
    }
}

/// Write-path surface, present for host-catalog compatibility only.
impl<R> Layer<R> {
    pub fn create_feature(&mut self, _feature: &Feature) -> Result<(), WmapError> {
        Err(WmapError::Unsupported("feature creation"))
    }

    pub fn set_feature(&mut self, _feature: &Feature) -> Result<(), WmapError> {
        Err(WmapError::Unsupported("feature update"))
    }

    pub fn delete_feature(&mut self, _fid: i64) -> Result<(), WmapError> {
        Err(WmapError::Unsupported("feature deletion"))
    }

    pub fn create_field(&mut self, _name: &str) -> Result<(), WmapError> {
        Err(WmapError::Unsupported("field creation"))
    }

    pub fn create_spatial_index(&mut self, _max_depth: u32) -> Result<(), WmapError> {
        Err(WmapError::Unsupported("spatial index creation"))
    }

    pub fn drop_spatial_index(&mut self) -> Result<(), WmapError> {
        Err(WmapError::Unsupported("spatial index removal"))
    }

    pub fn repack(&mut self) -> Result<(), WmapError> {
        Err(WmapError::Unsupported("repack"))
    }
}

/// Lenient record-count line: absent, non-numeric or negative all mean
/// zero records.
fn read_count<R: BufRead>(reader: &mut LineReader<R>) -> Result<u64, WmapError> {
    let count = reader
        .read_line()?
        .map(|line| parse_int_lenient(&line))
        .unwrap_or(0);
    Ok(count.max(0) as u64)
}

/// Decodes the inline arc table of a polygon-mode file. Each arc is a
/// 3-line prologue, a point count, that many point lines, and the arc's
/// own ID line. Any short read here is fatal: the ring builder depends on
/// every arc that the file promised.
fn decode_arc_section<R: BufRead>(
    reader: &mut LineReader<R>,
    arc_count: u64,
) -> Result<HashMap<i64, Vec<Vertex>>, WmapError> {
    let mut arcs = HashMap::with_capacity(arc_count as usize);
    for _ in 0..arc_count {
        for _ in 0..3 {
            must_read_line(reader, "arc prologue")?;
        }
        let point_count = parse_int_lenient(&must_read_line(reader, "arc point count")?);

        let mut points = Vec::with_capacity(point_count.max(0) as usize);
        for _ in 0..point_count {
            let fields = read_parse_line(reader, ',', true)?
                .ok_or_else(|| WmapError::truncated("arc point"))?;
            if fields.len() < 2 {
                return Err(WmapError::truncated("arc point"));
            }
            points.push(Vertex::new(
                parse_float_lenient(&fields[0]),
                parse_float_lenient(&fields[1]),
            ));
        }

        let id_fields =
            read_parse_line(reader, ',', true)?.ok_or_else(|| WmapError::truncated("arc id"))?;
        let id = id_fields
            .first()
            .map(|f| parse_int_lenient(f))
            .ok_or_else(|| WmapError::truncated("arc id"))?;
        arcs.insert(id, points);
    }
    Ok(arcs)
}

/// Consumes the node/arc-adjacency table. The format stores it for
/// topological bookkeeping the decoder never uses; the lines are skipped
/// only to keep the cursor correct. Note the table holds one fewer node
/// group than the declared node count.
fn skip_node_section<R: BufRead>(reader: &mut LineReader<R>) -> Result<(), WmapError> {
    let node_count = parse_int_lenient(&must_read_line(reader, "node count")?);
    for _ in 1..node_count {
        must_read_line(reader, "node label")?;
        let arc_ref_count = parse_int_lenient(&must_read_line(reader, "node arc count")?);
        for _ in 0..arc_ref_count {
            must_read_line(reader, "node arc reference")?;
        }
    }
    Ok(())
}

fn must_read_line<R: BufRead>(
    reader: &mut LineReader<R>,
    context: &'static str,
) -> Result<String, WmapError> {
    reader
        .read_line()?
        .ok_or_else(|| WmapError::truncated(context))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn layer(text: &str) -> Layer<Cursor<Vec<u8>>> {
        Layer::from_reader(Cursor::new(text.as_bytes().to_vec())).unwrap()
    }

    fn collect(layer: &mut Layer<Cursor<Vec<u8>>>) -> Vec<Feature> {
        let mut out = Vec::new();
        while let Some(f) = layer.next_feature().unwrap() {
            out.push(f);
        }
        out
    }

    #[test]
    fn test_header_mismatch_is_fatal() {
        let err = Layer::from_reader(Cursor::new(b"GARBAGE\n3\n".to_vec())).unwrap_err();
        assert!(matches!(err, WmapError::FormatMismatch { .. }));
    }

    #[test]
    fn test_magic_is_case_insensitive() {
        let l = layer("wmap9022\n0\n");
        assert_eq!(l.kind(), RecordKind::Point);
    }

    #[test]
    fn test_non_numeric_count_means_zero_records() {
        let mut l = layer("WMAP9022\nnot-a-number\n1.0,2.0,5\n");
        assert_eq!(l.feature_count(), 0);
        assert!(l.next_feature().unwrap().is_none());
    }

    #[test]
    fn test_negative_count_means_zero_records() {
        let mut l = layer("WMAP9022\n-4\n1.0,2.0,5\n");
        assert!(l.next_feature().unwrap().is_none());
    }

    #[test]
    fn test_point_records() {
        let mut l = layer("WMAP9022\n2\n1.5,2.5,10\n-3.0,4.0,11\n");
        let features = collect(&mut l);
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].fid, Some(10));
        assert_eq!(features[0].layer_name(), "WAT_1");
        assert_eq!(
            features[0].geometry,
            Geometry::Point(Vertex::new(1.5, 2.5))
        );
        assert_eq!(features[1].fid, Some(11));
    }

    #[test]
    fn test_point_iteration_bounded_by_declared_count() {
        // Three data lines but only two declared.
        let mut l = layer("WMAP9022\n2\n1,1,1\n2,2,2\n3,3,3\n");
        assert_eq!(collect(&mut l).len(), 2);
    }

    #[test]
    fn test_short_point_record_stops_iteration() {
        let mut l = layer("WMAP9022\n3\n1.0,2.0,1\n5\n9.0,9.0,3\n");
        let features = collect(&mut l);
        // The short record ends the usable data; nothing after it is emitted.
        assert_eq!(features.len(), 1);
        assert!(l.next_feature().unwrap().is_none());
    }

    #[test]
    fn test_polyline_end_to_end() {
        let mut l = layer("WMAP9021\n1\nL1\n2\n0,0\n1,1\n\n");
        let features = collect(&mut l);
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].layer_name(), "WAL_1");
        assert_eq!(features[0].fid, None);
        assert_eq!(
            features[0].geometry,
            Geometry::Polyline(vec![Vertex::new(0.0, 0.0), Vertex::new(1.0, 1.0)])
        );
    }

    #[test]
    fn test_truncated_polyline_points_end_iteration() {
        let mut l = layer("WMAP9021\n1\nL1\n3\n0,0\n1,1\n");
        assert!(collect(&mut l).is_empty());
    }

    const POLYGON_FILE: &str = "WMAP9023\n\
        2\n\
        arc\nA1\n-\n\
        2\n0,0\n10,0\n\
        3\n\
        arc\nA2\n-\n\
        3\n10,0\n10,10\n0,0\n\
        2\n\
        3\n\
        N1\n2\n3\n-2\n\
        N2\n1\n3\n\
        1\n\
        F1\n\
        3\n\
        3\n\
        -2\n\
        \n";

    #[test]
    fn test_polygon_arc_stitching_signed_references() {
        // Arc list [3, -2]: arc 3 in stored order, then arc 2 reversed.
        let mut l = layer(POLYGON_FILE);
        assert_eq!(l.kind(), RecordKind::Polygon);
        assert_eq!(l.feature_count(), 1);

        let features = collect(&mut l);
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].layer_name(), "WAP_1");
        assert_eq!(
            features[0].geometry,
            Geometry::Polygon(vec![
                (0.0, 0.0),
                (10.0, 0.0),
                (0.0, 0.0),
                (10.0, 10.0),
                (10.0, 0.0),
            ])
        );
    }

    #[test]
    fn test_polygon_missing_arc_is_an_explicit_error() {
        // Same file but the feature references arc 9, never defined.
        let text = POLYGON_FILE.replace("F1\n3\n3\n-2\n", "F1\n3\n9\n-2\n");
        let mut l = layer(&text);
        let err = l.next_feature().unwrap_err();
        assert!(matches!(err, WmapError::ArcNotFound { id: 9 }));
    }

    #[test]
    fn test_truncated_arc_section_is_fatal() {
        let err = Layer::from_reader(Cursor::new(
            b"WMAP9023\n1\narc\nA1\n-\n2\n0,0\n".to_vec(),
        ))
        .unwrap_err();
        assert!(matches!(err, WmapError::Truncated { .. }));
    }

    #[test]
    fn test_reset_reading_reproduces_identical_sequence() {
        let mut l = layer(POLYGON_FILE);
        let first = collect(&mut l);
        assert_eq!(first.len(), 1);
        assert!(l.next_feature().unwrap().is_none());

        l.reset_reading().unwrap();
        let second = collect(&mut l);
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.geometry, b.geometry);
            assert_eq!(a.fid, b.fid);
            assert_eq!(a.properties, b.properties);
        }
    }

    #[test]
    fn test_reset_reading_after_short_record() {
        let mut l = layer("WMAP9022\n2\n1,1,1\n2\n");
        assert_eq!(collect(&mut l).len(), 1);
        l.reset_reading().unwrap();
        assert_eq!(collect(&mut l).len(), 1);
    }

    #[test]
    fn test_spatial_filter_bbox() {
        let mut l = layer("WMAP9022\n3\n0,0,1\n50,50,2\n2,2,3\n");
        l.set_spatial_filter(Some(geo::Rect::new(
            geo::Coord { x: -1.0, y: -1.0 },
            geo::Coord { x: 10.0, y: 10.0 },
        )));
        let features = collect(&mut l);
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].fid, Some(1));
        assert_eq!(features[1].fid, Some(3));
    }

    #[test]
    fn test_attribute_filter() {
        let mut l = layer("WMAP9022\n3\n0,0,1\n1,1,2\n2,2,3\n");
        l.set_attribute_filter(Some(Box::new(|f: &Feature| f.fid == Some(2))));
        let features = collect(&mut l);
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].fid, Some(2));
    }

    #[test]
    fn test_write_surface_is_unsupported() {
        let mut l = layer("WMAP9022\n0\n");
        assert!(matches!(l.repack(), Err(WmapError::Unsupported(_))));
        assert!(matches!(
            l.delete_feature(1),
            Err(WmapError::Unsupported(_))
        ));
        assert!(matches!(
            l.create_field("name"),
            Err(WmapError::Unsupported(_))
        ));
        assert!(matches!(
            l.create_spatial_index(8),
            Err(WmapError::Unsupported(_))
        ));
    }

    #[test]
    fn test_schema_surface() {
        let l = layer("WMAP9021\n0\n");
        assert_eq!(l.fields(), &["Layer"]);
        assert!(l.spatial_ref().is_none());
    }
}
