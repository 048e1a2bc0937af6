//! Data model for decoded WMAP features

use std::collections::HashMap;

use geo::BoundingRect;

/// Name of the single attribute every WMAP feature carries
pub const ATTR_LAYER: &str = "Layer";

/// One coordinate of a point or polyline.
///
/// The format stores x and y; z exists because the record readers assign it
/// (always 0.0, and reversed-arc traversal re-forces it to 0.0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vertex {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }
}

/// Geometry decoded from one WMAP record.
///
/// A polygon is a single outer ring with coordinate dimension fixed to 2;
/// ring closure is the caller's responsibility, the decoder does not
/// enforce it.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Vertex),
    Polyline(Vec<Vertex>),
    Polygon(Vec<(f64, f64)>),
}

impl Geometry {
    /// Converts into `geo` types for the geospatial ecosystem (z dropped).
    pub fn to_geo(&self) -> geo::Geometry<f64> {
        match self {
            Geometry::Point(v) => geo::Geometry::Point(geo::Point::new(v.x, v.y)),
            Geometry::Polyline(pts) => geo::Geometry::LineString(geo::LineString::from(
                pts.iter().map(|v| (v.x, v.y)).collect::<Vec<_>>(),
            )),
            Geometry::Polygon(ring) => geo::Geometry::Polygon(geo::Polygon::new(
                geo::LineString::from(ring.clone()),
                Vec::new(),
            )),
        }
    }

    /// Axis-aligned bounding rectangle, `None` for empty geometries.
    pub fn bounding_rect(&self) -> Option<geo::Rect<f64>> {
        self.to_geo().bounding_rect()
    }
}

/// A decoded feature: optional identifier, geometry, and the sub-layer
/// attribute (`WAT_1`, `WAL_1` or `WAP_1`).
///
/// Point records carry their identifier in the record itself; polyline and
/// polygon records have none.
#[derive(Debug, Clone)]
pub struct Feature {
    pub fid: Option<i64>,
    pub geometry: Geometry,
    pub properties: HashMap<String, String>,
}

impl Feature {
    pub(crate) fn new(fid: Option<i64>, geometry: Geometry, kind: RecordKind) -> Self {
        let mut properties = HashMap::with_capacity(1);
        properties.insert(ATTR_LAYER.to_string(), kind.sub_layer().to_string());
        Self {
            fid,
            geometry,
            properties,
        }
    }

    /// The originating sub-layer name.
    pub fn layer_name(&self) -> &str {
        self.properties.get(ATTR_LAYER).map_or("", String::as_str)
    }
}

/// The three record kinds a WMAP file can hold, selected once by the magic
/// header and fixed for the lifetime of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Point,
    Polyline,
    Polygon,
}

impl RecordKind {
    /// Matches the header line against the three magic tokens,
    /// case-insensitively.
    pub fn from_magic(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.eq_ignore_ascii_case("WMAP9022") {
            Some(Self::Point)
        } else if line.eq_ignore_ascii_case("WMAP9021") {
            Some(Self::Polyline)
        } else if line.eq_ignore_ascii_case("WMAP9023") {
            Some(Self::Polygon)
        } else {
            None
        }
    }

    /// Matches a file extension against the historical allow-list.
    pub fn from_extension(ext: &str) -> Option<Self> {
        if ext.eq_ignore_ascii_case("wat") {
            Some(Self::Point)
        } else if ext.eq_ignore_ascii_case("wal") {
            Some(Self::Polyline)
        } else if ext.eq_ignore_ascii_case("wap") {
            Some(Self::Polygon)
        } else {
            None
        }
    }

    /// The magic header token written at the top of files of this kind.
    pub const fn magic(self) -> &'static str {
        match self {
            Self::Point => "WMAP9022",
            Self::Polyline => "WMAP9021",
            Self::Polygon => "WMAP9023",
        }
    }

    /// Value of the `Layer` attribute for features of this kind.
    pub const fn sub_layer(self) -> &'static str {
        match self {
            Self::Point => "WAT_1",
            Self::Polyline => "WAL_1",
            Self::Polygon => "WAP_1",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_magic_case_insensitive() {
        assert_eq!(RecordKind::from_magic("WMAP9022"), Some(RecordKind::Point));
        assert_eq!(
            RecordKind::from_magic("wmap9021"),
            Some(RecordKind::Polyline)
        );
        assert_eq!(
            RecordKind::from_magic("  WmAp9023  "),
            Some(RecordKind::Polygon)
        );
        assert_eq!(RecordKind::from_magic("WMAP9024"), None);
        assert_eq!(RecordKind::from_magic(""), None);
    }

    #[test]
    fn test_from_extension() {
        assert_eq!(RecordKind::from_extension("WAT"), Some(RecordKind::Point));
        assert_eq!(
            RecordKind::from_extension("wal"),
            Some(RecordKind::Polyline)
        );
        assert_eq!(
            RecordKind::from_extension("Wap"),
            Some(RecordKind::Polygon)
        );
        assert_eq!(RecordKind::from_extension("shp"), None);
    }

    #[test]
    fn test_point_to_geo() {
        let geom = Geometry::Point(Vertex::new(1.5, -2.0));
        match geom.to_geo() {
            geo::Geometry::Point(p) => {
                assert_eq!(p.x(), 1.5);
                assert_eq!(p.y(), -2.0);
            }
            other => panic!("expected point, got {other:?}"),
        }
    }

    #[test]
    fn test_polyline_bounding_rect() {
        let geom = Geometry::Polyline(vec![Vertex::new(0.0, 0.0), Vertex::new(4.0, 2.0)]);
        let rect = geom.bounding_rect().unwrap();
        assert_eq!(rect.min().x, 0.0);
        assert_eq!(rect.max().x, 4.0);
        assert_eq!(rect.max().y, 2.0);
    }

    #[test]
    fn test_empty_polyline_has_no_bbox() {
        assert!(Geometry::Polyline(Vec::new()).bounding_rect().is_none());
    }

    #[test]
    fn test_feature_layer_name() {
        let f = Feature::new(Some(7), Geometry::Point(Vertex::new(0.0, 0.0)), RecordKind::Point);
        assert_eq!(f.layer_name(), "WAT_1");
        assert_eq!(f.fid, Some(7));
    }
}
