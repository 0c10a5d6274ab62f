use std::collections::HashMap;
use std::io::{BufRead, Read};
use std::path::Path;

use crate::pointcloud::PointCloud;

const MAX_POINT_STEP: usize = 1024;
const MAX_POINTS: usize = 50_000_000;

/// Error types for the PCD module.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PcdError {
    /// Failed to read PCD file
    #[error("Failed to read PCD file")]
    Io(#[from] std::io::Error),

    /// Unsupported header
    #[error("Unsupported PCD header: {0}")]
    UnsupportedProperty(String),

    /// Malformed PCD header
    #[error("Malformed PCD header")]
    MalformedHeader,

    /// Malformed point record in the data section
    #[error("Malformed PCD point record {0}")]
    MalformedPoint(usize),

    /// Invalid PCD file extension
    #[error("Invalid PCD file extension. Got:{0}")]
    InvalidFileExtension(String),
}

/// Encoding of the data section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PcdData {
    Ascii,
    Binary,
}

/// Describes a single field in a PCD point record
#[derive(Debug)]
struct PcdField {
    byte_offset: usize, // byte offset within a binary point
    column: usize,      // first token index within an ascii line
    size: usize,        // size of one element (bytes)
}

#[derive(Debug)]
struct PcdLayout {
    fields: HashMap<String, PcdField>,
    point_step: usize,  // total bytes per point
    num_columns: usize, // total tokens per ascii line
    num_points: usize,
    data: PcdData,
}

impl PcdLayout {
    fn field(&self, name: &str) -> Result<&PcdField, PcdError> {
        self.fields
            .get(name)
            .ok_or_else(|| PcdError::UnsupportedProperty(format!("missing field {name}")))
    }
}

/// Read a little-endian float of 4 or 8 bytes from a byte buffer
#[inline]
fn read_float(buf: &[u8], field: &PcdField) -> Option<f64> {
    let slice = buf.get(field.byte_offset..field.byte_offset + field.size)?;
    match field.size {
        4 => Some(f32::from_le_bytes(slice.try_into().ok()?) as f64),
        8 => Some(f64::from_le_bytes(slice.try_into().ok()?)),
        _ => None,
    }
}

#[inline]
fn read_xyz(buf: &[u8], fields: [&PcdField; 3]) -> Option<[f64; 3]> {
    Some([
        read_float(buf, fields[0])?,
        read_float(buf, fields[1])?,
        read_float(buf, fields[2])?,
    ])
}

fn parse_values<T: std::str::FromStr>(
    tokens: std::str::SplitWhitespace<'_>,
) -> Result<Vec<T>, PcdError> {
    tokens
        .map(|v| v.parse::<T>().map_err(|_| PcdError::MalformedHeader))
        .collect()
}

fn parse_pcd_layout<R: BufRead>(reader: &mut R) -> Result<PcdLayout, PcdError> {
    let mut field_names: Vec<String> = Vec::new();
    let mut sizes: Vec<usize> = Vec::new();
    let mut types: Vec<char> = Vec::new();
    let mut counts: Vec<usize> = Vec::new();
    let mut points: Option<usize> = None;
    let mut width: Option<usize> = None;
    let mut height: Option<usize> = None;

    let data = loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            return Err(PcdError::MalformedHeader);
        }
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut it = line.split_whitespace();
        match it.next() {
            Some("DATA") => match it.next() {
                Some("ascii") => break PcdData::Ascii,
                Some("binary") => break PcdData::Binary,
                Some(other) => return Err(PcdError::UnsupportedProperty(format!("DATA {other}"))),
                None => return Err(PcdError::MalformedHeader),
            },
            Some("SIZE") => sizes = parse_values(it)?,
            Some("TYPE") => {
                types = it
                    .map(|v| v.chars().next().ok_or(PcdError::MalformedHeader))
                    .collect::<Result<Vec<_>, _>>()?;
            }
            Some("COUNT") => counts = parse_values(it)?,
            Some("WIDTH") => width = parse_values(it)?.first().copied(),
            Some("HEIGHT") => height = parse_values(it)?.first().copied(),
            Some("POINTS") => points = parse_values(it)?.first().copied(),
            Some("FIELDS") => field_names = it.map(String::from).collect(),
            _ => {}
        }
    };

    if field_names.is_empty()
        || sizes.len() != field_names.len()
        || types.len() != field_names.len()
        || (!counts.is_empty() && counts.len() != field_names.len())
    {
        return Err(PcdError::MalformedHeader);
    }

    // POINTS is optional in old headers, fall back to WIDTH * HEIGHT
    let num_points = match (points, width, height) {
        (Some(points), _, _) => points,
        (None, Some(width), height) => width
            .checked_mul(height.unwrap_or(1))
            .ok_or(PcdError::MalformedHeader)?,
        _ => return Err(PcdError::MalformedHeader),
    };

    // Compute byte offsets and ascii columns for each field
    let mut byte_offset = 0usize;
    let mut column = 0usize;
    let mut fields = HashMap::new();

    for (i, name) in field_names.iter().enumerate() {
        // If COUNT is omitted, the PCD format defaults the count to 1
        let count = counts.get(i).copied().unwrap_or(1);
        let size = sizes[i];

        if matches!(name.as_str(), "x" | "y" | "z")
            && !((size == 4 || size == 8) && count == 1 && types[i] == 'F')
        {
            return Err(PcdError::UnsupportedProperty(format!(
                "field {name} must be a single F4 or F8 value"
            )));
        }

        let field = PcdField {
            byte_offset,
            column,
            size,
        };

        byte_offset = size
            .checked_mul(count)
            .and_then(|bytes| byte_offset.checked_add(bytes))
            .ok_or(PcdError::MalformedHeader)?;
        column += count;

        if byte_offset > MAX_POINT_STEP {
            return Err(PcdError::MalformedHeader);
        }

        if fields.insert(name.clone(), field).is_some() {
            return Err(PcdError::MalformedHeader);
        }
    }

    Ok(PcdLayout {
        fields,
        point_step: byte_offset,
        num_columns: column,
        num_points,
        data,
    })
}

fn read_binary_points<R: Read>(
    reader: &mut R,
    layout: &PcdLayout,
) -> Result<Vec<[f64; 3]>, PcdError> {
    let (fx, fy, fz) = (layout.field("x")?, layout.field("y")?, layout.field("z")?);

    if layout.point_step == 0 {
        return Err(PcdError::MalformedHeader);
    }

    let mut buffer = vec![0u8; layout.point_step];
    let mut points = Vec::with_capacity(layout.num_points);

    for i in 0..layout.num_points {
        reader.read_exact(&mut buffer)?;
        let point = read_xyz(&buffer, [fx, fy, fz]).ok_or(PcdError::MalformedPoint(i))?;
        points.push(point);
    }

    Ok(points)
}

fn read_ascii_points<R: BufRead>(
    reader: &mut R,
    layout: &PcdLayout,
) -> Result<Vec<[f64; 3]>, PcdError> {
    let columns = [
        layout.field("x")?.column,
        layout.field("y")?.column,
        layout.field("z")?.column,
    ];

    let mut points = Vec::with_capacity(layout.num_points);
    let mut line = String::new();

    while points.len() < layout.num_points {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(PcdError::MalformedPoint(points.len()));
        }
        if line.trim().is_empty() {
            continue;
        }

        let tokens = line.split_whitespace().collect::<Vec<_>>();
        if tokens.len() < layout.num_columns {
            return Err(PcdError::MalformedPoint(points.len()));
        }

        let mut point = [0.0; 3];
        for (value, column) in point.iter_mut().zip(columns) {
            // "nan" parses as f64::NAN, which is what PCL writes for invalid points
            *value = tokens[column]
                .parse::<f64>()
                .map_err(|_| PcdError::MalformedPoint(points.len()))?;
        }
        points.push(point);
    }

    Ok(points)
}

/// Read a PCD file with `ascii` or `binary` data.
///
/// # Arguments
/// * `path` - Path to a `.pcd` file.
///
/// # Returns
/// A [`PointCloud`] with the `x y z` coordinates of every point. Other fields
/// are skipped. `binary_compressed` data is not supported.
pub fn read_pcd(path: impl AsRef<Path>) -> Result<PointCloud, PcdError> {
    let Some(file_ext) = path.as_ref().extension() else {
        return Err(PcdError::InvalidFileExtension("".into()));
    };

    if file_ext != "pcd" {
        return Err(PcdError::InvalidFileExtension(
            file_ext.to_string_lossy().to_string(),
        ));
    }

    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);

    let layout = parse_pcd_layout(&mut reader)?;

    if layout.num_points > MAX_POINTS {
        return Err(PcdError::MalformedHeader);
    }

    let points = match layout.data {
        PcdData::Ascii => read_ascii_points(&mut reader, &layout)?,
        PcdData::Binary => read_binary_points(&mut reader, &layout)?,
    };

    Ok(PointCloud::new(points))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    #[test]
    fn fails_on_compressed_data() {
        let data = b"FIELDS x y z
SIZE 4 4 4
TYPE F F F
COUNT 1 1 1
POINTS 1
DATA binary_compressed";
        let mut reader = Cursor::new(&data[..]);
        assert!(matches!(
            parse_pcd_layout(&mut reader),
            Err(PcdError::UnsupportedProperty(_))
        ));
    }

    #[test]
    fn parses_valid_headers() -> Result<(), PcdError> {
        let data = b"# .PCD v0.7 - Point Cloud Data file format
VERSION 0.7
FIELDS x y z intensity
SIZE 4 4 4 4
TYPE F F F F
COUNT 1 1 1 1
WIDTH 10
HEIGHT 1
VIEWPOINT 0 0 0 1 0 0 0
POINTS 10
DATA ascii
";
        let layout = parse_pcd_layout(&mut Cursor::new(&data[..]))?;
        assert_eq!(layout.num_points, 10);
        assert_eq!(layout.data, PcdData::Ascii);
        assert_eq!(layout.point_step, 16);
        assert_eq!(layout.field("intensity")?.column, 3);
        Ok(())
    }

    #[test]
    fn rejects_wrong_type_for_xyz() {
        let data = b"FIELDS x y z
SIZE 4 4 4
TYPE I I I
COUNT 1 1 1
POINTS 5
DATA binary";
        let mut reader = Cursor::new(&data[..]);
        assert!(parse_pcd_layout(&mut reader).is_err());
    }

    #[test]
    fn rejects_missing_data_line() {
        let data = b"FIELDS x y z
SIZE 4 4 4
TYPE F F F
POINTS 5
";
        let mut reader = Cursor::new(&data[..]);
        assert!(matches!(
            parse_pcd_layout(&mut reader),
            Err(PcdError::MalformedHeader)
        ));
    }

    #[test]
    fn reads_ascii_file() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::Builder::new().suffix(".pcd").tempfile()?;
        write!(
            file,
            "VERSION 0.7
FIELDS x y z rgb
SIZE 4 4 4 4
TYPE F F F U
COUNT 1 1 1 1
WIDTH 3
HEIGHT 1
POINTS 3
DATA ascii
1.0 2.0 3.0 0
-1.5 0.5 2.25 0

4 5 6 0
"
        )?;

        let cloud = read_pcd(file.path())?;
        assert_eq!(cloud.len(), 3);
        assert_eq!(cloud.points()[1], [-1.5, 0.5, 2.25]);
        assert_eq!(cloud.points()[2], [4.0, 5.0, 6.0]);
        Ok(())
    }

    #[test]
    fn reads_binary_file() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::Builder::new().suffix(".pcd").tempfile()?;
        write!(
            file,
            "VERSION 0.7
FIELDS x y z intensity
SIZE 4 4 4 8
TYPE F F F F
COUNT 1 1 1 1
WIDTH 2
HEIGHT 1
POINTS 2
DATA binary
"
        )?;
        for (p, intensity) in [([0.5f32, 1.0, -2.0], 7.0f64), ([3.0, 4.0, 5.0], 8.0)] {
            for v in p {
                file.write_all(&v.to_le_bytes())?;
            }
            file.write_all(&intensity.to_le_bytes())?;
        }
        file.flush()?;

        let cloud = read_pcd(file.path())?;
        assert_eq!(cloud.points(), &[[0.5, 1.0, -2.0], [3.0, 4.0, 5.0]]);
        Ok(())
    }

    #[test]
    fn fails_on_truncated_binary_file() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::Builder::new().suffix(".pcd").tempfile()?;
        write!(
            file,
            "FIELDS x y z
SIZE 4 4 4
TYPE F F F
POINTS 2
DATA binary
"
        )?;
        file.write_all(&[0u8; 12])?;
        file.flush()?;

        assert!(matches!(read_pcd(file.path()), Err(PcdError::Io(_))));
        Ok(())
    }

    #[test]
    fn rejects_wrong_extension() {
        assert!(matches!(
            read_pcd("map.ply"),
            Err(PcdError::InvalidFileExtension(ext)) if ext == "ply"
        ));
    }
}
