use super::layout::AtomLayout;
use crate::core::models::template::SrcLoc;
use crate::core::utils::geometry::AffineTransform;
use nalgebra::{Point3, Quaternion, Vector3};
use thiserror::Error;

const ELLIPSOID_COLUMNS: usize = 8;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DataFormatError {
    #[error(
        "{loc}: a line in \"{channel}\" has {found} columns but the atom layout has {expected}:\n    {line}"
    )]
    ColumnCount {
        loc: SrcLoc,
        channel: String,
        expected: usize,
        found: usize,
        line: String,
    },

    #[error(
        "{loc}: a line in \"{channel}\" has 3 extra columns; image flags are not supported, remove them:\n    {line}"
    )]
    ImageFlags {
        loc: SrcLoc,
        channel: String,
        line: String,
    },

    #[error("{loc}: \"{value}\" in \"{channel}\" is not a number")]
    NotNumeric {
        loc: SrcLoc,
        channel: String,
        value: String,
    },

    #[error("{loc}: no mass was written for atom type \"{atom_type}\"")]
    MissingMass { loc: SrcLoc, atom_type: String },

    #[error("{loc}: the atom layout has no atom-type column, so atoms cannot be weighted by mass")]
    NoTypeColumn { loc: SrcLoc },
}

/// One row of the `Data Atoms` section as needed for centroid calculations.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomRow {
    pub position: Point3<f64>,
    pub atom_type: Option<String>,
}

/// Splits a line into whitespace-separated columns and its trailing comment.
///
/// A column that starts with `{` extends to the matching `}`, so grouped values
/// containing spaces count as one column.
pub fn split_columns(line: &str) -> (Vec<String>, Option<&str>) {
    let (body, comment) = match line.find('#') {
        Some(i) => (&line[..i], Some(&line[i..])),
        None => (line, None),
    };
    let mut columns = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for c in body.chars() {
        match c {
            '{' => {
                depth += 1;
                current.push(c);
            }
            '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            c if c.is_whitespace() && depth == 0 => {
                if !current.is_empty() {
                    columns.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        columns.push(current);
    }
    (columns, comment)
}

pub fn format_number(value: f64) -> String {
    let text = value.to_string();
    if !value.is_finite() || text.contains(['.', 'e', 'E']) {
        text
    } else {
        format!("{}.0", text)
    }
}

fn parse_number(value: &str, channel: &str, loc: &SrcLoc) -> Result<f64, DataFormatError> {
    value.parse::<f64>().map_err(|_| DataFormatError::NotNumeric {
        loc: loc.clone(),
        channel: channel.to_string(),
        value: value.to_string(),
    })
}

fn read_triplet(
    columns: &[String],
    idx: &[usize; 3],
    channel: &str,
    loc: &SrcLoc,
) -> Result<Vector3<f64>, DataFormatError> {
    Ok(Vector3::new(
        parse_number(&columns[idx[0]], channel, loc)?,
        parse_number(&columns[idx[1]], channel, loc)?,
        parse_number(&columns[idx[2]], channel, loc)?,
    ))
}

fn write_triplet(columns: &mut [String], idx: &[usize; 3], v: &Vector3<f64>) {
    for (slot, value) in idx.iter().zip(v.iter()) {
        columns[*slot] = format_number(*value);
    }
}

fn check_width(
    columns: &[String],
    expected: usize,
    line: &str,
    channel: &str,
    loc: &SrcLoc,
) -> Result<(), DataFormatError> {
    match columns.len() {
        n if n == expected => Ok(()),
        n if n == expected + 3 => Err(DataFormatError::ImageFlags {
            loc: loc.clone(),
            channel: channel.to_string(),
            line: line.to_string(),
        }),
        n => Err(DataFormatError::ColumnCount {
            loc: loc.clone(),
            channel: channel.to_string(),
            expected,
            found: n,
            line: line.to_string(),
        }),
    }
}

/// Rewrites every non-blank line of `text` through `edit`, preserving comments.
fn map_lines<F>(text: &str, mut edit: F) -> Result<String, DataFormatError>
where
    F: FnMut(&mut Vec<String>, &str) -> Result<(), DataFormatError>,
{
    let mut out = Vec::new();
    for line in text.split('\n') {
        let (mut columns, comment) = split_columns(line);
        if columns.is_empty() {
            out.push(line.to_string());
            continue;
        }
        edit(&mut columns, line)?;
        let mut rebuilt = columns.join(" ");
        if let Some(comment) = comment {
            rebuilt.push(' ');
            rebuilt.push_str(comment);
        }
        out.push(rebuilt);
    }
    Ok(out.join("\n"))
}

/// Applies `transform` to the coordinate columns of atom lines, and its linear part
/// to the direction columns.
pub fn transform_atom_text(
    text: &str,
    transform: &AffineTransform,
    layout: &AtomLayout,
    channel: &str,
    loc: &SrcLoc,
) -> Result<String, DataFormatError> {
    map_lines(text, |columns, line| {
        check_width(columns, layout.len(), line, channel, loc)?;
        for idx in &layout.coords {
            let p = Point3::from(read_triplet(columns, idx, channel, loc)?);
            write_triplet(columns, idx, &transform.transform_point(&p).coords);
        }
        for idx in &layout.vects {
            let v = read_triplet(columns, idx, channel, loc)?;
            write_triplet(columns, idx, &transform.transform_vector(&v));
        }
        Ok(())
    })
}

/// Rotates the orientation quaternion held in the last four of eight columns
/// (`atom-ID shapex shapey shapez quatw quati quatj quatk`).
pub fn transform_ellipsoid_text(
    text: &str,
    transform: &AffineTransform,
    channel: &str,
    loc: &SrcLoc,
) -> Result<String, DataFormatError> {
    let rotation = *transform.rotation_part().quaternion();
    map_lines(text, |columns, line| {
        check_width(columns, ELLIPSOID_COLUMNS, line, channel, loc)?;
        let q = Quaternion::new(
            parse_number(&columns[4], channel, loc)?,
            parse_number(&columns[5], channel, loc)?,
            parse_number(&columns[6], channel, loc)?,
            parse_number(&columns[7], channel, loc)?,
        );
        let rotated = rotation * q;
        columns[4] = format_number(rotated.w);
        columns[5] = format_number(rotated.i);
        columns[6] = format_number(rotated.j);
        columns[7] = format_number(rotated.k);
        Ok(())
    })
}

pub fn read_atoms(
    text: &str,
    layout: &AtomLayout,
    channel: &str,
    loc: &SrcLoc,
) -> Result<Vec<AtomRow>, DataFormatError> {
    let mut rows = Vec::new();
    for line in text.lines() {
        let (columns, _) = split_columns(line);
        if columns.is_empty() {
            continue;
        }
        check_width(&columns, layout.len(), line, channel, loc)?;
        let Some(first) = layout.coords.first() else {
            continue;
        };
        rows.push(AtomRow {
            position: Point3::from(read_triplet(&columns, first, channel, loc)?),
            atom_type: layout.atom_type.map(|i| columns[i].clone()),
        });
    }
    Ok(rows)
}

/// Reads `type mass` pairs from a `Data Masses` section.
pub fn read_masses(
    text: &str,
    channel: &str,
    loc: &SrcLoc,
) -> Result<Vec<(String, f64)>, DataFormatError> {
    let mut masses = Vec::new();
    for line in text.lines() {
        let (columns, _) = split_columns(line);
        if let [atom_type, mass, ..] = columns.as_slice() {
            masses.push((atom_type.clone(), parse_number(mass, channel, loc)?));
        }
    }
    Ok(masses)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    fn loc() -> SrcLoc {
        SrcLoc::new("cols.lt", 1)
    }

    fn xyz_layout() -> AtomLayout {
        AtomLayout::from_style("atom-ID x y z").unwrap()
    }

    #[test]
    fn split_keeps_braced_groups_and_comment() {
        let (cols, comment) = split_columns("  1 {a b} 2.0   # note");
        assert_eq!(cols, vec!["1", "{a b}", "2.0"]);
        assert_eq!(comment, Some("# note"));
    }

    #[test]
    fn numbers_always_carry_a_decimal_point() {
        assert_eq!(format_number(2.0), "2.0");
        assert_eq!(format_number(-0.5), "-0.5");
        assert_eq!(format_number(0.0), "0.0");
        assert_eq!(format_number(6.123233995736766e-17), "0.00000000000000006123233995736766");
        assert_eq!(format_number(f64::INFINITY), "inf");
    }

    #[test]
    fn translation_updates_coordinates_only() {
        let t = AffineTransform::from_translation(Vector3::new(1.0, 0.0, 0.0));
        let out = transform_atom_text("1 1.0 0.0 0.0\n", &t, &xyz_layout(), "Data Atoms", &loc())
            .unwrap();
        assert_eq!(out, "1 2.0 0.0 0.0\n");
    }

    #[test]
    fn blank_lines_and_comments_are_preserved() {
        let t = AffineTransform::identity();
        let out = transform_atom_text(
            "\n1 0 0 0 # first\n   \n",
            &t,
            &xyz_layout(),
            "Data Atoms",
            &loc(),
        )
        .unwrap();
        assert_eq!(out, "\n1 0.0 0.0 0.0 # first\n   \n");
    }

    #[test]
    fn dipoles_rotate_but_do_not_translate() {
        let layout = AtomLayout::from_style("dipole").unwrap();
        let t = AffineTransform::from_translation(Vector3::new(5.0, 0.0, 0.0))
            * AffineTransform::rotation(90.0, &Vector3::z()).unwrap();
        let out = transform_atom_text("1 1 0.0 1 0 0 1 0 0", &t, &layout, "Data Atoms", &loc())
            .unwrap();
        let (cols, _) = split_columns(&out);
        let v: Vec<f64> = cols.iter().map(|c| c.parse().unwrap()).collect();
        assert!((v[3] - 5.0).abs() < TOLERANCE && (v[4] - 1.0).abs() < TOLERANCE);
        assert!(v[6].abs() < TOLERANCE && (v[7] - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn wrong_column_count_is_an_error() {
        let err = transform_atom_text(
            "1 0 0",
            &AffineTransform::identity(),
            &xyz_layout(),
            "Data Atoms",
            &loc(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            DataFormatError::ColumnCount {
                expected: 4,
                found: 3,
                ..
            }
        ));
    }

    #[test]
    fn image_flags_are_reported_separately() {
        let err = transform_atom_text(
            "1 0 0 0 0 0 1",
            &AffineTransform::identity(),
            &xyz_layout(),
            "Data Atoms",
            &loc(),
        )
        .unwrap_err();
        assert!(matches!(err, DataFormatError::ImageFlags { .. }));
    }

    #[test]
    fn non_numeric_coordinate_is_an_error() {
        let err = transform_atom_text(
            "1 x 0 0",
            &AffineTransform::identity(),
            &xyz_layout(),
            "Data Atoms",
            &loc(),
        )
        .unwrap_err();
        assert!(matches!(err, DataFormatError::NotNumeric { value, .. } if value == "x"));
    }

    #[test]
    fn ellipsoid_quaternion_is_premultiplied_by_the_rotation() {
        let t = AffineTransform::rotation(90.0, &Vector3::z()).unwrap();
        let out =
            transform_ellipsoid_text("1 1 1 1 1 0 0 0", &t, "Data Ellipsoids", &loc()).unwrap();
        let (cols, _) = split_columns(&out);
        let q: Vec<f64> = cols[4..].iter().map(|c| c.parse().unwrap()).collect();
        let half = 45.0f64.to_radians();
        assert!((q[0] - half.cos()).abs() < TOLERANCE);
        assert!((q[3] - half.sin()).abs() < TOLERANCE);
    }

    #[test]
    fn reads_atom_rows_and_masses() {
        let layout = AtomLayout::default();
        let rows = read_atoms("1 1 2 0.0 1 2 3\n\n", &layout, "Data Atoms", &loc()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].atom_type.as_deref(), Some("2"));
        assert_eq!(rows[0].position, Point3::new(1.0, 2.0, 3.0));

        let masses = read_masses("1 12.01\n2 1.008 # H\n", "Data Masses", &loc()).unwrap();
        assert_eq!(masses, vec![("1".to_string(), 12.01), ("2".to_string(), 1.008)]);
    }
}
