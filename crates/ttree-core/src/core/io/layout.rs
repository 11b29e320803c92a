use phf::{Map, phf_map};
use thiserror::Error;

/// Column names of the `Data Atoms` section for each LAMMPS atom style.
static ATOM_STYLE_COLUMNS: Map<&'static str, &'static [&'static str]> = phf_map! {
    "angle" => &["atom-ID", "molecule-ID", "atom-type", "x", "y", "z"],
    "atomic" => &["atom-ID", "atom-type", "x", "y", "z"],
    "body" => &["atom-ID", "atom-type", "bodyflag", "mass", "x", "y", "z"],
    "bond" => &["atom-ID", "molecule-ID", "atom-type", "x", "y", "z"],
    "charge" => &["atom-ID", "atom-type", "q", "x", "y", "z"],
    "dipole" => &["atom-ID", "atom-type", "q", "x", "y", "z", "mux", "muy", "muz"],
    "electron" => &["atom-ID", "atom-type", "q", "spin", "eradius", "x", "y", "z"],
    "ellipsoid" => &["atom-ID", "atom-type", "ellipsoidflag", "density", "x", "y", "z"],
    "full" => &["atom-ID", "molecule-ID", "atom-type", "q", "x", "y", "z"],
    "line" => &["atom-ID", "molecule-ID", "atom-type", "lineflag", "density", "x", "y", "z"],
    "meso" => &["atom-ID", "atom-type", "rho", "e", "cv", "x", "y", "z"],
    "molecular" => &["atom-ID", "molecule-ID", "atom-type", "x", "y", "z"],
    "peri" => &["atom-ID", "atom-type", "volume", "density", "x", "y", "z"],
    "sphere" => &["atom-ID", "atom-type", "diameter", "density", "x", "y", "z"],
    "template" => &["atom-ID", "molecule-ID", "template-index", "template-atom", "atom-type", "x", "y", "z"],
    "tri" => &["atom-ID", "molecule-ID", "atom-type", "triangleflag", "density", "x", "y", "z"],
    "wavepacket" => &["atom-ID", "atom-type", "charge", "spin", "eradius", "etag", "cs_re", "cs_im", "x", "y", "z"],
};

const HYBRID_BASE: &[&str] = &["atom-ID", "atom-type", "x", "y", "z"];

pub const DEFAULT_ATOM_STYLE: &str = "full";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("Unknown atom style: \"{0}\"")]
    UnknownStyle(String),

    #[error("Atom layout \"{0}\" has no x y z coordinate columns")]
    NoCoordinates(String),

    #[error("Atom layout \"{0}\" has an incomplete {1} triplet")]
    IncompleteTriplet(String, &'static str),
}

/// Which columns of a positional line hold what.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomLayout {
    pub columns: Vec<String>,
    /// `(x, y, z)` indices of each coordinate triplet; transformed as points.
    pub coords: Vec<[usize; 3]>,
    /// `(x, y, z)` indices of each direction triplet; only rotated and scaled.
    pub vects: Vec<[usize; 3]>,
    pub atom_id: Option<usize>,
    pub atom_type: Option<usize>,
}

impl Default for AtomLayout {
    fn default() -> Self {
        // The built-in default style is always present in the table.
        Self::from_style(DEFAULT_ATOM_STYLE).unwrap_or_else(|_| Self {
            columns: Vec::new(),
            coords: Vec::new(),
            vects: Vec::new(),
            atom_id: None,
            atom_type: None,
        })
    }
}

impl AtomLayout {
    /// Accepts a style name (`full`), a hybrid style (`hybrid sphere dipole`) or an
    /// explicit space-separated column list (`atom-ID atom-type x y z`).
    pub fn from_style(style: &str) -> Result<Self, LayoutError> {
        let words: Vec<&str> = style.split_whitespace().collect();
        let columns: Vec<String> = match words.as_slice() {
            [] => return Err(LayoutError::UnknownStyle(style.to_string())),
            [name] => ATOM_STYLE_COLUMNS
                .get(*name)
                .ok_or_else(|| LayoutError::UnknownStyle(name.to_string()))?
                .iter()
                .map(|c| c.to_string())
                .collect(),
            ["hybrid", subs @ ..] => {
                let mut cols: Vec<String> = HYBRID_BASE.iter().map(|c| c.to_string()).collect();
                for sub in subs {
                    let extra = ATOM_STYLE_COLUMNS
                        .get(*sub)
                        .ok_or_else(|| LayoutError::UnknownStyle(sub.to_string()))?;
                    for c in extra.iter() {
                        if !cols.iter().any(|existing| existing == c) {
                            cols.push(c.to_string());
                        }
                    }
                }
                cols
            }
            list => list.iter().map(|c| c.to_string()).collect(),
        };
        Self::from_columns(columns, style)
    }

    fn from_columns(columns: Vec<String>, style: &str) -> Result<Self, LayoutError> {
        let find = |name: &str| columns.iter().position(|c| c == name);
        let triplet = |names: [&str; 3], what: &'static str| -> Result<Option<[usize; 3]>, LayoutError> {
            match (find(names[0]), find(names[1]), find(names[2])) {
                (Some(a), Some(b), Some(c)) => Ok(Some([a, b, c])),
                (None, None, None) => Ok(None),
                _ => Err(LayoutError::IncompleteTriplet(style.to_string(), what)),
            }
        };
        let coords: Vec<[usize; 3]> = triplet(["x", "y", "z"], "coordinate")?.into_iter().collect();
        if coords.is_empty() {
            return Err(LayoutError::NoCoordinates(style.to_string()));
        }
        let vects = triplet(["mux", "muy", "muz"], "dipole")?.into_iter().collect();
        let atom_id = find("atom-ID");
        let atom_type = find("atom-type");
        Ok(Self {
            columns,
            coords,
            vects,
            atom_id,
            atom_type,
        })
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_is_full_style() {
        let layout = AtomLayout::default();
        assert_eq!(layout.len(), 7);
        assert_eq!(layout.coords, vec![[4, 5, 6]]);
        assert_eq!(layout.atom_type, Some(2));
    }

    #[test]
    fn dipole_style_has_direction_columns() {
        let layout = AtomLayout::from_style("dipole").unwrap();
        assert_eq!(layout.vects, vec![[6, 7, 8]]);
    }

    #[test]
    fn explicit_column_list_is_accepted() {
        let layout = AtomLayout::from_style("atom-ID x y z").unwrap();
        assert_eq!(layout.columns, vec!["atom-ID", "x", "y", "z"]);
        assert_eq!(layout.coords, vec![[1, 2, 3]]);
        assert_eq!(layout.atom_type, None);
    }

    #[test]
    fn hybrid_style_appends_sub_style_columns_once() {
        let layout = AtomLayout::from_style("hybrid sphere dipole").unwrap();
        assert_eq!(
            layout.columns,
            vec![
                "atom-ID", "atom-type", "x", "y", "z", "diameter", "density", "q", "mux", "muy",
                "muz"
            ]
        );
    }

    #[test]
    fn unknown_style_is_rejected() {
        assert_eq!(
            AtomLayout::from_style("granular"),
            Err(LayoutError::UnknownStyle("granular".into()))
        );
    }

    #[test]
    fn layout_without_coordinates_is_rejected() {
        assert!(matches!(
            AtomLayout::from_style("atom-ID atom-type q"),
            Err(LayoutError::NoCoordinates(_))
        ));
        assert!(matches!(
            AtomLayout::from_style("atom-ID x y"),
            Err(LayoutError::IncompleteTriplet(_, "coordinate"))
        ));
    }
}
