use super::template::SrcLoc;
use crate::core::utils::geometry::AffineTransform;
use nalgebra::{Matrix3, Point3, Vector3};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransformError {
    #[error("{loc}: unknown transformation \"{name}\"")]
    UnknownPrimitive { loc: SrcLoc, name: String },

    #[error("{loc}: \"{name}\" expects {expected} argument(s), found {found}")]
    WrongArity {
        loc: SrcLoc,
        name: String,
        expected: &'static str,
        found: usize,
    },

    #[error("{loc}: argument \"{arg}\" of \"{name}\" is not a number")]
    NotNumeric {
        loc: SrcLoc,
        name: String,
        arg: String,
    },

    #[error("{loc}: \"{name}\" has a zero-length axis or quaternion")]
    Degenerate { loc: SrcLoc, name: String },

    #[error("{loc}: malformed transformation list \"{text}\"")]
    Malformed { loc: SrcLoc, text: String },

    #[error("{loc}: the enclosing coordinate transformation is not invertible")]
    Singular { loc: SrcLoc },
}

/// One geometric operation from a transformation chain such as
/// `.rot(90,0,0,1).move(10,0,0)`.
///
/// The `*Cm` variants act relative to the centroid of the coordinates written so
/// far in the current scope and cannot be evaluated until that scope closes.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Move(Vector3<f64>),
    Rotate { angle: f64, axis: Vector3<f64> },
    RotateVectors { from: Vector3<f64>, to: Vector3<f64> },
    Scale(Vector3<f64>),
    Matrix(Matrix3<f64>),
    Quaternion([f64; 4]),
    MoveCm(Vector3<f64>),
    RotateCm { angle: f64, axis: Vector3<f64> },
    ScaleCm(Vector3<f64>),
}

impl Primitive {
    pub fn is_deferred(&self) -> bool {
        matches!(
            self,
            Primitive::MoveCm(_) | Primitive::RotateCm { .. } | Primitive::ScaleCm(_)
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Primitive::Move(_) => "move",
            Primitive::Rotate { .. } => "rot",
            Primitive::RotateVectors { .. } => "rotvv",
            Primitive::Scale(_) => "scale",
            Primitive::Matrix(_) => "matrix",
            Primitive::Quaternion(_) => "quat",
            Primitive::MoveCm(_) => "movecm",
            Primitive::RotateCm { .. } => "rotcm",
            Primitive::ScaleCm(_) => "scalecm",
        }
    }

    fn parse(name: &str, args: &[String], loc: &SrcLoc) -> Result<Self, TransformError> {
        let values = args
            .iter()
            .map(|a| {
                a.parse::<f64>().map_err(|_| TransformError::NotNumeric {
                    loc: loc.clone(),
                    name: name.to_string(),
                    arg: a.clone(),
                })
            })
            .collect::<Result<Vec<f64>, _>>()?;

        let arity = |expected: &'static str| TransformError::WrongArity {
            loc: loc.clone(),
            name: name.to_string(),
            expected,
            found: values.len(),
        };
        let vec3 = |v: &[f64]| Vector3::new(v[0], v[1], v[2]);
        let scale = |v: &[f64]| match v.len() {
            1 => Some(Vector3::repeat(v[0])),
            3 => Some(vec3(v)),
            _ => None,
        };

        let primitive = match name {
            "move" | "movecm" => {
                if values.len() != 3 {
                    return Err(arity("3"));
                }
                if name == "move" {
                    Primitive::Move(vec3(&values))
                } else {
                    Primitive::MoveCm(vec3(&values))
                }
            }
            "rot" | "rotcm" => {
                if values.len() != 4 {
                    return Err(arity("4"));
                }
                let (angle, axis) = (values[0], vec3(&values[1..]));
                if name == "rot" {
                    Primitive::Rotate { angle, axis }
                } else {
                    Primitive::RotateCm { angle, axis }
                }
            }
            "rotvv" => {
                if values.len() != 6 {
                    return Err(arity("6"));
                }
                Primitive::RotateVectors {
                    from: vec3(&values[..3]),
                    to: vec3(&values[3..]),
                }
            }
            "scale" => Primitive::Scale(scale(&values).ok_or_else(|| arity("1 or 3"))?),
            "scalecm" => Primitive::ScaleCm(scale(&values).ok_or_else(|| arity("1 or 3"))?),
            "matrix" => {
                if values.len() != 9 {
                    return Err(arity("9"));
                }
                Primitive::Matrix(Matrix3::from_row_slice(&values))
            }
            "quat" => {
                if values.len() != 4 {
                    return Err(arity("4"));
                }
                Primitive::Quaternion([values[0], values[1], values[2], values[3]])
            }
            _ => {
                return Err(TransformError::UnknownPrimitive {
                    loc: loc.clone(),
                    name: name.to_string(),
                });
            }
        };
        Ok(primitive)
    }

    /// The affine map of this primitive. Centroid-relative primitives need the
    /// centroid, expressed in the same frame the map will act in.
    pub fn to_affine(
        &self,
        centroid: Option<&Point3<f64>>,
        loc: &SrcLoc,
    ) -> Result<AffineTransform, TransformError> {
        let degenerate = || TransformError::Degenerate {
            loc: loc.clone(),
            name: self.name().to_string(),
        };
        let pivot = centroid.copied().unwrap_or_else(Point3::origin);
        let affine = match self {
            Primitive::Move(v) => AffineTransform::from_translation(*v),
            Primitive::Rotate { angle, axis } => {
                AffineTransform::rotation(*angle, axis).ok_or_else(degenerate)?
            }
            Primitive::RotateVectors { from, to } => {
                AffineTransform::rotation_between(from, to).ok_or_else(degenerate)?
            }
            Primitive::Scale(f) => AffineTransform::scaling(f),
            Primitive::Matrix(m) => AffineTransform::from_linear(*m),
            Primitive::Quaternion([w, x, y, z]) => {
                AffineTransform::from_quaternion(*w, *x, *y, *z).ok_or_else(degenerate)?
            }
            Primitive::MoveCm(target) => AffineTransform::from_translation(target - pivot.coords),
            Primitive::RotateCm { angle, axis } => AffineTransform::rotation(*angle, axis)
                .ok_or_else(degenerate)?
                .about_pivot(&pivot),
            Primitive::ScaleCm(f) => AffineTransform::scaling(f).about_pivot(&pivot),
        };
        Ok(affine)
    }
}

/// An ordered list of primitives. Points are acted on by the first primitive first.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransformChain {
    pub primitives: Vec<Primitive>,
}

impl TransformChain {
    pub fn new(primitives: Vec<Primitive>) -> Self {
        Self { primitives }
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    pub fn has_deferred(&self) -> bool {
        self.primitives.iter().any(Primitive::is_deferred)
    }

    /// Concatenates two chains; `other` acts after `self`.
    pub fn then(&self, other: &TransformChain) -> TransformChain {
        let mut primitives = self.primitives.clone();
        primitives.extend(other.primitives.iter().cloned());
        TransformChain { primitives }
    }

    /// Splits the chain at every centroid-relative primitive.
    ///
    /// The first element holds everything before the first such primitive and can
    /// be applied right away. Each following block starts with one
    /// centroid-relative primitive and runs up to the next.
    pub fn split_deferred(&self) -> (TransformChain, Vec<TransformChain>) {
        let mut immediate = Vec::new();
        let mut blocks: Vec<Vec<Primitive>> = Vec::new();
        for p in &self.primitives {
            if p.is_deferred() {
                blocks.push(vec![p.clone()]);
            } else if let Some(last) = blocks.last_mut() {
                last.push(p.clone());
            } else {
                immediate.push(p.clone());
            }
        }
        (
            TransformChain::new(immediate),
            blocks.into_iter().map(TransformChain::new).collect(),
        )
    }

    /// The composite map of the whole chain, evaluating centroid-relative
    /// primitives against `centroid`.
    pub fn to_affine(
        &self,
        centroid: Option<&Point3<f64>>,
        loc: &SrcLoc,
    ) -> Result<AffineTransform, TransformError> {
        self.primitives
            .iter()
            .try_fold(AffineTransform::identity(), |acc, p| {
                Ok(p.to_affine(centroid, loc)? * acc)
            })
    }

    /// Parses text of the form `.rot(30,0,0,1).move(1,2,3)`. The leading dot is
    /// optional and whitespace between tokens is ignored.
    pub fn parse(text: &str, loc: &SrcLoc) -> Result<Self, TransformError> {
        let malformed = || TransformError::Malformed {
            loc: loc.clone(),
            text: text.to_string(),
        };
        let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
        let mut primitives = Vec::new();
        let mut i = 0;
        while i < chars.len() {
            if chars[i] == '.' {
                i += 1;
                continue;
            }
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            if i == start || i >= chars.len() || chars[i] != '(' {
                return Err(malformed());
            }
            let name: String = chars[start..i].iter().collect();
            i += 1;
            let arg_start = i;
            while i < chars.len() && chars[i] != ')' {
                i += 1;
            }
            if i >= chars.len() {
                return Err(malformed());
            }
            let inner: String = chars[arg_start..i].iter().collect();
            i += 1;
            let args: Vec<String> = if inner.is_empty() {
                Vec::new()
            } else {
                inner.split(',').map(str::to_string).collect()
            };
            primitives.push(Primitive::parse(&name, &args, loc)?);
        }
        Ok(Self { primitives })
    }
}
