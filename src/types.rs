use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, de};

use crate::error::{Error, Result};

/// Default blade width loss in mm.
pub const DEFAULT_KERF: u32 = 4;
/// Default smallest usable fragment in mm.
pub const DEFAULT_MIN_SLICE: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Axis::X => "X",
            Axis::Y => "Y",
            Axis::Z => "Z",
        };
        f.write_str(name)
    }
}

impl TryFrom<char> for Axis {
    type Error = String;

    fn try_from(c: char) -> std::result::Result<Self, Self::Error> {
        match c.to_ascii_uppercase() {
            'X' => Ok(Axis::X),
            'Y' => Ok(Axis::Y),
            'Z' => Ok(Axis::Z),
            _ => Err(format!("invalid axis '{c}', expected X, Y or Z")),
        }
    }
}

/// Axis-aligned box size. `length` runs along X, `width` along Y and
/// `height` along Z.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dims {
    #[serde(alias = "l", deserialize_with = "deserialize_u32_from_number")]
    pub length: u32,
    #[serde(alias = "w", deserialize_with = "deserialize_u32_from_number")]
    pub width: u32,
    #[serde(alias = "h", deserialize_with = "deserialize_u32_from_number")]
    pub height: u32,
}

impl Dims {
    pub fn new(length: u32, width: u32, height: u32) -> Self {
        Self {
            length,
            width,
            height,
        }
    }

    pub fn volume(&self) -> u64 {
        self.length as u64 * self.width as u64 * self.height as u64
    }

    pub fn get(&self, axis: Axis) -> u32 {
        match axis {
            Axis::X => self.length,
            Axis::Y => self.width,
            Axis::Z => self.height,
        }
    }

    pub fn with(mut self, axis: Axis, value: u32) -> Self {
        match axis {
            Axis::X => self.length = value,
            Axis::Y => self.width = value,
            Axis::Z => self.height = value,
        }
        self
    }

    pub fn fits_in(&self, other: &Dims) -> bool {
        self.length <= other.length && self.width <= other.width && self.height <= other.height
    }

    pub fn min_side(&self) -> u32 {
        self.length.min(self.width).min(self.height)
    }
}

impl fmt::Display for Dims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.length, self.width, self.height)
    }
}

impl FromStr for Dims {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('x').collect();
        if parts.len() != 3 {
            return Err(format!("invalid dimensions '{}', expected LxWxH", s));
        }
        let mut values = [0u32; 3];
        for (value, (part, name)) in values
            .iter_mut()
            .zip(parts.iter().zip(["length", "width", "height"]))
        {
            *value = part
                .trim()
                .parse::<u32>()
                .map_err(|_| format!("invalid {} in '{}'", name, s))?;
        }
        Ok(Dims::new(values[0], values[1], values[2]))
    }
}

/// A required part type. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartType {
    id: u32,
    dims: Dims,
    quantity: u32,
    value: Option<u64>,
    allow_rotation: bool,
}

impl PartType {
    pub fn new(id: u32, dims: Dims, quantity: u32) -> Result<Self> {
        for axis in Axis::ALL {
            if dims.get(axis) == 0 {
                return Err(Error::InvalidPart {
                    id,
                    field: dim_field(axis),
                    reason: "must be non-zero".to_string(),
                });
            }
        }
        if quantity == 0 {
            return Err(Error::InvalidPart {
                id,
                field: "quantity",
                reason: "must be non-zero".to_string(),
            });
        }
        Ok(Self {
            id,
            dims,
            quantity,
            value: None,
            allow_rotation: true,
        })
    }

    /// Overrides the default value (the part's volume).
    pub fn with_value(mut self, value: u64) -> Result<Self> {
        if value == 0 {
            return Err(Error::InvalidPart {
                id: self.id,
                field: "value",
                reason: "must be non-zero".to_string(),
            });
        }
        self.value = Some(value);
        Ok(self)
    }

    pub fn with_rotation(mut self, allow_rotation: bool) -> Self {
        self.allow_rotation = allow_rotation;
        self
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn allow_rotation(&self) -> bool {
        self.allow_rotation
    }

    pub fn unit_value(&self) -> u64 {
        self.value.unwrap_or_else(|| self.dims.volume())
    }
}

fn dim_field(axis: Axis) -> &'static str {
    match axis {
        Axis::X => "length",
        Axis::Y => "width",
        Axis::Z => "height",
    }
}

/// The material block to be cut plus its process parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockBlock {
    dims: Dims,
    kerf: u32,
    min_slice: u32,
    stage_order: Vec<Axis>,
}

impl StockBlock {
    pub fn new(dims: Dims) -> Result<Self> {
        for axis in Axis::ALL {
            if dims.get(axis) == 0 {
                return Err(Error::InvalidStock {
                    field: dim_field(axis),
                    reason: "must be non-zero".to_string(),
                });
            }
        }
        Ok(Self {
            dims,
            kerf: DEFAULT_KERF,
            min_slice: DEFAULT_MIN_SLICE,
            stage_order: vec![Axis::Z, Axis::X, Axis::Y],
        })
    }

    pub fn with_kerf(mut self, kerf: u32) -> Self {
        self.kerf = kerf;
        self
    }

    pub fn with_min_slice(mut self, min_slice: u32) -> Self {
        self.min_slice = min_slice;
        self
    }

    pub fn with_stage_order(mut self, stage_order: Vec<Axis>) -> Result<Self> {
        if stage_order.is_empty() {
            return Err(Error::InvalidStock {
                field: "stage_order",
                reason: "must name at least one axis".to_string(),
            });
        }
        self.stage_order = stage_order;
        Ok(self)
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }

    pub fn kerf(&self) -> u32 {
        self.kerf
    }

    pub fn min_slice(&self) -> u32 {
        self.min_slice
    }

    pub fn stage_order(&self) -> &[Axis] {
        &self.stage_order
    }

    pub fn volume(&self) -> u64 {
        self.dims.volume()
    }
}

/// Stock block plus the part types requested from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Problem {
    stock: StockBlock,
    parts: Vec<PartType>,
}

impl Problem {
    pub fn new(stock: StockBlock, parts: Vec<PartType>) -> Result<Self> {
        let mut seen = HashSet::new();
        for p in &parts {
            if !seen.insert(p.id) {
                return Err(Error::DuplicatePartId(p.id));
            }
        }
        Ok(Self { stock, parts })
    }

    pub fn stock(&self) -> &StockBlock {
        &self.stock
    }

    pub fn parts(&self) -> &[PartType] {
        &self.parts
    }

    pub fn part(&self, id: u32) -> Option<&PartType> {
        self.parts.iter().find(|p| p.id == id)
    }

    pub fn total_quantity(&self) -> u64 {
        self.parts.iter().map(|p| p.quantity as u64).sum()
    }

    /// Same problem with the part list in a different order.
    pub fn reordered(&self, parts: Vec<PartType>) -> Self {
        Self {
            stock: self.stock.clone(),
            parts,
        }
    }

    pub(crate) fn with_kerf(mut self, kerf: u32) -> Self {
        self.stock.kerf = kerf;
        self
    }

    /// Cut from a block of `dims` with the same kerf and min slice, each
    /// part limited to its entry in `counts`. Parts without one are dropped.
    /// `stage_order` must be non-empty.
    pub(crate) fn limited(
        &self,
        dims: Dims,
        stage_order: Vec<Axis>,
        counts: &BTreeMap<u32, u32>,
    ) -> Self {
        let parts = self
            .parts
            .iter()
            .filter_map(|p| {
                let quantity = counts.get(&p.id).copied().filter(|&n| n > 0)?;
                Some(PartType {
                    quantity: quantity.min(p.quantity),
                    ..p.clone()
                })
            })
            .collect();
        Self {
            stock: StockBlock {
                dims,
                stage_order,
                ..self.stock.clone()
            },
            parts,
        }
    }
}

/// A part at its absolute position inside the stock block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedPart {
    pub id: u32,
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub dims: Dims,
}

impl PlacedPart {
    pub fn origin(&self, axis: Axis) -> u32 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    pub fn end(&self, axis: Axis) -> u32 {
        self.origin(axis) + self.dims.get(axis)
    }

    pub fn volume(&self) -> u64 {
        self.dims.volume()
    }

    /// True when the kerf-padded boxes intersect on all three axes.
    pub fn overlaps(&self, other: &PlacedPart, kerf: u32) -> bool {
        Axis::ALL.iter().all(|&axis| {
            self.end(axis) as u64 + kerf as u64 > other.origin(axis) as u64
                && other.end(axis) as u64 + kerf as u64 > self.origin(axis) as u64
        })
    }
}

impl fmt::Display for PlacedPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} @ ({}, {}, {})",
            self.id, self.dims, self.x, self.y, self.z
        )
    }
}

/// Accepts JSON numbers such as `200` or `200.0` for integral fields.
pub fn deserialize_u32_from_number<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let v = f64::deserialize(deserializer)?;
    if v < 0.0 || v.fract() != 0.0 || v > u32::MAX as f64 {
        return Err(de::Error::custom(format!(
            "expected a non-negative whole number, got {v}"
        )));
    }
    Ok(v as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dims_parse() {
        let d: Dims = "1000x800x600".parse().unwrap();
        assert_eq!(d, Dims::new(1000, 800, 600));
        assert_eq!(d.volume(), 480_000_000);
        assert!("10x20".parse::<Dims>().is_err());
        assert!("10xax20".parse::<Dims>().is_err());
    }

    #[test]
    fn test_dims_axis_access() {
        let d = Dims::new(1, 2, 3);
        assert_eq!(d.get(Axis::Y), 2);
        assert_eq!(d.with(Axis::Z, 9), Dims::new(1, 2, 9));
    }

    #[test]
    fn test_zero_dimension_rejected_with_field() {
        let err = PartType::new(7, Dims::new(10, 0, 10), 1).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidPart {
                id: 7,
                field: "width",
                reason: "must be non-zero".to_string()
            }
        );
        let err = StockBlock::new(Dims::new(10, 10, 0)).unwrap_err();
        assert!(matches!(err, Error::InvalidStock { field: "height", .. }));
    }

    #[test]
    fn test_zero_quantity_and_value_rejected() {
        assert!(PartType::new(1, Dims::new(1, 1, 1), 0).is_err());
        let p = PartType::new(1, Dims::new(1, 1, 1), 1).unwrap();
        assert!(p.clone().with_value(0).is_err());
        assert_eq!(p.with_value(42).unwrap().unit_value(), 42);
    }

    #[test]
    fn test_empty_stage_order_rejected() {
        let stock = StockBlock::new(Dims::new(10, 10, 10)).unwrap();
        assert!(stock.with_stage_order(vec![]).is_err());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let stock = StockBlock::new(Dims::new(100, 100, 100)).unwrap();
        let a = PartType::new(1, Dims::new(10, 10, 10), 1).unwrap();
        let err = Problem::new(stock, vec![a.clone(), a]).unwrap_err();
        assert_eq!(err, Error::DuplicatePartId(1));
    }

    #[test]
    fn test_overlap_respects_kerf() {
        let a = PlacedPart {
            id: 1,
            x: 0,
            y: 0,
            z: 0,
            dims: Dims::new(10, 10, 10),
        };
        let touching = PlacedPart { x: 10, ..a };
        let spaced = PlacedPart { x: 14, ..a };
        let beside = PlacedPart { y: 100, x: 5, ..a };
        assert!(!a.overlaps(&touching, 0));
        assert!(a.overlaps(&touching, 4));
        assert!(!a.overlaps(&spaced, 4));
        assert!(!a.overlaps(&beside, 4));
        assert!(a.overlaps(&PlacedPart { x: 5, ..a }, 0));
    }

    #[test]
    fn test_deserialize_float_dims() {
        let d: Dims = serde_json::from_str(r#"{"l": 200.0, "w": 100, "h": 50}"#).unwrap();
        assert_eq!(d, Dims::new(200, 100, 50));
        assert!(serde_json::from_str::<Dims>(r#"{"l": 2.5, "w": 1, "h": 1}"#).is_err());
    }
}
