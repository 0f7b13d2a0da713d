//! Record specialization sampled on a regular grid.
//!
//! Grounded on `original_source/include/openPMD/Mesh.hpp`. Geometry,
//! data order, and the grid metadata are all attribute sugar stored
//! through [`Attributable`]; `Mesh` otherwise forwards component access
//! to the embedded [`Record`].

use crate::attributable::Attributable;
use crate::error::Result;
use crate::record::Record;
use crate::record_component::RecordComponent;
use crate::writable::{Arena, WritableId};

/// `spec.md` §4.5: "closed set plus other". Unrecognized strings are
/// auto-prefixed with `other:` by [`Mesh::set_geometry_str`], grounded on
/// `original_source/src/Mesh.cpp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Geometry {
    Cartesian,
    ThetaMode,
    Cylindrical,
    Spherical,
    Other,
}

impl Geometry {
    fn as_str(self) -> &'static str {
        match self {
            Geometry::Cartesian => "cartesian",
            Geometry::ThetaMode => "thetaMode",
            Geometry::Cylindrical => "cylindrical",
            Geometry::Spherical => "spherical",
            Geometry::Other => "other",
        }
    }

    fn from_str(s: &str) -> Option<Geometry> {
        Some(match s {
            "cartesian" => Geometry::Cartesian,
            "thetaMode" => Geometry::ThetaMode,
            "cylindrical" => Geometry::Cylindrical,
            "spherical" => Geometry::Spherical,
            "other" => Geometry::Other,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataOrder {
    C,
    F,
}

impl DataOrder {
    fn as_str(self) -> &'static str {
        match self {
            DataOrder::C => "C",
            DataOrder::F => "F",
        }
    }
}

/// A value expressed either as one scalar SI factor (openPMD 1.x) or one
/// per dimension (2.x); `spec.md` §4.5 requires both forms to round-trip.
#[derive(Debug, Clone, PartialEq)]
pub enum GridUnitSi {
    Scalar(f64),
    PerDimension(Vec<f64>),
}

#[derive(Debug, Clone)]
pub struct Mesh {
    pub(crate) base: Record,
    pub(crate) attrs: Attributable,
}

impl Mesh {
    pub fn new(writable_id: WritableId) -> Self {
        Mesh {
            base: Record::new(writable_id),
            attrs: Attributable::new(),
        }
    }

    pub fn writable_id(&self) -> WritableId {
        self.base.writable_id()
    }

    pub fn is_scalar(&self) -> bool {
        self.base.is_scalar()
    }

    pub fn component(&self, name: &str) -> Option<&RecordComponent> {
        self.base.component(name)
    }

    pub fn component_mut(&mut self, name: &str) -> Option<&mut RecordComponent> {
        self.base.component_mut(name)
    }

    pub fn component_names(&self) -> Vec<String> {
        self.base.component_names()
    }

    pub fn component_or_insert(
        &mut self,
        arena: &mut Arena,
        name: &str,
    ) -> Result<&mut RecordComponent> {
        self.base.component_or_insert(arena, name)
    }

    pub fn erase_component(&mut self, arena: &mut Arena, name: &str) -> Option<RecordComponent> {
        self.base.erase_component(arena, name)
    }

    pub fn component_ids(&self) -> Vec<WritableId> {
        self.base.component_ids()
    }

    pub fn geometry(&self) -> Option<Geometry> {
        self.geometry_string().and_then(|s| Geometry::from_str(&s))
    }

    pub fn geometry_string(&self) -> Option<String> {
        self.attrs.get_attribute_as("geometry")
    }

    pub fn set_geometry(&mut self, arena: &mut Arena, g: Geometry) {
        self.attrs
            .set_attribute(arena, self.writable_id(), "geometry", g.as_str());
    }

    /// Free-form geometry string. Unrecognized values are auto-prefixed
    /// with `other:` unless already present, per `spec.md` §4.5.
    pub fn set_geometry_str(&mut self, arena: &mut Arena, geometry: impl AsRef<str>) {
        let geometry = geometry.as_ref();
        let value = if Geometry::from_str(geometry).is_some() || geometry.starts_with("other:") {
            geometry.to_string()
        } else {
            format!("other:{geometry}")
        };
        self.attrs
            .set_attribute(arena, self.writable_id(), "geometry", value);
    }

    pub fn geometry_parameters(&self) -> Option<String> {
        self.attrs.get_attribute_as("geometryParameters")
    }

    pub fn set_geometry_parameters(&mut self, arena: &mut Arena, params: impl Into<String>) {
        self.attrs
            .set_attribute(arena, self.writable_id(), "geometryParameters", params.into());
    }

    pub fn data_order(&self) -> Option<DataOrder> {
        let s: String = self.attrs.get_attribute_as("dataOrder")?;
        match s.as_str() {
            "C" => Some(DataOrder::C),
            "F" => Some(DataOrder::F),
            _ => None,
        }
    }

    pub fn set_data_order(&mut self, arena: &mut Arena, order: DataOrder) {
        self.attrs
            .set_attribute(arena, self.writable_id(), "dataOrder", order.as_str());
    }

    pub fn axis_labels(&self) -> Option<Vec<String>> {
        self.attrs.get_attribute_as("axisLabels")
    }

    pub fn set_axis_labels(&mut self, arena: &mut Arena, labels: Vec<String>) {
        self.attrs
            .set_attribute(arena, self.writable_id(), "axisLabels", labels);
    }

    pub fn grid_spacing(&self) -> Option<Vec<f64>> {
        self.attrs.get_attribute_as("gridSpacing")
    }

    pub fn set_grid_spacing(&mut self, arena: &mut Arena, spacing: Vec<f64>) {
        self.attrs
            .set_attribute(arena, self.writable_id(), "gridSpacing", spacing);
    }

    pub fn grid_global_offset(&self) -> Option<Vec<f64>> {
        self.attrs.get_attribute_as("gridGlobalOffset")
    }

    pub fn set_grid_global_offset(&mut self, arena: &mut Arena, offset: Vec<f64>) {
        self.attrs
            .set_attribute(arena, self.writable_id(), "gridGlobalOffset", offset);
    }

    /// Reads back whichever form (§4.5: scalar legacy or per-dimension)
    /// was stored, regardless of which form the caller originally wrote.
    pub fn grid_unit_si(&self) -> Option<GridUnitSi> {
        if let Some(v) = self.attrs.get_attribute_as::<Vec<f64>>("gridUnitSI") {
            if v.len() > 1 {
                return Some(GridUnitSi::PerDimension(v));
            }
            if let Some(&only) = v.first() {
                return Some(GridUnitSi::Scalar(only));
            }
        }
        self.attrs
            .get_attribute_as::<f64>("gridUnitSI")
            .map(GridUnitSi::Scalar)
    }

    pub fn set_grid_unit_si(&mut self, arena: &mut Arena, value: GridUnitSi) {
        match value {
            GridUnitSi::Scalar(s) => {
                self.attrs.set_attribute(arena, self.writable_id(), "gridUnitSI", s)
            }
            GridUnitSi::PerDimension(v) => {
                self.attrs.set_attribute(arena, self.writable_id(), "gridUnitSI", v)
            }
        }
    }

    /// SI base-quantity exponents `[L, M, T, I, Θ, N, J]`.
    pub fn unit_dimension(&self) -> [f64; 7] {
        self.attrs
            .get_attribute_as("unitDimension")
            .unwrap_or([0.0; 7])
    }

    pub fn set_unit_dimension(&mut self, arena: &mut Arena, dims: [f64; 7]) {
        self.attrs
            .set_attribute(arena, self.writable_id(), "unitDimension", dims);
    }

    /// Merge per-key updates into the existing `unitDimension` array
    /// rather than overwriting it wholesale (`spec.md` §4.5).
    pub fn merge_unit_dimension(&mut self, arena: &mut Arena, updates: &[(UnitDimensionIndex, f64)]) {
        let mut dims = self.unit_dimension();
        for &(idx, v) in updates {
            dims[idx as usize] = v;
        }
        self.set_unit_dimension(arena, dims);
    }

    pub fn time_offset(&self) -> Option<f64> {
        self.attrs.get_attribute_as("timeOffset")
    }

    pub fn set_time_offset(&mut self, arena: &mut Arena, offset: f64) {
        self.attrs
            .set_attribute(arena, self.writable_id(), "timeOffset", offset);
    }
}

/// Index into the 7-element `unitDimension` array, in SI base order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitDimensionIndex {
    Length = 0,
    Mass = 1,
    Time = 2,
    ElectricCurrent = 3,
    Temperature = 4,
    AmountOfSubstance = 5,
    LuminousIntensity = 6,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writable::Arena;

    fn new_mesh() -> (Arena, Mesh) {
        let mut arena = Arena::new();
        let root = arena.insert_root();
        let id = arena.insert(root, "E");
        (arena, Mesh::new(id))
    }

    #[test]
    fn known_geometry_roundtrips() {
        let (mut arena, mut m) = new_mesh();
        m.set_geometry(&mut arena, Geometry::Cartesian);
        assert_eq!(m.geometry(), Some(Geometry::Cartesian));
        assert_eq!(m.geometry_string().as_deref(), Some("cartesian"));
    }

    #[test]
    fn unknown_geometry_gets_other_prefixed() {
        let (mut arena, mut m) = new_mesh();
        m.set_geometry_str(&mut arena, "custom-topology");
        assert_eq!(m.geometry_string().as_deref(), Some("other:custom-topology"));
        // idempotent: already-prefixed strings are left alone.
        m.set_geometry_str(&mut arena, "other:custom-topology");
        assert_eq!(m.geometry_string().as_deref(), Some("other:custom-topology"));
    }

    #[test]
    fn grid_unit_si_accepts_scalar_and_per_dimension_forms() {
        let (mut arena, mut m) = new_mesh();
        m.set_grid_unit_si(&mut arena, GridUnitSi::Scalar(1.0));
        assert_eq!(m.grid_unit_si(), Some(GridUnitSi::Scalar(1.0)));

        m.set_grid_unit_si(&mut arena, GridUnitSi::PerDimension(vec![1.0, 2.0]));
        assert_eq!(
            m.grid_unit_si(),
            Some(GridUnitSi::PerDimension(vec![1.0, 2.0]))
        );
    }

    #[test]
    fn merge_unit_dimension_only_touches_named_keys() {
        let (mut arena, mut m) = new_mesh();
        m.set_unit_dimension(&mut arena, [1.0, 0.0, -3.0, 0.0, 0.0, 0.0, 0.0]);
        m.merge_unit_dimension(&mut arena, &[(UnitDimensionIndex::Mass, 2.0)]);
        assert_eq!(m.unit_dimension(), [1.0, 2.0, -3.0, 0.0, 0.0, 0.0, 0.0]);
    }
}
