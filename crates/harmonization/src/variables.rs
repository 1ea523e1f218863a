//! Physical variables delivered by the acquisition collaborators.
//!
//! Used to decide which layers are mandatory for a source and which values
//! are physically plausible when scoring quality.

use harmonize_common::SourceId;

/// Unit and plausible range of one delivered variable.
#[derive(Debug, Clone, Copy)]
pub struct VariableSpec {
    /// Variable name inside the source array (e.g., "temperature_2m")
    pub name: &'static str,
    pub source: SourceId,
    pub unit: &'static str,
    /// Inclusive plausible range
    pub min: f32,
    pub max: f32,
    /// Optional layers may be absent without the source being incomplete
    pub optional: bool,
}

impl VariableSpec {
    pub fn is_plausible(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }
}

pub const TEMPERATURE_2M: &str = "temperature_2m";
pub const RELATIVE_HUMIDITY: &str = "relative_humidity";
pub const PRECIPITATION: &str = "precipitation";
pub const NDVI: &str = "ndvi";
pub const LST_DAY: &str = "lst_day";
pub const PIXEL_RELIABILITY: &str = "pixel_reliability";
pub const PREVALENCE: &str = "prevalence";
pub const POPULATION_DENSITY: &str = "population_density";

/// Every variable the pipeline knows how to interpret.
pub fn known_variables() -> &'static [VariableSpec] {
    use SourceId::*;

    const SPECS: &[VariableSpec] = &[
        VariableSpec { name: TEMPERATURE_2M, source: Climate, unit: "K", min: 180.0, max: 340.0, optional: false },
        VariableSpec { name: RELATIVE_HUMIDITY, source: Climate, unit: "%", min: 0.0, max: 100.0, optional: true },
        VariableSpec { name: PRECIPITATION, source: Precipitation, unit: "mm/day", min: 0.0, max: 500.0, optional: false },
        VariableSpec { name: NDVI, source: Vegetation, unit: "1", min: -1.0, max: 1.0, optional: false },
        VariableSpec { name: LST_DAY, source: Vegetation, unit: "K", min: 200.0, max: 350.0, optional: true },
        VariableSpec { name: PIXEL_RELIABILITY, source: Vegetation, unit: "class", min: 0.0, max: 3.0, optional: true },
        VariableSpec { name: PREVALENCE, source: Epidemiology, unit: "fraction", min: 0.0, max: 1.0, optional: false },
        VariableSpec { name: POPULATION_DENSITY, source: Population, unit: "persons/km2", min: 0.0, max: 100_000.0, optional: false },
    ];
    SPECS
}

/// Look up a variable by name.
pub fn variable_spec(name: &str) -> Option<&'static VariableSpec> {
    known_variables().iter().find(|spec| spec.name == name)
}

/// Mandatory variables for a source.
pub fn required_variables(source: SourceId) -> impl Iterator<Item = &'static str> {
    known_variables()
        .iter()
        .filter(move |spec| spec.source == source && !spec.optional)
        .map(|spec| spec.name)
}

/// Kelvin to degrees Celsius, keeping NaN.
pub fn kelvin_to_celsius(k: f32) -> f32 {
    k - 273.15
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_source_has_a_required_variable() {
        for source in SourceId::ALL {
            assert_eq!(required_variables(source).count(), 1, "{}", source);
        }
    }

    #[test]
    fn test_plausible_ranges() {
        let ndvi = variable_spec(NDVI).unwrap();
        assert!(ndvi.is_plausible(0.4));
        assert!(!ndvi.is_plausible(1.5));
        assert!(!ndvi.is_plausible(f32::NAN));
        assert!(variable_spec("wind_speed").is_none());
    }
}
