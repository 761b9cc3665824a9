//! Parameter catalog
//!
//! The catalog is loaded once at startup and never changes afterwards. It
//! fixes the request order, the schema labels and the column order of every
//! data record.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConvError, ConvResult};
use crate::schema::sanitize_key;
use crate::types::{Conversion, DataSource, Parameter};

/// Ordered set of data sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    sources: Vec<DataSource>,
}

impl Catalog {
    pub fn new(sources: Vec<DataSource>) -> Self {
        Self { sources }
    }

    /// Parse a catalog from YAML and validate it
    ///
    /// ```yaml
    /// sources:
    ///   - local_identifier: 1
    ///     parameters:
    ///       - name: Engine Speed
    ///         unit: RPM
    ///         byte_offset: 31
    ///         byte_size: 2
    ///         precision: 1
    /// ```
    pub fn from_yaml(yaml: &str) -> ConvResult<Self> {
        let catalog: Catalog = serde_yaml::from_str(yaml)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load and validate a YAML catalog file
    pub fn from_file(path: impl AsRef<Path>) -> ConvResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn sources(&self) -> &[DataSource] {
        &self.sources
    }

    /// All parameters, flattened in catalog order
    pub fn parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.sources.iter().flat_map(|s| s.parameters.iter())
    }

    pub fn parameter_count(&self) -> usize {
        self.sources.iter().map(|s| s.parameters.len()).sum()
    }

    /// Check field widths, local identifiers and schema key uniqueness
    pub fn validate(&self) -> ConvResult<()> {
        if self.parameter_count() == 0 {
            return Err(ConvError::EmptyCatalog);
        }

        let mut local_ids = HashSet::new();
        let mut keys: HashMap<String, &str> = HashMap::new();

        for source in &self.sources {
            if !local_ids.insert(source.local_identifier) {
                return Err(ConvError::DuplicateLocalIdentifier(
                    source.local_identifier,
                ));
            }

            for param in &source.parameters {
                if !matches!(param.byte_size, 1 | 2) {
                    return Err(ConvError::InvalidParameter {
                        name: param.name.clone(),
                        reason: format!("byte_size must be 1 or 2, got {}", param.byte_size),
                    });
                }

                let key = sanitize_key(&param.name);
                if key.is_empty() {
                    return Err(ConvError::InvalidParameter {
                        name: param.name.clone(),
                        reason: "label has no alphanumeric characters".to_string(),
                    });
                }
                if let Some(first) = keys.insert(key.clone(), &param.name) {
                    return Err(ConvError::DuplicateKey {
                        key,
                        first: first.to_string(),
                        second: param.name.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Live data catalog for the SIMK4x engine ECUs
    pub fn builtin() -> Self {
        let p = Parameter::new;
        let parameters = vec![
            p("Oxygen Sensor-Bank1/Sensor1", "mV", 38, 2)
                .with_conversion(Conversion::scaled(4.883))
                .with_precision(1),
            p("Air Flow Rate from Mass Air Flow Sensor", "kg/h", 15, 2)
                .with_conversion(Conversion::scaled(0.03125))
                .with_precision(2),
            p("Engine Coolant Temperature Sensor", "C", 4, 1)
                .with_conversion(Conversion::scaled(0.75))
                .with_precision(2),
            p("Oil Temperature Sensor", "C", 6, 1)
                .with_conversion(Conversion::affine(1.0, -40.0))
                .with_precision(2),
            p("Intake Air Temperature Sensor", "C", 9, 1)
                .with_conversion(Conversion::affine(0.75, -48.0))
                .with_precision(2),
            p("Throttle Position", "'", 11, 1)
                .with_conversion(Conversion::scaled(0.468627))
                .with_precision(2),
            p("Battery voltage", "V", 1, 1)
                .with_conversion(Conversion::scaled(0.10159))
                .with_precision(2),
            p("Vehicle Speed", "km/h", 30, 1).with_precision(1),
            p("Engine Speed", "RPM", 31, 2).with_precision(1),
            p("Oxygen Sensor-Bank1/Sensor2", "mV", 40, 2)
                .with_conversion(Conversion::scaled(4.883))
                .with_precision(2),
            p("Ignition Timing Advance for 1 Cylinder", "'", 58, 1)
                .with_conversion(Conversion::affine(-0.325, -72.0))
                .with_precision(2),
            p("Cylinder Injection Time-Bank1", "ms", 76, 2)
                .with_conversion(Conversion::scaled(0.004))
                .with_precision(2),
            p("Long Term Fuel Trim-Idle Load", "ms", 89, 2)
                .with_conversion(Conversion::scaled(0.004))
                .with_precision(2),
            p("Long Term Fuel Trim-Part Load", "%", 91, 2)
                .with_conversion(Conversion::scaled(0.001529))
                .with_precision(2),
            p("Camshaft Actual Position", "'", 142, 1)
                .with_conversion(Conversion::affine(0.375, -60.0))
                .with_precision(2),
            p("Camshaft position target", "'", 143, 1)
                .with_conversion(Conversion::affine(0.375, -60.0))
                .with_precision(2),
            p("Ignition dwell time", "ms", 106, 2)
                .with_conversion(Conversion::scaled(0.004))
                .with_precision(2),
            p("EVAP Purge valve", "%", 101, 2)
                .with_conversion(Conversion::scaled(0.003052))
                .with_precision(2),
            p("Idle speed control actuator", "%", 99, 2)
                .with_conversion(Conversion::scaled(0.001529))
                .with_precision(2),
            p("CVVT Valve Duty", "%", 156, 2)
                .with_conversion(Conversion::scaled(0.001526))
                .with_precision(2),
            p("Oxygen Sensor Heater Duty-Bank1/Sensor1", "%", 93, 1)
                .with_conversion(Conversion::scaled(0.390625))
                .with_precision(2),
            p("Oxygen Sensor Heater Duty-Bank1/Sensor2", "%", 94, 1)
                .with_conversion(Conversion::scaled(0.390625))
                .with_precision(2),
            p("CVVT Status", "", 145, 1).with_precision(1),
            p("CVVT Actuation Status", "", 146, 1).with_precision(1),
            p("CVVT Duty Control Status", "", 160, 1).with_precision(1),
        ];

        Self::new(vec![DataSource::new(0x01, parameters)])
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}
