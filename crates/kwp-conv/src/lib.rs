//! kwp-conv - Live data catalog and decoding for K-Line ECUs
//!
//! Describes which bytes of a ReadDataByLocalIdentifier block hold which
//! physical value, turns raw blocks into rounded values and builds the
//! schema line viewers receive before any data.
//!
//! # Quick Start
//!
//! ```rust
//! use kwp_conv::{decode_source, Catalog, Conversion, DataSource, Parameter, TelemetryRecord};
//!
//! let source = DataSource::new(0x01, vec![
//!     Parameter::new("Battery voltage", "V", 1, 1)
//!         .with_conversion(Conversion::scaled(0.10159))
//!         .with_precision(2),
//!     Parameter::new("Engine Speed", "RPM", 31, 2).with_precision(1),
//! ]);
//!
//! let mut block = vec![0u8; 33];
//! block[1] = 100;
//! block[31..33].copy_from_slice(&2000u16.to_le_bytes());
//!
//! let values = decode_source(&block, &source);
//! assert_eq!(values, vec![10.16, 2000.0]);
//!
//! let record = TelemetryRecord::new(42, values);
//! assert_eq!(record.to_line(), "DATA 42,10.16,2000");
//!
//! let catalog = Catalog::new(vec![source]);
//! assert!(catalog.validate().is_ok());
//! ```
//!
//! # YAML Catalog Files
//!
//! ```yaml
//! sources:
//!   - local_identifier: 0x01
//!     parameters:
//!       - name: Intake Air Temperature Sensor
//!         unit: C
//!         byte_offset: 9
//!         byte_size: 1
//!         conversion:
//!           type: affine
//!           scale: 0.75
//!           offset: -48.0
//!         precision: 2
//! ```

pub mod catalog;
pub mod decode;
pub mod error;
pub mod precision;
pub mod record;
pub mod schema;
pub mod types;

pub use catalog::Catalog;
pub use decode::{decode, decode_source, decode_source_into, read_le};
pub use error::{ConvError, ConvResult};
pub use precision::{format_value, round_to_precision, MAX_PRECISION};
pub use record::{TelemetryRecord, DATA_KEYWORD};
pub use schema::{build_schema, sanitize_key, Schema, SchemaField, SCHEMA_KEYWORD, SCHEMA_VERSION};
pub use types::{Conversion, DataSource, Parameter};
