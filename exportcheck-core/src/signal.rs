//! Telemetry payloads exchanged between generator, exporter and receiver.
//!
//! The harness does not care about telemetry semantics. Each payload kind only
//! has to carry the unique id attribute ([`UNIQUE_ID_ATTR`]) on every element so
//! the receiver can extract it. The per-kind layout differs (log records, spans,
//! metric data points); [`IdCarrier`] hides that difference behind one
//! extraction strategy.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::ids::{IdSet, UniqueId};

/// Attribute carrying the unique id on every generated element.
pub const UNIQUE_ID_ATTR: &str = "test_id";

/// Which exporter entry point and payload kind is exercised.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    #[default]
    Logs,
    Traces,
    Metrics,
}

impl DataType {
    pub const ALL: [DataType; 3] = [DataType::Logs, DataType::Traces, DataType::Metrics];

    pub fn name(&self) -> &'static str {
        match self {
            DataType::Logs => "logs",
            DataType::Traces => "traces",
            DataType::Metrics => "metrics",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataType::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| format!("unknown data type '{s}'"))
    }
}

/// Attribute value as found on a telemetry element.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    Str(String),
    Int(i64),
    Double(f64),
    Bool(bool),
}

impl AttributeValue {
    pub fn kind(&self) -> &'static str {
        match self {
            AttributeValue::Str(_) => "str",
            AttributeValue::Int(_) => "int",
            AttributeValue::Double(_) => "double",
            AttributeValue::Bool(_) => "bool",
        }
    }
}

pub type Attributes = BTreeMap<String, AttributeValue>;

fn id_attributes(id: &UniqueId) -> Attributes {
    let mut attributes = Attributes::new();
    attributes.insert(
        UNIQUE_ID_ATTR.to_string(),
        AttributeValue::Str(id.as_str().to_string()),
    );
    attributes
}

/// Ids carried by one batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchIds {
    pub ids: IdSet,
    /// Ids carried by more than one element of the batch, once per repeat.
    pub repeated: Vec<UniqueId>,
}

impl BatchIds {
    /// Records the id of one element.
    fn push(&mut self, id: UniqueId) {
        if !self.ids.insert(id.clone()) {
            self.repeated.push(id);
        }
    }
}

/// Reads the id attribute of one element into `ids`.
fn extract_id(attributes: &Attributes, ids: &mut BatchIds) -> Result<(), ValidationError> {
    match attributes.get(UNIQUE_ID_ATTR) {
        Some(AttributeValue::Str(value)) => {
            ids.push(UniqueId::new(value.as_str()));
            Ok(())
        }
        Some(other) => Err(ValidationError::WrongAttributeType {
            attribute: UNIQUE_ID_ATTR,
            found: other.kind(),
        }),
        None => Err(ValidationError::MissingAttribute {
            attribute: UNIQUE_ID_ATTR,
        }),
    }
}

/// Per-kind id extraction strategy.
pub trait IdCarrier: Sized {
    const DATA_TYPE: DataType;

    /// Payload with exactly one element tagged with `id`.
    fn with_id(id: &UniqueId) -> Self;

    /// Ids of every element; fails on the first element without a valid id.
    /// An id carried twice is kept once in `ids` and listed in `repeated`.
    fn extract_ids(&self) -> Result<BatchIds, ValidationError>;

    /// Number of elements (log records, spans or data points).
    fn item_count(&self) -> usize;
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub body: String,
    pub attributes: Attributes,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LogsData {
    pub records: Vec<LogRecord>,
}

impl IdCarrier for LogsData {
    const DATA_TYPE: DataType = DataType::Logs;

    fn with_id(id: &UniqueId) -> Self {
        Self {
            records: vec![LogRecord {
                body: format!("generated log {id}"),
                attributes: id_attributes(id),
            }],
        }
    }

    fn extract_ids(&self) -> Result<BatchIds, ValidationError> {
        let mut ids = BatchIds::default();
        for record in &self.records {
            extract_id(&record.attributes, &mut ids)?;
        }
        Ok(ids)
    }

    fn item_count(&self) -> usize {
        self.records.len()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub name: String,
    pub attributes: Attributes,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TracesData {
    pub spans: Vec<Span>,
}

impl IdCarrier for TracesData {
    const DATA_TYPE: DataType = DataType::Traces;

    fn with_id(id: &UniqueId) -> Self {
        Self {
            spans: vec![Span {
                name: format!("generated span {id}"),
                attributes: id_attributes(id),
            }],
        }
    }

    fn extract_ids(&self) -> Result<BatchIds, ValidationError> {
        let mut ids = BatchIds::default();
        for span in &self.spans {
            extract_id(&span.attributes, &mut ids)?;
        }
        Ok(ids)
    }

    fn item_count(&self) -> usize {
        self.spans.len()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub value: f64,
    pub attributes: Attributes,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub data_points: Vec<DataPoint>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsData {
    pub metrics: Vec<Metric>,
}

impl IdCarrier for MetricsData {
    const DATA_TYPE: DataType = DataType::Metrics;

    fn with_id(id: &UniqueId) -> Self {
        Self {
            metrics: vec![Metric {
                name: "generated.gauge".to_string(),
                data_points: vec![DataPoint {
                    value: 1.0,
                    attributes: id_attributes(id),
                }],
            }],
        }
    }

    fn extract_ids(&self) -> Result<BatchIds, ValidationError> {
        let mut ids = BatchIds::default();
        for point in self.metrics.iter().flat_map(|m| &m.data_points) {
            extract_id(&point.attributes, &mut ids)?;
        }
        Ok(ids)
    }

    fn item_count(&self) -> usize {
        self.metrics.iter().map(|m| m.data_points.len()).sum()
    }
}

/// Payload of any kind, as carried by exporter calls and transport frames.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "data_type", rename_all = "snake_case")]
pub enum TelemetryBatch {
    Logs(LogsData),
    Traces(TracesData),
    Metrics(MetricsData),
}

impl TelemetryBatch {
    /// One-element batch of the given kind carrying `id`.
    pub fn with_id(data_type: DataType, id: &UniqueId) -> Self {
        match data_type {
            DataType::Logs => TelemetryBatch::Logs(LogsData::with_id(id)),
            DataType::Traces => TelemetryBatch::Traces(TracesData::with_id(id)),
            DataType::Metrics => TelemetryBatch::Metrics(MetricsData::with_id(id)),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            TelemetryBatch::Logs(_) => LogsData::DATA_TYPE,
            TelemetryBatch::Traces(_) => TracesData::DATA_TYPE,
            TelemetryBatch::Metrics(_) => MetricsData::DATA_TYPE,
        }
    }

    /// Extracts the ids of every element, repeats included. An empty batch
    /// is rejected too.
    pub fn batch_ids(&self) -> Result<BatchIds, ValidationError> {
        let ids = match self {
            TelemetryBatch::Logs(data) => data.extract_ids()?,
            TelemetryBatch::Traces(data) => data.extract_ids()?,
            TelemetryBatch::Metrics(data) => data.extract_ids()?,
        };
        if ids.ids.is_empty() {
            return Err(ValidationError::EmptyBatch);
        }
        Ok(ids)
    }

    /// Distinct ids of the batch.
    pub fn ids(&self) -> Result<IdSet, ValidationError> {
        self.batch_ids().map(|batch| batch.ids)
    }

    pub fn item_count(&self) -> usize {
        match self {
            TelemetryBatch::Logs(data) => data.item_count(),
            TelemetryBatch::Traces(data) => data.item_count(),
            TelemetryBatch::Metrics(data) => data.item_count(),
        }
    }
}
