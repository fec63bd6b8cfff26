//! Name-pattern classification of metrics and the registry that holds it.
//!
//! Classification is pure string matching over lowercased metric names.
//! Pattern lists are checked in precedence order, so a name matching both
//! a ratio and a flow pattern (for example `margin`) classifies as ratio.

use std::{collections::BTreeMap, fmt, fs, path::Path};

use anyhow::{Context, Result};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{self, MapAccess, Visitor},
    ser::SerializeMap,
};

pub const LEVEL_PATTERNS: &[&str] = &[
    "count",
    "total",
    "sum",
    "balance",
    "inventory",
    "headcount",
    "qty",
    "quantity",
    "volume",
    "units",
    "size",
];

pub const FLOW_PATTERNS: &[&str] = &[
    "revenue", "sales", "cost", "expense", "income", "profit", "spend", "payment", "receipt",
    "cash", "margin",
];

pub const RATIO_PATTERNS: &[&str] = &[
    "rate",
    "ratio",
    "percentage",
    "pct",
    "%",
    "margin",
    "yield",
    "avg",
    "average",
    "mean",
    "median",
    "per",
    "efficiency",
];

pub const PRICE_PATTERNS: &[&str] = &["price", "rate", "cost_per", "unit_cost"];
pub const VOLUME_PATTERNS: &[&str] = &["quantity", "count", "volume", "units", "qty"];
pub const QUALITY_PATTERNS: &[&str] = &["rating", "score", "satisfaction", "nps", "quality"];
pub const DISCOUNT_PATTERNS: &[&str] = &["discount", "promotion", "rebate", "markdown"];

/// Flow metrics containing one of these decompose into price and volume.
pub const DECOMPOSABLE_PATTERNS: &[&str] = &["revenue", "sales", "gross"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    /// Point-in-time stock, compared across periods directly.
    Level,
    /// Per-period amount such as revenue or spend.
    Flow,
    /// Normalized quantity; deltas in percentage points, not percent.
    Ratio,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Level => "level",
            MetricType::Flow => "flow",
            MetricType::Ratio => "ratio",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverCategory {
    Price,
    Volume,
    Quality,
    Discount,
    Other,
}

impl DriverCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverCategory::Price => "price",
            DriverCategory::Volume => "volume",
            DriverCategory::Quality => "quality",
            DriverCategory::Discount => "discount",
            DriverCategory::Other => "other",
        }
    }
}

impl fmt::Display for DriverCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    pub driver_category: DriverCategory,
    pub is_decomposable: bool,
    pub analysis_priority: u8,
}

/// Classify one metric by its name alone.
pub fn classify_metric(name: &str) -> MetricDescriptor {
    let lowered = name.to_lowercase();
    let metric_type = infer_metric_type(&lowered);
    let driver_category = infer_driver_category(&lowered);
    let is_decomposable =
        metric_type == MetricType::Flow && matches_any(&lowered, DECOMPOSABLE_PATTERNS);
    MetricDescriptor {
        name: name.to_string(),
        metric_type,
        driver_category,
        is_decomposable,
        analysis_priority: assign_priority(metric_type, driver_category),
    }
}

fn matches_any(lowered: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|pattern| lowered.contains(pattern))
}

fn infer_metric_type(lowered: &str) -> MetricType {
    if matches_any(lowered, RATIO_PATTERNS) {
        MetricType::Ratio
    } else if matches_any(lowered, FLOW_PATTERNS) {
        MetricType::Flow
    } else {
        // Unmatched names default to level, the safest comparison basis.
        MetricType::Level
    }
}

fn infer_driver_category(lowered: &str) -> DriverCategory {
    if matches_any(lowered, PRICE_PATTERNS) {
        DriverCategory::Price
    } else if matches_any(lowered, VOLUME_PATTERNS) {
        DriverCategory::Volume
    } else if matches_any(lowered, QUALITY_PATTERNS) {
        DriverCategory::Quality
    } else if matches_any(lowered, DISCOUNT_PATTERNS) {
        DriverCategory::Discount
    } else {
        DriverCategory::Other
    }
}

fn assign_priority(metric_type: MetricType, driver: DriverCategory) -> u8 {
    if metric_type == MetricType::Flow {
        1
    } else if matches!(
        driver,
        DriverCategory::Price | DriverCategory::Volume | DriverCategory::Quality
    ) {
        2
    } else if metric_type == MetricType::Ratio {
        3
    } else {
        4
    }
}

/// Ordered collection of classified metrics. Iteration order is the order
/// names were first seen, which JSON persistence preserves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricRegistry {
    metrics: Vec<MetricDescriptor>,
}

impl MetricRegistry {
    pub fn classify<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut registry = Self::default();
        for name in names {
            let name = name.as_ref();
            if registry.get(name).is_none() {
                registry.metrics.push(classify_metric(name));
            }
        }
        registry
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&MetricDescriptor> {
        self.metrics.iter().find(|metric| metric.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricDescriptor> {
        self.metrics.iter()
    }

    pub fn decomposable(&self) -> impl Iterator<Item = &MetricDescriptor> {
        self.metrics.iter().filter(|metric| metric.is_decomposable)
    }

    /// First registered metric with the given driver, if any.
    pub fn first_with_driver(&self, driver: DriverCategory) -> Option<&MetricDescriptor> {
        self.metrics
            .iter()
            .find(|metric| metric.driver_category == driver)
    }

    /// Metrics worth leading a report with, sorted by priority.
    pub fn priority_metrics(&self) -> Vec<&MetricDescriptor> {
        let mut picked: Vec<&MetricDescriptor> = self
            .metrics
            .iter()
            .filter(|metric| metric.analysis_priority <= 2)
            .collect();
        picked.sort_by_key(|metric| metric.analysis_priority);
        picked
    }

    pub fn type_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for metric in &self.metrics {
            *counts.entry(metric.metric_type.as_str()).or_insert(0) += 1;
        }
        counts
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut rendered =
            serde_json::to_string_pretty(self).context("Serializing metric registry to JSON")?;
        rendered.push('\n');
        fs::write(path, rendered).with_context(|| format!("Writing metric registry {path:?}"))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Reading metric registry {path:?}"))?;
        let registry: MetricRegistry = serde_json::from_str(&contents)
            .with_context(|| format!("Parsing metric registry {path:?}"))?;
        Ok(registry)
    }
}

impl Serialize for MetricRegistry {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.metrics.len()))?;
        for metric in &self.metrics {
            map.serialize_entry(&metric.name, metric)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for MetricRegistry {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct RegistryVisitor;

        impl<'de> Visitor<'de> for RegistryVisitor {
            type Value = MetricRegistry;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of metric name to descriptor")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut metrics = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, descriptor)) =
                    access.next_entry::<String, MetricDescriptor>()?
                {
                    if name != descriptor.name {
                        return Err(de::Error::custom(format!(
                            "Registry key '{name}' does not match descriptor name '{}'",
                            descriptor.name
                        )));
                    }
                    metrics.push(descriptor);
                }
                Ok(MetricRegistry { metrics })
            }
        }

        deserializer.deserialize_map(RegistryVisitor)
    }
}
