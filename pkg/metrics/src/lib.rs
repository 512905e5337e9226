use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Label set of one series, kept sorted so equal sets render identically.
type Labels = Vec<(String, String)>;

/// A lightweight, thread-safe metrics registry that renders in Prometheus text exposition format.
///
/// Counters may carry labels; each distinct label set is its own series.
pub struct MetricsRegistry {
    counters: RwLock<BTreeMap<String, CounterFamily>>,
    gauges: RwLock<BTreeMap<String, Gauge>>,
}

/// Monotonically increasing counters sharing a name and help text.
struct CounterFamily {
    help: String,
    series: RwLock<BTreeMap<Labels, AtomicU64>>,
}

/// Value that can go up or down.
struct Gauge {
    value: AtomicI64,
    help: String,
}

fn normalize(labels: &[(&str, &str)]) -> Labels {
    let mut out: Labels = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    out.sort();
    out
}

fn render_labels(labels: &Labels) -> String {
    if labels.is_empty() {
        return String::new();
    }
    let inner = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, v.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect::<Vec<_>>()
        .join(",");
    format!("{{{}}}", inner)
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(BTreeMap::new()),
            gauges: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register a counter family. If it already exists, this is a no-op.
    pub fn register_counter(&self, name: &str, help: &str) {
        self.counters
            .write()
            .entry(name.to_string())
            .or_insert_with(|| CounterFamily {
                help: help.to_string(),
                series: RwLock::new(BTreeMap::new()),
            });
    }

    /// Register a gauge. If it already exists, this is a no-op.
    pub fn register_gauge(&self, name: &str, help: &str) {
        self.gauges
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Gauge {
                value: AtomicI64::new(0),
                help: help.to_string(),
            });
    }

    /// Increment an unlabelled counter by 1.
    pub fn counter_inc(&self, name: &str) {
        self.counter_add_with(name, &[], 1);
    }

    /// Increment the series of `name` identified by `labels` by 1.
    pub fn counter_inc_with(&self, name: &str, labels: &[(&str, &str)]) {
        self.counter_add_with(name, labels, 1);
    }

    /// Add `val` to a labelled series. Unregistered names are ignored.
    pub fn counter_add_with(&self, name: &str, labels: &[(&str, &str)], val: u64) {
        let counters = self.counters.read();
        let Some(family) = counters.get(name) else {
            return;
        };
        let key = normalize(labels);
        if let Some(series) = family.series.read().get(&key) {
            series.fetch_add(val, Ordering::Relaxed);
            return;
        }
        family
            .series
            .write()
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(val, Ordering::Relaxed);
    }

    /// Current value of a series, 0 if it was never touched.
    pub fn counter_value(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.counters
            .read()
            .get(name)
            .and_then(|family| {
                family
                    .series
                    .read()
                    .get(&normalize(labels))
                    .map(|v| v.load(Ordering::Relaxed))
            })
            .unwrap_or(0)
    }

    /// Set a gauge to a specific value.
    pub fn gauge_set(&self, name: &str, val: i64) {
        if let Some(g) = self.gauges.read().get(name) {
            g.value.store(val, Ordering::Relaxed);
        }
    }

    pub fn gauge_value(&self, name: &str) -> i64 {
        self.gauges
            .read()
            .get(name)
            .map(|g| g.value.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut output = String::new();

        for (name, family) in self.counters.read().iter() {
            let _ = writeln!(output, "# HELP {} {}", name, family.help);
            let _ = writeln!(output, "# TYPE {} counter", name);
            let series = family.series.read();
            if series.is_empty() {
                let _ = writeln!(output, "{} 0", name);
            }
            for (labels, value) in series.iter() {
                let _ = writeln!(
                    output,
                    "{}{} {}",
                    name,
                    render_labels(labels),
                    value.load(Ordering::Relaxed)
                );
            }
        }

        for (name, gauge) in self.gauges.read().iter() {
            let _ = writeln!(output, "# HELP {} {}", name, gauge.help);
            let _ = writeln!(output, "# TYPE {} gauge", name);
            let _ = writeln!(output, "{} {}", name, gauge.value.load(Ordering::Relaxed));
        }

        output
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
