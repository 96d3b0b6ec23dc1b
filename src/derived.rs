//! # Derived Metrics
//!
//! Derived metrics are sliding-window counters over recent history, keyed
//! by name and defined in the rule set. They are recomputed in full at the
//! start of every run; nothing is cached between runs, and the generated
//! script performs the same computation at its top before any branch is
//! considered.

use std::collections::{BTreeMap, HashMap};

use tracing::trace;

use crate::ast::RuleSpec;
use crate::context::HistoryView;
use crate::matching;

/// The computed metric values for one run.
#[derive(Debug, Clone, Default)]
pub struct DerivedValues {
    values: HashMap<String, f64>,
}

impl DerivedValues {
    /// Computes every defined metric. A definition referencing an unknown
    /// list counts zero; duplicate keys keep the last definition.
    pub fn compute(spec: &RuleSpec, history: &HistoryView) -> Self {
        let mut values = HashMap::new();
        for def in &spec.derived {
            let count = match spec.find_list(&def.list_id) {
                Some(list) => {
                    matching::count_in_window(&list.entries, history.entries(), def.window)
                }
                None => 0,
            };
            trace!("derived '{}' = {}", def.key, count);
            values.insert(def.key.clone(), count as f64);
        }
        Self { values }
    }

    /// Reads a metric; unknown keys read as zero.
    pub fn get(&self, key: &str) -> f64 {
        self.values.get(key).copied().unwrap_or(0.0)
    }

    /// Ordered copy of all values, for trace output.
    pub fn snapshot(&self) -> BTreeMap<String, f64> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }
}
