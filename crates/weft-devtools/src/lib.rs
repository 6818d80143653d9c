use std::fmt;

use weft_core::{ContextMonitor, Statistics};

const COMBINED: &str = "<combined>";

/// One line of a [`StatisticsReport`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReportRow {
    pub name: String,
    pub unique_contexts: usize,
    /// Number of distinct values per variable, sorted by variable name.
    pub unique_values: Vec<(String, usize)>,
}

impl ReportRow {
    fn new(name: String, statistics: &Statistics) -> Self {
        let unique_values = statistics
            .variable_names()
            .into_iter()
            .map(|v| (v.to_string(), statistics.num_unique_values(v)))
            .collect();
        Self {
            name,
            unique_contexts: statistics.num_unique_contexts(),
            unique_values,
        }
    }

    fn values_column(&self) -> String {
        self.unique_values
            .iter()
            .map(|(name, count)| format!("{name}={count}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Snapshot of a [`ContextMonitor`], laid out for reading.
///
/// Components are named relative to the monitor's root when it is still
/// alive, by full name otherwise.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatisticsReport {
    pub rows: Vec<ReportRow>,
    pub combined: ReportRow,
}

impl StatisticsReport {
    pub fn from_monitor(monitor: &ContextMonitor) -> Self {
        let root = monitor.root();
        let mut rows: Vec<ReportRow> = monitor
            .all_statistics()
            .iter()
            .map(|(component, statistics)| {
                let name = match &root {
                    Some(root) if root.is_ancestor_of(component) => component.relative_name(root),
                    _ => component.full_name(),
                };
                ReportRow::new(name, statistics)
            })
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            rows,
            combined: ReportRow::new(COMBINED.to_string(), &monitor.combined_statistics()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, name: &str) -> Option<&ReportRow> {
        self.rows.iter().find(|r| r.name == name)
    }

    pub fn log_report(&self) {
        for line in self.to_string().lines() {
            log::info!("{line}");
        }
    }
}

impl fmt::Display for StatisticsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .rows
            .iter()
            .chain(std::iter::once(&self.combined))
            .map(|r| r.name.len())
            .max()
            .unwrap_or(0)
            .max("component".len());

        writeln!(f, "{:<width$}  {:>8}  variables", "component", "contexts")?;
        for row in self.rows.iter().chain(std::iter::once(&self.combined)) {
            writeln!(
                f,
                "{:<width$}  {:>8}  {}",
                row.name,
                row.unique_contexts,
                row.values_column()
            )?;
        }
        Ok(())
    }
}
