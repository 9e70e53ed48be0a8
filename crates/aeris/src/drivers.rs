//! Driver values reported to the host.

use serde::Serialize;
use std::collections::BTreeMap;

/// Destination for driver updates.
///
/// Implementations accept and ignore values they cannot use; a bad value
/// never surfaces as an error to the caller.
pub trait DriverSink {
    fn set_value(&mut self, driver: &str, value: f64);

    /// Report every driver on the next flush, changed or not.
    fn report_all(&mut self) {}

    /// Install display-unit codes for the drivers in `uom`.
    fn set_uom(&mut self, _uom: &BTreeMap<&'static str, u32>) {}
}

/// One driver slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DriverValue {
    pub value: f64,
    pub uom: u32,
    #[serde(skip)]
    dirty: bool,
    /// False while the slot only holds the placeholder from `set_uom`.
    #[serde(skip)]
    reported: bool,
}

/// In-memory driver table with change tracking.
///
/// `set_value` only marks a driver for reporting when its value actually
/// changed; `take_changes` drains the marked drivers for publication.
#[derive(Debug, Clone, Default)]
pub struct DriverTable {
    values: BTreeMap<String, DriverValue>,
}

impl DriverTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, driver: &str) -> Option<f64> {
        self.values.get(driver).map(|d| d.value)
    }

    pub fn uom(&self, driver: &str) -> Option<u32> {
        self.values.get(driver).map(|d| d.uom)
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Drain every driver marked for reporting, in driver-id order.
    pub fn take_changes(&mut self) -> Vec<(String, DriverValue)> {
        self.values
            .iter_mut()
            .filter(|(_, v)| v.dirty)
            .map(|(k, v)| {
                v.dirty = false;
                (k.clone(), *v)
            })
            .collect()
    }
}

impl DriverSink for DriverTable {
    fn set_value(&mut self, driver: &str, value: f64) {
        if !value.is_finite() {
            log::debug!("Ignoring non-finite value for driver {}", driver);
            return;
        }
        match self.values.get_mut(driver) {
            Some(entry) => {
                if !entry.reported || entry.value != value {
                    entry.value = value;
                    entry.dirty = true;
                    entry.reported = true;
                }
            }
            None => {
                self.values.insert(
                    driver.to_string(),
                    DriverValue {
                        value,
                        uom: 0,
                        dirty: true,
                        reported: true,
                    },
                );
            }
        }
    }

    fn report_all(&mut self) {
        for v in self.values.values_mut() {
            v.dirty = true;
        }
    }

    /// Drivers not yet seen are created at 0 until their first real value.
    fn set_uom(&mut self, uom: &BTreeMap<&'static str, u32>) {
        for (driver, code) in uom {
            let entry = self
                .values
                .entry((*driver).to_string())
                .or_insert(DriverValue {
                    value: 0.0,
                    uom: *code,
                    dirty: false,
                    reported: false,
                });
            if entry.uom != *code {
                entry.uom = *code;
                entry.dirty = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchanged_value_is_not_reported_twice() {
        let mut table = DriverTable::new();
        table.set_value("CLITEMP", 21.5);
        assert_eq!(table.take_changes().len(), 1);

        table.set_value("CLITEMP", 21.5);
        assert!(table.take_changes().is_empty());

        table.set_value("CLITEMP", 22.0);
        let changes = table.take_changes();
        assert_eq!(changes[0].0, "CLITEMP");
        assert_eq!(changes[0].1.value, 22.0);
    }

    #[test]
    fn non_finite_values_are_ignored() {
        let mut table = DriverTable::new();
        table.set_value("CLIHUM", f64::NAN);
        table.set_value("CLIHUM", f64::INFINITY);
        assert_eq!(table.get("CLIHUM"), None);
        assert!(table.take_changes().is_empty());
    }

    #[test]
    fn report_all_marks_everything() {
        let mut table = DriverTable::new();
        table.set_value("GV0", 1.0);
        table.set_value("GV1", 2.0);
        table.take_changes();

        table.report_all();
        assert_eq!(table.take_changes().len(), 2);
    }

    #[test]
    fn uom_change_is_reported() {
        let mut table = DriverTable::new();
        let mut uom = BTreeMap::new();
        uom.insert("CLITEMP", 4);
        table.set_uom(&uom);
        assert_eq!(table.uom("CLITEMP"), Some(4));
        assert!(table.take_changes().is_empty());

        uom.insert("CLITEMP", 17);
        table.set_uom(&uom);
        assert_eq!(table.take_changes().len(), 1);
    }

    #[test]
    fn first_zero_after_set_uom_is_reported() {
        let mut table = DriverTable::new();
        let mut uom = BTreeMap::new();
        uom.insert("GV6", 82);
        uom.insert("GV18", 51);
        table.set_uom(&uom);
        assert!(table.take_changes().is_empty());

        table.set_value("GV6", 0.0);
        let changes = table.take_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].0, "GV6");
        assert_eq!(changes[0].1.value, 0.0);
        assert_eq!(changes[0].1.uom, 82);

        // a repeated zero is a plain duplicate again
        table.set_value("GV6", 0.0);
        assert!(table.take_changes().is_empty());
    }
}
