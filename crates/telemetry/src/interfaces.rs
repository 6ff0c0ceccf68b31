//! Capture interface descriptors.
//!
//! The backend describes interfaces as `"name - ip - guid"`. Only interfaces
//! with a real GUID can be handed to the engine.

use serde::Serialize;

/// GUID placeholder the backend reports for unusable adapters.
pub const GUID_NOT_FOUND: &str = "GUID not found";

const SEPARATOR: &str = " - ";

/// One enumerated network interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceDescriptor {
    /// The descriptor exactly as enumerated; this is what the engine is
    /// started with.
    pub raw: String,
    pub name: String,
    pub ip: String,
    pub guid: String,
}

impl InterfaceDescriptor {
    /// Split a descriptor. Missing parts are left empty.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let mut parts = raw.splitn(3, SEPARATOR).map(str::trim);
        let name = parts.next().unwrap_or_default().to_string();
        let ip = parts.next().unwrap_or_default().to_string();
        let guid = parts.next().unwrap_or_default().to_string();
        Self {
            raw: raw.to_string(),
            name,
            ip,
            guid,
        }
    }

    #[must_use]
    pub fn is_selectable(&self) -> bool {
        !self.guid.is_empty() && self.guid != GUID_NOT_FOUND
    }

    /// `"name - ip"` for display.
    #[must_use]
    pub fn display(&self) -> String {
        if self.ip.is_empty() {
            self.name.clone()
        } else {
            format!("{}{SEPARATOR}{}", self.name, self.ip)
        }
    }
}

/// Enumerated interfaces plus the current selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceList {
    interfaces: Vec<InterfaceDescriptor>,
    selected: Option<String>,
}

impl InterfaceList {
    /// Build from enumeration output and select the first usable interface.
    pub fn from_raw<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let interfaces: Vec<_> = raw
            .into_iter()
            .map(|r| InterfaceDescriptor::parse(r.as_ref()))
            .collect();
        let selected = interfaces
            .iter()
            .find(|i| i.is_selectable())
            .map(|i| i.raw.clone());
        Self {
            interfaces,
            selected,
        }
    }

    #[must_use]
    pub fn interfaces(&self) -> &[InterfaceDescriptor] {
        &self.interfaces
    }

    pub fn selectable(&self) -> impl Iterator<Item = &InterfaceDescriptor> {
        self.interfaces.iter().filter(|i| i.is_selectable())
    }

    /// Raw descriptor of the selected interface.
    #[must_use]
    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Select by raw descriptor or by name. Returns `false` if no selectable
    /// interface matches.
    pub fn select(&mut self, key: &str) -> bool {
        let found = self
            .selectable()
            .find(|i| i.raw == key || i.name == key)
            .map(|i| i.raw.clone());
        match found {
            Some(raw) => {
                self.selected = Some(raw);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }
}
