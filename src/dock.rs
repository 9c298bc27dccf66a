// SPDX-License-Identifier: GPL-3.0-only
//! Dock identity filter
//!
//! Decides whether a Thunderbolt device directory belongs to the dock we
//! care about by keyword matching its `vendor_name` and `device_name`.
//! The match is a substring test, so it tolerates formatting differences
//! but can be fooled by coincidental substrings.

use std::path::Path;

use crate::connector::read_attr;

#[derive(Debug, Clone)]
pub struct DockFilter {
    keywords: Vec<String>,
}

impl DockFilter {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().to_lowercase())
                .collect(),
        }
    }

    /// Identity string compared against the keywords
    ///
    /// Missing attributes read as empty strings.
    pub fn identity(sys_path: &Path) -> String {
        let vendor = read_attr(sys_path, "vendor_name").unwrap_or_default();
        let device = read_attr(sys_path, "device_name").unwrap_or_default();
        format!("{} {}", vendor, device).to_lowercase()
    }

    /// True iff every keyword is a substring of the identity string
    pub fn is_target_dock(&self, sys_path: &Path) -> bool {
        self.matches(&Self::identity(sys_path))
    }

    pub fn matches(&self, identity: &str) -> bool {
        self.keywords.iter().all(|k| identity.contains(k.as_str()))
    }
}
