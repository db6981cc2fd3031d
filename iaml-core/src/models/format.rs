use std::fmt;

use serde::{Deserialize, Serialize};

/// How a program is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Format {
    #[serde(rename = "In-Person")]
    InPerson,
    #[serde(rename = "Virtual")]
    Virtual,
    #[serde(rename = "On-Demand")]
    OnDemand,
}

impl Format {
    pub fn all() -> &'static [Format] {
        &[Format::InPerson, Format::Virtual, Format::OnDemand]
    }

    /// Display name, as stored on session records and sent to the CRM.
    pub fn label(&self) -> &'static str {
        match self {
            Self::InPerson => "In-Person",
            Self::Virtual => "Virtual",
            Self::OnDemand => "On-Demand",
        }
    }

    /// URL slug used in `?format=` query parameters.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::InPerson => "in-person",
            Self::Virtual => "virtual",
            Self::OnDemand => "on-demand",
        }
    }

    /// Two-letter prefix of a registration code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InPerson => "IP",
            Self::Virtual => "VI",
            Self::OnDemand => "OD",
        }
    }

    /// Accepts a slug, display name or code, ignoring case.
    pub fn parse(s: &str) -> Option<Self> {
        let needle = s.trim();
        Self::all().iter().copied().find(|f| {
            needle.eq_ignore_ascii_case(f.slug())
                || needle.eq_ignore_ascii_case(f.label())
                || needle.eq_ignore_ascii_case(f.code())
        })
    }
}

impl fmt::Display for Format {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.label())
    }
}
