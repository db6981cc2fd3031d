use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::Format;

/// A concrete scheduled offering of a program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub program: Option<String>,
    pub format: Option<Format>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub venue: Option<String>,
}

impl SessionRecord {
    /// Human-readable location: whichever of venue, city and state are known,
    /// comma separated, or `"Online"` when none are.
    pub fn location(&self) -> String {
        let parts: Vec<&str> = [&self.venue, &self.city, &self.state]
            .into_iter()
            .filter_map(|part| part.as_deref())
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();

        if parts.is_empty() {
            "Online".to_string()
        } else {
            parts.join(", ")
        }
    }
}
