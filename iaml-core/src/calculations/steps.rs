//! Step planning for the registration wizard.
//!
//! The step list is recomputed from scratch after every answer change:
//! a step is skipped when its answer was already resolved from the URL, and
//! the blocks step only appears for block-capable programs that are not sold
//! on demand. Contact and payment are always the last two steps.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{Attendance, BlockId, Format, Program, ProgramCatalog};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Format,
    Program,
    Blocks,
    Session,
    Contact,
    Payment,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Format => "format",
            Self::Program => "program",
            Self::Blocks => "blocks",
            Self::Session => "session",
            Self::Contact => "contact",
            Self::Payment => "payment",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answers resolved from URL query parameters before the wizard starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prefill {
    pub format: Option<Format>,
    /// Canonical program name.
    pub program: Option<String>,
    pub attendance: Option<Attendance>,
    pub session_id: Option<String>,
}

impl Prefill {
    /// Resolves `format`, `program`, `blocks` and `session` from a query
    /// string (with or without the leading `?`).
    ///
    /// Values that do not resolve against the catalog are dropped so that the
    /// matching step is asked instead. `blocks` only resolves when the program
    /// resolves, has blocks, and every listed block exists on it; the value
    /// `full` selects full attendance.
    pub fn from_query(
        query: &str,
        catalog: &ProgramCatalog,
    ) -> Self {
        let query = query.trim().trim_start_matches('?');

        let mut format_param = None;
        let mut program_param = None;
        let mut blocks_param = None;
        let mut session_param = None;
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let value = value.trim().to_string();
            if value.is_empty() {
                continue;
            }
            match &*key {
                "format" => format_param = Some(value),
                "program" => program_param = Some(value),
                "blocks" => blocks_param = Some(value),
                "session" => session_param = Some(value),
                _ => {}
            }
        }

        let format = format_param.as_deref().and_then(Format::parse);
        let program = program_param
            .as_deref()
            .and_then(|p| catalog.resolve(p));
        let attendance = match (program, blocks_param.as_deref()) {
            (Some(program), Some(blocks)) => resolve_blocks(program, blocks),
            _ => None,
        };

        let prefill = Self {
            format,
            program: program.map(|p| p.name.clone()),
            attendance,
            session_id: session_param,
        };
        debug!(?prefill, "resolved URL prefill");
        prefill
    }
}

fn resolve_blocks(
    program: &Program,
    raw: &str,
) -> Option<Attendance> {
    if !program.has_blocks() {
        return None;
    }
    if raw.eq_ignore_ascii_case("full") {
        return Some(Attendance::Full);
    }

    let mut selected = BTreeSet::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let id = BlockId::parse(part)?;
        program.block(id)?;
        selected.insert(id);
    }

    if selected.is_empty() {
        None
    } else {
        Some(Attendance::Blocks(selected))
    }
}

/// Computes the ordered list of steps still to be asked.
///
/// `format` and `program` are the values currently known, whether they came
/// from the URL or from an answered step.
pub fn determine_steps(
    prefill: &Prefill,
    format: Option<Format>,
    program: Option<&Program>,
) -> Vec<Step> {
    let mut steps = Vec::with_capacity(6);

    if prefill.format.is_none() {
        steps.push(Step::Format);
    }
    if prefill.program.is_none() {
        steps.push(Step::Program);
    }

    let supports_blocks = program.is_some_and(Program::has_blocks);
    if prefill.attendance.is_none() && supports_blocks && format != Some(Format::OnDemand) {
        steps.push(Step::Blocks);
    }

    if prefill.session_id.is_none() {
        steps.push(Step::Session);
    }

    steps.push(Step::Contact);
    steps.push(Step::Payment);
    steps
}

/// Difference between two step plans, used to rebuild the step indicator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepDiff {
    pub inserted: Vec<Step>,
    pub removed: Vec<Step>,
}

impl StepDiff {
    pub fn between(
        old: &[Step],
        new: &[Step],
    ) -> Self {
        Self {
            inserted: new.iter().filter(|s| !old.contains(s)).copied().collect(),
            removed: old.iter().filter(|s| !new.contains(s)).copied().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.removed.is_empty()
    }
}
