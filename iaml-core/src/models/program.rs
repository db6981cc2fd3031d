//! Program catalog: the programs IAML sells and the blocks they split into.

use std::collections::HashSet;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of a block within a program, displayed as `"Block N"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlockId(pub u8);

impl BlockId {
    pub fn number(&self) -> u8 {
        self.0
    }

    /// Parses `"Block 2"`, `"block-2"` or a bare `"2"`.
    pub fn parse(s: &str) -> Option<Self> {
        let trimmed = s.trim();
        let lower = trimmed.to_ascii_lowercase();
        let digits = lower
            .strip_prefix("block")
            .map(|rest| rest.trim_start_matches(['-', '_', ' ']))
            .unwrap_or(lower.as_str());
        match digits.parse::<u8>() {
            Ok(n) if n > 0 => Some(Self(n)),
            _ => None,
        }
    }
}

impl fmt::Display for BlockId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "Block {}", self.0)
    }
}

impl TryFrom<String> for BlockId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid block id '{value}'"))
    }
}

impl From<BlockId> for String {
    fn from(id: BlockId) -> Self {
        id.to_string()
    }
}

/// A separately sellable slice of a multi-day program.
///
/// `start_offset` and `end_offset` are inclusive day offsets from the
/// session's base start date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub title: String,
    pub price: Decimal,
    pub start_offset: u32,
    pub end_offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub name: String,
    pub slug: String,
    /// Letter used in registration codes. Falls back to the first letter of
    /// the name when absent.
    pub code: Option<char>,
    pub full_price: Decimal,
    pub blocks: Vec<Block>,
}

impl Program {
    pub fn has_blocks(&self) -> bool {
        !self.blocks.is_empty()
    }

    pub fn block(
        &self,
        id: BlockId,
    ) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn program_code(&self) -> char {
        self.code
            .or_else(|| self.name.chars().next())
            .map(|c| c.to_ascii_uppercase())
            .unwrap_or('X')
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog has no programs")]
    Empty,

    #[error("duplicate program name '{0}'")]
    DuplicateName(String),

    #[error("duplicate program slug '{0}'")]
    DuplicateSlug(String),

    #[error("program '{program}' lists {block} more than once")]
    DuplicateBlock { program: String, block: BlockId },

    #[error("program '{program}': {block} ends before it starts")]
    InvertedBlockRange { program: String, block: BlockId },

    #[error("program '{0}' has a negative price")]
    NegativePrice(String),
}

/// The set of programs offered for registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramCatalog {
    programs: Vec<Program>,
}

impl ProgramCatalog {
    /// Builds a catalog, checking names, slugs, block ids, offsets and prices.
    pub fn new(programs: Vec<Program>) -> Result<Self, CatalogError> {
        if programs.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut names = HashSet::new();
        let mut slugs = HashSet::new();
        for program in &programs {
            if !names.insert(program.name.to_ascii_lowercase()) {
                return Err(CatalogError::DuplicateName(program.name.clone()));
            }
            if !slugs.insert(program.slug.to_ascii_lowercase()) {
                return Err(CatalogError::DuplicateSlug(program.slug.clone()));
            }
            if program.full_price < Decimal::ZERO
                || program.blocks.iter().any(|b| b.price < Decimal::ZERO)
            {
                return Err(CatalogError::NegativePrice(program.name.clone()));
            }

            let mut block_ids = HashSet::new();
            for block in &program.blocks {
                if !block_ids.insert(block.id) {
                    return Err(CatalogError::DuplicateBlock {
                        program: program.name.clone(),
                        block: block.id,
                    });
                }
                if block.start_offset > block.end_offset {
                    return Err(CatalogError::InvertedBlockRange {
                        program: program.name.clone(),
                        block: block.id,
                    });
                }
            }
        }

        Ok(Self { programs })
    }

    /// The six programs currently on sale.
    pub fn standard() -> Self {
        fn block(
            n: u8,
            title: &str,
            price: i64,
            start_offset: u32,
            end_offset: u32,
        ) -> Block {
            Block {
                id: BlockId(n),
                title: title.to_string(),
                price: Decimal::from(price),
                start_offset,
                end_offset,
            }
        }

        fn program(
            name: &str,
            slug: &str,
            code: Option<char>,
            full_price: i64,
            blocks: Vec<Block>,
        ) -> Program {
            Program {
                name: name.to_string(),
                slug: slug.to_string(),
                code,
                full_price: Decimal::from(full_price),
                blocks,
            }
        }

        Self {
            programs: vec![
                program(
                    "Certificate in Employee Relations Law",
                    "employee-relations-law",
                    Some('A'),
                    2375,
                    vec![
                        block(1, "Comprehensive Labor Relations", 1375, 0, 1),
                        block(2, "Discrimination Prevention and Defense", 1375, 2, 3),
                        block(3, "Special Issues in Employment Law", 575, 4, 4),
                    ],
                ),
                program(
                    "Certificate in Employee Benefits Law",
                    "employee-benefits-law",
                    Some('B'),
                    2375,
                    vec![
                        block(1, "Retirement Plans", 1575, 0, 1),
                        block(2, "Benefit Plan Claims, Appeals and Litigation", 975, 2, 2),
                    ],
                ),
                program(
                    "Certificate in Strategic HR Management",
                    "strategic-hr-management",
                    Some('C'),
                    1575,
                    vec![
                        block(1, "HR Leadership and Strategy", 1075, 0, 1),
                        block(2, "Talent and Workforce Planning", 575, 2, 2),
                    ],
                ),
                program(
                    "Certificate in Workplace Investigations",
                    "workplace-investigations",
                    None,
                    1575,
                    Vec::new(),
                ),
                program(
                    "Advanced Certificate in Strategic Employment Law",
                    "strategic-employment-law",
                    None,
                    1975,
                    Vec::new(),
                ),
                program(
                    "Certificate in HR Management",
                    "hr-management",
                    None,
                    2375,
                    Vec::new(),
                ),
            ],
        }
    }

    pub fn programs(&self) -> &[Program] {
        &self.programs
    }

    pub fn by_name(
        &self,
        name: &str,
    ) -> Option<&Program> {
        let name = name.trim();
        self.programs
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn by_slug(
        &self,
        slug: &str,
    ) -> Option<&Program> {
        let slug = slug.trim();
        self.programs
            .iter()
            .find(|p| p.slug.eq_ignore_ascii_case(slug))
    }

    /// Looks a program up by slug first, then by canonical name.
    pub fn resolve(
        &self,
        name_or_slug: &str,
    ) -> Option<&Program> {
        self.by_slug(name_or_slug)
            .or_else(|| self.by_name(name_or_slug))
    }
}

impl Default for ProgramCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
