use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use iaml_data::{CatalogLoader, SessionLoader};

/// Validate a program catalog CSV and, optionally, a sessions CSV against it.
///
/// The catalog file has the columns:
/// - program, slug, code, full_price
/// - block, block_title, block_price, start_offset, end_offset (empty for
///   programs sold only as a whole)
///
/// The sessions file has the columns:
/// - id, program, format, start_date, end_date, city, state, venue
#[derive(Parser, Debug)]
#[command(name = "iaml-catalog-check")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the catalog CSV file
    #[arg(short, long)]
    catalog: PathBuf,

    /// Path to a sessions CSV file to check against the catalog
    #[arg(short, long)]
    sessions: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    println!("Loading catalog from: {}", args.catalog.display());
    let catalog = CatalogLoader::from_path(&args.catalog)
        .with_context(|| format!("Invalid catalog: {}", args.catalog.display()))?;

    for program in catalog.programs() {
        println!(
            "  [{}] {} ({}) full price {}",
            program.program_code(),
            program.name,
            program.slug,
            program.full_price
        );
        for block in &program.blocks {
            println!(
                "      {}: {} {} (days {}-{})",
                block.id, block.title, block.price, block.start_offset, block.end_offset
            );
        }
    }
    println!("Catalog OK: {} programs.", catalog.programs().len());

    if let Some(path) = &args.sessions {
        println!("Loading sessions from: {}", path.display());
        let sessions = SessionLoader::from_path(path)
            .with_context(|| format!("Invalid sessions file: {}", path.display()))?;

        let mut unknown = 0;
        for session in &sessions {
            let known = session
                .program
                .as_deref()
                .is_some_and(|name| catalog.by_name(name).is_some());
            if !known {
                unknown += 1;
                println!(
                    "  warning: session {} names unknown program {:?}",
                    session.id, session.program
                );
            }
        }

        anyhow::ensure!(
            unknown == 0,
            "{unknown} of {} sessions reference programs missing from the catalog",
            sessions.len()
        );
        println!("Sessions OK: {} sessions.", sessions.len());
    }

    Ok(())
}
