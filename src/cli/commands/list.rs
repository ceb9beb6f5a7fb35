//! List command - show projects and their published builds

use crate::build::BuildRecord;
use crate::cli::args::{ListArgs, OutputFormat};
use crate::config::{Config, DefinitionStore};
use crate::error::StemmerResult;
use crate::ui::{self, UiContext};
use console::style;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ProjectEntry {
    name: String,
    published: Option<BuildRecord>,
}

/// Execute the list command
pub async fn execute(args: ListArgs, config: &Config) -> StemmerResult<()> {
    let store = DefinitionStore::new(&config.paths);
    let build_dir = config.paths.build_dir();

    let mut entries = Vec::new();
    for name in store.list_projects().await? {
        let published = BuildRecord::load(&build_dir.join(&name)).await?;
        entries.push(ProjectEntry { name, published });
    }

    if entries.is_empty() {
        match args.format {
            OutputFormat::Json => println!("[]"),
            OutputFormat::Plain => {}
            OutputFormat::Table => {
                let ctx = UiContext::detect();
                ui::step_info(&ctx, "No projects found");
                ui::remark(
                    &ctx,
                    &format!("Looked in {}", config.paths.projects_dir().display()),
                );
            }
        }
        return Ok(());
    }

    match args.format {
        OutputFormat::Table => print_table(&entries),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Plain => {
            for entry in &entries {
                println!("{}", entry.name);
            }
        }
    }
    Ok(())
}

fn print_table(entries: &[ProjectEntry]) {
    let ctx = UiContext::detect();
    ui::intro(&ctx, "Projects");

    println!(
        "{:<20} {:<16} {:<8} {:<18} {:<8}",
        style("NAME").bold(),
        style("PLATFORM").bold(),
        style("ARCH").bold(),
        style("BUILT").bold(),
        style("PACKAGES").bold()
    );
    println!("{}", "-".repeat(74));

    for entry in entries {
        match &entry.published {
            Some(record) => println!(
                "{:<20} {:<16} {:<8} {:<18} {:<8}",
                entry.name,
                record.platform,
                record.arch,
                record.finished_at.format("%Y-%m-%d %H:%M"),
                record.packages.len()
            ),
            None => println!(
                "{:<20} {:<16} {:<8} {:<18} {:<8}",
                entry.name,
                "-",
                "-",
                style("never").dim(),
                "-"
            ),
        }
    }

    println!();
    println!("{} project(s)", entries.len());
}
