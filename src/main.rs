// src/main.rs

use anyhow::{bail, Context, Result};
use mangashelf::logging;
use mangashelf::prelude::*;
use std::io::IsTerminal;

const SEARCH_LIMIT: usize = 5;
const CHAPTER_PREVIEW: usize = 10;

#[tokio::main]
async fn main() -> Result<()> {
    let query = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if query.trim().is_empty() {
        bail!("usage: mangashelf <title to search>");
    }

    let config = Config::load(None).context("loading configuration")?;
    logging::init(&config.log_level, std::io::stderr().is_terminal())?;

    let session = Session::open(config).await?;

    let results = session.search(&query, SEARCH_LIMIT).await?;
    let Some(first) = results.first() else {
        println!("No catalog results for {query:?}.");
        return Ok(());
    };

    println!("Results for {query:?}:");
    for manga in &results {
        println!("  {} [{}] {}", manga.title, manga.id, manga.authors.join(", "));
    }

    let (manga, chapters) = session.manga_details(&first.id).await?;
    println!("\n{} ({:?}, {} chapters)", manga.title, manga.status, chapters.len());
    if !manga.tags.is_empty() {
        println!("  tags: {}", manga.tags.join(", "));
    }

    let progress = session.store().progress_for_manga(&manga.id).await?;
    for chapter in chapters.iter().take(CHAPTER_PREVIEW) {
        let read = progress
            .iter()
            .find(|(id, _)| *id == chapter.id)
            .map(|(_, p)| if p.completed { "read" } else { "started" })
            .unwrap_or("");
        println!("  {:<40} {read}", chapter.label());
    }
    if let Some(next) = mangashelf::reader::next_unread(&chapters, &progress) {
        println!("  continue with: {}", next.label());
    }

    match session.suggest_downloads(&manga).await {
        Ok(suggestions) if suggestions.is_empty() => {
            println!("\nNo tracked downloads look like {:?}.", manga.title);
        }
        Ok(suggestions) => {
            println!("\nLikely downloads:");
            for s in suggestions {
                println!(
                    "  {:>3.0}%  {} ({:.0}% done)",
                    s.coverage * 100.0,
                    s.item.name,
                    s.item.progress * 100.0
                );
            }
        }
        Err(e) if e.kind() == ErrorKind::Credential => {
            println!("\nSet MANGASHELF_DEBRID_TOKEN to see matching downloads.");
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
