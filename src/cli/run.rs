use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tracing::info;

use crate::agents::JsonMap;
use crate::cli::commands::RunArgs;
use crate::cli::render::{render_result, render_statistics};
use crate::cli::setup;

pub async fn handle_run(args: RunArgs, quiet: bool) -> anyhow::Result<()> {
    let config = setup::load(&args.config).await?;
    let commits = read_commits(Path::new(&args.input)).await?;
    info!(commits = commits.len(), config = %args.config, "Starting run");

    let system = setup::build_system(config).await?;
    let controller = system.controller.clone();

    let bar = if quiet || args.json {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(commits.len() as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("  {bar:30.cyan/dark_gray} {pos}/{len} commits | {msg}")?
                .progress_chars("█▓░"),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        bar
    };

    let mut results = Vec::with_capacity(commits.len());
    let mut in_flight = stream::iter(commits)
        .map(|commit| {
            let controller = controller.clone();
            async move { controller.process(commit).await }
        })
        .buffered(args.concurrency.max(1));

    while let Some(result) = in_flight.next().await {
        bar.inc(1);
        if !args.json {
            bar.println(render_result(&result));
        }
        results.push(result);
    }
    bar.finish_and_clear();

    let stats = controller.get_statistics().await;
    if args.json {
        let out = serde_json::json!({ "results": results, "statistics": stats });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}", render_statistics(&stats));
        if let Some(cache) = controller.cache() {
            let cache_stats = cache.stats();
            println!(
                "  cache hits {}  misses {}  size {}/{}",
                cache_stats.hits, cache_stats.misses, cache_stats.size, cache_stats.capacity
            );
        }
    }

    system.manager.shutdown().await;
    Ok(())
}

/// Commits from a JSON array, or an object with a `commits` array.
pub async fn read_commits(path: &Path) -> anyhow::Result<Vec<JsonMap>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read input file {}", path.display()))?;
    parse_commits(&content).with_context(|| format!("Invalid input file {}", path.display()))
}

pub fn parse_commits(content: &str) -> anyhow::Result<Vec<JsonMap>> {
    let value: Value = serde_json::from_str(content)?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("commits") {
            Some(Value::Array(items)) => items,
            _ => bail!("expected a `commits` array"),
        },
        _ => bail!("expected a JSON array of commits"),
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(commit) => Ok(commit),
            _ => bail!("commit #{} is not an object", i),
        })
        .collect()
}
