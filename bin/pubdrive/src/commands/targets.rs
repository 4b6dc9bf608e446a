use pubdrive_engine::launch::list_targets;

/// Print the open targets of an already-running browser.
pub async fn run(port: u16) -> anyhow::Result<()> {
    let targets = list_targets(port).await?;
    if targets.is_empty() {
        println!("No open targets on port {}.", port);
        return Ok(());
    }

    println!("{} target(s) on port {}:", targets.len(), port);
    for t in &targets {
        let attachable = if t.ws_url.is_some() { "" } else { " (not attachable)" };
        println!("  [{}] {} — {}{}", t.kind, t.id, t.url, attachable);
    }
    Ok(())
}
