//! One-shot maintenance commands

use anyhow::{Context, Result};
use mindful_api::UNKNOWN_ITEM_NAME;
use mindful_core::Components;
use mindful_store::Store;
use mindful_util::{ItemToken, format_datetime_full, format_duration};
use std::collections::BTreeMap;

fn decode(token: &str) -> Result<ItemToken> {
    ItemToken::decode(token).with_context(|| format!("Not an item token: {:?}", token))
}

fn cached_name(names: &BTreeMap<ItemToken, String>, token: &ItemToken) -> String {
    names
        .get(token)
        .cloned()
        .unwrap_or_else(|| token.to_string())
}

async fn reapply(components: &Components) -> Result<()> {
    let blocked = components
        .policy
        .apply(components.clock.now())
        .await
        .context("Failed to apply policy")?;
    println!("{} item(s) blocked", blocked.len());
    Ok(())
}

pub async fn grant(
    components: &Components,
    token: &str,
    minutes: u32,
    name: Option<String>,
    reason: &str,
) -> Result<()> {
    let name = match name {
        Some(name) => name,
        None => ItemToken::decode(token)
            .ok()
            .and_then(|t| components.store.item_name(&t).ok().flatten())
            .unwrap_or_else(|| UNKNOWN_ITEM_NAME.to_string()),
    };

    let outcome = components
        .grants
        .grant(token, &name, minutes, reason)
        .await
        .context("Grant refused")?;

    println!(
        "{} unblocked until {}",
        outcome.grant.display_name,
        format_datetime_full(&outcome.grant.expires_at)
    );
    if !outcome.persisted {
        println!("warning: grant not persisted; it ends at the next reconciliation");
    }
    if !outcome.monitor_armed {
        println!("warning: no OS trigger armed; reblocking relies on mindfuld");
    }
    Ok(())
}

pub fn justify(components: &Components, reason: &str) -> Result<()> {
    match components.requests.submit_justification(reason)? {
        Some(request) => println!("Justification sent for {}", request.display_name),
        None => println!("No pending request"),
    }
    Ok(())
}

pub async fn reconcile(components: &Components) -> Result<()> {
    let summary = components.resume.reconcile_all().await?;
    println!(
        "reconciled {}, re-armed {}, pruned {} claim(s)",
        summary.reconciled, summary.rearmed, summary.pruned_claims
    );
    Ok(())
}

pub fn status(components: &Components) -> Result<()> {
    let now = components.clock.now();
    let snapshot = components.policy.snapshot()?;
    let names = components.store.name_cache().unwrap_or_default();

    println!("Grants:");
    for grant in &snapshot.grants {
        if grant.is_active(now) {
            println!(
                "  {:<24} {} left (until {})",
                grant.display_name,
                format_duration(grant.remaining(now)),
                format_datetime_full(&grant.expires_at)
            );
        } else {
            println!("  {:<24} expired, awaiting reconciliation", grant.display_name);
        }
    }
    if snapshot.grants.is_empty() {
        println!("  (none)");
    }

    match components.requests.pending()? {
        Some(request) => println!(
            "Pending request: {} ({})",
            request.display_name,
            request.justification.as_deref().unwrap_or("awaiting justification")
        ),
        None => println!("Pending request: none"),
    }

    let blocked = snapshot.blocked(now);
    println!(
        "Blocked ({} of {} managed, {} exempt):",
        blocked.len(),
        snapshot.universe.len(),
        snapshot.exemptions.len()
    );
    for token in &blocked {
        println!("  {}", cached_name(&names, token));
    }
    Ok(())
}

pub fn diagnostics(components: &Components, log_entries: usize) -> Result<()> {
    let store = &components.store;
    let report = store.diagnostics()?;
    for channel in &report.channels {
        let state = if channel.available { "available" } else { "unavailable" };
        println!("[{}] {}, {} key(s)", channel.name, state, channel.keys.len());
        for key in &channel.keys {
            println!("  {}", key);
        }
    }

    println!("Recent log:");
    for entry in store.recent_log(log_entries)? {
        println!("  {}", serde_json::to_string(&entry)?);
    }
    Ok(())
}

pub async fn manage(components: &Components, token: &str, name: Option<String>) -> Result<()> {
    let token = decode(token)?;
    let store = &components.store;

    let mut universe = store.universe()?;
    universe.insert(token.clone());
    store.save_universe(&universe)?;
    if let Some(name) = name {
        store.save_item_name(&token, &name)?;
    }
    reapply(components).await
}

pub async fn unmanage(components: &Components, token: &str) -> Result<()> {
    let token = decode(token)?;
    let store = &components.store;

    let mut universe = store.universe()?;
    if !universe.remove(&token) {
        println!("Item was not managed");
    }
    store.save_universe(&universe)?;
    reapply(components).await
}

pub async fn exempt(components: &Components, token: &str, exempt: bool) -> Result<()> {
    let token = decode(token)?;
    let store = &components.store;

    let mut exemptions = store.exemptions()?;
    if exempt {
        exemptions.insert(token);
    } else {
        exemptions.remove(&token);
    }
    store.save_exemptions(&exemptions)?;
    reapply(components).await
}
