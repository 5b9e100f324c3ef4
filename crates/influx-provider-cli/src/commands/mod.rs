pub mod authorization;
pub mod bucket;
pub mod state;
#[cfg(test)]
mod stub;

use anyhow::Context as _;
use colored::Colorize;
use influx_provider::{Provider, ProviderConfig};
use influx_provider_core::{
    Action, ActionType, GlobalState, ResourceState, ResourceStatus, StateManager,
};
use serde::Serialize;
use std::path::Path;

/// Settings shared by every command
pub struct Context {
    pub config: ProviderConfig,
    pub state: StateManager,
}

impl Context {
    pub fn new(config: ProviderConfig, state_dir: &Path) -> Self {
        Self {
            config,
            state: StateManager::new(state_dir),
        }
    }

    /// Validate the configuration and resolve the organization
    pub async fn connect(&self) -> anyhow::Result<Provider> {
        let provider = Provider::configure(self.config.clone())
            .await
            .with_context(|| format!("failed to configure provider for {}", self.config.url))?;

        println!(
            "{} {} ({})",
            "Organization:".dimmed(),
            provider.organization().name.cyan(),
            provider.org_id()
        );
        Ok(provider)
    }
}

pub fn print_action(action: &Action) {
    let (symbol, key) = match action.action_type {
        ActionType::Create => ("+".green(), action.key().green()),
        ActionType::Update => ("~".yellow(), action.key().yellow()),
        ActionType::Replace => ("-/+".magenta(), action.key().magenta()),
        ActionType::Delete => ("-".red(), action.key().red()),
        ActionType::NoOp => {
            println!("{} {}", action.key().dimmed(), "(no changes)".dimmed());
            return;
        }
    };

    println!(
        "{} {} will be {}",
        symbol,
        key.bold(),
        action.action_type.past_participle()
    );
    for change in &action.changes {
        println!("    {}", change);
    }
}

/// Record attributes under `key`, keeping the creation time of an
/// unchanged remote id
pub fn store<T: Serialize>(
    state: &mut GlobalState,
    key: &str,
    resource_type: &str,
    id: &str,
    attributes: &T,
) -> anyhow::Result<()> {
    match state.resources.get_mut(key) {
        Some(existing) if existing.id == id => {
            existing.set_attributes(attributes)?;
            existing.status = ResourceStatus::Present;
        }
        _ => {
            let resource = ResourceState::new(id, resource_type).with_attributes(attributes)?;
            state.set_resource(key.to_string(), resource);
        }
    }
    Ok(())
}

pub fn mark(state: &mut GlobalState, key: &str, status: ResourceStatus) {
    if let Some(resource) = state.resources.get_mut(key) {
        tracing::warn!("Marking {} as {}", key, status);
        resource.status = status;
    }
}
