use super::{Context, mark, print_action, store};
use colored::Colorize;
use influx_provider::authorization::RESOURCE_TYPE;
use influx_provider::{
    AuthorizationError, AuthorizationManager, AuthorizationSpec, AuthorizationState, InfluxClient,
};
use influx_provider_core::{ActionType, GlobalState, ResourceStatus, resource_key};

type Manager = AuthorizationManager<InfluxClient>;

fn stored(state: &GlobalState, key: &str) -> anyhow::Result<Option<AuthorizationState>> {
    Ok(state
        .get_resource(key)
        .map(|resource| resource.attributes::<AuthorizationState>())
        .transpose()?)
}

/// Re-read a stored authorization, carrying over the token
async fn refresh_prior(
    authorizations: &Manager,
    prior: Option<AuthorizationState>,
) -> anyhow::Result<Option<AuthorizationState>> {
    let Some(prior) = prior else {
        return Ok(None);
    };

    match authorizations.read(&prior.id).await? {
        Some(mut current) => {
            if current.token.is_none() {
                current.token = prior.token;
            }
            Ok(Some(current))
        }
        None => {
            println!(
                "{} authorization {} ({}) no longer exists",
                "!".yellow(),
                prior.name,
                prior.id
            );
            Ok(None)
        }
    }
}

fn record(
    state: &mut GlobalState,
    key: &str,
    action: ActionType,
    result: Result<Option<AuthorizationState>, AuthorizationError>,
) -> anyhow::Result<()> {
    match result {
        Ok(Some(authorization)) => {
            store(state, key, RESOURCE_TYPE, &authorization.id, &authorization)?;
            println!(
                "{} {}: authorization {} is {}",
                "✓".green(),
                key,
                authorization.id.cyan(),
                authorization.status
            );
            Ok(())
        }
        Ok(None) => {
            state.remove_resource(key);
            println!("{} {} destroyed", "✓".green(), key);
            Ok(())
        }
        Err(e) => {
            match &e {
                AuthorizationError::UpdateFailed { .. } => {
                    mark(state, key, ResourceStatus::Tainted)
                }
                AuthorizationError::DeleteFailed { .. } | AuthorizationError::InvalidSpec(_) => {}
                // the prior authorization is already gone
                _ if action == ActionType::Replace => {
                    tracing::warn!("Replacement of {} failed after the delete", key);
                    state.remove_resource(key);
                }
                _ => {}
            }
            Err(anyhow::Error::new(e).context(format!("failed to apply {}", key)))
        }
    }
}

pub async fn plan(
    ctx: &Context,
    resource_name: &str,
    spec: &AuthorizationSpec,
) -> anyhow::Result<()> {
    let provider = ctx.connect().await?;
    let authorizations = provider.authorizations();

    let state = ctx.state.load().await?;
    let key = resource_key(RESOURCE_TYPE, resource_name);
    let prior = refresh_prior(&authorizations, stored(&state, &key)?).await?;

    print_action(&authorizations.plan(resource_name, prior.as_ref(), Some(spec)));
    Ok(())
}

pub async fn apply(
    ctx: &Context,
    resource_name: &str,
    spec: &AuthorizationSpec,
) -> anyhow::Result<()> {
    let provider = ctx.connect().await?;
    let authorizations = provider.authorizations();

    let lock = ctx.state.acquire_lock().await?;
    let mut state = ctx.state.load().await?;
    let key = resource_key(RESOURCE_TYPE, resource_name);
    let prior = refresh_prior(&authorizations, stored(&state, &key)?).await?;

    let action = authorizations.plan(resource_name, prior.as_ref(), Some(spec));
    print_action(&action);

    let outcome = if action.has_changes() {
        let result = authorizations.apply(prior.as_ref(), Some(spec)).await;
        record(&mut state, &key, action.action_type, result)
    } else {
        record(&mut state, &key, action.action_type, Ok(prior))
    };

    ctx.state.save(&state).await?;
    lock.release().await?;
    outcome
}

pub async fn refresh(ctx: &Context, resource_name: &str) -> anyhow::Result<()> {
    let provider = ctx.connect().await?;
    let authorizations = provider.authorizations();

    let lock = ctx.state.acquire_lock().await?;
    let mut state = ctx.state.load().await?;
    let key = resource_key(RESOURCE_TYPE, resource_name);
    let prior: AuthorizationState = state.require(&key)?.attributes()?;

    let outcome = match refresh_prior(&authorizations, Some(prior)).await? {
        Some(current) => record(&mut state, &key, ActionType::NoOp, Ok(Some(current))),
        None => {
            state.remove_resource(&key);
            println!("{} {} removed from state", "-".red(), key);
            Ok(())
        }
    };

    ctx.state.save(&state).await?;
    lock.release().await?;
    outcome
}

pub async fn destroy(ctx: &Context, resource_name: &str) -> anyhow::Result<()> {
    let provider = ctx.connect().await?;
    let authorizations = provider.authorizations();

    let lock = ctx.state.acquire_lock().await?;
    let mut state = ctx.state.load().await?;
    let key = resource_key(RESOURCE_TYPE, resource_name);
    let prior: AuthorizationState = state.require(&key)?.attributes()?;

    let action = authorizations.plan(resource_name, Some(&prior), None);
    print_action(&action);
    let result = authorizations.apply(Some(&prior), None).await;
    let outcome = record(&mut state, &key, action.action_type, result);

    ctx.state.save(&state).await?;
    lock.release().await?;
    outcome
}
