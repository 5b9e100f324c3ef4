use super::{Context, mark, print_action, store};
use colored::Colorize;
use influx_provider::bucket::RESOURCE_TYPE;
use influx_provider::{BucketError, BucketReconciler, BucketSpec, BucketState, InfluxClient};
use influx_provider_core::{ActionType, GlobalState, ResourceState, ResourceStatus, resource_key};

type Reconciler = BucketReconciler<InfluxClient, InfluxClient>;

/// Decode a stored bucket. An entry whose delete left its mapping behind
/// only accepts `destroy`.
fn managed(key: &str, resource: &ResourceState) -> anyhow::Result<BucketState> {
    let bucket: BucketState = resource.attributes()?;
    if resource.status == ResourceStatus::PartiallyDeleted {
        anyhow::bail!(
            "{} is partially deleted: DBRP mapping {} of bucket {} is orphaned; \
             run `bucket destroy` to remove it",
            key,
            bucket.dbrp_id,
            bucket.id
        );
    }
    Ok(bucket)
}

fn stored(state: &GlobalState, key: &str) -> anyhow::Result<Option<BucketState>> {
    state
        .get_resource(key)
        .map(|resource| managed(key, resource))
        .transpose()
}

/// Re-read a stored bucket; `None` once it is gone remotely
async fn refresh_prior(
    buckets: &Reconciler,
    prior: Option<BucketState>,
) -> anyhow::Result<Option<BucketState>> {
    let Some(prior) = prior else {
        return Ok(None);
    };

    match buckets.read(&prior.id).await? {
        Some((bucket, mapping)) => Ok(Some(BucketState::from_remote(&bucket, &mapping))),
        None => {
            println!(
                "{} bucket {} ({}) no longer exists",
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
    result: Result<Option<BucketState>, BucketError>,
) -> anyhow::Result<()> {
    match result {
        Ok(Some(bucket)) => {
            store(state, key, RESOURCE_TYPE, &bucket.id, &bucket)?;
            println!(
                "{} {}: bucket {} with DBRP mapping {}",
                "✓".green(),
                key,
                bucket.id.cyan(),
                bucket.dbrp_id.cyan()
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
                BucketError::BucketUpdateFailed { .. }
                | BucketError::MappingUpdateFailed { .. } => {
                    mark(state, key, ResourceStatus::Tainted)
                }
                BucketError::MappingDeleteFailed { .. } => {
                    mark(state, key, ResourceStatus::PartiallyDeleted)
                }
                BucketError::BucketDeleteFailed { .. } | BucketError::InvalidSpec(_) => {}
                // the prior bucket is already gone
                _ if action == ActionType::Replace => {
                    tracing::warn!("Replacement of {} failed after the delete", key);
                    state.remove_resource(key);
                }
                _ => {}
            }
            if e.is_fatal() {
                eprintln!(
                    "{} {}",
                    "✗".red().bold(),
                    "An orphaned bucket remains and must be removed by hand".red()
                );
            }
            Err(anyhow::Error::new(e).context(format!("failed to apply {}", key)))
        }
    }
}

pub async fn plan(ctx: &Context, resource_name: &str, spec: &BucketSpec) -> anyhow::Result<()> {
    let provider = ctx.connect().await?;
    let buckets = provider.buckets();

    let state = ctx.state.load().await?;
    let key = resource_key(RESOURCE_TYPE, resource_name);
    let prior = refresh_prior(&buckets, stored(&state, &key)?).await?;

    print_action(&buckets.plan(resource_name, prior.as_ref(), Some(spec)));
    Ok(())
}

pub async fn apply(ctx: &Context, resource_name: &str, spec: &BucketSpec) -> anyhow::Result<()> {
    let provider = ctx.connect().await?;
    let buckets = provider.buckets();

    let lock = ctx.state.acquire_lock().await?;
    let mut state = ctx.state.load().await?;
    let key = resource_key(RESOURCE_TYPE, resource_name);
    let prior = refresh_prior(&buckets, stored(&state, &key)?).await?;

    let action = buckets.plan(resource_name, prior.as_ref(), Some(spec));
    print_action(&action);

    let outcome = if action.has_changes() {
        let result = buckets.apply(prior.as_ref(), Some(spec)).await;
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
    let buckets = provider.buckets();

    let lock = ctx.state.acquire_lock().await?;
    let mut state = ctx.state.load().await?;
    let key = resource_key(RESOURCE_TYPE, resource_name);
    let prior = managed(&key, state.require(&key)?)?;

    let outcome = match refresh_prior(&buckets, Some(prior)).await? {
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
    let buckets = provider.buckets();

    let lock = ctx.state.acquire_lock().await?;
    let mut state = ctx.state.load().await?;
    let key = resource_key(RESOURCE_TYPE, resource_name);
    let prior: BucketState = state.require(&key)?.attributes()?;

    // a bucket that is already gone still gets its mapping removed
    let action = buckets.plan(resource_name, Some(&prior), None);
    print_action(&action);
    let result = buckets.apply(Some(&prior), None).await;
    let outcome = record(&mut state, &key, action.action_type, result);

    ctx.state.save(&state).await?;
    lock.release().await?;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::stub;

    async fn entry(ctx: &Context, name: &str) -> Option<(ResourceStatus, BucketState)> {
        let state = ctx.state.load().await.unwrap();
        state
            .get_resource(&resource_key(RESOURCE_TYPE, name))
            .map(|resource| (resource.status, resource.attributes().unwrap()))
    }

    #[tokio::test]
    async fn test_failed_update_marks_tainted() {
        let (ctx, influx, _dir) = stub::start().await;

        let spec = BucketSpec::new("metrics").with_retention_days(30);
        apply(&ctx, "metrics", &spec).await.unwrap();
        let (status, created) = entry(&ctx, "metrics").await.unwrap();
        assert_eq!(status, ResourceStatus::Present);
        assert_eq!(created.retention_days, 30);

        influx.lock().unwrap().fail_bucket_patch = true;
        let spec = spec.with_retention_days(7);
        assert!(apply(&ctx, "metrics", &spec).await.is_err());

        let (status, stored) = entry(&ctx, "metrics").await.unwrap();
        assert_eq!(status, ResourceStatus::Tainted);
        assert_eq!(stored.id, created.id);

        influx.lock().unwrap().fail_bucket_patch = false;
        apply(&ctx, "metrics", &spec).await.unwrap();
        let (status, updated) = entry(&ctx, "metrics").await.unwrap();
        assert_eq!(status, ResourceStatus::Present);
        assert_eq!(updated.retention_days, 7);
    }

    #[tokio::test]
    async fn test_orphaned_mapping_is_kept_until_destroy() {
        let (ctx, influx, _dir) = stub::start().await;

        let spec = BucketSpec::new("metrics");
        apply(&ctx, "metrics", &spec).await.unwrap();
        let (_, created) = entry(&ctx, "metrics").await.unwrap();

        influx.lock().unwrap().fail_mapping_delete = true;
        assert!(destroy(&ctx, "metrics").await.is_err());
        let (status, stored) = entry(&ctx, "metrics").await.unwrap();
        assert_eq!(status, ResourceStatus::PartiallyDeleted);
        assert_eq!(stored.dbrp_id, created.dbrp_id);
        assert!(influx.lock().unwrap().buckets.is_empty());

        // the bucket is gone remotely, but the entry must survive
        let err = refresh(&ctx, "metrics").await.unwrap_err();
        assert!(err.to_string().contains(&created.dbrp_id));
        assert!(err.to_string().contains("bucket destroy"));
        assert!(plan(&ctx, "metrics", &spec).await.is_err());
        assert!(apply(&ctx, "metrics", &spec).await.is_err());

        let (status, stored) = entry(&ctx, "metrics").await.unwrap();
        assert_eq!(status, ResourceStatus::PartiallyDeleted);
        assert_eq!(stored.dbrp_id, created.dbrp_id);
        assert!(influx.lock().unwrap().buckets.is_empty());

        influx.lock().unwrap().fail_mapping_delete = false;
        destroy(&ctx, "metrics").await.unwrap();
        assert!(entry(&ctx, "metrics").await.is_none());
        assert!(influx.lock().unwrap().mappings.is_empty());
    }

    #[tokio::test]
    async fn test_failed_replace_drops_deleted_entry() {
        let (ctx, influx, _dir) = stub::start().await;

        apply(&ctx, "metrics", &BucketSpec::new("metrics")).await.unwrap();

        influx.lock().unwrap().fail_bucket_create = true;
        let renamed = BucketSpec::new("telemetry");
        assert!(apply(&ctx, "metrics", &renamed).await.is_err());

        assert!(entry(&ctx, "metrics").await.is_none());
        assert!(influx.lock().unwrap().buckets.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_unmanaged_bucket() {
        let (ctx, _influx, _dir) = stub::start().await;

        let err = refresh(&ctx, "metrics").await.unwrap_err();
        assert!(err.to_string().contains("influx_bucket.metrics is not managed"));
    }
}
