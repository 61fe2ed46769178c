//! Commands that talk to the message bus

use anyhow::{Context, Result};
use bridge_lib::messaging::MessagingClient;
use bridge_lib::translate::{component_descriptor, metric_model};
use serde_json::Value;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use crate::bus::BusArgs;
use crate::document::{load_record, load_text};
use crate::output::{print_document, print_info, print_success, print_warning, OutputFormat};

/// Run `op` on a fresh connection and always close it
async fn with_client<T, F, Fut>(bus: &BusArgs, op: F) -> Result<T>
where
    F: FnOnce(MessagingClient) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let client = bus.connect().await?;
    let result = op(client.clone()).await;
    client.shutdown().await;
    result
}

async fn await_reply<F>(reply: F, timeout: Duration) -> Result<Value>
where
    F: Future<Output = Result<Value, bridge_lib::MessagingError>>,
{
    tokio::time::timeout(timeout, reply)
        .await
        .context("No reply before the timeout")?
        .map_err(Into::into)
}

/// Translate a document and publish both DSL messages
pub async fn publish_dsl(bus: &BusArgs, path: &Path) -> Result<()> {
    let record = load_record(path)?;
    let descriptor = component_descriptor(&record)?;
    let model = metric_model(&record)?;

    let correlation_id = with_client(bus, |client| async move {
        Ok::<_, anyhow::Error>(client.publish_application_dsl(&record.uuid, &descriptor, &model)?)
    })
    .await?;

    print_success(&format!("Published DSL (correlation id {})", correlation_id));
    Ok(())
}

/// Ask the ontology service to validate a document's SLOs
pub async fn validate(bus: &BusArgs, path: &Path, format: OutputFormat) -> Result<()> {
    let record = load_record(path)?;
    let descriptor = component_descriptor(&record)?;

    let verdict = with_client(bus, |client| async move {
        Ok::<_, anyhow::Error>(client.validate_slos(&record.uuid, &descriptor).await?)
    })
    .await?;

    match format {
        OutputFormat::Json | OutputFormat::Yaml => print_document(&verdict, format)?,
        OutputFormat::Table => match verdict.get("valid").and_then(Value::as_bool) {
            Some(true) => print_success("SLOs are valid"),
            Some(false) => print_warning(&format!("SLOs rejected: {}", verdict)),
            None => print_info(&verdict.to_string()),
        },
    }
    Ok(())
}

/// Upsert a policy bundle
pub async fn policies(bus: &BusArgs, path: &Path) -> Result<()> {
    let bundle = load_text(path)?;
    let count = with_client(bus, |client| async move {
        Ok::<_, anyhow::Error>(client.publish_policies(&bundle)?)
    })
    .await?;
    print_success(&format!("Published {} policies", count));
    Ok(())
}

/// Request an undeploy
pub async fn undeploy(bus: &BusArgs, uuid: &str, format: OutputFormat) -> Result<()> {
    let receipt = with_client(bus, |client| async move {
        Ok::<_, anyhow::Error>(client.application_undeploy(uuid)?)
    })
    .await?;

    match format {
        OutputFormat::Json | OutputFormat::Yaml => print_document(&receipt, format)?,
        OutputFormat::Table => print_success(&format!(
            "Undeploy requested; redeployable copy is {}",
            receipt.new_uuid
        )),
    }
    Ok(())
}

/// List node candidates known to the SAL
pub async fn node_candidates(bus: &BusArgs, format: OutputFormat) -> Result<()> {
    let timeout = bus.timeout();
    let candidates = with_client(bus, |client| async move {
        let reply = client.get_node_candidates(Vec::new())?;
        let candidates = await_reply(reply, timeout).await?;
        Ok::<_, anyhow::Error>(candidates)
    })
    .await?;

    print_document(&candidates, format)
}
