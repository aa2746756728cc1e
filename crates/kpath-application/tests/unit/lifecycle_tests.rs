//! Lifecycle manager state machine and persistence

use super::helpers::{service, stack, tool, with_capability};
use kpath_application::{ArtifactLayout, IndexLifecycleManager, LifecycleState};
use kpath_providers::embedding::NullEmbeddingProvider;
use std::sync::Arc;

#[tokio::test]
async fn search_before_initialize_is_retriable_unavailable() {
    let stack = stack(false);
    let error = stack.lifecycle.snapshot().unwrap_err();
    assert!(matches!(
        error,
        kpath_domain::Error::IndexUnavailable { .. }
    ));
}

#[tokio::test]
async fn initialize_builds_both_indexes() {
    let stack = stack(false);
    stack.catalog.insert_service(with_capability(
        service(1, "EmailService", "Send and manage email communications"),
        1,
        "SendEmail",
        "Send transactional email",
    ));
    stack
        .catalog
        .insert_tool(tool(10, 1, "send_email", "Send an email to a recipient"));

    stack.lifecycle.initialize(false).await.unwrap();
    assert_eq!(stack.lifecycle.state(), LifecycleState::FreshlyBuilt);

    let snapshot = stack.lifecycle.snapshot().unwrap();
    assert_eq!(snapshot.services.len(), 1);
    assert_eq!(snapshot.tools.len(), 1);
    assert_eq!(snapshot.tool_services.get(&10), Some(&1));

    let status = stack.lifecycle.status();
    assert!(status.initialized);
    assert!(status.files.model_exists);
    assert!(status.files.service_index_exists);
    assert!(status.files.tool_index_exists);
}

#[tokio::test]
async fn inactive_services_and_tools_stay_out_of_the_index() {
    let stack = stack(false);
    let mut inactive = service(2, "Mothballed", "An inactive service");
    inactive.status = kpath_domain::entities::ServiceStatus::Inactive;
    stack.catalog.insert_service(inactive);
    stack
        .catalog
        .insert_service(service(1, "Active", "An active service"));

    let mut dormant_tool = tool(11, 1, "dormant", "A disabled tool");
    dormant_tool.is_active = false;
    stack.catalog.insert_tool(dormant_tool);
    stack.catalog.insert_tool(tool(12, 2, "orphan", "Tool of an inactive service"));

    stack.lifecycle.initialize(false).await.unwrap();
    let snapshot = stack.lifecycle.snapshot().unwrap();
    assert_eq!(snapshot.services.ids(), &[1]);
    assert!(snapshot.tools.is_empty());
}

#[tokio::test]
async fn startup_restores_persisted_generation() {
    let stack = stack(false);
    stack
        .catalog
        .insert_service(service(1, "EmailService", "Send email"));
    stack.lifecycle.initialize(false).await.unwrap();

    // A second manager over the same artifacts and catalog
    let embedder = Arc::new(NullEmbeddingProvider::new());
    let reloaded = IndexLifecycleManager::new(
        embedder,
        stack.catalog.clone(),
        ArtifactLayout::new(stack._artifacts.path()),
    );
    assert!(reloaded.startup().await.unwrap());
    assert_eq!(reloaded.state(), LifecycleState::LoadedFromDisk);
    assert_eq!(reloaded.snapshot().unwrap().services.ids(), &[1]);

    // initialize without force is a no-op on a loaded generation
    reloaded.initialize(false).await.unwrap();
    assert_eq!(reloaded.state(), LifecycleState::LoadedFromDisk);
}

#[tokio::test]
async fn startup_without_artifacts_reports_not_loaded() {
    let stack = stack(false);
    assert!(!stack.lifecycle.startup().await.unwrap());
    assert_eq!(stack.lifecycle.state(), LifecycleState::Uninitialized);
}

#[tokio::test]
async fn add_update_remove_service_deltas() {
    let stack = stack(false);
    stack
        .catalog
        .insert_service(service(1, "EmailService", "Send email"));
    stack.lifecycle.initialize(false).await.unwrap();

    // add a service that appears in the catalog afterwards
    stack
        .catalog
        .insert_service(service(2, "InvoiceService", "Create invoices"));
    assert!(stack.lifecycle.add_service(2).await.unwrap());
    assert!(stack.lifecycle.snapshot().unwrap().services.contains(2));

    // adding the same service twice is rejected
    assert!(stack.lifecycle.add_service(2).await.is_err());

    // unknown catalog id reports false
    assert!(!stack.lifecycle.add_service(99).await.unwrap());

    // update re-embeds in place
    stack
        .catalog
        .insert_service(service(2, "InvoiceService", "Create and send invoices"));
    assert!(stack.lifecycle.update_service(2).await.unwrap());

    // remove drops it from subsequent snapshots
    assert!(stack.lifecycle.remove_service(2).await.unwrap());
    assert!(!stack.lifecycle.snapshot().unwrap().services.contains(2));
    assert!(!stack.lifecycle.remove_service(2).await.unwrap());
}

#[tokio::test]
async fn rebuild_after_catalog_changes_matches_fresh_build() {
    let stack = stack(false);
    stack
        .catalog
        .insert_service(service(1, "EmailService", "Send email"));
    stack
        .catalog
        .insert_service(service(2, "CalendarService", "Manage calendars"));
    stack.lifecycle.initialize(false).await.unwrap();

    let before = stack
        .lifecycle
        .snapshot()
        .unwrap()
        .services
        .ids()
        .to_vec();

    // remove then rebuild from the unchanged catalog restores membership
    assert!(stack.lifecycle.remove_service(2).await.unwrap());
    assert!(!stack.lifecycle.snapshot().unwrap().services.contains(2));

    stack.lifecycle.rebuild().await.unwrap();
    let after = stack.lifecycle.snapshot().unwrap().services.ids().to_vec();
    let mut before_sorted = before;
    before_sorted.sort_unstable();
    let mut after_sorted = after;
    after_sorted.sort_unstable();
    assert_eq!(before_sorted, after_sorted);
}

#[tokio::test]
async fn empty_catalog_builds_empty_indexes() {
    let stack = stack(false);
    stack.lifecycle.initialize(false).await.unwrap();
    let snapshot = stack.lifecycle.snapshot().unwrap();
    assert!(snapshot.services.is_empty());
    assert!(snapshot.tools.is_empty());
}
