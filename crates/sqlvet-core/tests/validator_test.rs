//! End-to-end tests for the validation pipeline against a scripted
//! analytics backend.
//!
//! These run with tokio's paused clock so the 500 ms poll cadence
//! costs no wall time.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use sqlvet_core::config::ValidatorConfig;
use sqlvet_core::error::ValidatorError;
use sqlvet_core::scheduler::SqlValidator;
use sqlvet_test_utils::{MockAnalyticsClient, explore_fixture, init_tracing};

/// Generous upper bound; paused-clock tests only hit it on deadlock.
const TEST_DEADLINE: Duration = Duration::from_secs(600);

fn validator(client: Arc<MockAnalyticsClient>, config: ValidatorConfig) -> SqlValidator {
    SqlValidator::new(client, config)
}

async fn search(
    validator: &SqlValidator,
    explores: &[Arc<sqlvet_core::model::Explore>],
    fail_fast: bool,
) -> Result<(), ValidatorError> {
    tokio::time::timeout(
        TEST_DEADLINE,
        validator.search(explores, fail_fast, false, CancellationToken::new()),
    )
    .await
    .expect("pipeline deadlocked")
}

// ===========================================================================
// Happy path
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn all_dimensions_pass() {
    init_tracing();
    let client = Arc::new(MockAnalyticsClient::new());
    let explore = explore_fixture("ecommerce", "orders", 3);
    let validator = validator(client.clone(), ValidatorConfig::default());

    search(&validator, &[explore.clone()], false).await.unwrap();

    assert!(explore.errors().is_empty());
    assert!(explore.queried());
    for dimension in explore.dimensions() {
        assert!(dimension.queried());
        assert!(dimension.errors().is_empty());
    }
    // One seed query, never subdivided.
    assert_eq!(client.created_queries().len(), 1);
    assert_eq!(client.created_task_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn multiple_explores_run_in_one_pipeline() {
    let client = Arc::new(
        MockAnalyticsClient::new().fail_explore("ecommerce", "refunds", "Unknown column", None),
    );
    let orders = explore_fixture("ecommerce", "orders", 2);
    let refunds = explore_fixture("ecommerce", "refunds", 1);
    let validator = validator(client, ValidatorConfig::default());

    search(&validator, &[orders.clone(), refunds.clone()], false)
        .await
        .unwrap();

    assert!(orders.errors().is_empty());
    assert!(orders.queried());
    // Single-dimension explore: the error lands on the dimension.
    let failed = &refunds.dimensions()[0];
    assert_eq!(failed.errors().len(), 1);
    assert_eq!(failed.errors()[0].message, "Unknown column");
}

// ===========================================================================
// Fail-fast mode
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn fail_fast_attributes_to_the_explore() {
    let client = Arc::new(
        MockAnalyticsClient::new().fail_explore("ecommerce", "orders", "Syntax error", Some(7)),
    );
    let explore = explore_fixture("ecommerce", "orders", 10);
    let validator = validator(client.clone(), ValidatorConfig::default());

    search(&validator, &[explore.clone()], true).await.unwrap();

    let errors = explore.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].model, "ecommerce");
    assert_eq!(errors[0].explore, "orders");
    assert_eq!(errors[0].dimension, None);
    assert_eq!(errors[0].message, "Syntax error");
    assert_eq!(errors[0].line_number, Some(7));
    assert!(errors[0].sql.as_deref().unwrap().starts_with("SELECT"));
    assert!(explore.queried());

    // No subdivision in fail-fast mode.
    assert_eq!(client.created_queries().len(), 1);
    for dimension in explore.dimensions() {
        assert!(dimension.errors().is_empty());
    }
}

// ===========================================================================
// Localize mode
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn localize_narrows_to_the_offending_dimension() {
    let client = Arc::new(MockAnalyticsClient::new().fail_dimension(
        "ecommerce",
        "orders",
        "orders.dim_3",
        "Column does not exist",
        Some(2),
    ));
    let explore = explore_fixture("ecommerce", "orders", 4);
    let validator = validator(client.clone(), ValidatorConfig::default());

    search(&validator, &[explore.clone()], false).await.unwrap();

    // Parent of 4 -> two halves of 2 -> the errored half splits into
    // singletons.
    let sizes: Vec<usize> = client
        .created_queries()
        .iter()
        .map(|dimensions| dimensions.len())
        .collect();
    assert_eq!(sizes, [4, 2, 2, 1, 1]);
    assert_eq!(client.created_queries()[3], ["orders.dim_2"]);
    assert_eq!(client.created_queries()[4], ["orders.dim_3"]);

    let culprit = &explore.dimensions()[3];
    let errors = culprit.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].dimension.as_deref(), Some("orders.dim_3"));
    assert_eq!(errors[0].explore, "orders");
    assert_eq!(errors[0].message, "Column does not exist");
    assert_eq!(errors[0].line_number, Some(2));
    assert!(errors[0].lookml_url.is_some());
    assert!(errors[0].explore_url.is_some());

    // Everyone else is clean but was queried.
    for dimension in &explore.dimensions()[..3] {
        assert!(dimension.errors().is_empty());
        assert!(dimension.queried());
    }
    assert!(culprit.queried());
    // In localize mode nothing is pinned on the explore itself.
    assert!(explore.errors().is_empty());
}

#[tokio::test(start_paused = true)]
async fn wide_explores_subdivide_into_chunk_windows() {
    let client = Arc::new(MockAnalyticsClient::new().fail_dimension(
        "ecommerce",
        "orders",
        "orders.dim_0",
        "Bad dimension",
        None,
    ));
    let explore = explore_fixture("ecommerce", "orders", 1500);
    let validator = validator(client.clone(), ValidatorConfig::default());

    search(&validator, &[explore.clone()], false).await.unwrap();

    // 1500 / 2 = 750 > 500: the parent fans out into three windows of
    // 500, not two halves of 750.
    let created = client.created_queries();
    let sizes: Vec<usize> = created.iter().map(|dimensions| dimensions.len()).collect();
    assert_eq!(sizes[..4], [1500, 500, 500, 500]);
    assert_eq!(created[1].first().map(String::as_str), Some("orders.dim_0"));

    // The search still bottoms out at the single offending dimension.
    assert_eq!(sizes.last(), Some(&1));
    let culprit = &explore.dimensions()[0];
    assert_eq!(culprit.errors().len(), 1);
    assert_eq!(culprit.errors()[0].dimension.as_deref(), Some("orders.dim_0"));
}

// ===========================================================================
// Benign-notice filtering
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn benign_notices_attribute_nothing() {
    let client = Arc::new(MockAnalyticsClient::new().benign_failure("ecommerce", "orders"));
    let explore = explore_fixture("ecommerce", "orders", 2);
    let validator = validator(client.clone(), ValidatorConfig::default());

    search(&validator, &[explore.clone()], false).await.unwrap();

    // The query errored, so it subdivided all the way down, but no
    // SqlError lands anywhere.
    let sizes: Vec<usize> = client
        .created_queries()
        .iter()
        .map(|dimensions| dimensions.len())
        .collect();
    assert_eq!(sizes, [2, 1, 1]);
    assert!(explore.errors().is_empty());
    for dimension in explore.dimensions() {
        assert!(dimension.errors().is_empty());
        assert!(dimension.queried());
    }
}

#[tokio::test(start_paused = true)]
async fn bare_message_errors_carry_no_location() {
    let client = Arc::new(MockAnalyticsClient::new().bare_message_failure(
        "ecommerce",
        "orders",
        "Query timed out",
    ));
    let explore = explore_fixture("ecommerce", "orders", 1);
    let validator = validator(client, ValidatorConfig::default());

    search(&validator, &[explore.clone()], false).await.unwrap();

    let errors = explore.dimensions()[0].errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "Query timed out");
    assert_eq!(errors[0].line_number, None);
    assert_eq!(errors[0].sql, None);
}

// ===========================================================================
// Interrupts
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn interrupt_cancels_every_outstanding_task() {
    let mut client = MockAnalyticsClient::new();
    for i in 0..20 {
        client = client.hang_explore("ecommerce", &format!("sales_{i}"));
    }
    let client = Arc::new(client);
    let explores: Vec<_> = (0..20)
        .map(|i| explore_fixture("ecommerce", &format!("sales_{i}"), 1))
        .collect();
    let validator = validator(client.clone(), ValidatorConfig::default().concurrency(20));

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            // Give every task time to launch before interrupting.
            tokio::time::sleep(Duration::from_secs(5)).await;
            cancel.cancel();
        });
    }

    let err = tokio::time::timeout(
        TEST_DEADLINE,
        validator.search(&explores, false, false, cancel),
    )
    .await
    .expect("pipeline deadlocked")
    .unwrap_err();

    assert!(matches!(err, ValidatorError::Interrupted { cancelled: 20 }));
    assert_eq!(err.to_string(), "Attempted to cancel 20 running queries.");
    assert_eq!(err.title(), "SQL validation was manually interrupted.");
    assert_eq!(client.cancelled().len(), 20);
}

// ===========================================================================
// Fatal errors
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn create_query_rejection_aborts_the_run() {
    let client = Arc::new(MockAnalyticsClient::new().reject_create_query(
        "ecommerce",
        "orders",
        "invalid field",
    ));
    let explore = explore_fixture("ecommerce", "orders", 3);
    let validator = validator(client, ValidatorConfig::default());

    let err = search(&validator, &[explore], false).await.unwrap_err();
    assert!(matches!(err, ValidatorError::Api(_)));
    assert_eq!(err.title(), "Error communicating with the analytics API.");
}

#[tokio::test(start_paused = true)]
async fn unknown_status_aborts_the_run() {
    let client =
        Arc::new(MockAnalyticsClient::new().unknown_status("ecommerce", "orders", "killed"));
    let explore = explore_fixture("ecommerce", "orders", 3);
    let validator = validator(client, ValidatorConfig::default());

    let err = search(&validator, &[explore], false).await.unwrap_err();
    assert!(matches!(
        err,
        ValidatorError::UnexpectedStatus { ref status } if status == "killed"
    ));
}

// ===========================================================================
// Concurrency budget
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn small_concurrency_budget_still_drains() {
    // 30 queries through 2 slots: completion proves every terminal
    // result released its slot.
    let client = Arc::new(MockAnalyticsClient::new());
    let explores: Vec<_> = (0..30)
        .map(|i| explore_fixture("ecommerce", &format!("sales_{i}"), 2))
        .collect();
    let validator = validator(client.clone(), ValidatorConfig::default().concurrency(2));

    search(&validator, &explores, false).await.unwrap();

    assert_eq!(client.created_task_count(), 30);
    for explore in &explores {
        assert!(explore.queried());
        assert!(explore.errors().is_empty());
    }
}

// ===========================================================================
// Profiler
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn slow_queries_are_profiled() {
    let client = Arc::new(MockAnalyticsClient::new().slow_complete("ecommerce", "orders", 6.5));
    let orders = explore_fixture("ecommerce", "orders", 3);
    let refunds = explore_fixture("ecommerce", "refunds", 3);
    let validator = validator(client, ValidatorConfig::default());

    tokio::time::timeout(
        TEST_DEADLINE,
        validator.search(
            &[orders, refunds],
            false,
            true,
            CancellationToken::new(),
        ),
    )
    .await
    .expect("pipeline deadlocked")
    .unwrap();

    // Only the slow explore clears the 5 s threshold; the 0.1 s
    // default stays out.
    let rows = validator.long_running_queries();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].reference.name(), "orders");
    assert_eq!(rows[0].reference.kind(), "explore");
    assert!((rows[0].runtime - 6.5).abs() < f64::EPSILON);
}

// ===========================================================================
// SQL compilation
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn compile_sql_returns_the_generated_query() {
    let client = Arc::new(MockAnalyticsClient::new());
    let explore = explore_fixture("ecommerce", "orders", 2);
    let validator = validator(client, ValidatorConfig::default());

    let sql = validator.compile_sql(&explore).await.unwrap();
    assert_eq!(
        sql,
        "SELECT orders.dim_0, orders.dim_1 FROM ecommerce.orders"
    );
}

#[tokio::test(start_paused = true)]
async fn compile_sql_requires_dimensions() {
    let client = Arc::new(MockAnalyticsClient::new());
    let explore = sqlvet_core::model::Explore::new("ecommerce", "empty", Vec::new());
    let validator = validator(client, ValidatorConfig::default());

    let err = validator.compile_sql(&explore).await.unwrap_err();
    assert!(matches!(
        err,
        ValidatorError::MissingDimensions { ref explore } if explore == "empty"
    ));
}
