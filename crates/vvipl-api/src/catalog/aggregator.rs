//! Parts catalog aggregation across all diagrams of a model.

use std::num::NonZeroUsize;

use futures::{StreamExt, stream};
use serde_json::Value;
use tracing::instrument;

use super::types::{Diagram, DiagramId, ModelRef, PartsCatalog};
use crate::upstream::{CallTarget, IplError, LocalUpstreamApi};

/// Endpoint returning the ordered diagram list of a model.
pub const EP_GET_DIAGRAMS: &str = "get-diagrams";

/// Endpoint returning the parts map of one diagram.
pub const EP_GET_DIAGRAM_PARTS: &str = "get-diagram-parts";

/// Tuning for `build_catalog`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateOptions {
    /// Maximum number of per-diagram fetches in flight.
    pub concurrency: NonZeroUsize,
}

impl AggregateOptions {
    /// One fetch at a time, in diagram order.
    #[must_use]
    pub const fn sequential() -> Self {
        Self {
            concurrency: NonZeroUsize::MIN,
        }
    }

    /// Up to `concurrency` fetches in flight.
    #[must_use]
    pub const fn with_concurrency(concurrency: NonZeroUsize) -> Self {
        Self { concurrency }
    }
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self::sequential()
    }
}

/// Fetches the diagram list of a model.
///
/// # Errors
///
/// Propagates upstream call errors. Returns `IplError::Aggregation` if the
/// response is not an array of diagram records.
#[instrument(skip_all)]
pub async fn fetch_diagrams(
    api: &(impl LocalUpstreamApi + Sync),
    model: &ModelRef,
) -> Result<Vec<Diagram>, IplError> {
    let target = CallTarget::new(EP_GET_DIAGRAMS);
    let value = api.call(EP_GET_DIAGRAMS, &model.payload()).await?;

    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(IplError::Aggregation {
                target,
                message: format!("expected an array of diagrams, got {}", json_kind(&other)),
            });
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value::<Diagram>(item).map_err(|e| IplError::Aggregation {
                target: target.clone(),
                message: format!("entry #{index} is not a diagram record: {e}"),
            })
        })
        .collect()
}

/// Fetches the parts map of one diagram.
///
/// An empty JSON array is accepted as an empty parts map.
///
/// # Errors
///
/// Propagates upstream call errors. Returns `IplError::Aggregation` if the
/// response is not an object of part records.
#[instrument(skip_all, fields(diagram_id = %diagram_id))]
pub async fn fetch_diagram_parts(
    api: &(impl LocalUpstreamApi + Sync),
    model: &ModelRef,
    diagram_id: &DiagramId,
) -> Result<PartsCatalog, IplError> {
    let target = CallTarget::new(EP_GET_DIAGRAM_PARTS).with_diagram(diagram_id.as_str());

    let mut payload = model.payload();
    payload.insert(
        String::from("diagramId"),
        Value::String(diagram_id.to_string()),
    );

    let value = api.call(EP_GET_DIAGRAM_PARTS, &payload).await?;
    if let Value::Array(items) = &value
        && items.is_empty()
    {
        return Ok(PartsCatalog::new());
    }
    if !value.is_object() {
        return Err(IplError::Aggregation {
            target,
            message: format!("expected an object of parts, got {}", json_kind(&value)),
        });
    }

    serde_json::from_value(value).map_err(|e| IplError::Aggregation {
        target,
        message: format!("parts map could not be decoded: {e}"),
    })
}

/// Builds the merged parts catalog of a model.
///
/// Fetches the diagram list, then the parts of every diagram with at most
/// `options.concurrency` requests in flight. Results are merged in diagram
/// order regardless of completion order, so a part number present in
/// several diagrams takes the entry from the last diagram listing it.
///
/// Aggregation is all-or-nothing: the first failing call aborts the
/// remaining fetches and no partial catalog is returned.
///
/// # Errors
///
/// Returns the first `IplError` raised by the diagram list fetch or by any
/// per-diagram fetch (in diagram order).
#[instrument(skip_all, fields(model_number = %model.model_number, model_id = %model.model_id))]
pub async fn build_catalog(
    api: &(impl LocalUpstreamApi + Sync),
    model: &ModelRef,
    options: AggregateOptions,
) -> Result<PartsCatalog, IplError> {
    let diagrams = fetch_diagrams(api, model).await?;
    let total = diagrams.len();

    tracing::info!(
        diagrams = total,
        concurrency = options.concurrency.get(),
        "Diagram list fetched"
    );

    // `buffered` yields in input order, which fixes the merge order.
    let mut fetched = stream::iter(diagrams.iter().enumerate())
        .map(|(index, diagram)| async move {
            fetch_diagram_parts(api, model, &diagram.id)
                .await
                .map(|parts| (index, diagram, parts))
        })
        .buffered(options.concurrency.get());

    let mut catalog = PartsCatalog::new();
    while let Some(result) = fetched.next().await {
        let (index, diagram, parts) = result.inspect_err(|e| {
            tracing::warn!(error = %e, "Diagram parts fetch failed, aborting aggregation");
        })?;

        let count = parts.len();
        let overwritten = catalog.merge(parts);
        tracing::debug!(
            diagram = index.saturating_add(1),
            total,
            diagram_id = %diagram.id,
            section = diagram.section_name.as_deref().unwrap_or("-"),
            parts = count,
            overwritten,
            "Diagram parts merged"
        );
    }

    tracing::info!(
        diagrams = total,
        parts = catalog.len(),
        "Catalog aggregation completed"
    );

    Ok(catalog)
}

/// Names the JSON type of `value` for error messages.
const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]
    #![allow(clippy::float_cmp)]
    #![allow(clippy::indexing_slicing)]

    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::{Map, json};

    use super::*;
    use crate::upstream::{Credentials, UpstreamClient};

    /// Recorded call: endpoint and `diagramId` payload field.
    type Call = (String, Option<Value>);

    /// How a mocked call fails.
    #[derive(Debug, Clone, Copy)]
    enum Failure {
        Status(u16),
        Timeout,
        BadJson,
    }

    impl Failure {
        fn into_error(self, target: CallTarget) -> IplError {
            match self {
                Self::Status(status) => IplError::Upstream {
                    target,
                    status,
                    body: Some(String::from("mock failure")),
                },
                Self::Timeout => IplError::Transport {
                    target,
                    message: String::from("operation timed out"),
                    timed_out: true,
                },
                Self::BadJson => IplError::Decode {
                    target,
                    message: String::from("expected value at line 1 column 1"),
                },
            }
        }
    }

    /// Mock API serving a fixed diagram list and per-diagram parts.
    struct MockUpstreamApi {
        diagrams: Result<Value, Failure>,
        parts: HashMap<String, Result<Value, Failure>>,
        delays: HashMap<String, Duration>,
        calls: Mutex<Vec<Call>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl MockUpstreamApi {
        fn new(diagrams: Value) -> Self {
            Self {
                diagrams: Ok(diagrams),
                parts: HashMap::new(),
                delays: HashMap::new(),
                calls: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        fn failing_diagrams(status: u16) -> Self {
            let mut mock = Self::new(Value::Null);
            mock.diagrams = Err(Failure::Status(status));
            mock
        }

        fn with_parts(mut self, diagram_id: &str, parts: Value) -> Self {
            self.parts.insert(String::from(diagram_id), Ok(parts));
            self
        }

        fn with_failing_parts(mut self, diagram_id: &str, failure: Failure) -> Self {
            self.parts.insert(String::from(diagram_id), Err(failure));
            self
        }

        fn with_delay(mut self, diagram_id: &str, delay: Duration) -> Self {
            self.delays.insert(String::from(diagram_id), delay);
            self
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn parts_calls(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter(|(endpoint, _)| endpoint == EP_GET_DIAGRAM_PARTS)
                .filter_map(|(_, id)| id.and_then(|v| v.as_str().map(String::from)))
                .collect()
        }
    }

    impl LocalUpstreamApi for MockUpstreamApi {
        async fn call(
            &self,
            endpoint: &str,
            payload: &Map<String, Value>,
        ) -> Result<Value, IplError> {
            self.calls
                .lock()
                .unwrap()
                .push((String::from(endpoint), payload.get("diagramId").cloned()));

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let diagram_id = payload
                .get("diagramId")
                .and_then(Value::as_str)
                .map(String::from);
            if let Some(delay) = diagram_id.as_ref().and_then(|id| self.delays.get(id)) {
                tokio::time::sleep(*delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let mut target = CallTarget::new(endpoint);
            let reply = if endpoint == EP_GET_DIAGRAMS {
                self.diagrams.clone()
            } else {
                let id = diagram_id.unwrap();
                target = target.with_diagram(id.clone());
                self.parts.get(&id).cloned().unwrap_or(Ok(json!({})))
            };

            reply.map_err(|failure| failure.into_error(target))
        }
    }

    fn model() -> ModelRef {
        ModelRef::new("F150", "42")
    }

    #[tokio::test]
    async fn test_example_scenario_later_diagram_wins() {
        // Arrange
        let mock = MockUpstreamApi::new(json!([
            {"diagramId": 1, "sectionName": "A"},
            {"diagramId": 2, "sectionName": "B"}
        ]))
        .with_parts("1", json!({"P1": {"price": 10}}))
        .with_parts("2", json!({"P1": {"price": 12}, "P2": {"price": 5}}));

        // Act
        let catalog = build_catalog(&mock, &model(), AggregateOptions::default())
            .await
            .unwrap();

        // Assert
        assert_eq!(
            serde_json::to_value(&catalog).unwrap(),
            json!({"P1": {"price": 12}, "P2": {"price": 5}})
        );
    }

    #[tokio::test]
    async fn test_one_parts_call_per_diagram_in_order() {
        // Arrange
        let mock = MockUpstreamApi::new(json!([
            {"diagramId": 30, "sectionName": "Engine"},
            {"diagramId": "10", "sectionName": "Hull"},
            {"diagramId": 20, "sectionName": "Trailer"}
        ]));

        // Act
        build_catalog(&mock, &model(), AggregateOptions::default())
            .await
            .unwrap();

        // Assert
        let calls = mock.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0], (String::from(EP_GET_DIAGRAMS), None));
        assert_eq!(mock.parts_calls(), vec!["30", "10", "20"]);
    }

    #[tokio::test]
    async fn test_diagram_id_sent_as_string() {
        // Arrange
        let mock = MockUpstreamApi::new(json!([{"diagramId": 7, "sectionName": "A"}]));

        // Act
        build_catalog(&mock, &model(), AggregateOptions::default())
            .await
            .unwrap();

        // Assert
        let calls = mock.calls();
        assert_eq!(calls[1].1, Some(json!("7")));
    }

    #[tokio::test]
    async fn test_single_diagram_catalog_equals_its_parts() {
        // Arrange
        let parts = json!({
            "P1": {"description": "Gasket", "price": 10, "qty": 4},
            "P2": {"description": "Bolt", "price": "0.75", "listPrice": "1,200", "image": "b.png"},
            "P3": {"description": "Seal", "price": "N/A", "notes": {"superseded": true}}
        });
        let mock = MockUpstreamApi::new(json!([{"diagramId": 1, "sectionName": "A"}]))
            .with_parts("1", parts.clone());

        // Act
        let catalog = build_catalog(&mock, &model(), AggregateOptions::default())
            .await
            .unwrap();

        // Assert
        assert_eq!(serde_json::to_value(&catalog).unwrap(), parts);
    }

    #[tokio::test]
    async fn test_empty_diagram_list_yields_empty_catalog() {
        // Arrange
        let mock = MockUpstreamApi::new(json!([]));

        // Act
        let catalog = build_catalog(&mock, &model(), AggregateOptions::default())
            .await
            .unwrap();

        // Assert
        assert!(catalog.is_empty());
        assert!(mock.parts_calls().is_empty());
    }

    #[tokio::test]
    async fn test_diagrams_failure_skips_parts_fetch() {
        // Arrange
        let mock = MockUpstreamApi::failing_diagrams(500);

        // Act
        let err = build_catalog(&mock, &model(), AggregateOptions::default())
            .await
            .unwrap_err();

        // Assert
        assert!(matches!(err, IplError::Upstream { status: 500, .. }));
        assert_eq!(err.target().endpoint, EP_GET_DIAGRAMS);
        assert!(mock.parts_calls().is_empty());
    }

    #[tokio::test]
    async fn test_non_array_diagrams_is_aggregation_error() {
        // Arrange
        let mock = MockUpstreamApi::new(json!({"error": "unknown model"}));

        // Act
        let err = build_catalog(&mock, &model(), AggregateOptions::default())
            .await
            .unwrap_err();

        // Assert
        match &err {
            IplError::Aggregation { target, message } => {
                assert_eq!(target.endpoint, EP_GET_DIAGRAMS);
                assert!(message.contains("an object"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(mock.parts_calls().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_diagram_entry_is_aggregation_error() {
        // Arrange
        let mock = MockUpstreamApi::new(json!([
            {"diagramId": 1, "sectionName": "A"},
            {"sectionName": "missing id"}
        ]));

        // Act
        let err = build_catalog(&mock, &model(), AggregateOptions::default())
            .await
            .unwrap_err();

        // Assert
        assert!(matches!(err, IplError::Aggregation { .. }));
        assert!(err.to_string().contains("entry #1"));
        assert!(mock.parts_calls().is_empty());
    }

    #[tokio::test]
    async fn test_parts_failure_aborts_and_identifies_diagram() {
        // Arrange
        let mock = MockUpstreamApi::new(json!([
            {"diagramId": 1, "sectionName": "A"},
            {"diagramId": 2, "sectionName": "B"},
            {"diagramId": 3, "sectionName": "C"}
        ]))
        .with_parts("1", json!({"P1": {"price": 1}}))
        .with_failing_parts("2", Failure::Status(502));

        // Act
        let err = build_catalog(&mock, &model(), AggregateOptions::default())
            .await
            .unwrap_err();

        // Assert
        assert_eq!(err.status(), Some(502));
        assert_eq!(err.target().endpoint, EP_GET_DIAGRAM_PARTS);
        assert_eq!(err.target().diagram_id.as_deref(), Some("2"));
        assert_eq!(mock.parts_calls(), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_parts_timeout_aborts_and_identifies_diagram() {
        // Arrange
        let mock = MockUpstreamApi::new(json!([
            {"diagramId": 1, "sectionName": "A"},
            {"diagramId": 2, "sectionName": "B"},
            {"diagramId": 3, "sectionName": "C"}
        ]))
        .with_failing_parts("3", Failure::Timeout);

        // Act
        let err = build_catalog(&mock, &model(), AggregateOptions::default())
            .await
            .unwrap_err();

        // Assert
        assert!(matches!(
            err,
            IplError::Transport {
                timed_out: true,
                ..
            }
        ));
        assert_eq!(err.status(), None);
        assert_eq!(err.target().endpoint, EP_GET_DIAGRAM_PARTS);
        assert_eq!(err.target().diagram_id.as_deref(), Some("3"));
        assert_eq!(mock.parts_calls(), vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_parts_decode_failure_aborts_concurrent_build() {
        // Arrange
        let mock = MockUpstreamApi::new(json!([
            {"diagramId": 1, "sectionName": "A"},
            {"diagramId": 2, "sectionName": "B"}
        ]))
        .with_parts("1", json!({"P1": {"price": 1}}))
        .with_failing_parts("2", Failure::BadJson);
        let options = AggregateOptions::with_concurrency(NonZeroUsize::new(2).unwrap());

        // Act
        let err = build_catalog(&mock, &model(), options).await.unwrap_err();

        // Assert
        assert!(matches!(err, IplError::Decode { .. }));
        assert_eq!(err.target().diagram_id.as_deref(), Some("2"));
        assert!(err.to_string().contains("get-diagram-parts (diagram 2)"));
    }

    #[tokio::test]
    async fn test_unreadable_price_still_builds_catalog() {
        // Arrange
        let mock = MockUpstreamApi::new(json!([{"diagramId": 1, "sectionName": "A"}]))
            .with_parts("1", json!({"P1": {"price": 10}, "P2": {"price": "N/A"}}));

        // Act
        let catalog = build_catalog(&mock, &model(), AggregateOptions::default())
            .await
            .unwrap();

        // Assert
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("P1").unwrap().price(), Some(10.0));
        assert_eq!(catalog.get("P2").unwrap().price(), None);
        assert_eq!(catalog.get("P2").unwrap().get("price"), Some(&json!("N/A")));
    }

    #[tokio::test]
    async fn test_part_with_duplicate_key_spellings_builds_catalog() {
        // Arrange
        let mock = MockUpstreamApi::new(json!([{"diagramId": 1, "sectionName": "A"}]))
            .with_parts(
                "1",
                json!({"P1": {"quantity": 3, "qty": 3, "imageUrl": "a", "image": "a"}}),
            );

        // Act
        let catalog = build_catalog(&mock, &model(), AggregateOptions::default())
            .await
            .unwrap();

        // Assert
        let part = catalog.get("P1").unwrap();
        assert_eq!(part.quantity(), Some(3.0));
        assert_eq!(part.image_url(), Some("a"));
    }

    #[tokio::test]
    async fn test_parts_non_object_is_aggregation_error() {
        // Arrange
        let mock = MockUpstreamApi::new(json!([{"diagramId": 4, "sectionName": "A"}]))
            .with_parts("4", json!("no parts"));

        // Act
        let err = build_catalog(&mock, &model(), AggregateOptions::default())
            .await
            .unwrap_err();

        // Assert
        assert!(matches!(err, IplError::Aggregation { .. }));
        assert_eq!(err.target().diagram_id.as_deref(), Some("4"));
    }

    #[tokio::test]
    async fn test_parts_empty_array_is_empty_map() {
        // Arrange
        let mock = MockUpstreamApi::new(json!([])).with_parts("5", json!([]));

        // Act
        let parts = fetch_diagram_parts(&mock, &model(), &DiagramId::new("5"))
            .await
            .unwrap();

        // Assert
        assert!(parts.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_fetch_merges_in_diagram_order() {
        // Arrange: first diagram completes last
        let mock = MockUpstreamApi::new(json!([
            {"diagramId": 1, "sectionName": "A"},
            {"diagramId": 2, "sectionName": "B"}
        ]))
        .with_parts("1", json!({"P1": {"price": 10}}))
        .with_parts("2", json!({"P1": {"price": 12}}))
        .with_delay("1", Duration::from_millis(100));
        let options = AggregateOptions::with_concurrency(NonZeroUsize::new(2).unwrap());

        // Act
        let catalog = build_catalog(&mock, &model(), options).await.unwrap();

        // Assert
        assert_eq!(catalog.get("P1").unwrap().price(), Some(12.0));
        assert_eq!(mock.max_in_flight.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_sequential_fetch_has_one_call_in_flight() {
        // Arrange
        let mock = MockUpstreamApi::new(json!([
            {"diagramId": 1, "sectionName": "A"},
            {"diagramId": 2, "sectionName": "B"},
            {"diagramId": 3, "sectionName": "C"}
        ]))
        .with_delay("1", Duration::from_millis(20))
        .with_delay("2", Duration::from_millis(20));

        // Act
        build_catalog(&mock, &model(), AggregateOptions::sequential())
            .await
            .unwrap();

        // Assert
        assert_eq!(mock.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_build_catalog_via_http() {
        // Arrange
        let mock_server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/ipl/get-diagrams"))
            .and(wiremock::matchers::body_partial_json(json!({
                "username": "dealer",
                "password": "secret",
                "modelNumber": "F150",
                "modelId": "42"
            })))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!([
                {"diagramId": 1, "sectionName": "A"},
                {"diagramId": 2, "sectionName": "B"}
            ])))
            .expect(1)
            .mount(&mock_server)
            .await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/ipl/get-diagram-parts"))
            .and(wiremock::matchers::body_partial_json(json!({"diagramId": "1"})))
            .respond_with(
                wiremock::ResponseTemplate::new(200).set_body_json(json!({"P1": {"price": 10}})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/ipl/get-diagram-parts"))
            .and(wiremock::matchers::body_partial_json(json!({"diagramId": "2"})))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(
                json!({"P1": {"price": 12}, "P2": {"price": 5}}),
            ))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = UpstreamClient::builder()
            .base_url(format!("{}/ipl", mock_server.uri()).parse().unwrap())
            .credentials(Credentials::new("dealer", "secret"))
            .user_agent("test/0.0.0")
            .build()
            .unwrap();

        // Act
        let catalog = build_catalog(&client, &model(), AggregateOptions::default())
            .await
            .unwrap();

        // Assert
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("P1").unwrap().price(), Some(12.0));
        assert_eq!(catalog.get("P2").unwrap().price(), Some(5.0));
    }
}
