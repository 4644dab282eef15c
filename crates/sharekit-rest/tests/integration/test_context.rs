//! Engine operations running over the REST transport

use serde_json::json;
use sharekit_core::domain::{BatchError, PropertySelector};
use sharekit_core::model::ListTemplateType;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{self, api, batch_response, BATCH_CONTENT_TYPE};

const TASKS_ID: &str = "b5e8d1a0-0000-4000-8000-000000000001";
const DOCS_ID: &str = "b5e8d1a0-0000-4000-8000-000000000002";

#[tokio::test]
async fn test_get_list_by_title() {
    let (server, transport) = common::setup().await;
    Mock::given(method("GET"))
        .and(path(api("_api/web/lists/getbytitle('Tasks')")))
        .and(query_param("$select", "Id,ItemCount,Title"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Id": TASKS_ID,
            "Title": "Tasks",
            "ItemCount": 3
        })))
        .expect(1)
        .mount(&server)
        .await;
    let mut ctx = common::context(transport);

    let selector = PropertySelector::parse(["Title", "ItemCount"]).unwrap();
    let list = ctx.get_list_by_title("Tasks", selector).await.unwrap().unwrap();

    let object = ctx.object(list).unwrap();
    assert_eq!(object.text("Title").unwrap(), Some("Tasks"));
    assert_eq!(object.int("ItemCount").unwrap(), Some(3));
    assert_eq!(object.guid("Id").unwrap(), Some(Uuid::parse_str(TASKS_ID).unwrap()));
}

#[tokio::test]
async fn test_missing_list_is_none() {
    let (server, transport) = common::setup().await;
    Mock::given(method("GET"))
        .and(path(api("_api/web/lists/getbytitle('Nope')")))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(common::odata_error("List 'Nope' does not exist.")),
        )
        .mount(&server)
        .await;
    let mut ctx = common::context(transport);

    let list = ctx.get_list_by_title("Nope", PropertySelector::new()).await.unwrap();

    assert!(list.is_none());
}

#[tokio::test]
async fn test_server_error_surfaces_as_request_failed() {
    let (server, transport) = common::setup().await;
    Mock::given(method("GET"))
        .and(path(api("_api/web/lists/getbytitle('Tasks')")))
        .respond_with(ResponseTemplate::new(403).set_body_json(common::odata_error("Access denied.")))
        .mount(&server)
        .await;
    let mut ctx = common::context(transport);

    let err = ctx
        .get_list_by_title("Tasks", PropertySelector::new())
        .await
        .unwrap_err();

    match err {
        BatchError::RequestFailed { status, cause, .. } => {
            assert_eq!(status, Some(403));
            assert!(cause.contains("Access denied."));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_explicit_batch_travels_as_one_post() {
    let (server, transport) = common::setup().await;
    Mock::given(method("POST"))
        .and(path(api("_api/$batch")))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            batch_response(&[
                (200, Some(json!({ "Id": TASKS_ID, "Title": "Tasks" }))),
                (200, Some(json!({ "Id": DOCS_ID, "Title": "Docs" }))),
            ]),
            BATCH_CONTENT_TYPE,
        ))
        .expect(1)
        .mount(&server)
        .await;
    let mut ctx = common::context(transport);

    let mut batch = ctx.new_batch();
    let tasks = ctx
        .get_list_by_title_in(&mut batch, "Tasks", PropertySelector::new())
        .unwrap();
    let docs = ctx
        .get_list_by_title_in(&mut batch, "Docs", PropertySelector::new())
        .unwrap();
    let outcome = ctx.execute_batch(&mut batch).await.unwrap();

    assert_eq!(outcome.response_count(), 2);
    assert_eq!(
        ctx.object(tasks).unwrap().guid("Id").unwrap(),
        Some(Uuid::parse_str(TASKS_ID).unwrap())
    );
    assert_eq!(ctx.object(docs).unwrap().text("Title").unwrap(), Some("Docs"));
}

#[tokio::test]
async fn test_add_list_joins_web_lists() {
    let (server, transport) = common::setup().await;
    Mock::given(method("POST"))
        .and(path(api("_api/web/lists")))
        .and(body_partial_json(json!({ "Title": "Docs", "BaseTemplate": 101 })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "Id": DOCS_ID,
            "Title": "Docs",
            "BaseTemplate": 101
        })))
        .expect(1)
        .mount(&server)
        .await;
    let mut ctx = common::context(transport);

    let list = ctx.add_list("Docs", ListTemplateType::DocumentLibrary).await.unwrap();

    assert_eq!(ctx.lists().unwrap(), vec![list]);
    assert_eq!(
        ctx.object(list).unwrap().guid("Id").unwrap(),
        Some(Uuid::parse_str(DOCS_ID).unwrap())
    );
}
