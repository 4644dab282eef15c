//! In-memory SharePoint used by the integration tests
//!
//! [`FakeSharePoint`] implements [`IBatchTransport`] over a small model of a
//! site: lists with items, IRM settings and role inheritance, plus a site
//! collection app catalog. Clones share state, so several contexts created
//! from one factory see the same site.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{json, Value};
use uuid::Uuid;

use sharekit_core::domain::{OperationKind, Payload, PropertyBag, PropertySelector};
use sharekit_core::ports::{IBatchTransport, TransportFault, TransportRequest, TransportResponse};
use sharekit_core::{Context, ContextFactory};

pub const SITE_PATH: &str = "/sites/dev";
pub const APP_VERSION: &str = "1.0.0.0";

#[derive(Debug, Clone)]
pub struct FakeList {
    pub id: Uuid,
    pub title: String,
    pub template: i64,
    pub items: Vec<Value>,
    pub next_item: i64,
    pub irm_enabled: bool,
    pub unique_roles: bool,
}

impl FakeList {
    fn url(&self) -> String {
        format!("{SITE_PATH}/Lists/{}", self.title)
    }

    fn to_json(&self, selector: &PropertySelector) -> Value {
        let mut list = json!({
            "Id": self.id.to_string(),
            "Title": self.title,
            "BaseTemplate": self.template,
            "ItemCount": self.items.len(),
            "IrmEnabled": self.irm_enabled,
            "HasUniqueRoleAssignments": self.unique_roles,
            "ListExperienceOptions": 0,
            "RootFolder": { "ServerRelativeUrl": self.url() },
        });
        if selector.contains("Items") {
            list["Items"] = Value::Array(self.items.clone());
        }
        if selector.contains("ContentTypes") {
            list["ContentTypes"] = json!([
                {
                    "Id": "0x01",
                    "Name": "Item",
                    "FieldLinks": [
                        { "Id": "fa564e0f-0c70-4ab9-b863-0177e6ddd247", "Name": "Title" }
                    ]
                },
                { "Id": "0x0120", "Name": "Folder", "FieldLinks": [] }
            ]);
        }
        project(list, selector)
    }
}

#[derive(Debug, Clone)]
pub struct FakeApp {
    pub id: Uuid,
    pub title: String,
    pub file_name: String,
    pub deployed: bool,
    pub installed_version: Option<String>,
}

impl FakeApp {
    fn to_json(&self) -> Value {
        json!({
            "Id": self.id.to_string(),
            "Title": self.title,
            "Deployed": self.deployed,
            "InstalledVersion": self.installed_version,
            "AppCatalogVersion": APP_VERSION,
            "CanUpgrade": false,
        })
    }
}

#[derive(Debug, Default)]
pub struct SiteState {
    pub lists: Vec<FakeList>,
    pub apps: Vec<FakeApp>,
    pub recycle_bin: Vec<Uuid>,
    /// Every request received, in order
    pub requests: Vec<(OperationKind, String)>,
    /// Number of `send_batch` calls
    pub round_trips: usize,
    /// Paths answered with a 500
    pub failing: HashSet<String>,
}

/// Shared in-memory site
#[derive(Clone, Default)]
pub struct FakeSharePoint {
    state: Arc<Mutex<SiteState>>,
}

impl FakeSharePoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, SiteState> {
        self.state.lock().expect("fake site state poisoned")
    }

    pub fn factory(&self) -> ContextFactory {
        ContextFactory::new(Arc::new(self.clone()))
    }

    pub fn context(&self) -> Context {
        self.factory().create()
    }

    /// Seeds a generic list with `items` items titled `Item 0..`
    pub fn with_list(&self, title: &str, items: usize) -> Uuid {
        let id = Uuid::new_v4();
        let mut list = FakeList {
            id,
            title: title.to_string(),
            template: 100,
            items: Vec::new(),
            next_item: 1,
            irm_enabled: false,
            unique_roles: false,
        };
        for i in 0..items {
            add_item(&mut list, json!({ "Title": format!("Item {i}") }));
        }
        self.state().lists.push(list);
        id
    }

    /// Seeds an app in the catalog
    pub fn with_app(&self, title: &str, deployed: bool, installed: bool) -> Uuid {
        let id = Uuid::new_v4();
        self.state().apps.push(FakeApp {
            id,
            title: title.to_string(),
            file_name: format!("{title}.sppkg"),
            deployed,
            installed_version: installed.then(|| APP_VERSION.to_string()),
        });
        id
    }

    pub fn fail_on(&self, path: &str) {
        self.state().failing.insert(path.to_string());
    }

    pub fn request_count(&self) -> usize {
        self.state().requests.len()
    }

    pub fn round_trips(&self) -> usize {
        self.state().round_trips
    }

    pub fn list_count(&self) -> usize {
        self.state().lists.len()
    }

    pub fn app(&self, id: Uuid) -> Option<FakeApp> {
        self.state().apps.iter().find(|a| a.id == id).cloned()
    }

    pub fn list(&self, title: &str) -> Option<FakeList> {
        self.state().lists.iter().find(|l| l.title == title).cloned()
    }
}

#[async_trait::async_trait]
impl IBatchTransport for FakeSharePoint {
    async fn send(&self, request: &TransportRequest) -> Result<TransportResponse, TransportFault> {
        let mut state = self.state();
        state
            .requests
            .push((request.kind.clone(), request.path.clone()));
        if state.failing.contains(&request.path) {
            return Err(TransportFault::new(500, "Internal server error"));
        }
        let (status, body) = route(&mut state, request)?;
        Ok(TransportResponse::new(
            request.correlation_id,
            status,
            PropertyBag::from_json(&body),
        ))
    }

    async fn send_batch(
        &self,
        requests: &[TransportRequest],
    ) -> Vec<Result<TransportResponse, TransportFault>> {
        self.state().round_trips += 1;
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            let result = self.send(request).await;
            let failed = result.is_err();
            results.push(result);
            if failed {
                break;
            }
        }
        results
    }
}

// ============================================================================
// Routing
// ============================================================================

type Routed = Result<(u16, Value), TransportFault>;

fn not_found(what: &str) -> TransportFault {
    TransportFault::new(404, format!("{what} does not exist"))
}

fn payload(request: &TransportRequest) -> Value {
    match &request.payload {
        Payload::Properties(bag) => bag.to_json(),
        _ => Value::Null,
    }
}

/// Keeps only selected top-level properties
fn project(value: Value, selector: &PropertySelector) -> Value {
    if selector.is_empty() {
        return value;
    }
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(k, _)| selector.contains(k))
                .collect(),
        ),
        other => other,
    }
}

/// Text between `prefix` and the closing `')`
fn quoted<'a>(path: &'a str, prefix: &str) -> Option<(String, &'a str)> {
    let rest = path.strip_prefix(prefix)?;
    let end = rest.find("')")?;
    Some((rest[..end].replace("''", "'"), &rest[end + 2..]))
}

fn row_limit(view_xml: &str) -> Option<usize> {
    let start = view_xml.find("<RowLimit>")? + "<RowLimit>".len();
    let end = view_xml[start..].find("</RowLimit>")? + start;
    view_xml[start..end].trim().parse().ok()
}

fn add_item(list: &mut FakeList, values: Value) -> Value {
    let id = list.next_item;
    list.next_item += 1;
    let mut item = json!({ "Id": id, "ID": id });
    if let (Some(target), Value::Object(values)) = (item.as_object_mut(), values) {
        target.extend(values);
    }
    list.items.push(item.clone());
    item
}

fn route(state: &mut SiteState, request: &TransportRequest) -> Routed {
    let path = request.path.as_str();
    if path == "_api/web" {
        return web(state, request);
    }
    if path == "_api/web/lists" {
        return add_list(state, request);
    }
    if let Some((title, _)) = quoted(path, "_api/web/lists/getbytitle('") {
        let list = state
            .lists
            .iter()
            .find(|l| l.title == title)
            .ok_or_else(|| not_found(&format!("List '{title}'")))?;
        return Ok((200, list.to_json(&request.selector)));
    }
    if let Some((url, _)) = quoted(path, "_api/web/getlist('") {
        let list = state
            .lists
            .iter()
            .find(|l| l.url().eq_ignore_ascii_case(&url))
            .ok_or_else(|| not_found(&format!("List at '{url}'")))?;
        return Ok((200, list.to_json(&request.selector)));
    }
    if let Some((id, rest)) = quoted(path, "_api/web/lists(guid'") {
        let id = Uuid::parse_str(&id).map_err(|_| TransportFault::new(400, "Bad list id"))?;
        return list_action(state, request, id, rest);
    }
    if let Some(rest) = path.strip_prefix("_api/web/sitecollectionappcatalog") {
        return catalog(state, request, rest);
    }
    Err(TransportFault::new(400, format!("Unsupported path {path}")))
}

fn web(state: &SiteState, request: &TransportRequest) -> Routed {
    let mut web = json!({
        "Title": "Dev",
        "Url": format!("https://contoso.sharepoint.com{SITE_PATH}"),
        "Description": "Development site",
        "ServerRelativeUrl": SITE_PATH,
    });
    if request.selector.contains("Lists") {
        let nested = request
            .selector
            .child("Lists")
            .cloned()
            .unwrap_or_default();
        web["Lists"] = Value::Array(state.lists.iter().map(|l| l.to_json(&nested)).collect());
    }
    Ok((200, project(web, &request.selector)))
}

fn add_list(state: &mut SiteState, request: &TransportRequest) -> Routed {
    let body = payload(request);
    let title = body["Title"].as_str().unwrap_or_default().to_string();
    if state.lists.iter().any(|l| l.title == title) {
        return Err(TransportFault::new(500, format!("A list titled '{title}' already exists")));
    }
    let list = FakeList {
        id: Uuid::new_v4(),
        title,
        template: body["BaseTemplate"].as_i64().unwrap_or(100),
        items: Vec::new(),
        next_item: 1,
        irm_enabled: false,
        unique_roles: false,
    };
    let json = list.to_json(&PropertySelector::new());
    state.lists.push(list);
    Ok((201, json))
}

fn list_action(state: &mut SiteState, request: &TransportRequest, id: Uuid, rest: &str) -> Routed {
    let index = state
        .lists
        .iter()
        .position(|l| l.id == id)
        .ok_or_else(|| not_found("List"))?;

    match (rest, &request.kind) {
        ("", OperationKind::Get) => Ok((200, state.lists[index].to_json(&request.selector))),
        ("", OperationKind::Update) => {
            if let Some(enabled) = payload(request)["IrmEnabled"].as_bool() {
                state.lists[index].irm_enabled = enabled;
            }
            Ok((204, Value::Null))
        }
        ("", OperationKind::Delete) => {
            state.lists.remove(index);
            Ok((200, Value::Null))
        }
        ("/recycle", _) => {
            state.lists.remove(index);
            let recycled = Uuid::new_v4();
            state.recycle_bin.push(recycled);
            Ok((200, json!({ "value": recycled.to_string() })))
        }
        ("/items", OperationKind::Add) => {
            let item = add_item(&mut state.lists[index], payload(request));
            Ok((201, item))
        }
        ("/GetItems", _) => {
            let view = payload(request)["query"]["ViewXml"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let items = &state.lists[index].items;
            let limit = row_limit(&view).unwrap_or(items.len());
            Ok((200, json!({ "value": items.iter().take(limit).cloned().collect::<Vec<_>>() })))
        }
        ("/RenderListDataAsStream", _) => {
            let view = payload(request)["parameters"]["ViewXml"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let items = &state.lists[index].items;
            let limit = row_limit(&view).unwrap_or(30);
            let rows: Vec<Value> = items
                .iter()
                .take(limit)
                .map(|item| json!({ "ID": item["ID"].to_string(), "Title": item["Title"] }))
                .collect();
            Ok((
                200,
                json!({
                    "FirstRow": 1,
                    "LastRow": rows.len(),
                    "RowLimit": limit,
                    "Row": rows,
                }),
            ))
        }
        ("/InformationRightsManagementSettings", OperationKind::Get) => Ok((
            200,
            json!({
                "AllowPrint": false,
                "AllowScript": false,
                "AllowWriteCopy": false,
                "DocumentAccessExpireDays": 90,
                "LicenseCacheExpireDays": 30,
                "DocumentLibraryProtectionExpireDate": "2022-06-01T00:00:00Z",
                "PolicyTitle": "",
                "TemplateId": "",
            }),
        )),
        ("/resetroleinheritance", _) => {
            state.lists[index].unique_roles = false;
            Ok((200, Value::Null))
        }
        (action, _) if action.starts_with("/breakroleinheritance(") => {
            state.lists[index].unique_roles = true;
            Ok((200, Value::Null))
        }
        (other, kind) => Err(TransportFault::new(400, format!("Unsupported {kind} on list{other}"))),
    }
}

fn catalog(state: &mut SiteState, request: &TransportRequest, rest: &str) -> Routed {
    if let Some(args) = rest.strip_prefix("/Add(overwrite=") {
        let overwrite = args.starts_with("true");
        let (file_name, _) = quoted(args, if overwrite { "true,url='" } else { "false,url='" })
            .ok_or_else(|| TransportFault::new(400, "Bad add arguments"))?;
        if !matches!(request.payload, Payload::Binary(ref b) if !b.is_empty()) {
            return Err(TransportFault::new(400, "Package content missing"));
        }
        let title = file_name.trim_end_matches(".sppkg").to_string();
        let id = match state.apps.iter_mut().find(|a| a.file_name == file_name) {
            Some(_) if !overwrite => {
                return Err(TransportFault::new(409, format!("{file_name} already exists")))
            }
            Some(app) => app.id,
            None => {
                let id = Uuid::new_v4();
                state.apps.push(FakeApp {
                    id,
                    title,
                    file_name: file_name.clone(),
                    deployed: false,
                    installed_version: None,
                });
                id
            }
        };
        return Ok((
            200,
            json!({ "UniqueId": id.to_string(), "Name": file_name, "Length": 1 }),
        ));
    }

    if rest == "/AvailableApps" {
        let apps: Vec<Value> = state.apps.iter().map(FakeApp::to_json).collect();
        return Ok((200, json!({ "value": apps })));
    }
    if let Some(filter) = rest.strip_prefix("/AvailableApps?$filter=Title eq '") {
        let title = filter.trim_end_matches('\'').replace("''", "'");
        let apps: Vec<Value> = state
            .apps
            .iter()
            .filter(|a| a.title == title)
            .map(FakeApp::to_json)
            .collect();
        return Ok((200, json!({ "value": apps })));
    }
    if let Some((id, action)) = quoted(rest, "/AvailableApps/GetById('") {
        let id = Uuid::parse_str(&id).map_err(|_| TransportFault::new(400, "Bad app id"))?;
        let index = state
            .apps
            .iter()
            .position(|a| a.id == id)
            .ok_or_else(|| not_found("App"))?;
        if action == "/Remove" {
            state.apps.remove(index);
            return Ok((200, Value::Null));
        }
        let app = &mut state.apps[index];
        match action {
            "" => return Ok((200, project(app.to_json(), &request.selector))),
            "/Deploy" => app.deployed = true,
            "/Retract" => app.deployed = false,
            "/Install" | "/Upgrade" => {
                if !app.deployed {
                    return Err(TransportFault::new(400, "App is not deployed"));
                }
                app.installed_version = Some(APP_VERSION.to_string());
            }
            "/Uninstall" => app.installed_version = None,
            other => return Err(TransportFault::new(400, format!("Unsupported app action {other}"))),
        }
        return Ok((200, Value::Null));
    }
    Err(TransportFault::new(400, format!("Unsupported catalog path {rest}")))
}
